//! Lifecycle facts published for external observers.
//!
//! The manager is a pure producer. Each [`LifecycleEvent`] carries a UTC
//! timestamp and a topic of the form `hearth/devices/{uid}/{kind}` so a
//! broadcaster can forward it without further enrichment. Subscribers
//! receive events over their own channel; nothing waits for them.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::trace;

use crate::uid::DeviceUid;

const EVENTS_TARGET: &str = "hearth::events";
const TOPIC_PREFIX: &str = "hearth/devices";

/// Kinds of lifecycle facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A device was registered.
    Added,
    /// A device was unregistered.
    Removed,
    /// A handler was bound to a device.
    Bound,
    /// A handler binding was released.
    Unbound,
    /// Handler construction failed.
    BindingFailed,
    /// A device was enabled.
    Enabled,
    /// A device was disabled.
    Disabled,
}

impl EventKind {
    /// Returns the snake-case label used in topics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Bound => "bound",
            Self::Unbound => "unbound",
            Self::BindingFailed => "binding_failed",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error returned when parsing an event kind fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported event kind: {0}")]
pub struct EventKindParseError(String);

impl FromStr for EventKind {
    type Err = EventKindParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "added" => Ok(Self::Added),
            "removed" => Ok(Self::Removed),
            "bound" => Ok(Self::Bound),
            "unbound" => Ok(Self::Unbound),
            "binding_failed" => Ok(Self::BindingFailed),
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            other => Err(EventKindParseError(other.to_owned())),
        }
    }
}

/// A single timestamped lifecycle fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    kind: EventKind,
    uid: DeviceUid,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl LifecycleEvent {
    /// Creates an event stamped with the current UTC time.
    #[must_use]
    pub fn now(kind: EventKind, uid: DeviceUid) -> Self {
        Self {
            kind,
            uid,
            timestamp: OffsetDateTime::now_utc(),
            detail: None,
        }
    }

    /// Attaches free-form detail such as a factory name or failure reason.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the device the event refers to.
    #[must_use]
    pub const fn uid(&self) -> &DeviceUid {
        &self.uid
    }

    /// Returns the UTC timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    /// Returns the optional detail.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the broadcast topic, e.g. `hearth/devices/hue:bulb:1/bound`.
    #[must_use]
    pub fn topic(&self) -> String {
        format!("{TOPIC_PREFIX}/{}/{}", self.uid, self.kind)
    }
}

/// Selects events by device and kind. Empty sets match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    uids: BTreeSet<DeviceUid>,
    kinds: BTreeSet<EventKind>,
}

impl EventFilter {
    /// Filter accepting every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the filter to the given device (may be repeated).
    #[must_use]
    pub fn for_uid(mut self, uid: DeviceUid) -> Self {
        self.uids.insert(uid);
        self
    }

    /// Restricts the filter to the given kind (may be repeated).
    #[must_use]
    pub fn for_kind(mut self, kind: EventKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Returns `true` when the event passes the filter.
    #[must_use]
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        (self.uids.is_empty() || self.uids.contains(&event.uid))
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: Receiver<LifecycleEvent>,
}

impl EventSubscription {
    /// Returns the next buffered event without blocking.
    #[must_use]
    pub fn try_next(&self) -> Option<LifecycleEvent> {
        self.receiver.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    #[must_use]
    pub fn next_timeout(&self, timeout: Duration) -> Option<LifecycleEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Collects every buffered event.
    #[must_use]
    pub fn drain(&self) -> Vec<LifecycleEvent> {
        self.receiver.try_iter().collect()
    }
}

#[derive(Debug)]
struct Subscriber {
    filter: EventFilter,
    sender: Sender<LifecycleEvent>,
}

/// Fan-out of lifecycle events to filtered subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    /// Creates a bus without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber receiving events that pass `filter`.
    ///
    /// The channel is unbounded: publishing never blocks or drops, so a live
    /// subscriber that never drains keeps every matching event in memory.
    /// Narrow the filter or drop the subscription when events are not read.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        let (sender, receiver) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { filter, sender });
        EventSubscription { receiver }
    }

    /// Delivers the event to every matching subscriber. Subscribers whose
    /// receiving end was dropped are removed.
    pub fn publish(&self, event: &LifecycleEvent) {
        trace!(
            target: EVENTS_TARGET,
            topic = %event.topic(),
            "publishing lifecycle event"
        );
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|subscriber| {
                !subscriber.filter.matches(event) || subscriber.sender.send(event.clone()).is_ok()
            });
    }

    /// Returns the number of live subscribers as of the last publish.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
