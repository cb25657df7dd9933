//! Bookkeeping for registered devices and handler factories.
//!
//! Neither registry is synchronised on its own. The manager keeps both
//! behind a single mutex because a matching pass reads them together.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::device::Device;
use crate::handler::{DeviceHandler, HandlerFactory, same_factory};
use crate::uid::DeviceUid;

/// Binding state held for a registered device.
pub(crate) enum BindingState {
    /// No handler, no attempt in flight.
    Unbound,
    /// A matching pass is running on the caller.
    Binding {
        /// Attempt number used to discard stale results.
        attempt: u64,
    },
    /// A handler services the device.
    Bound {
        factory: Arc<dyn HandlerFactory>,
        handler: Box<dyn DeviceHandler>,
    },
    /// The selected factory failed to create a handler.
    Failed {
        factory: Arc<dyn HandlerFactory>,
        reason: String,
    },
}

impl BindingState {
    pub(crate) fn status(&self) -> BindingStatus {
        match self {
            Self::Unbound => BindingStatus::Unbound,
            Self::Binding { .. } => BindingStatus::Binding,
            Self::Bound { factory, .. } => BindingStatus::Bound {
                factory: factory.name().to_owned(),
            },
            Self::Failed { factory, reason } => BindingStatus::Failed {
                factory: factory.name().to_owned(),
                reason: reason.clone(),
            },
        }
    }

    /// Returns `true` when a new matching pass may start.
    pub(crate) const fn accepts_matching(&self) -> bool {
        matches!(self, Self::Unbound | Self::Failed { .. })
    }

    pub(crate) fn is_bound_to(&self, candidate: &Arc<dyn HandlerFactory>) -> bool {
        match self {
            Self::Bound { factory, .. } => same_factory(factory, candidate),
            _ => false,
        }
    }

    pub(crate) fn failed_in(&self, candidate: &Arc<dyn HandlerFactory>) -> bool {
        match self {
            Self::Failed { factory, .. } => same_factory(factory, candidate),
            _ => false,
        }
    }

    /// Returns `true` while the given attempt is still the live one.
    pub(crate) const fn is_attempt(&self, current: u64) -> bool {
        matches!(self, Self::Binding { attempt } if *attempt == current)
    }

    /// Detaches a bound handler, leaving the device unbound.
    pub(crate) fn take_bound(&mut self) -> Option<(Arc<dyn HandlerFactory>, Box<dyn DeviceHandler>)> {
        if !matches!(self, Self::Bound { .. }) {
            return None;
        }
        match std::mem::replace(self, Self::Unbound) {
            Self::Bound { factory, handler } => Some((factory, handler)),
            _ => None,
        }
    }
}

/// Caller-facing view of a device's binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingStatus {
    /// No handler is bound.
    Unbound,
    /// Handler assignment is in progress.
    Binding,
    /// A handler created by the named factory services the device.
    Bound {
        /// Name of the servicing factory.
        factory: String,
    },
    /// Handler initialisation failed and will not be retried automatically.
    Failed {
        /// Name of the factory that failed.
        factory: String,
        /// Failure description.
        reason: String,
    },
}

impl fmt::Display for BindingStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbound => formatter.write_str("unbound"),
            Self::Binding => formatter.write_str("binding"),
            Self::Bound { factory } => write!(formatter, "bound to {factory}"),
            Self::Failed { factory, reason } => {
                write!(formatter, "failed in {factory}: {reason}")
            }
        }
    }
}

pub(crate) struct DeviceEntry {
    pub(crate) device: Device,
    pub(crate) state: BindingState,
}

/// Outcome of inserting a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Insertion {
    Inserted,
    Unchanged,
    Conflict,
}

#[derive(Default)]
pub(crate) struct DeviceRegistry {
    entries: BTreeMap<DeviceUid, DeviceEntry>,
}

impl DeviceRegistry {
    pub(crate) fn insert(&mut self, device: Device) -> Insertion {
        match self.entries.get(device.uid()) {
            Some(existing) if existing.device == device => Insertion::Unchanged,
            Some(_) => Insertion::Conflict,
            None => {
                self.entries.insert(
                    device.uid().clone(),
                    DeviceEntry {
                        device,
                        state: BindingState::Unbound,
                    },
                );
                Insertion::Inserted
            }
        }
    }

    pub(crate) fn remove(&mut self, uid: &DeviceUid) -> Option<DeviceEntry> {
        self.entries.remove(uid)
    }

    pub(crate) fn get(&self, uid: &DeviceUid) -> Option<&DeviceEntry> {
        self.entries.get(uid)
    }

    pub(crate) fn get_mut(&mut self, uid: &DeviceUid) -> Option<&mut DeviceEntry> {
        self.entries.get_mut(uid)
    }

    pub(crate) fn uids(&self) -> Vec<DeviceUid> {
        self.entries.keys().cloned().collect()
    }

    /// UIDs of devices that may start a matching pass.
    pub(crate) fn matchable(&self) -> Vec<DeviceUid> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.state.accepts_matching())
            .map(|(uid, _)| uid.clone())
            .collect()
    }

    pub(crate) fn bridged_by(&self, bridge: &DeviceUid) -> Vec<DeviceUid> {
        self.entries
            .values()
            .filter(|entry| entry.device.bridge() == Some(bridge))
            .map(|entry| entry.device.uid().clone())
            .collect()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut DeviceEntry> {
        self.entries.values_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Factories in registration order.
///
/// Every successful addition bumps the epoch so a matching pass can tell
/// which factories appeared after it took its snapshot.
#[derive(Default)]
pub(crate) struct FactoryRegistry {
    factories: Vec<(Arc<dyn HandlerFactory>, u64)>,
    epoch: u64,
}

impl FactoryRegistry {
    /// Adds the factory; returns `false` when it was already registered.
    pub(crate) fn add(&mut self, factory: Arc<dyn HandlerFactory>) -> bool {
        if self.contains(&factory) {
            return false;
        }
        self.epoch += 1;
        self.factories.push((factory, self.epoch));
        true
    }

    /// Removes the factory; returns `false` when it was not registered.
    pub(crate) fn remove(&mut self, factory: &Arc<dyn HandlerFactory>) -> bool {
        let before = self.factories.len();
        self.factories
            .retain(|(registered, _)| !same_factory(registered, factory));
        self.factories.len() != before
    }

    pub(crate) fn contains(&self, factory: &Arc<dyn HandlerFactory>) -> bool {
        self.factories
            .iter()
            .any(|(registered, _)| same_factory(registered, factory))
    }

    pub(crate) const fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn HandlerFactory>> {
        self.factories
            .iter()
            .map(|(factory, _)| Arc::clone(factory))
            .collect()
    }

    /// Factories registered after `epoch`, in registration order.
    pub(crate) fn added_after(&self, epoch: u64) -> Vec<Arc<dyn HandlerFactory>> {
        self.factories
            .iter()
            .filter(|(_, added)| *added > epoch)
            .map(|(factory, _)| Arc::clone(factory))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.factories.len()
    }
}
