//! Errors returned synchronously by the lifecycle manager.

use thiserror::Error;

use crate::caller::CallerError;
use crate::store::StoreError;
use crate::uid::DeviceUid;

/// Failures surfaced to the immediate caller of a manager operation.
///
/// Handler construction failures never appear here; they are recorded in
/// the device's binding status instead.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A different device is already registered under this UID.
    #[error("device '{uid}' is already registered with a different definition")]
    Conflict {
        /// UID of the conflicting registration.
        uid: DeviceUid,
    },
    /// The device names itself as its bridge.
    #[error("device '{uid}' cannot be its own bridge")]
    InvalidBridge {
        /// UID of the rejected device.
        uid: DeviceUid,
    },
    /// The manager no longer accepts lifecycle changes.
    #[error("lifecycle manager is shut down: {source}")]
    CallerClosed {
        /// Underlying caller error.
        #[source]
        source: CallerError,
    },
    /// Persisting the enablement flag failed.
    #[error("failed to persist enablement of '{uid}': {source}")]
    Store {
        /// Device whose flag could not be written.
        uid: DeviceUid,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}

impl LifecycleError {
    pub(crate) const fn conflict(uid: DeviceUid) -> Self {
        Self::Conflict { uid }
    }

    pub(crate) const fn invalid_bridge(uid: DeviceUid) -> Self {
        Self::InvalidBridge { uid }
    }

    pub(crate) const fn store(uid: DeviceUid, source: StoreError) -> Self {
        Self::Store { uid, source }
    }

    /// Returns `true` for the shut-down error.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::CallerClosed { .. })
    }
}

impl From<CallerError> for LifecycleError {
    fn from(source: CallerError) -> Self {
        Self::CallerClosed { source }
    }
}
