//! Sparse persistence of the per-device enabled flag.
//!
//! A record under the device UID means "disabled"; no record means
//! "enabled". Enabling deletes the record instead of writing a positive
//! marker. The store is read on every query, so external edits are seen
//! immediately.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::{DISABLED_MARKER, StatusStore, StoreError};
use crate::uid::DeviceUid;

const ENABLEMENT_TARGET: &str = "hearth::enablement";

#[derive(Clone, Default)]
pub(crate) struct Enablement {
    store: Option<Arc<dyn StatusStore>>,
}

impl Enablement {
    pub(crate) fn new(store: Option<Arc<dyn StatusStore>>) -> Self {
        Self { store }
    }

    /// Persists the flag. Without a store the call is a no-op.
    pub(crate) fn set(&self, uid: &DeviceUid, enabled: bool) -> Result<(), StoreError> {
        let Some(store) = self.store.as_ref() else {
            debug!(
                target: ENABLEMENT_TARGET,
                uid = %uid,
                enabled,
                "no status store configured; enablement not persisted"
            );
            return Ok(());
        };
        if enabled {
            store.remove(uid.as_str())
        } else {
            store.put(uid.as_str(), DISABLED_MARKER)
        }
    }

    /// Reads the flag, falling back to enabled when the store is absent or
    /// unreadable.
    pub(crate) fn is_enabled(&self, uid: &DeviceUid) -> bool {
        let Some(store) = self.store.as_ref() else {
            return true;
        };
        match store.contains_key(uid.as_str()) {
            Ok(disabled) => !disabled,
            Err(error) => {
                warn!(
                    target: ENABLEMENT_TARGET,
                    uid = %uid,
                    error = %error,
                    "status store unavailable; assuming device is enabled"
                );
                true
            }
        }
    }
}
