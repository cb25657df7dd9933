//! Device descriptions registered with the lifecycle manager.

use crate::uid::{DeviceTypeUid, DeviceUid};

/// Logical representation of a physical or virtual endpoint.
///
/// Two registrations refer to the same device only when the whole value is
/// equal; a differing label, type or bridge under an existing UID is a
/// configuration conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    uid: DeviceUid,
    device_type: DeviceTypeUid,
    label: Option<String>,
    bridge: Option<DeviceUid>,
}

impl Device {
    /// Creates a device of the given type.
    #[must_use]
    pub fn new(uid: DeviceUid, device_type: DeviceTypeUid) -> Self {
        Self {
            uid,
            device_type,
            label: None,
            bridge: None,
        }
    }

    /// Creates a device whose type is taken from the UID prefix.
    #[must_use]
    pub fn from_uid(uid: DeviceUid) -> Self {
        let device_type = uid.device_type();
        Self::new(uid, device_type)
    }

    /// Attaches a human-readable label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Records the bridge hosting this device.
    #[must_use]
    pub fn with_bridge(mut self, bridge: DeviceUid) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Returns the unique identifier.
    #[must_use]
    pub const fn uid(&self) -> &DeviceUid {
        &self.uid
    }

    /// Returns the device type used for factory matching.
    #[must_use]
    pub const fn device_type(&self) -> &DeviceTypeUid {
        &self.device_type
    }

    /// Returns the label, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns the hosting bridge, if any.
    #[must_use]
    pub const fn bridge(&self) -> Option<&DeviceUid> {
        self.bridge.as_ref()
    }
}
