//! Handler and handler-factory contracts.
//!
//! Factories are supplied by external modules. The manager only ever holds
//! them through `Arc`, and two registrations refer to the same factory when
//! they share the allocation.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

use crate::device::Device;
use crate::uid::{DeviceTypeUid, DeviceUid};

/// Device-type-specific behaviour produced by a [`HandlerFactory`].
pub trait DeviceHandler: Send {
    /// Returns the device serviced by this handler.
    fn device_uid(&self) -> &DeviceUid;

    /// Releases resources held by the handler. Called exactly once when the
    /// binding is released.
    fn dispose(&mut self);
}

/// Capability provider that creates handlers for supported device types.
pub trait HandlerFactory: Send + Sync {
    /// Diagnostic name of the factory implementation.
    fn name(&self) -> &str;

    /// Returns `true` when the factory can service devices of this type.
    fn supports(&self, device_type: &DeviceTypeUid) -> bool;

    /// Creates a handler for the device.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the handler cannot be initialised.
    fn create(&self, device: &Device) -> Result<Box<dyn DeviceHandler>, HandlerError>;
}

/// Failure reported by a factory while creating a handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error that wraps an underlying source.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Converts a caught panic payload into an error.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::new(format!("handler factory panicked: {detail}"))
    }

    /// Human-readable message describing the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Returns `true` when both handles point at the same factory object.
#[must_use]
pub fn same_factory(left: &Arc<dyn HandlerFactory>, right: &Arc<dyn HandlerFactory>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(left), Arc::as_ptr(right))
}
