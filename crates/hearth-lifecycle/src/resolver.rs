//! Diagnostic lookup of the module that owns a device type.

use std::fmt;

use thiserror::Error;

use crate::uid::DeviceTypeUid;

/// Identity of the module that contributes a device type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleIdentity(String);

impl ModuleIdentity {
    /// Placeholder used when resolution fails.
    pub const UNKNOWN: &'static str = "unknown";

    /// Wraps a module name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Identity reported when no resolver is configured or it fails.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    /// Returns the module name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Raised when the owning module of a device type cannot be determined.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no module owns device type '{device_type}'")]
pub struct ResolveError {
    device_type: String,
}

impl ResolveError {
    /// Builds an error for the unresolvable type.
    #[must_use]
    pub fn new(device_type: &DeviceTypeUid) -> Self {
        Self {
            device_type: device_type.to_string(),
        }
    }
}

/// Maps device types to their owning modules. Only used to annotate logs.
pub trait CapabilityResolver: Send + Sync {
    /// Resolves the module that contributes `device_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the type is unknown to the resolver.
    fn resolve(&self, device_type: &DeviceTypeUid) -> Result<ModuleIdentity, ResolveError>;
}

/// Resolver that treats the first type segment as the module name.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModulePrefixResolver;

impl CapabilityResolver for ModulePrefixResolver {
    fn resolve(&self, device_type: &DeviceTypeUid) -> Result<ModuleIdentity, ResolveError> {
        Ok(ModuleIdentity::new(device_type.module()))
    }
}
