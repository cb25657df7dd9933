//! Device lifecycle management for the Hearth home automation runtime.
//!
//! The [`DeviceLifecycleManager`] tracks registered devices and the handler
//! factories contributed by extension modules, and pairs each device with
//! the first factory (in registration order) whose capability predicate
//! accepts the device type. Matching starts only once the manager is
//! activated and runs on a [`BoundedCaller`] with a fixed number of workers,
//! so extension code never executes on the registering thread.
//!
//! Each device also carries an enabled flag persisted sparsely in a
//! [`StatusStore`]: a record means "disabled", no record means "enabled".
//! Disabled devices are never offered to factories.
//!
//! Lifecycle facts are published as timestamped [`LifecycleEvent`]s that
//! observers consume through filtered subscriptions.

mod caller;
mod device;
mod enablement;
mod errors;
mod events;
mod handler;
mod manager;
mod registry;
mod resolver;
mod store;
mod uid;

pub use caller::{BoundedCaller, CallerError};
pub use device::Device;
pub use errors::LifecycleError;
pub use events::{
    EventBus, EventFilter, EventKind, EventKindParseError, EventSubscription, LifecycleEvent,
};
pub use handler::{DeviceHandler, HandlerError, HandlerFactory, same_factory};
pub use manager::{DeviceLifecycleManager, LifecycleManagerBuilder, LifecycleState};
pub use registry::BindingStatus;
pub use resolver::{CapabilityResolver, ModuleIdentity, ModulePrefixResolver, ResolveError};
pub use store::{DISABLED_MARKER, MemoryStatusStore, STATUS_STORAGE_NAME, StatusStore, StoreError};
pub use uid::{DeviceTypeUid, DeviceUid, UidParseError};

#[cfg(test)]
mod test_doubles;

#[cfg(test)]
mod tests;
