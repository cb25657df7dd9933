//! Host process for the Hearth device lifecycle manager.
//!
//! Bootstrap loads the layered [`hearth_config::Config`], installs structured
//! telemetry, starts the bounded binding caller and activates a
//! [`hearth_lifecycle::DeviceLifecycleManager`]. The process then waits for a
//! termination signal and deactivates the manager, which disposes every
//! bound handler before the caller is closed.
//!
//! Health reporting hooks emit structured telemetry at each milestone so
//! operators can tell a configuration failure from a shutdown.

mod bootstrap;
mod health;
mod run;
mod shutdown;
mod telemetry;

pub(crate) const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

pub use bootstrap::{
    BINDING_CALLER_NAME, BootstrapError, ConfigLoader, Daemon, StaticConfigLoader,
    SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use run::{RunError, run_daemon, run_daemon_with};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
