//! Foreground run loop: bootstrap, wait for a signal, shut down.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use hearth_lifecycle::HandlerFactory;

use crate::DAEMON_TARGET;
use crate::bootstrap::{BootstrapError, ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

/// Errors that end the daemon run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Bootstrap did not complete.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The shutdown listener failed; the manager was still deactivated.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Runs the daemon with system collaborators until a termination signal.
///
/// # Errors
///
/// See [`run_daemon_with`].
pub fn run_daemon(factories: Vec<Arc<dyn HandlerFactory>>) -> Result<(), RunError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        &SystemShutdownSignal,
        factories,
    )
}

/// Runs the daemon with the supplied collaborators.
///
/// The manager is deactivated even when waiting for the signal fails.
///
/// # Errors
///
/// Returns [`RunError::Bootstrap`] when the daemon cannot start and
/// [`RunError::Shutdown`] when the signal listener cannot be installed.
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    signal: &dyn ShutdownSignal,
    factories: Vec<Arc<dyn HandlerFactory>>,
) -> Result<(), RunError> {
    let daemon = bootstrap_with(loader, reporter, factories)?;
    info!(
        target: DAEMON_TARGET,
        factories = daemon.manager().factory_count(),
        "daemon running"
    );
    let waited = signal.wait();
    daemon.shutdown();
    waited.map_err(RunError::from)
}
