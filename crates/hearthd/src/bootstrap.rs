//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use hearth_config::{Config, ConfigError};
use hearth_lifecycle::{
    BoundedCaller, CallerError, DeviceLifecycleManager, HandlerFactory, LifecycleError,
    MemoryStatusStore, ModulePrefixResolver,
};

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Name given to the caller that runs binding work.
pub const BINDING_CALLER_NAME: &str = "device-lifecycle";

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when any configuration layer is malformed.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps the configuration to hand out.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but holds unusable values.
    #[error("invalid configuration: {source}")]
    InvalidConfiguration {
        /// Validation failure.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The binding caller could not start.
    #[error("failed to start binding workers: {source}")]
    Caller {
        /// Underlying caller error.
        #[source]
        source: CallerError,
    },
    /// Installing a handler factory or activating the manager failed.
    #[error("failed to activate device lifecycle: {source}")]
    Lifecycle {
        /// Underlying lifecycle error.
        #[source]
        source: LifecycleError,
    },
}

/// Result of a successful bootstrap.
pub struct Daemon {
    config: Config,
    manager: DeviceLifecycleManager,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The active lifecycle manager. Modules register devices and factories
    /// through it while the daemon runs.
    #[must_use]
    pub const fn manager(&self) -> &DeviceLifecycleManager {
        &self.manager
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Releases every handler and drains outstanding binding work.
    pub fn shutdown(self) {
        self.reporter.shutdown_requested();
        self.manager.deactivate();
        self.reporter.shutdown_completed();
    }
}

/// Bootstraps the daemon with the supplied collaborators.
///
/// `factories` are installed in order before activation, so the first
/// matching pass already sees all of them.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry, the binding
/// caller or activation fails. The reporter is notified before returning.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    factories: Vec<Arc<dyn HandlerFactory>>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match assemble(loader, factories) {
        Ok((config, manager, telemetry)) => {
            reporter.manager_activated(manager.factory_count());
            reporter.bootstrap_succeeded(&config);
            Ok(Daemon {
                config,
                manager,
                telemetry,
                reporter,
            })
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn assemble(
    loader: &dyn ConfigLoader,
    factories: Vec<Arc<dyn HandlerFactory>>,
) -> Result<(Config, DeviceLifecycleManager, TelemetryHandle), BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    config
        .validate()
        .map_err(|source| BootstrapError::InvalidConfiguration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let caller = BoundedCaller::new(BINDING_CALLER_NAME, config.binding_workers())
        .map_err(|source| BootstrapError::Caller { source })?;
    // No persistent engine yet: enablement lives only as long as the process.
    let manager = DeviceLifecycleManager::builder(caller)
        .status_store(Arc::new(MemoryStatusStore::named(config.status_storage())))
        .resolver(Arc::new(ModulePrefixResolver))
        .build();
    for factory in factories {
        manager
            .add_handler_factory(factory)
            .map_err(|source| BootstrapError::Lifecycle { source })?;
    }
    manager
        .activate()
        .map_err(|source| BootstrapError::Lifecycle { source })?;
    Ok((config, manager, telemetry))
}
