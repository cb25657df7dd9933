//! BDD test world holding the loader, reporter and daemon state.

use std::cell::RefCell;
use std::sync::Arc;

use hearth_lifecycle::{BindingStatus, Device, DeviceUid};

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, bootstrap_with};

use super::config_loader::{FailingConfigLoader, loader_with_workers};
use super::factory::{Disposals, LampFactory};
use super::reporter::RecordingHealthReporter;

/// Scenario world shared across steps.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    pub disposals: Disposals,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
}

impl TestWorld {
    #[must_use]
    pub fn new() -> Self {
        Self {
            loader: Box::new(loader_with_workers(1)),
            reporter: Arc::new(RecordingHealthReporter::default()),
            disposals: Disposals::default(),
            daemon: None,
            bootstrap_error: None,
        }
    }

    pub fn use_loader(&mut self, loader: Box<dyn ConfigLoader>) {
        self.loader = loader;
    }

    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
    }

    pub fn bootstrap(&mut self) {
        let factories = vec![LampFactory::shared(&self.disposals)];
        match bootstrap_with(&*self.loader, self.reporter.clone(), factories) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    pub fn register(&self, raw: &str) {
        let uid: DeviceUid = raw.parse().expect("valid device uid");
        let daemon = self.daemon();
        daemon
            .manager()
            .register_device(Device::from_uid(uid))
            .expect("register device");
        daemon.manager().wait_idle();
    }

    pub fn status(&self, raw: &str) -> Option<BindingStatus> {
        let uid: DeviceUid = raw.parse().expect("valid device uid");
        self.daemon().manager().binding_status(&uid)
    }

    pub fn shutdown(&mut self) {
        if let Some(daemon) = self.daemon.take() {
            daemon.shutdown();
        }
    }

    #[must_use]
    pub fn daemon(&self) -> &Daemon {
        self.daemon.as_ref().expect("daemon was bootstrapped")
    }

    #[must_use]
    pub const fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
