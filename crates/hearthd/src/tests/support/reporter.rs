//! Test double for [`HealthReporter`] that records milestones for assertions.

use std::sync::Mutex;

use hearth_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

/// Milestones tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    ManagerActivated { factories: usize },
    BootstrapSucceeded { binding_workers: usize },
    BootstrapFailed(String),
    ShutdownRequested,
    ShutdownCompleted,
}

/// Records health events in arrival order.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn manager_activated(&self, factories: usize) {
        self.record(HealthEvent::ManagerActivated { factories });
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded {
            binding_workers: config.binding_workers(),
        });
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn shutdown_requested(&self) {
        self.record(HealthEvent::ShutdownRequested);
    }

    fn shutdown_completed(&self) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}
