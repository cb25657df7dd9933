//! Test harness utilities for the daemon suites.

mod config_loader;
mod factory;
mod reporter;
mod world;

pub use config_loader::{FailingConfigLoader, loader_with_workers};
pub use factory::{Disposals, LampFactory};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use world::{TestWorld, world};
