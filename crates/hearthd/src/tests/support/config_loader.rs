//! Configuration loaders covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use hearth_config::Config;
use ortho_config::OrthoError;

use crate::bootstrap::{ConfigLoader, StaticConfigLoader};

/// Loader that yields the defaults with the given worker count.
pub fn loader_with_workers(binding_workers: usize) -> StaticConfigLoader {
    StaticConfigLoader::new(Config {
        binding_workers,
        ..Config::default()
    })
}

/// Loader that fails by parsing a malformed command line.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("hearthd"),
            OsString::from("--binding-workers"),
            OsString::from("many"),
        ];
        Config::load_from_iter(args)
    }
}
