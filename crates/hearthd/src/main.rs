//! Binary entry point for the Hearth daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    // Modules linked into the host contribute their factories here.
    match hearthd::run_daemon(Vec::new()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr().lock(), "hearthd: {error}");
            ExitCode::FAILURE
        }
    }
}
