use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use fileguard::handlers::{respond, unreadable_event};
use fileguard::settings::GuardSettings;
use tracing::{Level, debug, instrument};

/// Reads one event from stdin and writes the verdict, if any, to stdout.
///
/// Input problems become a verdict. The only error left is failing to write
/// that verdict.
#[instrument(level = Level::TRACE)]
pub fn run(settings_path: Option<&Path>) -> Result<()> {
    let settings = GuardSettings::load(settings_path);

    let mut raw = Vec::new();
    let response = match std::io::stdin().lock().read_to_end(&mut raw) {
        // Invalid UTF-8 is replaced, not rejected, so the event is still
        // judged on the parts that can be read.
        Ok(_) => respond(&String::from_utf8_lossy(&raw), settings),
        Err(e) => {
            let fail_open = settings.as_ref().is_ok_and(|s| s.fail_open);
            unreadable_event(&format!("could not read tool-call event: {}", e), fail_open)
        }
    };

    match response {
        Some(response) => response
            .write_stdout()
            .context("failed to write hook verdict"),
        None => {
            debug!("no response; call proceeds");
            Ok(())
        }
    }
}
