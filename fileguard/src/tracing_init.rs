//! Subscriber setup for the `fileguard` binary.
//!
//! Stdout carries the hook verdict, so logs never go there.

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

use crate::settings::GuardSettings;

/// Log path: `FILEGUARD_LOG` > `~/.fileguard/fileguard.log`.
pub fn log_path() -> Option<PathBuf> {
    std::env::var_os("FILEGUARD_LOG")
        .map(PathBuf::from)
        .or_else(|| {
            GuardSettings::settings_dir()
                .ok()
                .map(|d| d.join("fileguard.log"))
        })
}

pub fn init_tracing(verbose: bool) {
    let file_level = if verbose { Level::TRACE } else { Level::DEBUG };

    // Ensure parent directory exists.
    let log_file = log_path().and_then(|path| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok()?;
        }
        OpenOptions::new().create(true).append(true).open(&path).ok()
    });

    let layer: Box<dyn Layer<_> + Send + Sync> = match log_file {
        Some(file) => tracing_subscriber::fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::from_level(file_level))
            .boxed(),
        None => {
            // Fallback to stderr if log file can't be opened.
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false)
                .with_filter(LevelFilter::from_level(if verbose {
                    Level::DEBUG
                } else {
                    Level::INFO
                }))
                .boxed()
        }
    };

    tracing_subscriber::registry().with(layer).init()
}
