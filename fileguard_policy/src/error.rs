//! Error types for loading and compiling protection configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading a protection config.
///
/// Every variant except [`ConfigError::NotFound`] marks a config as
/// *malformed*: the engine then either falls back to the built-in defaults or
/// blocks everything, depending on `fail_open`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file does not exist. Not an error for the engine: it quietly
    /// uses the built-in defaults.
    #[error("config file not found at {0}")]
    NotFound(PathBuf),

    /// Failed to read an existing config file.
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or does not have the expected shape.
    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A glob pattern could not be compiled.
    #[error("invalid glob pattern '{pattern}' in {scope}: {source}")]
    InvalidGlob {
        /// The level name, or `self-protection`.
        scope: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Failed to determine the home directory.
    #[error("could not determine home directory")]
    NoHomeDirectory,
}

impl ConfigError {
    /// Returns true if the file simply isn't there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::NotFound(_))
    }

    /// Return a help message suggesting how to fix this error, if applicable.
    pub fn help(&self) -> Option<String> {
        match self {
            ConfigError::Parse { .. } => Some(
                "expected {\"protection_levels\": {\"no_access\": {\"patterns\": [...]}, ...}} \
                 with levels no_access, read_only, no_delete"
                    .into(),
            ),
            ConfigError::InvalidGlob { pattern, .. } => Some(format!(
                "globs support *, **, ?, [...] and {{a,b}} (got '{}')",
                pattern
            )),
            ConfigError::NoHomeDirectory => Some("set $HOME or pass an explicit install dir".into()),
            _ => None,
        }
    }
}

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
