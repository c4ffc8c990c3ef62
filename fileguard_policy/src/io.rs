//! Reading protection config files from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{Level, instrument};

use crate::error::{ConfigError, Result};
use crate::types::ProtectionConfig;

/// Reads a protection config from a specific file path.
///
/// A missing file yields [`ConfigError::NotFound`]; every other failure is a
/// malformed-config error.
#[instrument(level = Level::TRACE)]
pub fn read_config_from_path(path: &Path) -> Result<ProtectionConfig> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    parse_config(path, &content)
}

/// Parses config JSON. `path` is only used for error messages.
pub fn parse_config(path: &Path, content: &str) -> Result<ProtectionConfig> {
    serde_json::from_str(content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
