//! Structured audit logging for block decisions.
//!
//! Writes JSON Lines entries to `~/.fileguard/audit.jsonl` (configurable via
//! settings). Each entry records the blocked tool call and why it was blocked.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{Level, instrument, warn};

/// A single audit log entry.
#[derive(Debug, Serialize)]
pub struct AuditEntry<'a> {
    /// Unix timestamp with millisecond precision (e.g. `1706123456.789`).
    pub timestamp: String,
    pub tool: &'a str,
    pub agent_id: Option<&'a str>,
    pub path: Option<&'a str>,
    /// Protection level, `self-protection`, `config-error` or `internal-error`.
    pub level: &'a str,
    pub pattern: Option<&'a str>,
    pub reason: &'a str,
}

/// Configuration for audit logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Path to the audit log file. Defaults to `~/.fileguard/audit.jsonl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Resolve the audit log path.
    pub fn log_path(&self) -> PathBuf {
        if let Some(ref path) = self.path {
            path.clone()
        } else {
            dirs::home_dir()
                .map(|h| h.join(".fileguard").join("audit.jsonl"))
                .unwrap_or_else(|| PathBuf::from("audit.jsonl"))
        }
    }
}

/// Appends `entry` to the audit log if auditing is enabled. Failures are
/// logged, never propagated: auditing must not change a verdict.
#[instrument(level = Level::TRACE, skip(entry))]
pub fn log_block(config: &AuditConfig, entry: &AuditEntry<'_>) {
    if !config.enabled {
        return;
    }
    let path = config.log_path();
    if let Err(e) = append_entry(&path, entry) {
        warn!(error = %e, path = %path.display(), "Failed to write audit log entry");
    }
}

pub fn timestamp() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", duration.as_secs(), duration.subsec_millis())
}

fn append_entry(path: &Path, entry: &AuditEntry<'_>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(entry).map_err(std::io::Error::other)?;
    writeln!(file, "{}", json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(reason: &str) -> AuditEntry<'_> {
        AuditEntry {
            timestamp: timestamp(),
            tool: "read",
            agent_id: Some("search"),
            path: Some(".env"),
            level: "no_access",
            pattern: Some("**/.env"),
            reason,
        }
    }

    #[test]
    fn test_log_block_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            enabled: true,
            path: Some(dir.path().join("nested/audit.jsonl")),
        };
        log_block(&config, &entry("first"));
        log_block(&config, &entry("second"));

        let contents = std::fs::read_to_string(config.log_path()).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["reason"], "first");
        assert_eq!(lines[1]["level"], "no_access");
        assert_eq!(lines[1]["agent_id"], "search");
    }

    #[test]
    fn test_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            enabled: false,
            path: Some(dir.path().join("audit.jsonl")),
        };
        log_block(&config, &entry("x"));
        assert!(!dir.path().join("audit.jsonl").exists());
    }

    #[test]
    fn test_default_path() {
        let path = AuditConfig::default().log_path();
        assert!(path.ends_with(".fileguard/audit.jsonl") || path.ends_with("audit.jsonl"));
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp();
        let (secs, millis) = ts.split_once('.').unwrap();
        assert!(secs.parse::<u64>().is_ok());
        assert_eq!(millis.len(), 3);
    }
}
