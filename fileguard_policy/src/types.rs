//! Type definitions for protection configuration.
//!
//! A [`ProtectionConfig`] maps each [`ProtectionLevel`] to an ordered list of
//! glob patterns. It mirrors the on-disk JSON document:
//!
//! ```json
//! {
//!   "protection_levels": {
//!     "no_access": { "description": "secrets", "patterns": ["**/.env"] },
//!     "read_only": { "patterns": ["**/Cargo.lock"] }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How strongly a path is protected.
///
/// Variants are declared in severity order, so the derived `Ord` (and the
/// iteration order of a `BTreeMap<ProtectionLevel, _>`) goes from most to
/// least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionLevel {
    /// No read, write or delete.
    NoAccess,
    /// Reads allowed; writes and deletes blocked.
    ReadOnly,
    /// Reads and writes allowed; deletes blocked.
    NoDelete,
}

impl ProtectionLevel {
    /// All levels, most severe first. Evaluation walks this order.
    pub const ALL: [ProtectionLevel; 3] = [
        ProtectionLevel::NoAccess,
        ProtectionLevel::ReadOnly,
        ProtectionLevel::NoDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionLevel::NoAccess => "no_access",
            ProtectionLevel::ReadOnly => "read_only",
            ProtectionLevel::NoDelete => "no_delete",
        }
    }

    /// Whether a path at this level may not undergo `op`.
    pub fn restricts(self, op: Operation) -> bool {
        match self {
            ProtectionLevel::NoAccess => true,
            ProtectionLevel::ReadOnly => matches!(op, Operation::Write | Operation::Delete),
            ProtectionLevel::NoDelete => op == Operation::Delete,
        }
    }
}

impl fmt::Display for ProtectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtectionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_access" => Ok(ProtectionLevel::NoAccess),
            "read_only" => Ok(ProtectionLevel::ReadOnly),
            "no_delete" => Ok(ProtectionLevel::NoDelete),
            other => Err(format!(
                "unknown protection level '{}' (expected no_access, read_only or no_delete)",
                other
            )),
        }
    }
}

/// The kind of file access a tool call implies for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patterns and an optional description for one protection level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Human-readable explanation, appended to block reasons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ordered glob patterns.
    pub patterns: Vec<String>,
}

impl LevelConfig {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            description: None,
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Glob patterns per protection level, as loaded from JSON.
///
/// Levels that are absent from the document simply have no patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionConfig {
    pub protection_levels: BTreeMap<ProtectionLevel, LevelConfig>,
}

const DEFAULT_NO_ACCESS: &[&str] = &[
    ".env",
    ".env.*",
    ".ssh/*",
    ".aws/credentials",
    ".aws/config",
    "credentials.json",
    "credentials.yaml",
    "*.pem",
    "*.key",
    ".kube/config",
    "secrets.yml",
    "secrets.yaml",
];

const DEFAULT_READ_ONLY: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "go.sum",
];

const DEFAULT_NO_DELETE: &[&str] = &[".git/*", "LICENSE", "README.md"];

impl ProtectionConfig {
    /// Creates an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in configuration used when no config file exists, or when a
    /// malformed file is encountered with `fail_open` set.
    pub fn defaults() -> Self {
        let anywhere = |names: &[&str]| names.iter().map(|n| format!("**/{}", n)).collect();
        Self::new()
            .with_level(
                ProtectionLevel::NoAccess,
                LevelConfig {
                    description: Some("secrets and credentials".into()),
                    patterns: anywhere(DEFAULT_NO_ACCESS),
                },
            )
            .with_level(
                ProtectionLevel::ReadOnly,
                LevelConfig {
                    description: Some("lockfiles are managed by package managers".into()),
                    patterns: anywhere(DEFAULT_READ_ONLY),
                },
            )
            .with_level(
                ProtectionLevel::NoDelete,
                LevelConfig {
                    description: Some("repository metadata and project documents".into()),
                    patterns: anywhere(DEFAULT_NO_DELETE),
                },
            )
    }

    /// Sets the config for a level, replacing any previous one.
    pub fn with_level(mut self, level: ProtectionLevel, config: LevelConfig) -> Self {
        self.protection_levels.insert(level, config);
        self
    }

    /// Returns the config for a level, if present.
    pub fn level(&self, level: ProtectionLevel) -> Option<&LevelConfig> {
        self.protection_levels.get(&level)
    }

    /// Returns the patterns for a level (empty if the level is absent).
    pub fn patterns(&self, level: ProtectionLevel) -> &[String] {
        self.level(level).map(|l| l.patterns.as_slice()).unwrap_or(&[])
    }

    /// Total number of patterns across all levels.
    pub fn pattern_count(&self) -> usize {
        self.protection_levels.values().map(|l| l.patterns.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_order_is_severity_order() {
        let mut levels = vec![
            ProtectionLevel::NoDelete,
            ProtectionLevel::NoAccess,
            ProtectionLevel::ReadOnly,
        ];
        levels.sort();
        assert_eq!(levels, ProtectionLevel::ALL.to_vec());
    }

    #[test]
    fn test_restricts_matrix() {
        use Operation::*;
        use ProtectionLevel::*;
        assert!(NoAccess.restricts(Read));
        assert!(NoAccess.restricts(Write));
        assert!(NoAccess.restricts(Delete));
        assert!(!ReadOnly.restricts(Read));
        assert!(ReadOnly.restricts(Write));
        assert!(ReadOnly.restricts(Delete));
        assert!(!NoDelete.restricts(Read));
        assert!(!NoDelete.restricts(Write));
        assert!(NoDelete.restricts(Delete));
    }

    #[test]
    fn test_defaults_are_prefixed() {
        let defaults = ProtectionConfig::defaults();
        assert_eq!(defaults.patterns(ProtectionLevel::NoAccess).len(), 12);
        assert_eq!(defaults.patterns(ProtectionLevel::ReadOnly).len(), 6);
        assert_eq!(defaults.patterns(ProtectionLevel::NoDelete).len(), 3);
        assert!(defaults.pattern_count() == 21);
        assert!(
            defaults
                .protection_levels
                .values()
                .flat_map(|l| &l.patterns)
                .all(|p| p.starts_with("**/"))
        );
        assert_eq!(defaults.patterns(ProtectionLevel::NoAccess)[0], "**/.env");
        assert_eq!(defaults.patterns(ProtectionLevel::NoDelete)[0], "**/.git/*");
    }

    #[test]
    fn test_parse_document() {
        let json = r#"{
            "protection_levels": {
                "no_access": { "description": "secrets", "patterns": ["**/.env"] },
                "no_delete": { "patterns": ["**/LICENSE"] }
            }
        }"#;
        let config: ProtectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.patterns(ProtectionLevel::NoAccess), ["**/.env"]);
        assert_eq!(
            config.level(ProtectionLevel::NoAccess).unwrap().description.as_deref(),
            Some("secrets")
        );
        assert!(config.patterns(ProtectionLevel::ReadOnly).is_empty());
        assert_eq!(config.patterns(ProtectionLevel::NoDelete), ["**/LICENSE"]);
    }

    #[test]
    fn test_parse_rejects_missing_protection_levels() {
        let result: Result<ProtectionConfig, _> = serde_json::from_str(r#"{"levels": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_level() {
        let json = r#"{"protection_levels": {"no_acess": {"patterns": []}}}"#;
        let result: Result<ProtectionConfig, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_missing_patterns() {
        let json = r#"{"protection_levels": {"no_access": {"description": "x"}}}"#;
        let result: Result<ProtectionConfig, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_roundtrips_level_keys() {
        let json = serde_json::to_value(ProtectionConfig::defaults()).unwrap();
        assert!(json["protection_levels"]["no_access"]["patterns"].is_array());
        assert!(json["protection_levels"]["read_only"]["patterns"].is_array());
        assert!(json["protection_levels"]["no_delete"]["patterns"].is_array());
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("read_only".parse::<ProtectionLevel>(), Ok(ProtectionLevel::ReadOnly));
        assert!("readonly".parse::<ProtectionLevel>().is_err());
    }
}
