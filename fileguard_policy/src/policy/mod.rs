//! File-access policy evaluation.
//!
//! A [`PolicyEngine`] is built once from the protection config (plus agent
//! overrides and the self-protection set) and then answers one
//! [`FileOperationRequest`] at a time with a [`GuardVerdict`]. Evaluation is
//! a pure function of the request and the engine's immutable state, so a
//! single engine can be shared across threads without locking.
//!
//! ## Tool semantics
//!
//! | Tool | Paths | Blocked by |
//! |---|---|---|
//! | `read` | `file_path` | `no_access` |
//! | `write`, `edit` | `file_path` | self-protection, `no_access`, `read_only` |
//! | `apply_patch` | patch headers | self-protection, `no_access`, `read_only` |
//! | `exec`, `bash` | shell reads | `no_access` |
//! | | shell writes | self-protection, `no_access`, `read_only` |
//! | | shell deletes | self-protection, all levels |

pub mod compile;
mod engine;
pub mod error;
mod eval;

use std::fmt;
use std::path::PathBuf;

use serde::{Serialize, Serializer};

use crate::types::{Operation, ProtectionLevel};

pub use compile::{CompiledLevel, CompiledMatcher, MatchOptions, SelfProtection};
pub use engine::{EngineOptions, PolicyEngine};
pub use error::GuardError;
pub use eval::{FileTarget, PathMatch, check_path, file_targets};

/// The guarded tool classes. Any other tool name passes through unchecked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Write,
    Edit,
    ApplyPatch,
    Exec,
    Bash,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::Read,
        ToolKind::Write,
        ToolKind::Edit,
        ToolKind::ApplyPatch,
        ToolKind::Exec,
        ToolKind::Bash,
    ];

    /// Maps a host tool name to a guarded tool, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Read => "read",
            ToolKind::Write => "write",
            ToolKind::Edit => "edit",
            ToolKind::ApplyPatch => "apply_patch",
            ToolKind::Exec => "exec",
            ToolKind::Bash => "bash",
        }
    }

    /// Whether the tool takes a shell command rather than a path.
    pub fn is_shell(&self) -> bool {
        matches!(self, ToolKind::Exec | ToolKind::Bash)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One intercepted tool call.
#[derive(Debug, Clone)]
pub struct FileOperationRequest {
    pub tool: ToolKind,
    pub agent_id: Option<String>,
    /// Directory relative paths are resolved against.
    pub cwd: PathBuf,
    /// Tool parameters exactly as the host sent them.
    pub params: serde_json::Value,
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum GuardVerdict {
    Allow,
    Block(Block),
}

impl GuardVerdict {
    pub fn is_block(&self) -> bool {
        matches!(self, GuardVerdict::Block(_))
    }

    pub fn block(&self) -> Option<&Block> {
        match self {
            GuardVerdict::Allow => None,
            GuardVerdict::Block(block) => Some(block),
        }
    }
}

/// What caused a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLevel {
    Protection(ProtectionLevel),
    SelfProtection,
    ConfigError,
}

impl fmt::Display for BlockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockLevel::Protection(level) => write!(f, "{}", level),
            BlockLevel::SelfProtection => f.write_str("self-protection"),
            BlockLevel::ConfigError => f.write_str("config-error"),
        }
    }
}

impl Serialize for BlockLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Details of a block decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub level: BlockLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    /// The offending path as the agent wrote it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub reason: String,
}

impl Block {
    pub(crate) fn config_error(message: &str) -> Self {
        Self {
            level: BlockLevel::ConfigError,
            operation: None,
            path: None,
            pattern: None,
            reason: format!(
                "fileguard: blocked because the protection config is invalid (config-error): {}",
                message
            ),
        }
    }

    pub(crate) fn from_match(target: &FileTarget, found: &PathMatch<'_>) -> Self {
        let reason = if found.self_protection {
            format!(
                "fileguard: {} of '{}' blocked by self-protection: the guard's own files cannot be modified",
                target.operation, target.path
            )
        } else {
            let mut reason = format!(
                "fileguard: {} of '{}' blocked: matches {} pattern '{}'",
                target.operation, target.path, found.level, found.pattern
            );
            if let Some(description) = found.description {
                reason.push_str(&format!(" ({})", description));
            }
            reason
        };
        Self {
            level: if found.self_protection {
                BlockLevel::SelfProtection
            } else {
                BlockLevel::Protection(found.level)
            },
            operation: Some(target.operation),
            path: Some(target.path.clone()),
            pattern: Some(found.pattern.to_string()),
            reason,
        }
    }
}
