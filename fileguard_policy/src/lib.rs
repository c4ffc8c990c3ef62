//! # fileguard_policy
//!
//! A deterministic file-access policy engine for agent tool calls.
//!
//! Agents with file and shell tools can reach sensitive files in many ways:
//! a direct `read`, an `edit`, a patch, or a shell command such as
//! `grep -r key .env` or `sed -i ... Cargo.lock`. This crate decides, for one
//! tool call at a time, whether the call touches a protected path in a way
//! its protection level forbids.
//!
//! ## Protection levels
//!
//! | Level | Read | Write | Delete |
//! |---|---|---|---|
//! | `no_access` | blocked | blocked | blocked |
//! | `read_only` | allowed | blocked | blocked |
//! | `no_delete` | allowed | allowed | blocked |
//!
//! Levels are configured with glob patterns in a JSON document:
//!
//! ```json
//! {
//!   "protection_levels": {
//!     "no_access": { "description": "secrets", "patterns": ["**/.env", "**/*.pem"] },
//!     "read_only": { "patterns": ["**/Cargo.lock"] },
//!     "no_delete": { "patterns": ["**/LICENSE"] }
//!   }
//! }
//! ```
//!
//! On top of the configured levels, the guard's own install directory and
//! config files are always protected from writes and deletes.
//!
//! ## Quick Start
//!
//! ```rust
//! use fileguard_policy::{FileOperationRequest, MatchOptions, PolicyEngine, ProtectionConfig, ToolKind};
//! use serde_json::json;
//!
//! let engine = PolicyEngine::from_config(ProtectionConfig::defaults(), MatchOptions::default()).unwrap();
//!
//! let request = FileOperationRequest {
//!     tool: ToolKind::Bash,
//!     agent_id: None,
//!     cwd: "/project".into(),
//!     params: json!({ "command": "cat .env | grep KEY" }),
//! };
//! assert!(engine.evaluate(&request).unwrap().is_block());
//! ```
//!
//! ## Shell analysis
//!
//! [`shell::extract_file_operations`] statically recovers the paths a shell
//! command reads, writes and deletes. It is a best-effort classifier for
//! common commands, not a shell interpreter.

pub mod error;
pub mod io;
pub mod merge;
pub mod patch;
pub mod paths;
pub mod policy;
pub mod shell;
pub mod types;

pub use error::{ConfigError, Result};
pub use merge::Merge;
pub use paths::{NormalizedPath, PathResolver};
pub use policy::{
    Block, BlockLevel, CompiledMatcher, EngineOptions, FileOperationRequest, FileTarget,
    GuardError, GuardVerdict, MatchOptions, PathMatch, PolicyEngine, SelfProtection, ToolKind,
    check_path,
};
pub use shell::{FileOperations, extract_file_operations};
pub use types::{LevelConfig, Operation, ProtectionConfig, ProtectionLevel};
