//! Host event and verdict shapes.
//!
//! The host sends one JSON tool-call event per intercepted call and treats
//! an empty response as "proceed".

use std::io::{Read, Write};
use std::path::PathBuf;

use fileguard_policy::{FileOperationRequest, ToolKind};
use serde::{Deserialize, Serialize};

/// A tool-call event as sent by the host.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallEvent {
    #[serde(rename = "toolName", alias = "tool_name")]
    pub tool_name: String,
    #[serde(default, rename = "agentId", alias = "agent_id")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default, alias = "tool_input")]
    pub params: serde_json::Value,
}

impl ToolCallEvent {
    /// Parse from any reader (for testability)
    pub fn from_reader(reader: impl Read) -> anyhow::Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// The guarded tool class, or `None` for tools that pass through.
    pub fn tool(&self) -> Option<ToolKind> {
        ToolKind::from_name(&self.tool_name)
    }

    /// Builds the engine request. A missing or empty `cwd` means the
    /// process working directory.
    pub fn to_request(&self, tool: ToolKind) -> FileOperationRequest {
        let cwd = self
            .cwd
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));
        FileOperationRequest {
            tool,
            agent_id: self.agent_id.clone().filter(|a| !a.is_empty()),
            cwd,
            params: self.params.clone(),
        }
    }
}

/// The response for a blocked call. Allowed calls get no response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    pub block: bool,
    pub block_reason: String,
}

impl HookResponse {
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            block: true,
            block_reason: reason.into(),
        }
    }

    /// Write response to any writer (for testability)
    pub fn write_to(&self, mut writer: impl Write) -> anyhow::Result<()> {
        serde_json::to_writer(&mut writer, self)?;
        writeln!(writer)?;
        Ok(())
    }

    /// Write response to stdout (convenience wrapper for production)
    pub fn write_stdout(&self) -> anyhow::Result<()> {
        self.write_to(std::io::stdout().lock())
    }
}

/// Exit codes for `fileguard hook`.
pub mod exit_code {
    /// Verdict (or nothing, for allow) written to stdout.
    pub const SUCCESS: i32 = 0;
    /// No verdict could be written; the host treats this as a blocking error.
    pub const BLOCKING_ERROR: i32 = 2;
}
