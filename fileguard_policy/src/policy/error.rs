//! Errors raised while evaluating a single tool call.

use super::ToolKind;

/// A request the engine cannot evaluate.
///
/// These never escape the hook boundary: the adapter turns them into a block
/// (or, with `fail_open`, an allow) verdict.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("{tool} call has no '{param}' parameter")]
    MissingParam { tool: ToolKind, param: &'static str },

    #[error("{tool} call contains no recognizable file headers")]
    EmptyPatch { tool: ToolKind },
}

impl GuardError {
    /// Return a help message suggesting how to fix this error, if applicable.
    pub fn help(&self) -> Option<String> {
        match self {
            GuardError::MissingParam { tool, .. } => Some(format!(
                "{} expects {}",
                tool,
                match tool {
                    ToolKind::Exec | ToolKind::Bash => "a 'command' string",
                    ToolKind::ApplyPatch => "patch text in 'patch', 'diff', 'input' or 'file_path'",
                    _ => "a non-empty 'file_path' (or 'path') string",
                }
            )),
            GuardError::EmptyPatch { .. } => Some(
                "use '--- a/path' / '+++ b/path' headers or '*** Update File: path'".into(),
            ),
        }
    }
}
