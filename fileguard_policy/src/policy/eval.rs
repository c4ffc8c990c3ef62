//! Per-request evaluation: which paths a tool call touches, and whether any
//! of them hits a protection pattern that restricts the operation.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{Level, debug, instrument};

use super::compile::{CompiledMatcher, SelfProtection};
use super::engine::{MatcherState, PolicyEngine};
use super::error::GuardError;
use super::{Block, FileOperationRequest, GuardVerdict, ToolKind};
use crate::patch::extract_patch_paths;
use crate::paths::{PathResolver, lexical_normalize, relative_to};
use crate::shell::extract_file_operations;
use crate::types::{Operation, ProtectionLevel};

/// A pattern hit for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch<'a> {
    /// The matching level. Self-protection hits report `no_access`.
    pub level: ProtectionLevel,
    pub pattern: &'a str,
    pub description: Option<&'a str>,
    pub self_protection: bool,
}

/// Tests one path against the self-protection set (if given) and then each
/// configured level in severity order.
///
/// The path is tried in its absolute form, relative to `cwd`, and in its
/// symlink-resolved form when that differs. The first level with any hit
/// wins.
#[instrument(level = Level::TRACE, skip(resolver, matcher, self_protection))]
pub fn check_path<'a>(
    resolver: &PathResolver,
    path: &str,
    cwd: &Path,
    matcher: &'a CompiledMatcher,
    self_protection: Option<&'a SelfProtection>,
) -> Option<PathMatch<'a>> {
    let normalized = resolver.normalize(path, cwd);
    let absolute = normalized.absolute.to_string_lossy();
    let resolved = normalized
        .resolved
        .as_ref()
        .filter(|r| **r != normalized.absolute)
        .map(|r| r.to_string_lossy());

    if let Some(sp) = self_protection
        && let Some(pattern) = std::iter::once(&absolute)
            .chain(resolved.as_ref())
            .find_map(|candidate| sp.matching_pattern(candidate))
    {
        return Some(PathMatch {
            level: ProtectionLevel::NoAccess,
            pattern,
            description: None,
            self_protection: true,
        });
    }

    let relative = relative_to(&lexical_normalize(cwd), &normalized.absolute);
    let relative = relative.to_string_lossy();

    let mut candidates = vec![&absolute];
    if !relative.is_empty() {
        candidates.push(&relative);
    }
    if let Some(resolved) = resolved.as_ref() {
        candidates.push(resolved);
    }

    matcher.levels().iter().find_map(|level| {
        candidates
            .iter()
            .find_map(|candidate| level.matching_pattern(candidate))
            .map(|pattern| PathMatch {
                level: level.level,
                pattern,
                description: level.description.as_deref(),
                self_protection: false,
            })
    })
}

/// One path a tool call touches, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTarget {
    pub path: String,
    pub operation: Operation,
}

impl FileTarget {
    fn new(path: impl Into<String>, operation: Operation) -> Self {
        Self {
            path: path.into(),
            operation,
        }
    }
}

/// Lists every path `tool` would touch given `params`.
#[instrument(level = Level::TRACE, skip(params))]
pub fn file_targets(tool: ToolKind, params: &Value) -> Result<Vec<FileTarget>, GuardError> {
    match tool {
        ToolKind::Read | ToolKind::Write | ToolKind::Edit => {
            let path = ["file_path", "path"]
                .into_iter()
                .find_map(|key| string_param(params, key))
                .filter(|p| !p.is_empty())
                .ok_or(GuardError::MissingParam {
                    tool,
                    param: "file_path",
                })?;
            let operation = if tool == ToolKind::Read {
                Operation::Read
            } else {
                Operation::Write
            };
            Ok(vec![FileTarget::new(path, operation)])
        }
        ToolKind::ApplyPatch => {
            let patch = ["patch", "diff", "input", "file_path"]
                .into_iter()
                .find_map(|key| string_param(params, key))
                .ok_or(GuardError::MissingParam {
                    tool,
                    param: "patch",
                })?;
            let paths = extract_patch_paths(patch);
            if paths.is_empty() {
                return Err(GuardError::EmptyPatch { tool });
            }
            Ok(paths
                .into_iter()
                .map(|p| FileTarget::new(p, Operation::Write))
                .collect())
        }
        ToolKind::Exec | ToolKind::Bash => {
            let command = string_param(params, "command").ok_or(GuardError::MissingParam {
                tool,
                param: "command",
            })?;
            let ops = extract_file_operations(command);
            let reads = ops.reads.into_iter().map(|p| FileTarget::new(p, Operation::Read));
            let writes = ops.writes.into_iter().map(|p| FileTarget::new(p, Operation::Write));
            let deletes = ops
                .deletes
                .into_iter()
                .map(|p| FileTarget::new(p, Operation::Delete));
            Ok(reads.chain(writes).chain(deletes).collect())
        }
    }
}

fn string_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

impl PolicyEngine {
    /// Evaluates one tool call.
    ///
    /// Errors mean the request could not be interpreted (missing parameter,
    /// patch without headers); the caller decides whether that blocks.
    #[instrument(level = Level::TRACE, skip(self, request), fields(tool = %request.tool, agent_id = ?request.agent_id))]
    pub fn evaluate(&self, request: &FileOperationRequest) -> Result<GuardVerdict, GuardError> {
        let matcher = match self.state_for(request.agent_id.as_deref()) {
            MatcherState::Ready(matcher) => matcher,
            MatcherState::ConfigError(message) => {
                return Ok(GuardVerdict::Block(Block::config_error(message)));
            }
        };

        for target in file_targets(request.tool, &request.params)? {
            // Self-protection never restricts reads.
            let self_protection =
                (target.operation != Operation::Read).then_some(self.self_protection());
            let Some(found) = check_path(
                self.resolver(),
                &target.path,
                &request.cwd,
                matcher,
                self_protection,
            ) else {
                continue;
            };
            // Levels restrict an upward-closed set of operations, so the most
            // severe hit decides.
            if found.self_protection || found.level.restricts(target.operation) {
                let block = Block::from_match(&target, &found);
                debug!(path = %target.path, level = %block.level, "blocking");
                return Ok(GuardVerdict::Block(block));
            }
        }
        Ok(GuardVerdict::Allow)
    }
}
