//! The hook boundary.
//!
//! [`GuardHook::handle`] turns one host event into a response. Nothing
//! escapes it: evaluation errors and panics become a block, or an allow
//! when `failOpen` is set.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use anyhow::Result;
use fileguard_policy::{Block, FileOperationRequest, GuardVerdict, PolicyEngine};
use tracing::{Level, debug, error, instrument, trace, warn};

use crate::audit::{self, AuditEntry};
use crate::hooks::{HookResponse, ToolCallEvent};
use crate::settings::GuardSettings;

/// A loaded engine plus the settings that govern the boundary.
#[derive(Debug, Clone)]
pub struct GuardHook {
    engine: PolicyEngine,
    settings: GuardSettings,
}

impl GuardHook {
    pub fn new(engine: PolicyEngine, settings: GuardSettings) -> Self {
        Self { engine, settings }
    }

    /// Loads the engine described by `settings`.
    #[instrument(level = Level::TRACE, skip(settings))]
    pub fn from_settings(settings: GuardSettings) -> Result<Self> {
        let engine = PolicyEngine::load(&settings.engine_options()?);
        Ok(Self::new(engine, settings))
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// Decides one event. `None` means allow.
    #[instrument(level = Level::TRACE, skip(self, event), fields(tool = %event.tool_name))]
    pub fn handle(&self, event: &ToolCallEvent) -> Option<HookResponse> {
        let Some(tool) = event.tool() else {
            trace!("tool is not guarded");
            return None;
        };
        let request = event.to_request(tool);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.engine.evaluate(&request)));
        let verdict = match outcome {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                let message = match e.help() {
                    Some(help) => format!("{} ({})", e, help),
                    None => e.to_string(),
                };
                return self.internal_error(&request, &message);
            }
            Err(payload) => return self.internal_error(&request, &panic_message(&*payload)),
        };

        match verdict {
            GuardVerdict::Allow => {
                debug!(tool = %request.tool, "allowed");
                None
            }
            GuardVerdict::Block(block) => {
                self.record_block(&request, &block);
                Some(HookResponse::block(block.reason))
            }
        }
    }

    fn record_block(&self, request: &FileOperationRequest, block: &Block) {
        let level = block.level.to_string();
        if self.settings.log_blocks {
            warn!(
                tool = %request.tool,
                path = block.path.as_deref().unwrap_or("-"),
                level = %level,
                agent_id = request.agent_id.as_deref().unwrap_or("-"),
                pattern = block.pattern.as_deref().unwrap_or("-"),
                "blocked file operation"
            );
        }
        audit::log_block(
            &self.settings.audit,
            &AuditEntry {
                timestamp: audit::timestamp(),
                tool: request.tool.as_str(),
                agent_id: request.agent_id.as_deref(),
                path: block.path.as_deref(),
                level: &level,
                pattern: block.pattern.as_deref(),
                reason: &block.reason,
            },
        );
    }

    fn internal_error(&self, request: &FileOperationRequest, message: &str) -> Option<HookResponse> {
        error!(
            tool = %request.tool,
            agent_id = request.agent_id.as_deref().unwrap_or("-"),
            error = message,
            "guard evaluation failed"
        );
        if self.settings.fail_open {
            warn!("allowing call despite evaluation failure (fail-open)");
            return None;
        }
        let reason = format!(
            "fileguard: could not evaluate {} call, blocking: {}",
            request.tool, message
        );
        if self.settings.log_blocks {
            warn!(
                tool = %request.tool,
                level = "internal-error",
                agent_id = request.agent_id.as_deref().unwrap_or("-"),
                "blocked file operation"
            );
        }
        audit::log_block(
            &self.settings.audit,
            &AuditEntry {
                timestamp: audit::timestamp(),
                tool: request.tool.as_str(),
                agent_id: request.agent_id.as_deref(),
                path: None,
                level: "internal-error",
                pattern: None,
                reason: &reason,
            },
        );
        Some(HookResponse::block(reason))
    }
}

/// Responds to raw hook input. Used by `fileguard hook`.
///
/// Settings problems are treated like a broken config: guarded calls are
/// blocked. Unparseable input is blocked unless `failOpen` is set.
#[instrument(level = Level::TRACE, skip(raw, settings))]
pub fn respond(raw: &str, settings: Result<GuardSettings>) -> Option<HookResponse> {
    let fail_open = settings.as_ref().is_ok_and(|s| s.fail_open);

    let event = match ToolCallEvent::from_reader(raw.as_bytes()) {
        Ok(event) => event,
        Err(e) => return unreadable_event(&format!("could not parse tool-call event: {}", e), fail_open),
    };
    if event.tool().is_none() {
        return None;
    }

    let hook = settings.and_then(GuardHook::from_settings);
    match hook {
        Ok(hook) => hook.handle(&event),
        Err(e) => {
            error!(error = %format!("{:#}", e), "could not load fileguard settings");
            Some(HookResponse::block(format!(
                "fileguard: blocked because settings could not be loaded (config-error): {:#}",
                e
            )))
        }
    }
}

/// The verdict for an event that never reached the engine: blocked unless
/// `fail_open` is set.
pub fn unreadable_event(message: &str, fail_open: bool) -> Option<HookResponse> {
    error!(error = message, fail_open, "no usable tool-call event");
    (!fail_open).then(|| HookResponse::block(format!("fileguard: {}", message)))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("internal panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("internal panic: {}", s)
    } else {
        "internal panic".to_string()
    }
}
