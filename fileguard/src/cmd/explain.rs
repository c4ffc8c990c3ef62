use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use fileguard::settings::GuardSettings;
use fileguard::style;
use fileguard_policy::policy::file_targets;
use fileguard_policy::{
    FileOperationRequest, GuardVerdict, PolicyEngine, ToolKind, extract_file_operations,
};
use serde_json::json;
use tracing::{Level, instrument};

/// Explain how the guard would decide a tool call.
///
/// The subject comes from the CLI args (`fileguard explain bash "rm .env"`)
/// or, when there are none, from stdin (handy for patches).
#[instrument(level = Level::TRACE)]
pub fn run(
    settings_path: Option<&Path>,
    json_output: bool,
    agent: Option<String>,
    cwd: Option<PathBuf>,
    tool_name: &str,
    args: &[String],
) -> Result<()> {
    let Some(tool) = ToolKind::from_name(tool_name) else {
        bail!(
            "'{}' is not a guarded tool (expected one of: {})",
            tool_name,
            ToolKind::ALL.map(|t| t.as_str()).join(", ")
        );
    };

    let subject = if args.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .lock()
            .read_to_string(&mut buf)
            .context("failed to read subject from stdin")?;
        buf
    } else {
        args.join(" ")
    };

    let cwd = match cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().context("could not determine current directory")?,
    };
    let request = FileOperationRequest {
        tool,
        agent_id: agent,
        cwd,
        params: params_for(tool, &subject),
    };

    let settings = GuardSettings::load(settings_path)?;
    let engine = PolicyEngine::load(&settings.engine_options()?);
    let outcome = engine.evaluate(&request);

    if json_output {
        let mut output = json!({
            "tool": tool.as_str(),
            "agent_id": request.agent_id,
            "cwd": request.cwd,
            "params": request.params,
            "targets": file_targets(tool, &request.params).ok(),
            "config_error": engine.config_error(request.agent_id.as_deref()),
        });
        if tool.is_shell() {
            output["operations"] = json!(extract_file_operations(&subject));
        }
        match &outcome {
            Ok(verdict) => output["verdict"] = json!(verdict),
            Err(e) => output["error"] = json!(e.to_string()),
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", style::bold("Input:"));
    println!("  {}  {}", style::cyan("tool:"), tool);
    if let Some(agent) = &request.agent_id {
        println!("  {} {}", style::cyan("agent:"), agent);
    }
    println!("  {}   {}", style::cyan("cwd:"), request.cwd.display());
    println!();

    if let Some(message) = engine.config_error(request.agent_id.as_deref()) {
        println!("{}", style::header("Config error:"));
        println!("  {}", style::red_bold(message));
        println!();
    }

    if tool.is_shell() {
        let ops = extract_file_operations(&subject);
        println!("{}", style::header("Shell analysis:"));
        if ops.is_empty() {
            println!("  {}", style::dim("(no file operations recognized)"));
        }
        for (label, paths) in [
            ("reads", &ops.reads),
            ("writes", &ops.writes),
            ("deletes", &ops.deletes),
        ] {
            if !paths.is_empty() {
                println!("  {:8} {}", style::cyan(label), paths.join(" "));
            }
        }
        println!();
    } else if let Ok(targets) = file_targets(tool, &request.params) {
        println!("{}", style::header("Targets:"));
        for target in targets {
            println!("  {:8} {}", style::cyan(target.operation.as_str()), target.path);
        }
        println!();
    }

    println!("{}", style::bold("Decision:"));
    match outcome {
        Ok(GuardVerdict::Allow) => println!("  {}", style::verdict("allow")),
        Ok(GuardVerdict::Block(block)) => {
            println!(
                "  {} {}",
                style::verdict("block"),
                style::level(&block.level.to_string())
            );
            if let Some(pattern) = &block.pattern {
                println!("  {} {}", style::cyan("pattern:"), pattern);
            }
            println!("  {}  {}", style::cyan("reason:"), block.reason);
        }
        Err(e) => {
            println!(
                "  {} {}",
                style::verdict("block"),
                style::dim("(unless failOpen is set)")
            );
            println!("  {}   {}", style::cyan("error:"), e);
            if let Some(help) = e.help() {
                println!("  {}    {}", style::cyan("hint:"), help);
            }
        }
    }

    Ok(())
}

/// The params the host would send for `tool` with `subject` as its argument.
fn params_for(tool: ToolKind, subject: &str) -> serde_json::Value {
    match tool {
        ToolKind::Read | ToolKind::Write | ToolKind::Edit => json!({ "file_path": subject.trim() }),
        ToolKind::ApplyPatch => json!({ "patch": subject }),
        ToolKind::Exec | ToolKind::Bash => json!({ "command": subject.trim() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_for_each_tool() {
        assert_eq!(
            params_for(ToolKind::Read, " .env\n"),
            json!({"file_path": ".env"})
        );
        assert_eq!(
            params_for(ToolKind::Bash, "rm -rf build"),
            json!({"command": "rm -rf build"})
        );
        let patch = "--- a/x\n+++ b/x\n";
        assert_eq!(params_for(ToolKind::ApplyPatch, patch), json!({"patch": patch}));
    }
}
