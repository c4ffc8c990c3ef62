//! Error output for the non-hook commands.

use std::io::Write;

use fileguard_policy::{ConfigError, GuardError};

use crate::style;

/// Prints `err` to stderr: the message, its causes, and a hint when one of
/// the causes is a fileguard error that knows how to fix itself.
pub fn display_error(err: &anyhow::Error, verbose: bool) {
    let mut out = std::io::stderr().lock();
    let _ = writeln!(out, "{}: {}", style::err_red_bold("error"), err);

    let causes: Vec<String> = err.chain().skip(1).map(|c| c.to_string()).collect();
    for (i, cause) in causes.iter().enumerate() {
        let line = match causes.len() {
            1 => format!("caused by: {}", cause),
            _ => format!("{}: {}", i + 1, cause),
        };
        let _ = writeln!(out, "  {}", style::err_dim(&line));
    }

    if let Some(hint) = hint(err) {
        let _ = writeln!(out, "\n  {}: {}", style::err_cyan_bold("hint"), hint);
    }

    if verbose {
        let _ = writeln!(out, "\n{:?}", err);
    } else if !causes.is_empty() {
        let _ = writeln!(out, "\n  {}", style::err_dim("(--verbose shows the debug form)"));
    }
}

/// The help text of the first domain error in the chain.
pub fn hint(err: &anyhow::Error) -> Option<String> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return e.help();
        }
        if let Some(e) = cause.downcast_ref::<GuardError>() {
            return e.help();
        }
        None
    })
}
