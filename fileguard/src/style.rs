//! Terminal colouring for `explain`, `validate` and error output.
//!
//! [`console`] decides per stream whether colour is wanted (TTY detection,
//! `NO_COLOR`), so stdout and stderr helpers are kept apart.

use console::Style;

fn paint(style: Style, text: &str) -> String {
    style.apply_to(text).to_string()
}

fn stdout() -> Style {
    Style::new()
}

fn stderr() -> Style {
    Style::new().for_stderr()
}

pub fn bold(text: &str) -> String {
    paint(stdout().bold(), text)
}

pub fn dim(text: &str) -> String {
    paint(stdout().dim(), text)
}

/// Section titles.
pub fn header(text: &str) -> String {
    paint(stdout().cyan().bold(), text)
}

/// Field labels.
pub fn cyan(text: &str) -> String {
    paint(stdout().cyan(), text)
}

pub fn yellow(text: &str) -> String {
    paint(stdout().yellow(), text)
}

pub fn green_bold(text: &str) -> String {
    paint(stdout().green().bold(), text)
}

pub fn red_bold(text: &str) -> String {
    paint(stdout().red().bold(), text)
}

pub fn err_red_bold(text: &str) -> String {
    paint(stderr().red().bold(), text)
}

pub fn err_dim(text: &str) -> String {
    paint(stderr().dim(), text)
}

pub fn err_cyan_bold(text: &str) -> String {
    paint(stderr().cyan().bold(), text)
}

/// `allow` in green, `block` in red.
pub fn verdict(action: &str) -> String {
    match action {
        "allow" => green_bold(action),
        "block" => red_bold(action),
        _ => action.to_string(),
    }
}

/// Blocking levels in red, `read_only` in yellow, the rest in cyan.
pub fn level(name: &str) -> String {
    match name {
        "no_access" | "self-protection" | "config-error" => red_bold(name),
        "read_only" => yellow(name),
        _ => cyan(name),
    }
}
