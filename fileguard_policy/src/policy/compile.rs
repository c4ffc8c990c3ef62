//! Compilation of protection globs into regex matchers.
//!
//! Each level's patterns become one [`RegexSet`], so testing a path against a
//! level is a single pass. When the set reports a hit, the index of the
//! matching member names the literal pattern for diagnostics.

use std::fs;
use std::path::{Path, PathBuf};

use regex::{RegexSet, RegexSetBuilder};
use tracing::{Level, debug, instrument};

use crate::error::{ConfigError, Result};
use crate::types::{ProtectionConfig, ProtectionLevel};

/// Host-dependent matching behavior, fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Match paths case-insensitively, as on default macOS and Windows
    /// filesystems.
    pub case_insensitive: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            case_insensitive: cfg!(any(target_os = "macos", target_os = "windows")),
        }
    }
}

/// One protection level, compiled.
#[derive(Debug, Clone)]
pub struct CompiledLevel {
    pub level: ProtectionLevel,
    pub description: Option<String>,
    /// Source patterns, index-aligned with `set`.
    pub patterns: Vec<String>,
    set: RegexSet,
}

impl CompiledLevel {
    /// Returns the first pattern that matches `candidate`.
    pub fn matching_pattern(&self, candidate: &str) -> Option<&str> {
        if !self.set.is_match(candidate) {
            return None;
        }
        self.set
            .matches(candidate)
            .iter()
            .next()
            .map(|i| self.patterns[i].as_str())
    }
}

/// Compiled matchers for every configured level, most severe first.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    levels: Vec<CompiledLevel>,
}

impl CompiledMatcher {
    /// Compiles every level of `config`.
    ///
    /// A pattern that does not translate to a valid regex is reported as
    /// [`ConfigError::InvalidGlob`].
    #[instrument(level = Level::TRACE, skip(config))]
    pub fn compile(config: &ProtectionConfig, options: MatchOptions) -> Result<Self> {
        let mut levels = Vec::with_capacity(config.protection_levels.len());
        // BTreeMap order is severity order.
        for (level, level_config) in &config.protection_levels {
            let set = build_set(&level_config.patterns, options, level.as_str())?;
            levels.push(CompiledLevel {
                level: *level,
                description: level_config.description.clone(),
                patterns: level_config.patterns.clone(),
                set,
            });
        }
        debug!(
            levels = levels.len(),
            patterns = config.pattern_count(),
            "compiled protection matcher"
        );
        Ok(Self { levels })
    }

    /// Levels in severity order. Levels absent from the config are skipped.
    pub fn levels(&self) -> &[CompiledLevel] {
        &self.levels
    }

    pub fn level(&self, level: ProtectionLevel) -> Option<&CompiledLevel> {
        self.levels.iter().find(|l| l.level == level)
    }
}

/// Paths belonging to the guard itself. They may never be written or
/// deleted, whatever the configuration says.
#[derive(Debug, Clone)]
pub struct SelfProtection {
    patterns: Vec<String>,
    set: RegexSet,
}

impl Default for SelfProtection {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            set: RegexSet::empty(),
        }
    }
}

impl SelfProtection {
    /// Protects `install_dir` with everything below it, plus each of `files`.
    /// Canonical forms are added for paths that exist.
    pub fn new<I>(install_dir: &Path, files: I, options: MatchOptions) -> Result<Self>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut patterns = Vec::new();
        for dir in with_canonical(install_dir.to_path_buf()) {
            push_unique(&mut patterns, format!("{}/**", escape_glob(&dir)));
        }
        for file in files {
            for form in with_canonical(file) {
                push_unique(&mut patterns, escape_glob(&form));
            }
        }
        let set = build_set(&patterns, options, "self-protection")?;
        debug!(?patterns, "self-protection set");
        Ok(Self { patterns, set })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matching_pattern(&self, candidate: &str) -> Option<&str> {
        if !self.set.is_match(candidate) {
            return None;
        }
        self.set
            .matches(candidate)
            .iter()
            .next()
            .map(|i| self.patterns[i].as_str())
    }
}

fn with_canonical(path: PathBuf) -> Vec<PathBuf> {
    match fs::canonicalize(&path) {
        Ok(canonical) if canonical != path => vec![path, canonical],
        _ => vec![path],
    }
}

fn push_unique(patterns: &mut Vec<String>, pattern: String) {
    if !patterns.contains(&pattern) {
        patterns.push(pattern);
    }
}

fn build_set(patterns: &[String], options: MatchOptions, scope: &str) -> Result<RegexSet> {
    let sources: Vec<String> = patterns.iter().map(|p| glob_to_regex(p)).collect();
    RegexSetBuilder::new(&sources)
        .case_insensitive(options.case_insensitive)
        .build()
        .map_err(|source| {
            // Pinpoint the offending member for the error message.
            let pattern = patterns
                .iter()
                .zip(&sources)
                .find(|(_, re)| regex::Regex::new(re).is_err())
                .map(|(p, _)| p.clone())
                .unwrap_or_default();
            ConfigError::InvalidGlob {
                scope: scope.to_string(),
                pattern,
                source,
            }
        })
}

/// Renders a filesystem path as a glob that matches only that path.
fn escape_glob(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Translates a glob into an anchored regex source.
///
/// - `*` matches within one segment, `?` one non-separator character
/// - `**/` at a segment start matches zero or more whole directories
/// - a trailing `/**` matches the directory itself and everything below it
/// - `**` anywhere else matches anything, separators included
/// - `{a,b}` is alternation and `[...]` a character class (`[!...]` negated)
/// - `\` escapes the next character
///
/// Leading dots get no special treatment, so `**/.env` matches hidden files.
pub fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut re = String::with_capacity(glob.len() * 2 + 2);
    re.push('^');
    let mut brace_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let at_segment_start = i == 0 || chars[i - 1] == '/';
                let mut end = i + 2;
                while chars.get(end) == Some(&'*') {
                    end += 1;
                }
                if at_segment_start && chars.get(end) == Some(&'/') {
                    re.push_str("(?:.*/)?");
                    i = end + 1;
                    continue;
                }
                if at_segment_start && i > 0 && end == chars.len() {
                    re.pop();
                    re.push_str("(?:/.*)?");
                } else {
                    re.push_str(".*");
                }
                i = end;
                continue;
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '{' => {
                brace_depth += 1;
                re.push_str("(?:");
            }
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                re.push(')');
            }
            ',' if brace_depth > 0 => re.push('|'),
            '[' => {
                if let Some(end) = class_end(&chars, i) {
                    push_class(&mut re, &chars[i + 1..end]);
                    i = end + 1;
                    continue;
                }
                re.push_str(r"\[");
            }
            '\\' if i + 1 < chars.len() => {
                i += 1;
                re.push_str(&regex::escape(chars[i].encode_utf8(&mut [0; 4])));
            }
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }

    re.push('$');
    re
}

/// Index of the `]` closing the class opened at `open`. A `]` right after
/// the opening bracket (or `[!`) is a literal member.
fn class_end(chars: &[char], open: usize) -> Option<usize> {
    let mut i = open + 1;
    if matches!(chars.get(i), Some('!' | '^')) {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    (i..chars.len()).find(|&j| chars[j] == ']')
}

fn push_class(re: &mut String, body: &[char]) {
    re.push('[');
    let mut body = body;
    if let Some((first, rest)) = body.split_first()
        && matches!(first, '!' | '^')
    {
        re.push('^');
        body = rest;
    }
    for &c in body {
        if matches!(c, '\\' | '[' | ']' | '&' | '~') {
            re.push('\\');
        }
        re.push(c);
    }
    re.push(']');
}
