//! Path normalization for tool-call arguments.
//!
//! Agents hand us paths in every shape: relative to the session cwd,
//! absolute, `~`-prefixed, full of `.`/`..` segments, or pointing through a
//! symlink. [`PathResolver::normalize`] turns any of those into an absolute
//! lexical form plus, when the path exists, its symlink-resolved target.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{Level, debug, instrument, warn};

/// The forms of a single path that protection patterns are matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    /// Absolute path with `.`/`..` resolved lexically.
    pub absolute: PathBuf,
    /// Canonical path with symlinks resolved, when the path exists.
    pub resolved: Option<PathBuf>,
}

/// Resolver for agent-supplied paths.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    /// Override for the home directory (useful for testing).
    home_override: Option<PathBuf>,
}

impl PathResolver {
    /// Creates a new PathResolver using the real home directory.
    pub fn new() -> Self {
        Self {
            home_override: None,
        }
    }

    /// Creates a PathResolver with a custom home directory.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_override = Some(home.into());
        self
    }

    /// Returns the home directory used for `~` expansion.
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.home_override.clone().or_else(dirs::home_dir)
    }

    /// Substitutes the home directory for a leading `~` or `~/`.
    ///
    /// `~user` forms are left alone.
    pub fn expand_home(&self, path: &str) -> PathBuf {
        let rest = if path == "~" {
            Some("")
        } else {
            path.strip_prefix("~/")
        };
        match (rest, self.home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            (Some(_), None) => {
                debug!(path, "no home directory available for ~ expansion");
                PathBuf::from(path)
            }
            (None, _) => PathBuf::from(path),
        }
    }

    /// Normalizes `path` against `cwd`.
    ///
    /// Never fails: a path that does not exist just has no resolved form.
    #[instrument(level = Level::TRACE, skip(self))]
    pub fn normalize(&self, path: &str, cwd: &Path) -> NormalizedPath {
        let expanded = self.expand_home(path);
        let joined = if expanded.is_absolute() {
            expanded
        } else {
            cwd.join(expanded)
        };
        let absolute = lexical_normalize(&joined);
        let resolved = resolve_symlinks(&absolute);
        NormalizedPath { absolute, resolved }
    }
}

/// Resolves `.` and `..` segments without touching the filesystem.
///
/// `..` never climbs above the root of an absolute path. Leading `..`
/// segments of a relative path are kept.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Computes `target` relative to `base`, like `path.relative` in other
/// ecosystems. Both paths should already be lexically normalized.
///
/// Returns an empty path when the two are equal.
pub fn relative_to(base: &Path, target: &Path) -> PathBuf {
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let target_parts: Vec<Component<'_>> = target.components().collect();

    let common = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &target_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

/// `realpath` equivalent. Missing paths are the normal case and return
/// `None` quietly; other I/O failures are logged and also return `None`.
fn resolve_symlinks(path: &Path) -> Option<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(resolved) => Some(resolved),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to resolve symlinks; checking unresolved path only");
            None
        }
    }
}
