//! Target paths of patch text handed to an `apply_patch` tool.
//!
//! Two formats are understood:
//!
//! - unified diffs, via their `--- old` / `+++ new` headers
//! - the envelope format (`*** Begin Patch` ... `*** End Patch`), via its
//!   `*** Add File:`, `*** Update File:`, `*** Delete File:` and
//!   `*** Move to:` headers
//!
//! Every path found is a write target; the caller checks them all at write
//! level.

use tracing::{Level, instrument, trace};

const ENVELOPE_HEADERS: [&str; 4] = [
    "*** Add File:",
    "*** Update File:",
    "*** Delete File:",
    "*** Move to:",
];

/// Lines still expected in the current hunk.
#[derive(Debug, Clone, Copy)]
enum Hunk {
    Outside,
    /// From `@@ -a,b +c,d @@`: old and new line counts left.
    Counted { old: usize, new: usize },
    /// A bare `@@` (envelope format); runs until the next `***` header.
    Open,
}

/// Extracts every file path named in the headers of `patch`, in order of
/// appearance and without duplicates.
///
/// `---` and `+++` lines are headers whenever they fall outside a hunk, alone
/// or paired. Inside a counted hunk they are removed or added content.
#[instrument(level = Level::TRACE, skip(patch))]
pub fn extract_patch_paths(patch: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut hunk = Hunk::Outside;
    let mut lines = patch.lines().peekable();

    while let Some(line) = lines.next() {
        if let Some(header) = ENVELOPE_HEADERS
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix))
        {
            push_unique(&mut paths, header.trim());
            hunk = Hunk::Outside;
            continue;
        }

        match hunk {
            Hunk::Counted { old, new } => {
                hunk = match line.chars().next() {
                    Some('-') => Hunk::Counted { old: old.saturating_sub(1), new },
                    Some('+') => Hunk::Counted { old, new: new.saturating_sub(1) },
                    Some('\\') => hunk,
                    _ => Hunk::Counted {
                        old: old.saturating_sub(1),
                        new: new.saturating_sub(1),
                    },
                };
                if let Hunk::Counted { old: 0, new: 0 } = hunk {
                    hunk = Hunk::Outside;
                }
                continue;
            }
            Hunk::Open => {
                if line.starts_with("***") {
                    hunk = Hunk::Outside;
                } else if !starts_header_pair(line, lines.peek().copied()) {
                    continue;
                }
            }
            Hunk::Outside => {}
        }

        if line.starts_with("@@") {
            hunk = hunk_counts(line)
                .map(|(old, new)| Hunk::Counted { old, new })
                .unwrap_or(Hunk::Open);
            if let Hunk::Counted { old: 0, new: 0 } = hunk {
                hunk = Hunk::Outside;
            }
            continue;
        }

        let side = line
            .strip_prefix("--- ")
            .or_else(|| line.strip_prefix("+++ "));
        if let Some(path) = side.and_then(diff_header_path) {
            push_unique(&mut paths, path);
        }
    }

    trace!(?paths, "patch header paths");
    paths
}

fn starts_header_pair(line: &str, next: Option<&str>) -> bool {
    line.starts_with("--- ") && next.is_some_and(|n| n.starts_with("+++ "))
}

/// Old and new line counts of a `@@ -a[,b] +c[,d] @@` header.
fn hunk_counts(line: &str) -> Option<(usize, usize)> {
    let mut ranges = line.strip_prefix("@@ ")?.split_whitespace();
    let old = range_len(ranges.next()?.strip_prefix('-')?)?;
    let new = range_len(ranges.next()?.strip_prefix('+')?)?;
    Some((old, new))
}

/// `start[,len]`; a missing length means one line.
fn range_len(range: &str) -> Option<usize> {
    match range.split_once(',') {
        Some((_, len)) => len.parse().ok(),
        None => range.parse::<usize>().ok().map(|_| 1),
    }
}

/// Path from one side of a unified diff header, or `None` for `/dev/null`.
fn diff_header_path(raw: &str) -> Option<&str> {
    // Timestamps are tab separated: `--- a/file.txt\t2024-01-01 00:00:00`.
    let raw = raw.split('\t').next().unwrap_or(raw).trim();
    let raw = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw);
    if raw.is_empty() || raw == "/dev/null" {
        return None;
    }
    Some(
        raw.strip_prefix("a/")
            .or_else(|| raw.strip_prefix("b/"))
            .unwrap_or(raw),
    )
}

fn push_unique(paths: &mut Vec<String>, path: &str) {
    if !path.is_empty() && !paths.iter().any(|p| p == path) {
        paths.push(path.to_string());
    }
}
