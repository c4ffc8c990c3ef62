//! Static extraction of file operations from raw shell command strings.
//!
//! Agents with a shell can reach a protected file through endless spellings:
//! `cat .env`, `grep -r key .env`, `sed -i ... config.yaml`, `echo x > f`.
//! [`extract_file_operations`] recovers the paths a command would read, write
//! and delete without executing anything.
//!
//! This is not a shell parser. Variable expansion, command substitution,
//! globbing, subshells and aliases are not modeled, and commands outside the
//! known families contribute nothing. The pipeline is:
//!
//! 1. split into sub-commands on `;`, `&&`, `||`, `|`, newlines and a lone `&`
//! 2. pull out redirections (`>`, `>>`, `<`) before tokenizing
//! 3. tokenize on whitespace, honoring single/double quotes and backslashes
//! 4. drop flags (unless they follow a bare `--`)
//! 5. classify by the base name of the command word

use serde::Serialize;
use tracing::{Level, instrument, trace};

/// Paths a command touches, bucketed by the kind of access.
///
/// Paths are reported exactly as written (unquoted), not normalized. Each
/// occurrence is kept, so a path used twice appears twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileOperations {
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    pub deletes: Vec<String>,
}

impl FileOperations {
    /// Returns true if the command touches no paths.
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty() && self.deletes.is_empty()
    }
}

/// Extracts the read, write and delete path sets implied by `command`.
#[instrument(level = Level::TRACE)]
pub fn extract_file_operations(command: &str) -> FileOperations {
    let mut ops = FileOperations::default();
    for segment in split_commands(command) {
        analyze_segment(&segment, &mut ops);
    }
    trace!(?ops, "extracted file operations");
    ops
}

// ---------------------------------------------------------------------------
// Quoting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Quote {
    #[default]
    None,
    Single,
    Double,
}

/// How one character takes part in a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    /// A quote or escape character; not part of the word's text.
    Syntax,
    /// Literal text that came from inside quotes or after a backslash.
    Quoted,
    /// Unquoted text; may be whitespace or an operator.
    Bare,
}

/// Per-character quote state machine.
#[derive(Debug, Default)]
struct QuoteTracker {
    quote: Quote,
    escaped: bool,
}

impl QuoteTracker {
    fn scan(&mut self, c: char) -> Lexeme {
        if self.escaped {
            self.escaped = false;
            return Lexeme::Quoted;
        }
        match (self.quote, c) {
            (Quote::Single, '\'') | (Quote::Double, '"') => {
                self.quote = Quote::None;
                Lexeme::Syntax
            }
            (Quote::Single, _) => Lexeme::Quoted,
            (Quote::None | Quote::Double, '\\') => {
                self.escaped = true;
                Lexeme::Syntax
            }
            (Quote::Double, _) => Lexeme::Quoted,
            (Quote::None, '\'') => {
                self.quote = Quote::Single;
                Lexeme::Syntax
            }
            (Quote::None, '"') => {
                self.quote = Quote::Double;
                Lexeme::Syntax
            }
            (Quote::None, _) => Lexeme::Bare,
        }
    }
}

// ---------------------------------------------------------------------------
// Splitting
// ---------------------------------------------------------------------------

/// Splits a command line into sub-commands. Quote characters are kept in
/// the returned segments; later stages re-scan them.
fn split_commands(command: &str) -> Vec<String> {
    let chars: Vec<char> = command.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut tracker = QuoteTracker::default();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if tracker.scan(c) != Lexeme::Bare {
            current.push(c);
            i += 1;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let operator_len = match (c, next) {
            (';' | '\n', _) => 1,
            ('&', Some('&')) | ('|', Some('|')) | ('|', Some('&')) => 2,
            // `>|` is the clobbering redirect, not a pipe.
            ('|', _) if current.ends_with('>') => 0,
            ('|', _) => 1,
            // `2>&1`, `<&3` and `&>file` use `&` as part of a redirect.
            ('&', _) if current.ends_with(['>', '<']) || next == Some('>') => 0,
            ('&', _) => 1,
            _ => 0,
        };

        if operator_len == 0 {
            current.push(c);
            i += 1;
        } else {
            push_segment(&mut segments, &mut current);
            i += operator_len;
        }
    }
    push_segment(&mut segments, &mut current);
    segments
}

fn push_segment(segments: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        segments.push(current.clone());
    }
    current.clear();
}

// ---------------------------------------------------------------------------
// Redirections
// ---------------------------------------------------------------------------

/// Redirection targets found in one sub-command.
#[derive(Debug, Default)]
struct Redirects {
    reads: Vec<String>,
    writes: Vec<String>,
}

/// Removes redirections from `segment`, returning the remaining text and
/// the redirect targets.
fn strip_redirects(segment: &str) -> (String, Redirects) {
    let chars: Vec<char> = segment.chars().collect();
    let mut rest = String::with_capacity(segment.len());
    let mut redirects = Redirects::default();
    let mut tracker = QuoteTracker::default();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let lexeme = tracker.scan(c);
        let next = chars.get(i + 1).copied();
        if lexeme != Lexeme::Bare || !matches!(c, '<' | '>') || next == Some('(') {
            rest.push(c);
            i += 1;
            continue;
        }

        strip_fd_prefix(&mut rest);
        let mut j = i + 1;
        if c == '<' {
            match next {
                // Here-doc (`<<`, `<<-`) or here-string (`<<<`): drop the
                // operator and its word; the body is not a path.
                Some('<') => {
                    j += 1;
                    while matches!(chars.get(j), Some('<' | '-')) {
                        j += 1;
                    }
                    let (_, end) = read_word(&chars, j);
                    j = end;
                }
                Some('&') => {
                    let (_, end) = read_word(&chars, j + 1);
                    j = end;
                }
                Some('>') => {
                    let (target, end) = read_word(&chars, j + 1);
                    push_nonempty(&mut redirects.writes, target);
                    j = end;
                }
                _ => {
                    let (target, end) = read_word(&chars, j);
                    push_nonempty(&mut redirects.reads, target);
                    j = end;
                }
            }
        } else {
            if matches!(next, Some('>' | '|')) {
                j += 1;
            }
            if chars.get(j) == Some(&'&') {
                // `>&2` duplicates a descriptor; `>&file` writes to a file.
                let (target, end) = read_word(&chars, j + 1);
                if !target.chars().all(|c| c.is_ascii_digit() || c == '-') {
                    redirects.writes.push(target);
                }
                j = end;
            } else {
                let (target, end) = read_word(&chars, j);
                push_nonempty(&mut redirects.writes, target);
                j = end;
            }
        }

        rest.push(' ');
        i = j;
    }

    (rest, redirects)
}

/// Drops an `N` or `&` written immediately before a redirect operator
/// (`2>file`, `&>file`) when it stands alone as a word.
fn strip_fd_prefix(rest: &mut String) {
    let without_digits = rest.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let start = if without_digits < rest.len() {
        without_digits
    } else if rest.ends_with('&') {
        rest.len() - 1
    } else {
        return;
    };
    if rest[..start].chars().next_back().is_none_or(char::is_whitespace) {
        rest.truncate(start);
    }
}

/// Reads one word starting at `start` (after optional blanks), honoring
/// quotes. Returns the unquoted word and the index just past it.
fn read_word(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    while chars.get(i).is_some_and(|c| *c == ' ' || *c == '\t') {
        i += 1;
    }

    let mut word = String::new();
    let mut tracker = QuoteTracker::default();
    while let Some(&c) = chars.get(i) {
        match tracker.scan(c) {
            Lexeme::Bare if c.is_whitespace() || "<>|;&()".contains(c) => break,
            Lexeme::Syntax => {}
            _ => word.push(c),
        }
        i += 1;
    }
    (word, i)
}

fn push_nonempty(into: &mut Vec<String>, word: String) {
    if !word.is_empty() {
        into.push(word);
    }
}

// ---------------------------------------------------------------------------
// Tokenizing and classification
// ---------------------------------------------------------------------------

/// Splits on unquoted whitespace and strips quote characters.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut tracker = QuoteTracker::default();

    for c in text.chars() {
        match tracker.scan(c) {
            Lexeme::Bare if c.is_whitespace() => {
                if in_word {
                    tokens.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            Lexeme::Syntax => in_word = true,
            Lexeme::Quoted | Lexeme::Bare => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        tokens.push(current);
    }
    tokens
}

fn analyze_segment(segment: &str, ops: &mut FileOperations) {
    let (rest, redirects) = strip_redirects(segment);
    let tokens = tokenize(&rest);
    classify(skip_env_assignments(&tokens), ops);
    ops.reads.extend(redirects.reads);
    ops.writes.extend(redirects.writes);
}

/// Skips leading `NAME=value` words (e.g. `LANG=C cat .env`).
fn skip_env_assignments(tokens: &[String]) -> &[String] {
    let assignments = tokens
        .iter()
        .take_while(|t| {
            t.split_once('=').is_some_and(|(name, _)| {
                name.chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
        })
        .count();
    &tokens[assignments..]
}

fn classify(tokens: &[String], ops: &mut FileOperations) {
    let Some((program, args)) = tokens.split_first() else {
        return;
    };
    let name = program.rsplit('/').next().unwrap_or(program);
    let positional = positional_args(args);

    match name {
        "cat" | "head" | "tail" | "less" | "more" => ops.reads.extend(positional),
        // First positional is the search pattern.
        "grep" | "egrep" | "fgrep" | "rg" => ops.reads.extend(positional.into_iter().skip(1)),
        "sed" => {
            let in_place = args
                .iter()
                .any(|a| a.starts_with("-i") || a == "--in-place" || a.starts_with("--in-place="));
            let files = positional
                .into_iter()
                .filter(|a| !a.starts_with("-i") && !is_sed_expression(a));
            if in_place {
                ops.writes.extend(files);
            } else {
                ops.reads.extend(files);
            }
        }
        "tee" => ops.writes.extend(positional),
        "rm" | "unlink" | "shred" => ops.deletes.extend(positional),
        "cp" | "mv" => match positional.split_last() {
            Some((dest, sources)) if !sources.is_empty() => {
                ops.reads.extend_from_slice(sources);
                ops.writes.push(dest.clone());
            }
            Some((only, _)) => ops.reads.push(only.clone()),
            None => {}
        },
        _ => {}
    }
}

/// Arguments with flags removed. Everything after a bare `--` is positional.
fn positional_args(args: &[String]) -> Vec<String> {
    let mut after_separator = false;
    args.iter()
        .filter(|arg| {
            if after_separator {
                return true;
            }
            if *arg == "--" {
                after_separator = true;
                return false;
            }
            !is_flag(arg)
        })
        .cloned()
        .collect()
}

/// `-x`, `-rf`, `-5`, `--name`, `--name=value`.
fn is_flag(arg: &str) -> bool {
    if let Some(long) = arg.strip_prefix("--") {
        let name = long.split_once('=').map_or(long, |(name, _)| name);
        return name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    }
    arg.strip_prefix('-')
        .is_some_and(|short| !short.is_empty() && short.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// `s/from/to/flags` or `y/abc/xyz/`, with any punctuation delimiter.
fn is_sed_expression(arg: &str) -> bool {
    let mut chars = arg.chars();
    let (Some(command), Some(delim)) = (chars.next(), chars.next()) else {
        return false;
    };
    if !matches!(command, 's' | 'y')
        || delim.is_alphanumeric()
        || delim.is_whitespace()
        || delim == '\\'
    {
        return false;
    }
    chars.filter(|&c| c == delim).count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ops(command: &str) -> FileOperations {
        extract_file_operations(command)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cat_flag_stripped() {
        assert_eq!(ops("cat -n .env").reads, strings(&[".env"]));
    }

    #[test]
    fn test_quoted_path_keeps_space() {
        assert_eq!(ops(r#"cat "my .env""#).reads, strings(&["my .env"]));
        assert_eq!(ops("cat 'my .env'").reads, strings(&["my .env"]));
    }

    #[test]
    fn test_sed_in_place_is_write() {
        let result = ops("sed -i 's/a/b/' config.yaml");
        assert_eq!(result.writes, strings(&["config.yaml"]));
        assert!(result.reads.is_empty());

        let result = ops("sed -i 's/a/b/' /etc/app/config.yaml");
        assert_eq!(result.writes, strings(&["/etc/app/config.yaml"]));
    }

    #[test]
    fn test_sed_without_in_place_is_read() {
        let result = ops("sed 's/a/b/' config.yaml");
        assert_eq!(result.reads, strings(&["config.yaml"]));
        assert!(result.writes.is_empty());
    }

    #[test]
    fn test_sed_in_place_suffix_and_long_form() {
        assert_eq!(
            ops("sed -i.bak 's|a|b|g' app.conf").writes,
            strings(&["app.conf"])
        );
        assert_eq!(
            ops("sed --in-place -e 'y/abc/xyz/' app.conf").writes,
            strings(&["app.conf"])
        );
    }

    #[test]
    fn test_pipe_into_grep() {
        let result = ops("cat .env | grep pattern");
        assert_eq!(result.reads, strings(&[".env"]));
        assert!(result.writes.is_empty());
    }

    #[test]
    fn test_or_is_not_two_pipes() {
        let result = ops("cat .env || echo fallback");
        assert_eq!(result.reads, strings(&[".env"]));
        assert!(result.writes.is_empty());
        assert!(result.deletes.is_empty());
    }

    #[test]
    fn test_grep_skips_pattern() {
        assert_eq!(
            ops("grep -r API_KEY .env src").reads,
            strings(&[".env", "src"])
        );
        assert!(ops("rg TODO").reads.is_empty());
    }

    #[test]
    fn test_separators() {
        let result = ops("cat a; head b && tail c\nless d & more e");
        assert_eq!(result.reads, strings(&["a", "b", "c", "d", "e"]));
    }

    #[test]
    fn test_operators_inside_quotes_are_text() {
        let result = ops(r#"grep "a;b|c&&d" .env"#);
        assert_eq!(result.reads, strings(&[".env"]));
        let result = ops("echo 'x > y' ; cat z");
        assert_eq!(result.reads, strings(&["z"]));
        assert!(result.writes.is_empty());
    }

    #[test]
    fn test_output_redirects_are_writes() {
        assert_eq!(ops("echo hi > out.txt").writes, strings(&["out.txt"]));
        assert_eq!(ops("echo hi >>log.txt").writes, strings(&["log.txt"]));
        assert_eq!(ops("make 2> errors.log").writes, strings(&["errors.log"]));
        assert_eq!(ops("make &> all.log").writes, strings(&["all.log"]));
        assert_eq!(ops("echo hi >| forced.txt").writes, strings(&["forced.txt"]));
        assert_eq!(ops(r#"echo hi > "my file""#).writes, strings(&["my file"]));
    }

    #[test]
    fn test_redirect_not_treated_as_argument() {
        let result = ops("cat notes.md > copy.md");
        assert_eq!(result.reads, strings(&["notes.md"]));
        assert_eq!(result.writes, strings(&["copy.md"]));
    }

    #[test]
    fn test_input_redirect_is_read() {
        let result = ops("wc -l < .env");
        assert_eq!(result.reads, strings(&[".env"]));
    }

    #[test]
    fn test_fd_duplication_is_not_a_path() {
        let result = ops("make 2>&1 | tee build.log");
        assert!(!result.writes.contains(&"1".to_string()));
        assert_eq!(result.writes, strings(&["build.log"]));
    }

    #[test]
    fn test_heredoc_word_is_not_a_read() {
        let result = ops("cat <<EOF");
        assert!(result.reads.is_empty());
        let result = ops("grep x <<< \"$VALUE\"");
        assert!(result.reads.is_empty());
    }

    #[test]
    fn test_tee_writes() {
        assert_eq!(
            ops("echo x | tee -a one.txt two.txt").writes,
            strings(&["one.txt", "two.txt"])
        );
    }

    #[test]
    fn test_delete_family() {
        assert_eq!(ops("rm -rf build LICENSE").deletes, strings(&["build", "LICENSE"]));
        assert_eq!(ops("unlink a").deletes, strings(&["a"]));
        assert_eq!(ops("shred -u key.pem").deletes, strings(&["key.pem"]));
    }

    #[test]
    fn test_copy_and_move() {
        let result = ops("cp -r a b dest");
        assert_eq!(result.reads, strings(&["a", "b"]));
        assert_eq!(result.writes, strings(&["dest"]));

        let result = ops("mv .env");
        assert_eq!(result.reads, strings(&[".env"]));
        assert!(result.writes.is_empty());
    }

    #[test]
    fn test_double_dash_keeps_flag_like_names() {
        assert_eq!(ops("rm -- -rf").deletes, strings(&["-rf"]));
        assert_eq!(ops("cat -n -- -v --long").reads, strings(&["-v", "--long"]));
    }

    #[test]
    fn test_command_base_name() {
        assert_eq!(ops("/bin/cat .env").reads, strings(&[".env"]));
        assert_eq!(ops("/usr/bin/rm LICENSE").deletes, strings(&["LICENSE"]));
    }

    #[test]
    fn test_env_assignments_skipped() {
        assert_eq!(ops("LANG=C FOO=1 cat .env").reads, strings(&[".env"]));
    }

    #[test]
    fn test_unknown_commands_contribute_nothing() {
        assert!(ops("python script.py .env").is_empty());
        assert!(ops("ls -la").is_empty());
        assert!(ops("").is_empty());
    }

    #[test]
    fn test_duplicates_preserved() {
        assert_eq!(ops("cat .env; cat .env").reads, strings(&[".env", ".env"]));
    }

    #[test]
    fn test_unterminated_quote_does_not_panic() {
        let result = ops("cat 'unterminated .env");
        assert_eq!(result.reads, strings(&["unterminated .env"]));
    }

    #[test]
    fn test_sed_expression_shapes() {
        assert!(is_sed_expression("s/a/b/"));
        assert!(is_sed_expression("s|a|b|g"));
        assert!(is_sed_expression("y/abc/xyz/"));
        assert!(!is_sed_expression("config.yaml"));
        assert!(!is_sed_expression("s.txt"));
        assert!(!is_sed_expression("sa/b/"));
    }

    #[test]
    fn test_flag_shapes() {
        assert!(is_flag("-i"));
        assert!(is_flag("-rf"));
        assert!(is_flag("--verbose"));
        assert!(is_flag("--include=*.rs"));
        assert!(!is_flag("-"));
        assert!(!is_flag("--"));
        assert!(!is_flag(".env"));
        assert!(!is_flag("-i.bak"));
    }

    fn command_strategy() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "cat .env",
            "rm -f LICENSE",
            "sed -i 's/x/y/' Cargo.lock",
            "cp a b",
            "echo hi > out.txt",
            "grep key secrets.yml",
            "ls -la",
        ])
        .prop_map(str::to_string)
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    proptest! {
        #[test]
        fn prop_sub_command_order_irrelevant(a in command_strategy(), b in command_strategy()) {
            let ab = ops(&format!("{a}; {b}"));
            let ba = ops(&format!("{b} && {a}"));
            prop_assert_eq!(sorted(ab.reads), sorted(ba.reads));
            prop_assert_eq!(sorted(ab.writes), sorted(ba.writes));
            prop_assert_eq!(sorted(ab.deletes), sorted(ba.deletes));
        }

        #[test]
        fn prop_multiplicity_preserved(a in command_strategy(), b in command_strategy()) {
            let (oa, ob) = (ops(&a), ops(&b));
            let combined = ops(&format!("{a}; {b}"));
            prop_assert_eq!(combined.reads.len(), oa.reads.len() + ob.reads.len());
            prop_assert_eq!(combined.writes.len(), oa.writes.len() + ob.writes.len());
            prop_assert_eq!(combined.deletes.len(), oa.deletes.len() + ob.deletes.len());
        }
    }
}
