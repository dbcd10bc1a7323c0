//! Diff synthesis between filesystem snapshots and captured command output.
//!
//! Wraps the external `diff` tool and post-processes its output natively.
//! Three representations are produced:
//!
//! - **status** (`diff -rq`): one terse line per path present in only one
//!   tree or differing between both
//! - **full** (`diff -urN`): the complete unified multi-file diff,
//!   decomposed into per-path entries so individual paths can be dropped
//!   (exclusion) or redacted (omission)
//! - **single** (`diff -su`): a unified diff between exactly two files
//!
//! The tool is always invoked with `LANG=C` so its reporting lines are
//! stable, and from the snapshots' common parent directory so emitted
//! paths stay relative to the staging tree.
//!
//! Synthesis is best effort: a true tool error (exit status above 1, or a
//! failed spawn) is logged and whatever text is available is returned. A
//! partial diff is recorded in the report rather than aborting the run at
//! its last step.

use std::path::Path;
use std::process::Command;

use tracing::{debug, error, info};

// =============================================================================
// Diff Modes
// =============================================================================

/// The diff representation to synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMode {
    /// Terse per-path status list (`diff -rq`).
    Status,
    /// Full unified multi-file diff (`diff -urN`).
    Full,
    /// Unified diff between exactly two files (`diff -su`).
    Single,
}

impl DiffMode {
    /// Parses a mode name. Unknown names yield `None`; callers log and
    /// skip the comparison rather than aborting.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "rq" | "status" => Some(Self::Status),
            "urN" | "full" => Some(Self::Full),
            "text" | "single" => Some(Self::Single),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "rq",
            Self::Full => "urN",
            Self::Single => "text",
        }
    }
}

impl std::fmt::Display for DiffMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Diff Entries
// =============================================================================

/// One unit of a decomposed full diff: a header line (`diff <flags> <base>
/// <after>`) plus the body lines that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub header: String,
    pub body: Vec<String>,
}

/// Decomposes full-diff text into entries with an explicit two-state line
/// scanner.
///
/// A header is any line beginning with an ASCII letter; everything until
/// the next such line belongs to the current entry's body. Body markers
/// (`+`, `-`, `@`, space) and lines starting with digits or punctuation
/// never open an entry. The first header needs no predecessor, lines
/// before it are dropped, and the final entry is flushed when the stream
/// ends without any terminator line.
pub fn decompose(text: &str) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    let mut current: Option<DiffEntry> = None;
    for line in text.lines() {
        let is_header = line
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic());
        if is_header {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(DiffEntry {
                header: line.to_string(),
                body: Vec::new(),
            });
        } else if let Some(entry) = current.as_mut() {
            entry.body.push(line.to_string());
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    entries
}

/// Splits full-diff text into self-contained per-entry blocks, without any
/// trailing newline on each block.
pub fn split_into_blocks(text: &str) -> Vec<String> {
    decompose(text)
        .into_iter()
        .map(|entry| {
            let mut block = entry.header;
            for line in entry.body {
                block.push('\n');
                block.push_str(&line);
            }
            block
        })
        .collect()
}

// =============================================================================
// Comparison
// =============================================================================

/// Compares two trees (or two files for [`DiffMode::Single`]) and returns
/// the synthesized diff text.
///
/// `exclude` patterns drop paths entirely; `omit` patterns keep a path's
/// header but redact its body (full mode only). Both match as substrings
/// of the reported path once the snapshot tree-root segment is stripped
/// (exclusion) or anywhere in the header line (omission).
pub fn compare(
    base: &Path,
    after: &Path,
    mode: DiffMode,
    exclude: &[String],
    omit: &[String],
) -> String {
    info!("Generating {mode} diff...");
    match mode {
        DiffMode::Status => status_diff(base, after, exclude),
        DiffMode::Full => full_diff(base, after, exclude, omit),
        DiffMode::Single => single_diff(base, after),
    }
}

fn status_diff(base: &Path, after: &Path, exclude: &[String]) -> String {
    let Some((dir, base_name, after_name)) = tree_operands(base, after) else {
        return String::new();
    };
    let raw = run_diff(dir, &["-rq", base_name, after_name]);
    if exclude.is_empty() {
        return raw;
    }
    let kept: Vec<&str> = raw
        .lines()
        .filter(|line| !status_line_excluded(line, exclude))
        .collect();
    join_lines(kept)
}

fn full_diff(base: &Path, after: &Path, exclude: &[String], omit: &[String]) -> String {
    let Some((dir, base_name, after_name)) = tree_operands(base, after) else {
        return String::new();
    };
    let raw = run_diff(dir, &["-urN", base_name, after_name]);
    let mut lines: Vec<String> = Vec::new();
    for entry in decompose(&raw) {
        if header_excluded(&entry.header, exclude) {
            continue;
        }
        if omit.iter().any(|p| entry.header.contains(p.as_str())) {
            lines.push(format!("{} (omitted)", entry.header));
            continue;
        }
        lines.push(entry.header);
        for line in entry.body {
            lines.push(strip_header_timestamp(&line));
        }
    }
    join_lines(lines)
}

fn single_diff(base: &Path, after: &Path) -> String {
    // Invoked from the grandparent directory so the emitted headers read
    // `<capture-dir>/<outfile>` for both sides.
    let Some(dir) = base.parent().and_then(Path::parent) else {
        error!("Single-file diff operands have no common grandparent");
        return String::new();
    };
    let Some(base_rel) = capture_relative(base) else {
        return String::new();
    };
    let Some(after_rel) = capture_relative(after) else {
        return String::new();
    };
    let raw = run_diff(dir, &["-su", &base_rel, &after_rel]);
    let stripped: Vec<String> = raw.lines().map(strip_header_timestamp).collect();
    join_lines(stripped)
}

/// Runs the external diff tool. Exit status 0 (identical) and 1
/// (differences found) are success; anything else is logged as a fault and
/// the available stdout is still returned.
fn run_diff(dir: &Path, args: &[&str]) -> String {
    debug!("Diff command (in {}): diff {}", dir.display(), args.join(" "));
    let output = Command::new("diff")
        .args(args)
        .current_dir(dir)
        .env("LANG", "C")
        .output();
    match output {
        Ok(out) => {
            let code = out.status.code().unwrap_or(-1);
            if !(0..=1).contains(&code) {
                error!(
                    "Diff command failed or encountered an issue. Exit code: {code}. Stderr: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
            }
            String::from_utf8_lossy(&out.stdout).into_owned()
        }
        Err(e) => {
            error!("Failed to invoke diff tool: {e}");
            String::new()
        }
    }
}

// =============================================================================
// Line Handling
// =============================================================================

fn tree_operands<'a>(base: &'a Path, after: &'a Path) -> Option<(&'a Path, &'a str, &'a str)> {
    let dir = base.parent()?;
    let base_name = base.file_name()?.to_str()?;
    let after_name = after.file_name()?.to_str()?;
    Some((dir, base_name, after_name))
}

fn capture_relative(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let dir = path.parent()?.file_name()?.to_str()?;
    Some(format!("{dir}/{name}"))
}

/// Truncates `---`/`+++` header lines at the first tab, dropping the
/// file-modification-time annotation the diff tool appends there.
fn strip_header_timestamp(line: &str) -> String {
    if line.starts_with("--- ") || line.starts_with("+++ ") {
        match line.find('\t') {
            Some(pos) => line[..pos].to_string(),
            None => line.to_string(),
        }
    } else {
        line.to_string()
    }
}

/// True when a `diff -rq` status line's reported path matches an
/// exclusion pattern.
fn status_line_excluded(line: &str, exclude: &[String]) -> bool {
    let path = if let Some(rest) = line.strip_prefix("Files ") {
        let differing = rest.strip_suffix(" differ").unwrap_or(rest);
        differing
            .split(" and ")
            .next()
            .unwrap_or(differing)
            .to_string()
    } else if let Some(rest) = line.strip_prefix("Only in ") {
        match rest.split_once(": ") {
            Some((dir, name)) => format!("{dir}/{name}"),
            None => rest.to_string(),
        }
    } else {
        line.to_string()
    };
    let stripped = strip_tree_root(&path);
    exclude.iter().any(|p| stripped.contains(p.as_str()))
}

/// True when a full-diff header's base-path operand matches an exclusion
/// pattern.
fn header_excluded(header: &str, exclude: &[String]) -> bool {
    if exclude.is_empty() {
        return false;
    }
    let operand = header.split_whitespace().nth(2).unwrap_or(header);
    let stripped = strip_tree_root(operand);
    exclude.iter().any(|p| stripped.contains(p.as_str()))
}

/// Drops the leading snapshot-root segment (`fs_base`/`fs_after`) from a
/// reported path, keeping the separator so patterns written as
/// in-container paths still match.
fn strip_tree_root(path: &str) -> &str {
    match path.find('/') {
        Some(pos) => &path[pos..],
        None => path,
    }
}

fn join_lines<S: AsRef<str>>(lines: Vec<S>) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    for line in &lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}
