//! Tests for diff synthesis.
//!
//! Exercises the three diff modes against real directory trees, plus the
//! exclusion/omission filters and the entry decomposition scanner.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use driftscan::diff::{self, DiffMode};

/// Builds sibling `base`/`after` trees where `common.txt` differs and
/// `new.txt` exists only in `after`.
fn sample_trees(tmp: &TempDir) -> (PathBuf, PathBuf) {
    let base = tmp.path().join("base");
    let after = tmp.path().join("after");
    fs::create_dir_all(&base).unwrap();
    fs::create_dir_all(&after).unwrap();
    fs::write(base.join("common.txt"), "foo\n").unwrap();
    fs::write(after.join("common.txt"), "bar\n").unwrap();
    fs::write(after.join("new.txt"), "new\n").unwrap();
    (base, after)
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

// =============================================================================
// Status Mode
// =============================================================================

#[test]
fn test_status_mode_reports_changed_and_added() {
    let tmp = TempDir::new().unwrap();
    let (base, after) = sample_trees(&tmp);

    let output = diff::compare(&base, &after, DiffMode::Status, &[], &[]);
    let lines: Vec<&str> = output.lines().filter(|l| !l.is_empty()).collect();

    assert_eq!(lines.len(), 2, "exactly one line per differing path");
    assert!(output.contains("Files base/common.txt and after/common.txt differ"));
    assert!(output.contains("Only in after: new.txt"));
}

#[test]
fn test_status_mode_exclusion_drops_lines() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("base");
    let after = tmp.path().join("after");
    write(&base.join("var/cache/index"), "a\n");
    write(&after.join("var/cache/index"), "b\n");
    write(&base.join("etc/hosts"), "a\n");
    write(&after.join("etc/hosts"), "b\n");

    let exclude = vec!["/var/cache".to_string()];
    let output = diff::compare(&base, &after, DiffMode::Status, &exclude, &[]);

    assert!(output.contains("etc/hosts"));
    assert!(!output.contains("var/cache"));
}

// =============================================================================
// Full Mode
// =============================================================================

#[test]
fn test_full_mode_contains_per_path_entries() {
    let tmp = TempDir::new().unwrap();
    let (base, after) = sample_trees(&tmp);

    let output = diff::compare(&base, &after, DiffMode::Full, &[], &[]);

    assert!(output.contains("diff -urN base/common.txt after/common.txt"));
    assert!(output.contains("--- base/common.txt"));
    assert!(output.contains("+++ after/common.txt"));
    assert!(output.contains("diff -urN base/new.txt after/new.txt"));
    assert!(output.contains("-foo"));
    assert!(output.contains("+bar"));
}

#[test]
fn test_full_mode_strips_header_timestamps() {
    let tmp = TempDir::new().unwrap();
    let (base, after) = sample_trees(&tmp);

    let output = diff::compare(&base, &after, DiffMode::Full, &[], &[]);

    for line in output.lines() {
        if line.starts_with("--- ") || line.starts_with("+++ ") {
            assert!(
                !line.contains('\t'),
                "modification-time annotation must be stripped: {line:?}"
            );
        }
    }
}

#[test]
fn test_full_mode_omission_redacts_body() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("base");
    let after = tmp.path().join("after");
    write(&base.join("skip.txt"), "foo\n");
    write(&after.join("skip.txt"), "bar\n");
    write(&base.join("keep.txt"), "foo\n");
    write(&after.join("keep.txt"), "bar\n");

    let omit = vec!["skip.txt".to_string()];
    let output = diff::compare(&base, &after, DiffMode::Full, &[], &omit);

    assert!(output.contains("diff -urN base/skip.txt after/skip.txt (omitted)"));
    assert!(output.contains("diff -urN base/keep.txt after/keep.txt"));
    assert!(!output.contains("--- base/skip.txt"));
    assert!(!output.contains("+++ after/skip.txt"));
    assert!(output.contains("--- base/keep.txt"));
    assert!(output.contains("+++ after/keep.txt"));
}

#[test]
fn test_full_mode_exclusion_drops_whole_entry() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("base");
    let after = tmp.path().join("after");
    write(&base.join("var/cache/index"), "a\n");
    write(&after.join("var/cache/index"), "b\n");
    write(&base.join("etc/hosts"), "a\n");
    write(&after.join("etc/hosts"), "b\n");

    let exclude = vec!["/var/cache".to_string()];
    let output = diff::compare(&base, &after, DiffMode::Full, &exclude, &[]);

    assert!(output.contains("diff -urN base/etc/hosts after/etc/hosts"));
    assert!(
        !output.contains("var/cache"),
        "excluded entries keep neither header nor body"
    );
}

#[test]
fn test_full_mode_split_into_blocks() {
    let tmp = TempDir::new().unwrap();
    let (base, after) = sample_trees(&tmp);

    let output = diff::compare(&base, &after, DiffMode::Full, &[], &[]);
    let blocks = diff::split_into_blocks(&output);

    assert_eq!(blocks.len(), 2);
    for block in &blocks {
        assert!(block.starts_with("diff "), "block starts at its header");
        assert!(!block.ends_with('\n'));
    }
}

// =============================================================================
// Single Mode
// =============================================================================

#[test]
fn test_single_mode_diffs_two_files() {
    let tmp = TempDir::new().unwrap();
    let base_file = tmp.path().join("cmd_outputs_base/pkgs.txt");
    let after_file = tmp.path().join("cmd_outputs_after/pkgs.txt");
    write(&base_file, "foo\n");
    write(&after_file, "bar\n");

    let output = diff::compare(&base_file, &after_file, DiffMode::Single, &[], &[]);

    assert!(output.contains("--- cmd_outputs_base/pkgs.txt"));
    assert!(output.contains("+++ cmd_outputs_after/pkgs.txt"));
    assert!(output.contains("-foo"));
    assert!(output.contains("+bar"));
}

#[test]
fn test_single_mode_reports_identical_files() {
    let tmp = TempDir::new().unwrap();
    let base_file = tmp.path().join("cmd_outputs_base/pkgs.txt");
    let after_file = tmp.path().join("cmd_outputs_after/pkgs.txt");
    write(&base_file, "same\n");
    write(&after_file, "same\n");

    let output = diff::compare(&base_file, &after_file, DiffMode::Single, &[], &[]);

    assert!(
        output.contains("identical"),
        "-s flag reports identical files: {output:?}"
    );
}

// =============================================================================
// Entry Decomposition
// =============================================================================

#[test]
fn test_decompose_first_entry_needs_no_predecessor() {
    let text = "diff -urN base/a after/a\n--- base/a\n+++ after/a\n@@ -1 +1 @@\n-x\n+y\n";
    let entries = diff::decompose(text);

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].header, "diff -urN base/a after/a");
    assert_eq!(entries[0].body.len(), 5);
}

#[test]
fn test_decompose_flushes_last_entry_without_terminator() {
    let text = "diff -urN base/a after/a\n-x\ndiff -urN base/b after/b\n+y";
    let entries = diff::decompose(text);

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].header, "diff -urN base/b after/b");
    assert_eq!(entries[1].body, vec!["+y".to_string()]);
}

#[test]
fn test_decompose_header_requires_leading_letter() {
    // Marker, digit, and punctuation lines never open a new entry.
    let text = "diff -urN base/a after/a\n@@ -1 +1 @@\n-1\n+2\n 3\n7z\n_x\n";
    let entries = diff::decompose(text);

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].body.len(), 6);
}

#[test]
fn test_decompose_empty_input() {
    assert!(diff::decompose("").is_empty());
    assert!(diff::split_into_blocks("").is_empty());
}

// =============================================================================
// Mode Parsing
// =============================================================================

#[test]
fn test_mode_parse_known_names() {
    assert_eq!(DiffMode::parse("rq"), Some(DiffMode::Status));
    assert_eq!(DiffMode::parse("urN"), Some(DiffMode::Full));
    assert_eq!(DiffMode::parse("text"), Some(DiffMode::Single));
}

#[test]
fn test_mode_parse_unknown_name() {
    assert_eq!(DiffMode::parse("sideways"), None);
}

#[test]
fn test_mode_display_uses_wire_names() {
    assert_eq!(DiffMode::Status.to_string(), "rq");
    assert_eq!(DiffMode::Full.to_string(), "urN");
    assert_eq!(DiffMode::Single.to_string(), "text");
}
