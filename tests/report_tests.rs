//! Tests for report assembly, serialization, and text rendering.

use serde_yaml::Mapping;
use tempfile::TempDir;

use driftscan::container::CommandResult;
use driftscan::report::{render_report_file, CommandDiff, DiffReports, Report, ReportMetadata};

fn sample_definitions() -> Mapping {
    serde_yaml::from_str(
        r#"
base_image: alpine:latest
prepare:
  copy_files:
    - src: setup.sh
      dest: /tmp/setup.sh
  commands:
    - setup
main_operation:
  commands:
    - echo hi
omit_diff_paths:
  - c
command_diff:
  - command: ls
    outfile: ls.txt
"#,
    )
    .unwrap()
}

fn sample_report() -> Report {
    Report::assemble(
        ReportMetadata {
            generated_on: "2020-01-01 00:00:00".to_string(),
            container_tool: "podman".to_string(),
            title: Some("My run".to_string()),
            description: Some("line1\nline2".to_string()),
        },
        sample_definitions(),
        vec![CommandResult {
            command: "echo hi".to_string(),
            stdout: "hi".to_string(),
            stderr: String::new(),
            return_code: 0,
        }],
        DiffReports {
            filesystem_rq: Some(vec!["Only in after: new.txt".to_string()]),
            filesystem_urn: Some(vec![
                "diff -urN a b\n--- a\n+++ b".to_string(),
            ]),
            command_outputs: vec![CommandDiff {
                command: "ls".to_string(),
                diff_file: "ls.txt".to_string(),
                diff_content: Some("--- a\n+++ b".to_string()),
            }],
        },
    )
}

// =============================================================================
// Rendering
// =============================================================================

#[test]
fn test_render_metadata_block() {
    let text = sample_report().render();

    assert!(text.contains("Report generated on: 2020-01-01 00:00:00"));
    assert!(text.contains("Container tool: podman"));
    assert!(text.contains("Title: My run"));
    assert!(text.contains("Description:"));
    assert!(text.contains("  line1"));
    assert!(text.contains("  line2"));
}

#[test]
fn test_render_optional_metadata_absent() {
    let mut report = sample_report();
    report.report_metadata.title = None;
    report.report_metadata.description = None;
    let text = report.render();

    assert!(!text.contains("Title:"));
    assert!(!text.contains("Description:"));
}

#[test]
fn test_render_definitions_block() {
    let text = sample_report().render();

    assert!(text.contains("Definitions:"));
    assert!(text.contains("- base_image:"));
    assert!(text.contains("  alpine:latest"));
    assert!(text.contains("- prepare:"));
    assert!(text.contains("  copy_files:"));
    assert!(text.contains("    - setup.sh -> /tmp/setup.sh"));
    assert!(text.contains("  commands:"));
    assert!(text.contains("    - setup"));
    assert!(text.contains("- omit_diff_paths:"));
    assert!(text.contains("  - c"));
}

#[test]
fn test_render_excludes_command_diff_key() {
    let text = sample_report().render();
    assert!(!text.contains("command_diff"));
}

#[test]
fn test_render_collapses_main_operation_commands() {
    let text = sample_report().render();
    // main_operation holds only `commands`, which duplicates the results
    // block, so the whole key disappears.
    assert!(!text.contains("- main_operation:"));
}

#[test]
fn test_render_keeps_other_main_operation_fields() {
    let mut report = sample_report();
    report.definitions = serde_yaml::from_str(
        "main_operation:\n  commands: [echo hi]\n  workdir: /srv\n",
    )
    .unwrap();
    let text = report.render();

    assert!(text.contains("- main_operation:"));
    assert!(text.contains("  workdir: /srv"));
    assert!(!text.contains("echo hi\n"), "commands stay collapsed");
}

#[test]
fn test_render_definitions_preferred_order() {
    let report = Report::assemble(
        ReportMetadata {
            generated_on: "2020-01-01 00:00:00".to_string(),
            container_tool: "podman".to_string(),
            title: None,
            description: None,
        },
        serde_yaml::from_str(
            r#"
omit_diff_paths: [c]
target_dirs: [/a]
prepare:
  commands: [setup]
exclude_paths: [/b]
base_image: alpine:latest
"#,
        )
        .unwrap(),
        Vec::new(),
        DiffReports::default(),
    );
    let text = report.render();
    let lines: Vec<&str> = text.lines().collect();

    let index = |needle: &str| lines.iter().position(|l| *l == needle).unwrap();
    let base_i = index("- base_image:");
    let prepare_i = index("- prepare:");
    let target_i = index("- target_dirs:");
    let exclude_i = index("- exclude_paths:");
    let omit_i = index("- omit_diff_paths:");

    assert!(base_i < prepare_i);
    assert!(prepare_i < target_i);
    assert!(target_i < exclude_i);
    assert!(exclude_i < omit_i);
}

#[test]
fn test_render_main_operation_results() {
    let text = sample_report().render();

    assert!(text.contains("Main operation results:"));
    assert!(text.contains("- echo hi (exit code 0)"));
    assert!(text.contains("  stdout:"));
    assert!(text.contains("    hi"));
    assert!(!text.contains("  stderr:"), "empty stderr is not rendered");
}

#[test]
fn test_render_diff_sections() {
    let text = sample_report().render();

    assert!(text.contains("Filesystem diff (rq):"));
    assert!(text.contains("  - Only in after: new.txt"));
    assert!(text.contains("Filesystem diff (urN):"));
    assert!(text.contains("  - diff -urN a b"));
    assert!(text.contains("    --- a"));
    assert!(text.contains("    +++ b"));
    assert!(text.contains("Command diff for: ls (file: ls.txt)"));
}

#[test]
fn test_render_missing_diff_content_placeholder() {
    let mut report = sample_report();
    report.diff_reports.command_outputs[0].diff_content = None;
    let text = report.render();

    assert!(text.contains("  No diff content available."));
}

#[test]
fn test_render_is_idempotent() {
    let report = sample_report();
    assert_eq!(report.render(), report.render());
}

#[test]
fn test_render_ends_with_single_newline() {
    let text = sample_report().render();
    assert!(text.ends_with('\n'));
    assert!(!text.ends_with("\n\n"));
}

// =============================================================================
// JSON Round Trip
// =============================================================================

#[test]
fn test_json_round_trip_preserves_rendering() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("report.json");
    let report = sample_report();

    report.write_json(&path).unwrap();
    let loaded = Report::load_json(&path).unwrap();

    assert_eq!(report.render(), loaded.render());
}

#[test]
fn test_render_report_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested/dir/report.json");
    sample_report().write_json(&path).unwrap();

    let text = render_report_file(&path).unwrap();
    assert!(text.contains("Report generated on: 2020-01-01 00:00:00"));
}

#[test]
fn test_json_omits_absent_metadata_fields() {
    let report = Report::assemble(
        ReportMetadata {
            generated_on: "2020-01-01 00:00:00".to_string(),
            container_tool: "docker".to_string(),
            title: None,
            description: None,
        },
        Mapping::new(),
        Vec::new(),
        DiffReports::default(),
    );
    let json = serde_json::to_string_pretty(&report).unwrap();

    assert!(!json.contains("\"title\""));
    assert!(!json.contains("\"description\""));
    assert!(json.contains("\"container_tool\": \"docker\""));
}

#[test]
fn test_json_keeps_wire_key_for_urn_section() {
    let json = serde_json::to_string(&sample_report()).unwrap();
    assert!(json.contains("\"filesystem_urN\""));
    assert!(json.contains("\"return_code\""));
}
