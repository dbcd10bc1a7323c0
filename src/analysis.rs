//! End-to-end drift analysis workflow.
//!
//! Drives one run, strictly sequentially: configuration resolution,
//! container preparation, baseline capture, main operation, after
//! capture, diff synthesis, report assembly. The container and the
//! staging directory are both scoped to the run and torn down on every
//! exit path.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{error, info, warn};

use crate::config::{self, CommandDiffSpec, EffectiveConfig};
use crate::constants::{
    CMD_OUTPUTS_AFTER_DIR, CMD_OUTPUTS_BASE_DIR, FS_AFTER_DIR, FS_BASE_DIR, STAGING_PREFIX,
};
use crate::container::{CommandResult, ContainerManager, ContainerTool};
use crate::diff::{self, DiffMode};
use crate::error::Result;
use crate::report::{CommandDiff, DiffReports, Report, ReportMetadata};

/// Placeholder recorded for both filesystem diff sections when no
/// `target_dirs` were configured.
const NO_TARGET_DIRS_NOTE: &str = "Skipped: 'target_dirs' was not specified or empty in config.";

/// Runs the full analysis described by the configuration at
/// `config_path` and writes the JSON report to `output_path`.
///
/// Only configuration and orchestration errors abort the run; everything
/// else degrades the report's completeness. The container is cleaned up
/// on the way out regardless of outcome.
pub fn run_analysis(config_path: &Path, output_path: &Path, tool: ContainerTool) -> Result<()> {
    let mut config = config::resolve(config_path)?;
    let root_dir = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let title = config.take_title();
    let description = config.take_description();
    let base_image = config.base_image()?.to_string();

    let metadata = ReportMetadata {
        generated_on: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        container_tool: tool.command().to_string(),
        title,
        description,
    };

    let mut results: Vec<CommandResult> = Vec::new();
    let mut diffs = DiffReports::default();

    let mut manager = ContainerManager::new(base_image, tool);
    let outcome = run_with_container(&mut manager, &config, &root_dir, &mut results, &mut diffs);
    manager.cleanup();
    outcome?;

    let report = Report::assemble(metadata, config.into_document(), results, diffs);
    info!("Writing final JSON report to '{}'...", output_path.display());
    report.write_json(output_path)?;
    info!(
        "Environment drift report successfully generated: {}",
        output_path.display()
    );
    Ok(())
}

fn run_with_container(
    manager: &mut ContainerManager,
    config: &EffectiveConfig,
    root_dir: &Path,
    results: &mut Vec<CommandResult>,
    diffs: &mut DiffReports,
) -> Result<()> {
    manager.create()?;

    info!("--- Preparing Container ---");
    for entry in config.copy_files() {
        let mut src = PathBuf::from(&entry.src);
        if src.is_relative() {
            src = root_dir.join(src);
        }
        if !src.exists() {
            error!(
                "Source file for copy not found: {}. Skipping this copy operation.",
                src.display()
            );
            continue;
        }
        manager.copy_to(&src, &entry.dest)?;
    }

    manager.start()?;

    for command in config.prepare_commands() {
        // Non-zero exits are logged inside; preparation continues.
        manager.execute_command(&command)?;
    }
    info!("--- Container Preparation Complete ---");

    let staging = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir()?;
    let tmpdir = staging.path();
    info!("Using temporary directory: {}", tmpdir.display());

    let base_fs_root = tmpdir.join(FS_BASE_DIR);
    let after_fs_root = tmpdir.join(FS_AFTER_DIR);
    let base_cmd_dir = tmpdir.join(CMD_OUTPUTS_BASE_DIR);
    let after_cmd_dir = tmpdir.join(CMD_OUTPUTS_AFTER_DIR);
    for dir in [&base_fs_root, &after_fs_root, &base_cmd_dir, &after_cmd_dir] {
        std::fs::create_dir_all(dir)?;
    }

    let target_dirs = config.target_dirs();
    if target_dirs.is_empty() {
        warn!("'target_dirs' not specified in config. File system diffs might be empty or limited.");
    }

    info!("--- Capturing Baseline State ---");
    if !target_dirs.is_empty() {
        manager.export_paths(&target_dirs, &base_fs_root)?;
    }
    for spec in config.command_diffs() {
        manager.capture_command_output(&spec.command, &base_cmd_dir.join(outfile_name(&spec)))?;
    }
    info!("--- Baseline State Captured ---");

    info!("--- Executing Main Operation ---");
    for command in config.main_operation_commands() {
        results.push(manager.execute_command(&command)?);
    }
    info!("--- Main Operation Complete ---");

    info!("--- Capturing State After Main Operation ---");
    if !target_dirs.is_empty() {
        manager.export_paths(&target_dirs, &after_fs_root)?;
    }
    for spec in config.command_diffs() {
        manager.capture_command_output(&spec.command, &after_cmd_dir.join(outfile_name(&spec)))?;
    }
    info!("--- State After Main Operation Captured ---");

    info!("--- Generating Diff Reports ---");
    let exclude = config.exclude_paths();
    let omit = config.omit_diff_paths();

    if !target_dirs.is_empty() {
        let status = diff::compare(&base_fs_root, &after_fs_root, DiffMode::Status, &exclude, &[]);
        diffs.filesystem_rq = Some(
            status
                .lines()
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
        );
        let full = diff::compare(&base_fs_root, &after_fs_root, DiffMode::Full, &exclude, &omit);
        diffs.filesystem_urn = Some(diff::split_into_blocks(&full));
    } else {
        info!("Skipping filesystem diffs as 'target_dirs' was empty.");
        diffs.filesystem_rq = Some(vec![NO_TARGET_DIRS_NOTE.to_string()]);
        diffs.filesystem_urn = Some(vec![NO_TARGET_DIRS_NOTE.to_string()]);
    }

    for spec in config.command_diffs() {
        diffs
            .command_outputs
            .push(synthesize_command_diff(&spec, &base_cmd_dir, &after_cmd_dir));
    }
    info!("--- Diff Report Generation Complete ---");
    Ok(())
}

/// Diffs one captured command's before/after output files.
///
/// A missing capture on either side yields an explicit skip reason in
/// `diff_content` instead of a fault.
pub fn synthesize_command_diff(
    spec: &CommandDiffSpec,
    base_dir: &Path,
    after_dir: &Path,
) -> CommandDiff {
    let name = outfile_name(spec);
    let base_file = base_dir.join(&name);
    let after_file = after_dir.join(&name);

    let diff_content = if base_file.is_file() && after_file.is_file() {
        let text = diff::compare(&base_file, &after_file, DiffMode::Single, &[], &[]);
        text.trim_end_matches('\n').to_string()
    } else {
        let mut missing = Vec::new();
        if !base_file.is_file() {
            missing.push(format!("baseline output '{}'", base_file.display()));
        }
        if !after_file.is_file() {
            missing.push(format!("after output '{}'", after_file.display()));
        }
        warn!(
            "Skipping diff for command '{}' due to missing output files: {}",
            spec.command,
            missing.join(", ")
        );
        format!("Skipped: Output file(s) not found ({}).", missing.join(", "))
    };

    CommandDiff {
        command: spec.command.clone(),
        diff_file: spec.outfile.clone(),
        diff_content: Some(diff_content),
    }
}

/// Captures are staged under the outfile's basename; any directory part
/// in the configuration is ignored.
fn outfile_name(spec: &CommandDiffSpec) -> String {
    Path::new(&spec.outfile)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| spec.outfile.clone())
}
