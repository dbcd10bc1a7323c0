//! # driftscan
//!
//! **Container Environment Drift Auditor**
//!
//! Captures the filesystem and command-output state of a container before
//! and after a user-defined "main operation", then produces a structured
//! diff report. Used to audit what a build/install step changes inside a
//! container image.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          driftscan                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  config     extends-chain resolution, path anchoring, merge     │
//! │      │                                                          │
//! │      ▼                                                          │
//! │  analysis   prepare → baseline → main operation → after capture │
//! │      │            (one container, one staging tree per run)     │
//! │      ▼                                                          │
//! │  diff       status ("rq") │ full ("urN") │ single ("text")      │
//! │      │      exclusion drops entries, omission redacts bodies    │
//! │      ▼                                                          │
//! │  report     JSON document + human-readable rendering            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  container  podman / docker driven as an external subprocess:   │
//! │             create → copy-in → start → exec → export → cleanup  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Run Lifecycle
//!
//! Everything is sequential and owned by one run: the configuration is
//! resolved, a container is created and prepared, the baseline snapshot
//! is captured, the main operation executes, the after snapshot is
//! captured, diffs are synthesized, and the report is written once. The
//! container is stopped and removed on every exit path, normal or not.
//!
//! # Failure Model
//!
//! Configuration and orchestration errors abort the run. Everything else
//! degrades the report instead of aborting it: a prepare command exiting
//! non-zero is recorded with its real exit code, a diff-tool fault yields
//! best-effort text, a missing capture file becomes an explicit skip
//! reason inside the report.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::Path;
//! use driftscan::{run_analysis, ContainerTool};
//!
//! fn main() -> driftscan::Result<()> {
//!     run_analysis(
//!         Path::new("input.yaml"),
//!         Path::new("output.json"),
//!         ContainerTool::Podman,
//!     )
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod constants;
pub mod container;
pub mod diff;
pub mod error;
pub mod report;

// Re-exports
pub use analysis::run_analysis;
pub use config::{CommandDiffSpec, CopyFile, EffectiveConfig};
pub use constants::*;
pub use container::{CommandResult, ContainerManager, ContainerTool};
pub use diff::{DiffEntry, DiffMode};
pub use error::{Error, Result};
pub use report::{render_report_file, CommandDiff, DiffReports, Report, ReportMetadata};
