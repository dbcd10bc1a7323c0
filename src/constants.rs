//! # Drift Analysis Constants
//!
//! Defines the timeouts, input bounds, and staging-directory layout used
//! throughout the analysis workflow. These constants are the single source
//! of truth for every bound the crate enforces.

use std::time::Duration;

// =============================================================================
// Container Lifecycle
// =============================================================================

/// Maximum time to wait for a started container to report a running state.
///
/// The readiness check polls the container tool's `inspect` output at
/// [`READINESS_POLL_INTERVAL`] until this deadline, then fails fatally.
pub const CONTAINER_START_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between container readiness checks.
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Configuration Limits
// =============================================================================

/// Maximum size of a single configuration document (1 MiB).
///
/// Prevents memory exhaustion from parsing oversized or malformed YAML.
/// Real configuration files are typically under a few KiB.
pub const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

// =============================================================================
// Staging Layout
// =============================================================================
//
// One temporary host directory tree is allocated per run and owned
// exclusively by that run. It is removed when the run ends, on every exit
// path. The subdirectory names below address the four capture areas.
// =============================================================================

/// Prefix for the per-run temporary staging directory.
pub const STAGING_PREFIX: &str = "driftscan_";

/// Filesystem snapshot taken before the main operation.
pub const FS_BASE_DIR: &str = "fs_base";

/// Filesystem snapshot taken after the main operation.
pub const FS_AFTER_DIR: &str = "fs_after";

/// Command-output captures taken before the main operation.
pub const CMD_OUTPUTS_BASE_DIR: &str = "cmd_outputs_base";

/// Command-output captures taken after the main operation.
pub const CMD_OUTPUTS_AFTER_DIR: &str = "cmd_outputs_after";
