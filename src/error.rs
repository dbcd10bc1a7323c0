//! Error types for the drift analysis layer.

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for drift analysis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a drift analysis run.
///
/// Only configuration and orchestration errors abort a run. Recoverable
/// faults (a prepare command exiting non-zero, the diff tool reporting a
/// true error, a missing capture file) are logged and degrade the report's
/// completeness instead of surfacing here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration file could not be parsed as YAML.
    #[error("failed to parse configuration '{path}': {reason}")]
    YamlParse { path: PathBuf, reason: String },

    /// Configuration file exceeds the size limit.
    #[error("configuration '{path}' exceeds size limit: {size} > {limit} bytes")]
    ConfigTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// A document reappeared in its own `extends` chain.
    #[error("cyclic extends chain detected at '{path}'")]
    CyclicExtends { path: PathBuf },

    /// The effective configuration has no `base_image`.
    #[error("'base_image' must be defined in the configuration")]
    MissingBaseImage,

    /// Configuration value has the wrong shape.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    /// The container tool binary could not be spawned.
    #[error("container tool not found: {tool} (is it installed and in PATH?)")]
    ToolNotFound { tool: String },

    /// A required container-tool invocation exited non-zero.
    #[error("command failed with exit code {code}: {command}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// An operation was requested without a live container handle.
    #[error("container not available: {0}")]
    ContainerUnavailable(String),

    /// The container never reached a running state.
    #[error("container '{id}' did not reach running state within {timeout:?}")]
    StartTimeout { id: String, timeout: Duration },

    /// Host source path for a copy-in does not exist.
    #[error("source path for copy does not exist: {path}")]
    CopySourceMissing { path: PathBuf },

    /// Exporting container paths to the host failed.
    #[error("failed to export container paths: {0}")]
    ExportFailed(String),

    /// Path traversal attempt detected in the export stream.
    #[error("path traversal detected in export stream: {path}")]
    PathTraversal { path: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
