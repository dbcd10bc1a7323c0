//! Container lifecycle driver.
//!
//! Drives a single podman or docker container through its lifetime:
//! create, copy-in, start (with readiness polling), in-container command
//! execution, path export, output capture, and teardown.
//!
//! One [`ContainerManager`] owns exactly one container for one run. The
//! teardown contract is scoped: [`ContainerManager::cleanup`] stops then
//! removes the container as two independent failure-isolated steps, and
//! `Drop` invokes it so every exit path (normal return, early return,
//! propagated fault) tears the container down. Cleanup failures are
//! logged, never raised.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tar::Archive;
use tracing::{debug, error, info, warn};

use crate::constants::{CONTAINER_START_TIMEOUT, READINESS_POLL_INTERVAL};
use crate::error::{Error, Result};

// =============================================================================
// Container Tool
// =============================================================================

/// The container utility driven by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerTool {
    #[default]
    Podman,
    Docker,
}

impl ContainerTool {
    /// Parses a tool name from the CLI.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "podman" => Some(Self::Podman),
            "docker" => Some(Self::Docker),
            _ => None,
        }
    }

    /// Returns the executable name.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }

    /// Flag carrying the stop grace period. Podman spells it `--time`,
    /// docker `-t`.
    fn stop_time_flag(&self) -> &'static str {
        match self {
            Self::Podman => "--time",
            Self::Docker => "-t",
        }
    }
}

impl std::fmt::Display for ContainerTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command())
    }
}

// =============================================================================
// Command Results
// =============================================================================

/// Result of executing a command inside the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// The command as given in the configuration.
    pub command: String,
    /// Captured stdout, trimmed.
    pub stdout: String,
    /// Captured stderr, trimmed.
    pub stderr: String,
    /// Exit code reported by the container tool.
    pub return_code: i32,
}

/// Raw output of one container-tool invocation.
struct ToolOutput {
    stdout: String,
    stderr: String,
    code: i32,
}

// =============================================================================
// Container Manager
// =============================================================================

/// Manages creation, execution, and cleanup of one container.
pub struct ContainerManager {
    image: String,
    tool: ContainerTool,
    container_id: Option<String>,
}

impl ContainerManager {
    /// Creates a manager for `image`. No container exists until
    /// [`ContainerManager::create`] is called.
    pub fn new(image: impl Into<String>, tool: ContainerTool) -> Self {
        let image = image.into();
        info!("ContainerManager initialized for image '{image}' using '{tool}'.");
        Self {
            image,
            tool,
            container_id: None,
        }
    }

    /// Returns the container id, if one has been created.
    pub fn id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    fn require_id(&self, operation: &str) -> Result<&str> {
        self.container_id.as_deref().ok_or_else(|| {
            Error::ContainerUnavailable(format!("no container for {operation} operation"))
        })
    }

    /// Runs the container tool with `args`, capturing stdout and stderr.
    ///
    /// With `check` set, a non-zero exit becomes [`Error::CommandFailed`];
    /// otherwise the output is returned with its real exit code.
    fn run_tool(&self, args: &[&str], check: bool) -> Result<ToolOutput> {
        let rendered = format!("{} {}", self.tool.command(), args.join(" "));
        debug!("Executing command: {rendered}");
        let output = Command::new(self.tool.command())
            .args(args)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolNotFound {
                        tool: self.tool.command().to_string(),
                    }
                } else {
                    Error::Io(e)
                }
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let code = output.status.code().unwrap_or(-1);
        if !stdout.trim().is_empty() {
            debug!("Stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("Stderr: {}", stderr.trim());
        }
        if check && code != 0 {
            error!("Command failed with exit code {code}: {rendered}");
            if !stderr.trim().is_empty() {
                error!("Failed command stderr: {}", stderr.trim());
            }
            return Err(Error::CommandFailed {
                command: rendered,
                code,
                stderr,
            });
        }
        Ok(ToolOutput {
            stdout,
            stderr,
            code,
        })
    }

    /// Creates a new container but does not start it.
    ///
    /// The container runs `tail -f /dev/null` so it stays alive for the
    /// whole analysis.
    pub fn create(&mut self) -> Result<()> {
        if let Some(id) = &self.container_id {
            warn!("Container {id} already exists. Skipping creation.");
            return Ok(());
        }
        let out = self.run_tool(
            &["create", "-ti", &self.image, "tail", "-f", "/dev/null"],
            true,
        )?;
        let id = out.stdout.trim().to_string();
        info!("Container {id} created from image '{}'.", self.image);
        self.container_id = Some(id);
        Ok(())
    }

    /// Starts the container and polls until it reports a running state.
    ///
    /// # Errors
    /// Returns [`Error::StartTimeout`] when the readiness check never
    /// succeeds within [`CONTAINER_START_TIMEOUT`].
    pub fn start(&self) -> Result<()> {
        let id = self.require_id("start")?.to_string();
        info!("Starting container {id}...");
        self.run_tool(&["start", &id], true)?;

        info!(
            "Waiting for container {id} to be running (timeout: {:?})...",
            CONTAINER_START_TIMEOUT
        );
        let deadline = Instant::now() + CONTAINER_START_TIMEOUT;
        loop {
            let out = self.run_tool(&["inspect", "-f", "{{.State.Running}}", &id], false)?;
            if out.code == 0 && out.stdout.trim() == "true" {
                info!("Container {id} is now running.");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::StartTimeout {
                    id,
                    timeout: CONTAINER_START_TIMEOUT,
                });
            }
            std::thread::sleep(READINESS_POLL_INTERVAL);
        }
    }

    /// Stops the container. Failures are logged, never raised.
    pub fn stop(&self, timeout_secs: u64) {
        let Some(id) = self.container_id.as_deref() else {
            warn!("No container ID set to stop.");
            return;
        };
        info!("Stopping container {id} (timeout: {timeout_secs}s)...");
        let grace = timeout_secs.to_string();
        match self.run_tool(&["stop", self.tool.stop_time_flag(), &grace, id], false) {
            Ok(_) => info!("Container {id} stop command issued."),
            Err(e) => error!("Error stopping container {id}: {e}"),
        }
    }

    /// Removes the container. Failures are logged, never raised; the
    /// handle is cleared either way.
    pub fn remove(&mut self, force: bool) {
        let Some(id) = self.container_id.clone() else {
            warn!("No container ID set to remove.");
            return;
        };
        info!("Removing container {id}...");
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(&id);
        match self.run_tool(&args, false) {
            Ok(_) => info!("Container {id} removed."),
            Err(e) => error!("Error removing container {id}: {e}"),
        }
        self.container_id = None;
    }

    /// Stops then removes the container as two independent steps, so a
    /// stop failure never prevents the removal attempt.
    pub fn cleanup(&mut self) {
        if self.container_id.is_none() {
            return;
        }
        info!("Cleaning up container {}...", self.container_id.as_deref().unwrap_or(""));
        self.stop(0);
        self.remove(true);
        info!("Container cleanup process finished.");
    }

    /// Copies a host file or directory into the container.
    pub fn copy_to(&self, src: &Path, dest_in_container: &str) -> Result<()> {
        let id = self.require_id("copy")?;
        if !src.exists() {
            return Err(Error::CopySourceMissing {
                path: src.to_path_buf(),
            });
        }
        let dest_spec = format!("{id}:{dest_in_container}");
        let src_str = src.to_string_lossy();
        info!("Copying '{src_str}' to '{dest_spec}'...");
        self.run_tool(&["cp", src_str.as_ref(), &dest_spec], true)?;
        info!("Successfully copied '{src_str}' to '{dest_spec}'.");
        Ok(())
    }

    /// Executes a shell command inside the running container.
    ///
    /// A non-zero exit is logged as a warning; the result is returned with
    /// its real exit code either way.
    pub fn execute_command(&self, command: &str) -> Result<CommandResult> {
        let id = self.require_id("exec")?;
        info!("Executing in container {id}: {command}");
        let out = self.run_tool(&["exec", id, "bash", "-c", command], false)?;
        if out.code == 0 {
            info!("Successfully executed in container: {command}");
        } else {
            warn!(
                "Command in container exited with code {}: {command}",
                out.code
            );
            if !out.stdout.trim().is_empty() {
                warn!("  Stdout: {}", out.stdout.trim());
            }
            if !out.stderr.trim().is_empty() {
                warn!("  Stderr: {}", out.stderr.trim());
            }
        }
        Ok(CommandResult {
            command: command.to_string(),
            stdout: out.stdout.trim().to_string(),
            stderr: out.stderr.trim().to_string(),
            return_code: out.code,
        })
    }

    /// Exports the given in-container paths into `host_output_dir`.
    ///
    /// Streams the container tool's `export` tar output through an archive
    /// reader, extracting only entries under the requested paths. Entry
    /// paths are validated against traversal before unpacking, and the
    /// extracted tree gets user rwx permissions so later diffing can
    /// descend into it.
    pub fn export_paths(&self, targets: &[String], host_output_dir: &Path) -> Result<()> {
        let id = self.require_id("export")?;
        if targets.is_empty() {
            warn!("No target paths specified for export. Skipping.");
            return Ok(());
        }
        fs::create_dir_all(host_output_dir)?;

        // Leading slashes are stripped to match tar member naming.
        let cleaned: Vec<String> = targets
            .iter()
            .map(|p| p.trim_start_matches('/').to_string())
            .collect();
        info!(
            "Exporting '{}' from {id} to '{}'...",
            cleaned.join(" "),
            host_output_dir.display()
        );

        let mut child = Command::new(self.tool.command())
            .args(["export", id])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolNotFound {
                        tool: self.tool.command().to_string(),
                    }
                } else {
                    Error::Io(e)
                }
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExportFailed("no stdout handle on export process".into()))?;

        let mut archive = Archive::new(stdout);
        let extracted = extract_targets(&mut archive, &cleaned, host_output_dir);
        if extracted.is_err() {
            let _ = child.kill();
        }
        let status = child.wait()?;
        extracted?;
        if !status.success() {
            let mut stderr_text = String::new();
            if let Some(mut stderr) = child.stderr.take() {
                use std::io::Read;
                let _ = stderr.read_to_string(&mut stderr_text);
            }
            return Err(Error::ExportFailed(format!(
                "{} export exited with status {:?}: {}",
                self.tool,
                status.code(),
                stderr_text.trim()
            )));
        }

        #[cfg(unix)]
        grant_user_rwx(host_output_dir)?;

        info!(
            "Successfully exported paths to '{}'.",
            host_output_dir.display()
        );
        Ok(())
    }

    /// Executes a command in the container and saves its stdout to a host
    /// file. A non-zero exit is logged; the (possibly empty) output is
    /// written regardless.
    pub fn capture_command_output(&self, command: &str, host_outfile: &Path) -> Result<()> {
        let id = self.require_id("capture")?;
        info!(
            "Capturing output of '{command}' from {id} to '{}'...",
            host_outfile.display()
        );
        let out = self.run_tool(&["exec", id, "bash", "-c", command], false)?;
        if let Some(parent) = host_outfile.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(host_outfile, out.stdout.as_bytes())?;
        info!(
            "Output of '{command}' saved to '{}'.",
            host_outfile.display()
        );
        if out.code != 0 {
            warn!(
                "Command '{command}' in container exited with code {}. Stderr: {}",
                out.code,
                out.stderr.trim()
            );
        }
        Ok(())
    }
}

impl Drop for ContainerManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// =============================================================================
// Export Extraction
// =============================================================================

fn extract_targets<R: std::io::Read>(
    archive: &mut Archive<R>,
    targets: &[String],
    dest: &Path,
) -> Result<()> {
    for entry in archive
        .entries()
        .map_err(|e| Error::ExportFailed(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| Error::ExportFailed(e.to_string()))?;
        let path: PathBuf = entry
            .path()
            .map_err(|e| Error::ExportFailed(e.to_string()))?
            .into_owned();
        let path_str = path.to_string_lossy().into_owned();
        if !targets.iter().any(|t| under_target(&path_str, t)) {
            continue;
        }
        if path.is_absolute() || path_str.split('/').any(|c| c == "..") {
            return Err(Error::PathTraversal { path: path_str });
        }
        debug!("Extracting: {path_str}");
        entry
            .unpack_in(dest)
            .map_err(|e| Error::ExportFailed(format!("failed to unpack '{path_str}': {e}")))?;
    }
    Ok(())
}

fn under_target(path: &str, target: &str) -> bool {
    let path = path.trim_end_matches('/');
    path == target || path.starts_with(&format!("{target}/"))
}

/// Recursively grants user rwx so exported trees with restrictive modes
/// can still be walked by the diff tool. Directories first, then their
/// children, so unreadable directories become listable before descent.
#[cfg(unix)]
fn grant_user_rwx(root: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let meta = fs::symlink_metadata(root)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    perms.set_mode(perms.mode() | 0o700);
    fs::set_permissions(root, perms)?;
    if meta.is_dir() {
        for child in fs::read_dir(root)? {
            grant_user_rwx(&child?.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_target_matches_exact_and_children() {
        assert!(under_target("usr/lib", "usr/lib"));
        assert!(under_target("usr/lib/", "usr/lib"));
        assert!(under_target("usr/lib/x/y", "usr/lib"));
        assert!(!under_target("usr/lib64", "usr/lib"));
        assert!(!under_target("usr", "usr/lib"));
    }
}
