//! Tests for the container driver's tool-agnostic surface.
//!
//! Container-tool invocations need a podman/docker installation, so these
//! tests cover the parts that hold without one: tool selection, handle
//! state, and the guard rails around operations on absent containers.

use std::path::Path;

use driftscan::container::{CommandResult, ContainerManager, ContainerTool};
use driftscan::Error;

// =============================================================================
// ContainerTool
// =============================================================================

#[test]
fn test_tool_parse() {
    assert_eq!(ContainerTool::parse("podman"), Some(ContainerTool::Podman));
    assert_eq!(ContainerTool::parse("docker"), Some(ContainerTool::Docker));
    assert_eq!(ContainerTool::parse("lxc"), None);
}

#[test]
fn test_tool_display_matches_command() {
    assert_eq!(ContainerTool::Podman.to_string(), "podman");
    assert_eq!(ContainerTool::Docker.to_string(), "docker");
    assert_eq!(ContainerTool::Podman.command(), "podman");
    assert_eq!(ContainerTool::Docker.command(), "docker");
}

#[test]
fn test_tool_default_is_podman() {
    assert_eq!(ContainerTool::default(), ContainerTool::Podman);
}

// =============================================================================
// Handle State
// =============================================================================

#[test]
fn test_new_manager_has_no_container() {
    let manager = ContainerManager::new("alpine:latest", ContainerTool::Podman);
    assert!(manager.id().is_none());
}

#[test]
fn test_exec_without_container_fails() {
    let manager = ContainerManager::new("alpine:latest", ContainerTool::Podman);
    let err = manager.execute_command("true").unwrap_err();
    assert!(matches!(err, Error::ContainerUnavailable(_)));
}

#[test]
fn test_copy_without_container_fails() {
    let manager = ContainerManager::new("alpine:latest", ContainerTool::Podman);
    let err = manager
        .copy_to(Path::new("/etc/hosts"), "/tmp/hosts")
        .unwrap_err();
    assert!(matches!(err, Error::ContainerUnavailable(_)));
}

#[test]
fn test_capture_without_container_fails() {
    let manager = ContainerManager::new("alpine:latest", ContainerTool::Podman);
    let err = manager
        .capture_command_output("true", Path::new("/tmp/out.txt"))
        .unwrap_err();
    assert!(matches!(err, Error::ContainerUnavailable(_)));
}

#[test]
fn test_export_without_container_fails() {
    let manager = ContainerManager::new("alpine:latest", ContainerTool::Podman);
    let err = manager
        .export_paths(&["/opt".to_string()], Path::new("/tmp/export"))
        .unwrap_err();
    assert!(matches!(err, Error::ContainerUnavailable(_)));
}

#[test]
fn test_start_without_container_fails() {
    let manager = ContainerManager::new("alpine:latest", ContainerTool::Podman);
    assert!(manager.start().is_err());
}

#[test]
fn test_cleanup_without_container_is_noop() {
    let mut manager = ContainerManager::new("alpine:latest", ContainerTool::Podman);
    manager.cleanup();
    manager.stop(0);
    manager.remove(true);
    assert!(manager.id().is_none());
}

// =============================================================================
// CommandResult
// =============================================================================

#[test]
fn test_command_result_serialization_shape() {
    let result = CommandResult {
        command: "dpkg -l".to_string(),
        stdout: "ok".to_string(),
        stderr: String::new(),
        return_code: 2,
    };
    let json = serde_json::to_string(&result).unwrap();

    assert!(json.contains("\"command\":\"dpkg -l\""));
    assert!(json.contains("\"return_code\":2"));

    let back: CommandResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.return_code, 2);
    assert_eq!(back.stdout, "ok");
}
