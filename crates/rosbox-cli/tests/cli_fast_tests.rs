//! Fast CLI tests using assert_cmd.
//! These test the binary directly without needing a container runtime.

#![allow(deprecated)] // assert_cmd::Command::cargo_bin is deprecated but works fine

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

/// `rosbox` with its config directory pointed at `dir`
fn rosbox(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rosbox").unwrap();
    cmd.env("ROSBOX_CONFIG_DIR", dir);
    cmd
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Config dir whose config points `templates_dir` at a minimal template tree
fn config_with_templates() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let templates = tmp.path().join("templates");
    write(
        &templates.join("base_templates/Dockerfile.universal.jinja"),
        "FROM ubuntu:22.04\n{{ ros_install }}\n{{ extensions_install }}\n{{ entrypoint_setup }}\n",
    );
    write(
        &templates.join("variant_templates/Dockerfile.ros-desktop.template"),
        "RUN apt-get install -y ros-humble-desktop",
    );
    write(
        &templates.join("entrypoints_templates/Dockerfile.rosbox.template"),
        "ENTRYPOINT [\"/entrypoint.sh\"]",
    );
    write(
        &tmp.path().join("config.toml"),
        &format!(
            "[paths]\ntemplates_dir = {:?}\n",
            templates.to_string_lossy()
        ),
    );
    tmp
}

#[test]
fn test_help_flag() {
    Command::cargo_bin("rosbox")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ROS development container manager"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("rosbox")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn test_subcommand_help() {
    for subcmd in &[
        "create", "update", "start", "stop", "enter", "remove", "list", "build", "ibuilder",
        "images", "config",
    ] {
        Command::cargo_bin("rosbox")
            .unwrap()
            .args([subcmd, "--help"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty().not());
    }
}

#[test]
fn test_create_help_lists_flags() {
    Command::cargo_bin("rosbox")
        .unwrap()
        .args(["create", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--no_start"))
        .stdout(predicate::str::contains("--no_host_net"))
        .stdout(predicate::str::contains("--ws"));
}

#[test]
fn test_unknown_subcommand_fails() {
    Command::cargo_bin("rosbox")
        .unwrap()
        .arg("nonexistent-subcommand")
        .assert()
        .failure();
}

#[test]
fn test_create_requires_name() {
    Command::cargo_bin("rosbox")
        .unwrap()
        .args(["create", "desktop"])
        .assert()
        .failure();
}

#[test]
fn test_create_custom_and_build_conflict() {
    Command::cargo_bin("rosbox")
        .unwrap()
        .args(["create", "desktop", "rig1", "--custom", "--build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_unknown_backend_rejected() {
    Command::cargo_bin("rosbox")
        .unwrap()
        .args(["--backend", "podman", "list"])
        .assert()
        .failure();
}

#[test]
fn test_config_shows_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    rosbox(tmp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("not created yet"))
        .stdout(predicate::str::contains("[defaults]"))
        .stdout(predicate::str::contains("backend = \"docker\""));
}

#[test]
fn test_config_shows_file_values() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        &tmp.path().join("config.toml"),
        "[defaults]\nshell = \"zsh\"\n",
    );
    rosbox(tmp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("not created yet").not())
        .stdout(predicate::str::contains("shell = \"zsh\""));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = tempfile::tempdir().unwrap();
    write(&tmp.path().join("config.toml"), "[defaults\nshell = ");
    rosbox(tmp.path())
        .arg("config")
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("Error:"));
}

#[test]
fn test_build_output_writes_dockerfile() {
    let tmp = config_with_templates();
    let output = tmp.path().join("Dockerfile.desktop");
    rosbox(tmp.path())
        .args(["build", "desktop", "--output"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote Dockerfile for 'desktop'"));

    let recipe = std::fs::read_to_string(&output).unwrap();
    assert!(recipe.starts_with("FROM ubuntu:22.04\n"));
    assert!(recipe.contains("ros-humble-desktop"));
    assert!(recipe.contains("ENTRYPOINT"));
    assert!(!recipe.contains("{{"));
}

#[test]
fn test_build_output_unknown_image_fails() {
    let tmp = config_with_templates();
    rosbox(tmp.path())
        .args(["build", "nope", "--output"])
        .arg(tmp.path().join("Dockerfile"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown image 'nope'"));
}

#[test]
fn test_build_output_without_image_is_error_off_terminal() {
    let tmp = config_with_templates();
    rosbox(tmp.path())
        .args(["build", "--output"])
        .arg(tmp.path().join("Dockerfile"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No image specified"));
}

#[test]
fn test_ibuilder_needs_terminal_to_pick_templates() {
    let tmp = config_with_templates();
    rosbox(tmp.path())
        .current_dir(tmp.path())
        .args(["ibuilder", "mybox", "--no_build"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("interactive terminal"));
    assert!(!tmp.path().join("Dockerfile").exists());
}
