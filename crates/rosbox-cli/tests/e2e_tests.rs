//! End-to-end CLI tests against a real Docker daemon.
//!
//! Run explicitly: `cargo test -p rosbox-cli --test e2e_tests -- --ignored`

#![allow(deprecated)] // assert_cmd::Command::cargo_bin is deprecated but works fine

use assert_cmd::Command;
use predicates::prelude::*;

const TEST_IMAGE: &str = "alpine:3.19";

fn unique_name(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    )
}

fn rosbox(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("rosbox").unwrap();
    cmd.env("ROSBOX_CONFIG_DIR", config_dir)
        .args(["--backend", "docker"]);
    cmd
}

#[test]
#[ignore]
fn test_e2e_cli_lifecycle() {
    let config_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        config_dir.path().join("config.toml"),
        "[defaults]\ndisplay = false\ndevices = false\n",
    )
    .unwrap();
    let name = unique_name("e2e-cli");

    rosbox(config_dir.path())
        .args(["create", TEST_IMAGE, &name, "--custom", "--no_host_net"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Created '{}'", name)));

    rosbox(config_dir.path())
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("\"name\": \"{}\"", name)));

    rosbox(config_dir.path())
        .args(["create", TEST_IMAGE, &name, "--custom"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));

    rosbox(config_dir.path())
        .args(["remove", &name])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("stop it first"));

    rosbox(config_dir.path())
        .args(["stop", &name])
        .assert()
        .success();

    rosbox(config_dir.path())
        .args(["remove", &name])
        .assert()
        .success();

    rosbox(config_dir.path())
        .args(["start", &name])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}
