//! E2E CLI tests for argument handling and error reporting.
//!
//! None of these reach the network: every failure is raised before a
//! request would be sent.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn ghs() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ghs"));
    cmd.env("GHSTORE_LOG", "error");
    cmd.env_remove("GITHUB_TOKEN");
    cmd.env_remove("GITHUB_REPOSITORY");
    cmd.env_remove("GHSTORE_API_URL");
    cmd.env_remove("FORMAT");
    cmd
}

#[test]
fn help_lists_commands() {
    ghs()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("process-updates"))
        .stdout(predicate::str::contains("deprecate"))
        .stdout(predicate::str::contains("snapshot"));
}

#[test]
fn missing_token_is_reported() {
    ghs()
        .args(["get", "settings", "--repo", "acme/store"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[missing_token]"))
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

#[test]
fn missing_repository_is_reported() {
    ghs()
        .args(["list"])
        .env("GITHUB_TOKEN", "t")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[missing_repository]"));
}

#[test]
fn malformed_repository_is_a_configuration_error() {
    ghs()
        .args(["list", "--repo", "not-a-slug", "--token", "t"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E1001]"));
}

#[test]
fn explicit_config_must_exist() {
    ghs()
        .args(["list", "--config", "/nonexistent/ghstore.toml"])
        .env("GITHUB_TOKEN", "t")
        .env("GITHUB_REPOSITORY", "acme/store")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E1001]"));
}

#[test]
fn malformed_config_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[store\nbase_label = 3").expect("write");

    ghs()
        .args(["list", "--token", "t", "--repo", "acme/store", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E1001]"));
}

#[test]
fn invalid_json_is_rejected_before_connecting() {
    ghs()
        .args(["create", "settings", "{oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[invalid_json]"));
}

#[test]
fn json_errors_are_structured() {
    let output = ghs()
        .args(["get", "settings", "--format", "json"])
        .output()
        .expect("run");
    assert!(!output.status.success());
    let err: Value = serde_json::from_slice(&output.stderr).expect("json on stderr");
    assert_eq!(err["error"]["error_code"], "missing_token");
    assert!(err["error"]["suggestion"].is_string());
}

#[test]
fn completions_are_generated() {
    ghs()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ghs"));
}
