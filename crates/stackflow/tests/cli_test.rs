#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! once assert_cmd 2.1 is the minimum

mod common;

use assert_cmd::Command;
use common::{ENV_VARS, TestProject};
use predicates::prelude::*;

const DEPLOY_KDL: &str = r#"
project "rese"

variables {
    app_ref "v1.4.2"
}

backend {
    storage {
        public-read #true
    }
    application {
        ref "{{ app_ref }}"
    }
}
"#;

fn project() -> TestProject {
    let project = TestProject::new();
    project.write_deploy_kdl(DEPLOY_KDL);
    project.write_env_local();
    project
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("synth"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("script"))
        .stdout(predicate::str::contains("version"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("stackflow "));
}

#[test]
fn test_synth_help() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.arg("synth")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--out"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

#[test]
fn test_validate_without_project() {
    let project = TestProject::new();
    project
        .command()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("deploy.kdl"));
}

#[test]
fn test_validate_missing_variable() {
    let project = TestProject::new();
    project.write_deploy_kdl(DEPLOY_KDL);
    project
        .command()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ACCOUNT_ID"));
}

#[test]
fn test_validate() {
    project()
        .command()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deployment is valid"))
        .stdout(predicate::str::contains("UsStack"))
        .stdout(predicate::str::contains("BackendStack"));
}

#[test]
fn test_process_env_overrides_env_file() {
    project()
        .command()
        .env("ACCOUNT_ID", "not-an-account")
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ACCOUNT_ID"));
}

#[test]
fn test_synth_writes_plan() {
    let project = project();
    project
        .command()
        .arg("synth")
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan synthesized"));

    let stored: serde_json::Value =
        serde_json::from_str(&project.read(".stackflow/plan.json")).unwrap();
    let stacks: Vec<_> = stored["plan"]["stacks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["stack"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(stacks, vec!["UsStack", "FrontendStack", "BackendStack"]);
    assert!(!project.path().join(".stackflow/lock.json").exists());
}

#[test]
fn test_synth_keeps_backup() {
    let project = project();
    project.command().arg("synth").assert().success();
    project.command().arg("synth").assert().success();
    assert!(project.path().join(".stackflow/plan.json.backup").exists());
}

#[test]
fn test_synth_out_dir() {
    let project = project();
    let out = tempfile::tempdir().unwrap();
    project
        .command()
        .arg("synth")
        .arg("--out")
        .arg(out.path())
        .assert()
        .success();
    assert!(out.path().join("plan.json").exists());
    assert!(!project.path().join(".stackflow").exists());
}

#[test]
fn test_synth_refuses_when_locked() {
    let project = project();
    std::fs::create_dir_all(project.path().join(".stackflow")).unwrap();
    let lock = serde_json::json!({
        "holder": "ci-runner",
        "acquired_at": "2999-01-01T00:00:00Z",
    });
    std::fs::write(project.path().join(".stackflow/lock.json"), lock.to_string()).unwrap();

    project
        .command()
        .arg("synth")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ci-runner"));
}

#[test]
fn test_plan_carries_no_secret() {
    let project = project();
    project.command().arg("synth").assert().success();
    let plan = project.read(".stackflow/plan.json");
    for (key, value) in &ENV_VARS[4..] {
        assert!(!plan.contains(value), "{key} leaked into plan.json");
    }
}

#[test]
fn test_script() {
    let output = project()
        .command()
        .arg("script")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("#!/bin/bash"))
        .stdout(predicate::str::contains("v1.4.2"))
        .get_output()
        .stdout
        .clone();

    let script = String::from_utf8(output).unwrap();
    assert!(!script.contains("sk_live_frontdoor"));
}

#[test]
fn test_project_dir_flag() {
    let project = project();
    let elsewhere = tempfile::tempdir().unwrap();
    project
        .command()
        .current_dir(elsewhere.path())
        .arg("--project-dir")
        .arg(project.path())
        .arg("validate")
        .assert()
        .success();
}
