//! Binary smoke tests

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gula(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gula-ai").unwrap();
    cmd.env("GULA_CONFIG_DIR", data_dir.path())
        .env_remove("AGENT_API_URL")
        .env_remove("GULA_API_URL")
        .env_remove("GULA_API_KEY");
    cmd
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    gula(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gula-ai"));
}

#[test]
fn test_help_lists_flags() {
    let dir = TempDir::new().unwrap();
    gula(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--health"))
        .stdout(predicate::str::contains("--no-rag"))
        .stdout(predicate::str::contains("--working-dir"));
}

#[test]
fn test_health_fails_for_unreachable_service() {
    let dir = TempDir::new().unwrap();
    gula(&dir)
        .args(["--health", "--api-url", "http://127.0.0.1:9"])
        .assert()
        .failure();

    // First run writes the example config and the log file
    assert!(dir.path().join("config.toml").exists());
    assert!(dir.path().join("logs").join("gula-ai.log").exists());
}

#[test]
fn test_malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    std::fs::write(&config, "rag_enabled = \"maybe\"").unwrap();

    gula(&dir)
        .arg("--config")
        .arg(&config)
        .arg("--health")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn test_quit_on_end_of_input() {
    let dir = TempDir::new().unwrap();
    gula(&dir)
        .args(["--api-url", "http://127.0.0.1:9", "--working-dir"])
        .arg(dir.path())
        .write_stdin("/help\n")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("/approve"));
}
