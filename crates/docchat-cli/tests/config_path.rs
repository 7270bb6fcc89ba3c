use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn test_config_path_command() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_creates_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");

    assert!(!config_path.exists());

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config at"));

    let contents = fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("[api]"));
    assert!(contents.contains("# base_url ="));
}

#[test]
fn test_config_init_fails_if_exists() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "# existing config").unwrap();

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_invalid_configured_url_is_reported() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "[api]\nbase_url = \"not a url\"\n",
    )
    .unwrap();

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", dir.path())
        .env_remove("DOCCHAT_API_URL")
        .arg("health")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid API base URL"));
}

#[test]
fn test_whoami_without_session() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", dir.path())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in."));
}
