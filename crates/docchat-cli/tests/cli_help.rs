use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("docchat")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("chatbots"))
        .stdout(predicate::str::contains("documents"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("health"));
}

#[test]
fn test_chatbots_help_shows_subcommands() {
    cargo_bin_cmd!("docchat")
        .args(["chatbots", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("toggle"))
        .stdout(predicate::str::contains("analytics"));
}

#[test]
fn test_history_export_rejects_unknown_format() {
    cargo_bin_cmd!("docchat")
        .args(["history", "export", "c1", "--format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown export format"));
}

#[test]
fn test_revoke_needs_id_or_all() {
    cargo_bin_cmd!("docchat")
        .args(["account", "revoke"])
        .assert()
        .failure();
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("docchat")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("docchat"));
}
