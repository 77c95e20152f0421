// tests/cli_test.rs
use std::process::{Command, Output};
use tempfile::TempDir;

const INPUT_VARS: [&str; 5] = [
    "INPUT_BRANCH",
    "INPUT_VERSION",
    "INPUT_PRE-ID",
    "INPUT_CONFIG",
    "GITHUB_ACTIONS",
];

fn ci_release(dir: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ci-release"));
    cmd.current_dir(dir.path());
    for var in INPUT_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn combined(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    let output = ci_release(&dir).arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("ci-release"));
    assert!(stdout.contains("--pre-id"));
    assert!(stdout.contains("--branch"));
}

#[test]
fn test_version_is_required() {
    let dir = TempDir::new().unwrap();
    let output = ci_release(&dir).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_invalid_bump_kind() {
    let dir = TempDir::new().unwrap();
    let output = ci_release(&dir)
        .args(["--version", "bogus"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let text = combined(&output);
    assert!(text.contains("Version \"bogus\" must be one of"), "{}", text);
}

#[test]
fn test_pre_id_with_release_kind_fails_before_repository_access() {
    // the directory is not a repository, so reaching git would fail differently
    let dir = TempDir::new().unwrap();
    let output = ci_release(&dir)
        .args(["--version", "patch", "--pre-id", "beta"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let text = combined(&output);
    assert!(
        text.contains("Provided pre-id \"beta\" with non-prerelease version \"patch\""),
        "{}",
        text
    );
}

#[test]
fn test_inputs_from_environment() {
    let dir = TempDir::new().unwrap();
    let output = ci_release(&dir)
        .env("INPUT_VERSION", "minor")
        .env("INPUT_PRE-ID", "rc")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let text = combined(&output);
    assert!(text.contains("\"rc\""), "{}", text);
    assert!(text.contains("\"minor\""), "{}", text);
}

#[test]
fn test_github_actions_error_annotation() {
    let dir = TempDir::new().unwrap();
    let output = ci_release(&dir)
        .env("GITHUB_ACTIONS", "true")
        .args(["--version", "huge"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("::error::"), "{}", stdout);
}

#[test]
fn test_outside_repository_fails() {
    let dir = TempDir::new().unwrap();
    let output = ci_release(&dir)
        .args(["--version", "patch", "--workdir"])
        .arg(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
}
