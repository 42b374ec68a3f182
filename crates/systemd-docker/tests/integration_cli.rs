use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_output() {
    let mut cmd = Command::cargo_bin("systemd-docker").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run a container as a systemd service"))
        .stdout(predicate::str::contains("--pid-file"))
        .stdout(predicate::str::contains("--logs"))
        .stdout(predicate::str::contains("--notify"))
        .stdout(predicate::str::contains("--env"));
}

#[test]
fn test_version_output() {
    let mut cmd = Command::cargo_bin("systemd-docker").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "systemd-docker {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_missing_run_marker_exits_with_2() {
    let mut cmd = Command::cargo_bin("systemd-docker").unwrap();
    cmd.args(["--pid-file", "/tmp/x.pid", "nginx"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("run not found in arguments"))
        .stderr(predicate::str::contains("unexpected argument").not());
}

#[test]
fn test_no_arguments_exits_with_2() {
    let mut cmd = Command::cargo_bin("systemd-docker").unwrap();
    cmd.assert().failure().code(2);
}

#[test]
fn test_unknown_own_flag_exits_with_2() {
    let mut cmd = Command::cargo_bin("systemd-docker").unwrap();
    cmd.args(["--bogus", "run", "nginx"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains(
            "Usage error: unexpected argument '--bogus'",
        ))
        .stderr(predicate::str::contains("Usage error: error").not());
}

#[test]
fn test_logs_requires_equals() {
    // `--logs false` would leave a stray positional.
    let mut cmd = Command::cargo_bin("systemd-docker").unwrap();
    cmd.args(["--logs", "false", "run", "nginx"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_missing_runtime_binary_exits_with_1() {
    let mut cmd = Command::cargo_bin("systemd-docker").unwrap();
    cmd.args([
        "--runtime-path",
        "/nonexistent/systemd-docker-test-runtime",
        "run",
        "nginx",
    ])
    .env_remove("NOTIFY_SOCKET")
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("not installed"));
}
