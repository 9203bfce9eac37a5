//! Drives the `todo` binary over stdin with the memory backend.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Runs from an empty directory so no `.env` file is picked up.
fn todo(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("todo").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("TODO_BACKEND")
        .env_remove("FIREBASE_API_KEY")
        .env_remove("FIREBASE_PROJECT_ID");
    cmd
}

#[test]
fn version_flag_prints_version() {
    let dir = TempDir::new().unwrap();
    todo(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn task_round_trip_over_stdin() {
    let dir = TempDir::new().unwrap();
    todo(&dir)
        .args(["--user", "a@x.com:secret"])
        .write_stdin("login a@x.com secret\nadd Buy milk\nadd   \nlist\ntoggle 1\nlist\ndelete 1\nlist\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("[success] Signed in"))
        .stdout(predicate::str::contains("[warning] Task text cannot be empty"))
        .stdout(predicate::str::contains("1. [ ] Buy milk"))
        .stdout(predicate::str::contains("1. [x] Buy milk"))
        .stdout(predicate::str::contains("[success] Task deleted"))
        .stdout(predicate::str::contains("No tasks."));
}

#[test]
fn wrong_password_reports_invalid_credentials() {
    let dir = TempDir::new().unwrap();
    todo(&dir)
        .args(["--user", "a@x.com:secret"])
        .write_stdin("login a@x.com nope\nwhoami\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("[error] Sign-in failed: The supplied credentials are invalid"))
        .stdout(predicate::str::contains("Not signed in"));
}

#[test]
fn password_reset_is_sent_once() {
    let dir = TempDir::new().unwrap();
    todo(&dir)
        .write_stdin("reset-password a@x.com\nreset-password a@x.com\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("[success] Password reset email sent"))
        .stdout(predicate::str::contains("error: A password reset email was already sent"));
}

#[test]
fn unknown_command_is_reported() {
    let dir = TempDir::new().unwrap();
    todo(&dir)
        .write_stdin("frobnicate\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("error: Unknown command `frobnicate`"));
}

#[test]
fn malformed_user_flag_fails() {
    let dir = TempDir::new().unwrap();
    todo(&dir)
        .args(["--user", "no-colon"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("EMAIL:PASSWORD"));
}

#[test]
fn firebase_backend_requires_configuration() {
    let dir = TempDir::new().unwrap();
    todo(&dir)
        .args(["--backend", "firebase"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("FIREBASE_API_KEY"));
}

#[test]
fn dotenv_in_working_directory_is_loaded() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".env"), "TODO_BACKEND=firebase\n").unwrap();
    todo(&dir)
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("FIREBASE_API_KEY"));
}
