//! End-to-end tests for the `keel` binary.
//!
//! Every command runs with a cleared environment inside a temp directory so
//! that neither the host's variables nor a stray `.env` leak in.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn keel(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("keel").unwrap();
    cmd.current_dir(dir.path()).env_clear();
    cmd
}

/// `keel` in the dev environment with its store inside `dir`.
fn keel_dev(dir: &TempDir) -> Command {
    let mut cmd = keel(dir);
    cmd.env("APP_ENV", "dev")
        .env("DEV_DB_PATH", dir.path().join("store.json"));
    cmd
}

#[test]
fn help_flag_succeeds() {
    let dir = TempDir::new().unwrap();
    keel(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("APP_ENV"));
}

#[test]
fn version_flag_succeeds() {
    let dir = TempDir::new().unwrap();
    keel(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    keel(&dir).arg("frobnicate").assert().code(2);
}

#[test]
fn env_reports_test_backends() {
    let dir = TempDir::new().unwrap();
    keel(&dir)
        .env("APP_ENV", "test")
        .args(["env", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""environment": "test""#))
        .stdout(predicate::str::contains(r#""engine": "memory""#))
        .stdout(predicate::str::contains(r#""logger": "console""#));
}

#[test]
fn env_honors_logger_override() {
    let dir = TempDir::new().unwrap();
    keel(&dir)
        .env("APP_ENV", "prod")
        .env("LOG_BACKEND", "loguru")
        .args(["--no-color", "env"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remote"))
        .stdout(predicate::str::contains("console (LOG_BACKEND)"));
}

#[test]
fn env_defaults_to_dev_and_warns() {
    let dir = TempDir::new().unwrap();
    keel(&dir)
        .env("LOG_BACKEND", "simple")
        .args(["env", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""environment": "dev""#))
        .stdout(predicate::str::contains(r#""environment_defaulted": true"#))
        .stderr(predicate::str::contains("APP_ENV is not set"));
}

#[test]
fn env_text_output_flags_the_defaulted_environment() {
    let dir = TempDir::new().unwrap();
    keel(&dir)
        .env("LOG_BACKEND", "simple")
        .args(["--no-color", "env"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "APP_ENV is not set, using the dev environment",
        ))
        .stdout(predicate::str::contains("dev (default)"));

    keel(&dir)
        .env("LOG_BACKEND", "simple")
        .args(["--quiet", "env"])
        .assert()
        .success()
        .stdout(predicate::str::contains("using the dev environment").not());
}

#[test]
fn invalid_environment_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    keel(&dir)
        .env("APP_ENV", "qa")
        .arg("env")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("qa"));
}

#[test]
fn check_succeeds_on_memory_engine() {
    let dir = TempDir::new().unwrap();
    keel(&dir)
        .env("APP_ENV", "test")
        .args(["--no-color", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("memory engine ready"));
}

#[test]
fn check_without_remote_credentials_fails_with_configuration_error() {
    let dir = TempDir::new().unwrap();
    keel(&dir)
        .env("APP_ENV", "prod")
        .env("LOG_BACKEND", "simple")
        .arg("check")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("PROD_DATABASE_URL"));
}

#[test]
fn doc_put_then_get_round_trips_through_the_dev_store() {
    let dir = TempDir::new().unwrap();

    keel_dev(&dir)
        .args(["doc", "put", "users", "42", r#"{"name": "ada"}"#])
        .assert()
        .success();

    keel_dev(&dir)
        .args(["doc", "get", "users", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name": "ada""#));

    assert!(dir.path().join("store.json").exists());
}

#[test]
fn doc_get_missing_document_exits_not_found() {
    let dir = TempDir::new().unwrap();
    keel_dev(&dir)
        .args(["doc", "get", "users", "nobody"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("users/nobody not found"));
}

#[test]
fn doc_delete_missing_document_exits_not_found() {
    let dir = TempDir::new().unwrap();
    keel_dev(&dir)
        .args(["doc", "rm", "users", "nobody"])
        .assert()
        .code(3);
}

#[test]
fn doc_delete_removes_document() {
    let dir = TempDir::new().unwrap();

    keel_dev(&dir)
        .args(["doc", "put", "users", "7", "{}"])
        .assert()
        .success();
    keel_dev(&dir)
        .args(["doc", "delete", "users", "7"])
        .assert()
        .success();
    keel_dev(&dir)
        .args(["doc", "get", "users", "7"])
        .assert()
        .code(3);
}

#[test]
fn doc_put_with_invalid_json_is_a_user_error() {
    let dir = TempDir::new().unwrap();
    keel_dev(&dir)
        .args(["doc", "put", "users", "1", "{not json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not valid JSON"));

    keel_dev(&dir)
        .args(["doc", "get", "users", "1"])
        .assert()
        .code(3);
}

#[test]
fn completions_need_no_environment() {
    let dir = TempDir::new().unwrap();
    keel(&dir)
        .env("APP_ENV", "qa")
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("keel"));
}
