//! CLI smoke tests for pkgver.
//!
//! These tests verify that every command parses, runs without panicking and
//! returns an appropriate exit code.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// A pkgver command isolated inside `temp`.
fn pkgver_cmd(temp: &TempDir) -> Command {
  let mut cmd: Command = cargo_bin_cmd!("pkgver");
  cmd.current_dir(temp.path());
  cmd.env("PKGVER_CACHE_DIR", temp.path().join("cache"));
  cmd.env("PKGVER_DEST_DIR", temp.path().join("dest"));
  cmd.env_remove("PKGVER_REVISIONS_DIR");
  cmd.env_remove("RUST_LOG");
  cmd
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp)
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp)
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("pkgver"));
}

#[test]
fn every_subcommand_has_help() {
  let temp = TempDir::new().unwrap();
  for sub in ["archive", "sync", "extract", "upload", "set-revision", "list", "build"] {
    pkgver_cmd(&temp).args([sub, "--help"]).assert().success();
  }
}

#[test]
fn unknown_subcommand_fails() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp).arg("frobnicate").assert().failure();
}

// =============================================================================
// Empty state
// =============================================================================

#[test]
fn list_on_empty_cache_succeeds() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp)
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("No packages cached"));
}

#[test]
fn list_json_on_empty_cache_is_empty_array() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp)
    .args(["list", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn sync_without_configured_packages_is_noop() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp)
    .arg("sync")
    .assert()
    .success()
    .stdout(predicate::str::contains("No configured packages"));
}

#[test]
fn sync_from_requires_package() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp).args(["sync", "--from", "m.json"]).assert().failure();
}

#[test]
fn extract_unsynced_package_fails() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp)
    .args(["extract", "--target", "linux_x86_64", "--package", "gcc"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("gcc"));
}

#[test]
fn archive_missing_file_fails() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp)
    .args(["archive", "--target", "t", "--package", "p", "missing.tar"])
    .assert()
    .failure();
}

#[test]
fn invalid_package_name_fails() {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("a.tar"), "aaa").unwrap();
  pkgver_cmd(&temp)
    .args(["archive", "--target", "t", "--package", "../escape", "a.tar"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid package"));
}

#[test]
fn build_with_missing_plan_fails() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp)
    .args(["build", "--plan", "nope.json"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("build plan"));
}

#[test]
fn bad_config_file_fails() {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("pkgver.json"), "{ not json").unwrap();
  pkgver_cmd(&temp)
    .arg("list")
    .assert()
    .failure()
    .stderr(predicate::str::contains("configuration"));
}

#[test]
fn missing_named_config_file_fails() {
  let temp = TempDir::new().unwrap();
  pkgver_cmd(&temp)
    .args(["--config", "nope.json", "list"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("nope.json"));
}
