use predicates::prelude::*;

use super::common::TestEnv;

const TARGET: &str = "linux_x86_64";

/// Author and publish `tools` revision 3 with one raw archive.
fn publish(env: &TestEnv, contents: &str) {
  env.write_file("src/hello.txt", contents);

  env
    .pkgver_cmd()
    .args(["--cache-dir", "author"])
    .args(["archive", "--target", TARGET, "--package", "tools", "--extract-dir", "bin"])
    .arg("src/hello.txt")
    .assert()
    .success()
    .stdout(predicate::str::contains("1 archive(s)"));

  env
    .pkgver_cmd()
    .args(["--cache-dir", "author"])
    .args(["upload", "--target", TARGET, "--package", "tools", "--revision", "3", "--remote", "remote"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Uploaded"));
}

fn write_consumer_config(env: &TestEnv) {
  env.write_file(
    "pkgver.json",
    r#"{
      "cache_dir": "consumer",
      "dest_dir": "dest",
      "revisions_dir": "revisions",
      "packages": { "linux_x86_64": ["tools"] }
    }"#,
  );
}

#[test]
fn upload_writes_remote_layout() {
  let env = TestEnv::new();
  publish(&env, "hello\n");

  assert!(env.exists("remote/builds/3/linux_x86_64/tools.json"));
  assert!(env.exists("remote/builds/3/linux_x86_64/tools/hello.txt.json"));
  assert!(env.exists("author/linux_x86_64/tools/hello.txt"));
}

#[test]
fn publish_pin_sync_extract() {
  let env = TestEnv::new();
  publish(&env, "hello\n");
  write_consumer_config(&env);

  env
    .pkgver_cmd()
    .args(["set-revision", "--package", "tools", "--revision", "3", "--remote", "remote"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Pinned tools at revision 3"));
  assert!(env.exists("revisions/tools.json"));

  env
    .pkgver_cmd()
    .arg("sync")
    .assert()
    .success()
    .stdout(predicate::str::contains("1 downloaded"));
  assert_eq!(env.read_file("consumer/linux_x86_64/tools/hello.txt"), "hello\n");

  env
    .pkgver_cmd()
    .arg("sync")
    .assert()
    .success()
    .stdout(predicate::str::contains("up to date"));

  env
    .pkgver_cmd()
    .arg("extract")
    .assert()
    .success()
    .stdout(predicate::str::contains("Extracted linux_x86_64/tools"));
  assert_eq!(env.read_file("dest/linux_x86_64/tools/bin/hello.txt"), "hello\n");
  assert!(env.exists("dest/.packages/linux_x86_64/tools.json"));

  env
    .pkgver_cmd()
    .arg("extract")
    .assert()
    .success()
    .stdout(predicate::str::contains("up to date"));
}

#[test]
fn sync_from_manifest_file() {
  let env = TestEnv::new();
  publish(&env, "hello\n");

  env
    .pkgver_cmd()
    .args(["--cache-dir", "consumer", "-o", "json"])
    .args(["sync", "--target", TARGET, "--package", "tools", "--from"])
    .arg(env.path("author/linux_x86_64/tools.json"))
    .assert()
    .success()
    .stdout(predicate::str::contains("\"downloaded\""))
    .stdout(predicate::str::contains("hello.txt"));

  assert_eq!(env.read_file("consumer/linux_x86_64/tools/hello.txt"), "hello\n");
}

#[test]
fn list_shows_cached_archives() {
  let env = TestEnv::new();
  publish(&env, "hello\n");

  env
    .pkgver_cmd()
    .args(["--cache-dir", "author", "list"])
    .assert()
    .success()
    .stdout(predicate::str::contains("linux_x86_64/tools"))
    .stdout(predicate::str::contains("hello.txt"));

  env
    .pkgver_cmd()
    .args(["--cache-dir", "author", "list", "--target", "mac_arm64", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn corrupt_remote_archive_fails_sync() {
  let env = TestEnv::new();
  publish(&env, "hello\n");
  write_consumer_config(&env);

  env
    .pkgver_cmd()
    .args(["set-revision", "--package", "tools", "--revision", "3", "--remote", "remote"])
    .assert()
    .success();

  let archives = env.path("remote/archives");
  let hash_dir = std::fs::read_dir(&archives).unwrap().next().unwrap().unwrap().path();
  std::fs::write(hash_dir.join("hello.txt"), "tampered").unwrap();

  env
    .pkgver_cmd()
    .arg("sync")
    .assert()
    .failure()
    .stderr(predicate::str::contains("hello.txt"));
  assert!(!env.exists("consumer/linux_x86_64/tools/hello.txt"));
}

#[test]
fn set_revision_without_targets_fails() {
  let env = TestEnv::new();
  publish(&env, "hello\n");

  env
    .pkgver_cmd()
    .args(["set-revision", "--package", "tools", "--revision", "3", "--remote", "remote"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--target"));
}
