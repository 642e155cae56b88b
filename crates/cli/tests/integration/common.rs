//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory; relative paths in commands and
/// in `pkgver.json` resolve inside it.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.path(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.path(relative_path))
      .unwrap_or_else(|e| panic!("Failed to read {}: {}", relative_path, e))
  }

  pub fn exists(&self, relative_path: &str) -> bool {
    self.path(relative_path).exists()
  }

  /// Get a pkgver command running inside the temp directory.
  ///
  /// `PKGVER_*` variables from the outer environment are removed and the
  /// user cache directory points into the temp directory.
  pub fn pkgver_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("pkgver");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("PKGVER_CACHE_DIR");
    cmd.env_remove("PKGVER_DEST_DIR");
    cmd.env_remove("PKGVER_REVISIONS_DIR");
    cmd.env_remove("RUST_LOG");
    cmd.env("XDG_CACHE_HOME", self.path("xdg-cache"));
    cmd.env("LOCALAPPDATA", self.path("xdg-cache")); // For Windows
    cmd
  }
}
