mod archive;
mod build;
mod extract;
mod list;
mod revision;
mod sync;
mod upload;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pkgver_lib::config::{Config, ConfigOverrides};
use pkgver_lib::platform::HostTarget;

pub use archive::{ArchiveArgs, cmd_archive};
pub use build::cmd_build;
pub use extract::cmd_extract;
pub use list::cmd_list;
pub use revision::cmd_set_revision;
pub use sync::cmd_sync;
pub use upload::cmd_upload;

pub fn load_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Config> {
  Config::load_with(path, overrides).context("Failed to load configuration")
}

/// The explicit target, or the one this machine runs.
pub fn resolve_target(target: Option<String>) -> Result<String> {
  match target {
    Some(target) => Ok(target),
    None => HostTarget::current()
      .map(|t| t.to_string())
      .context("Cannot detect a target for this machine; pass --target"),
  }
}

/// `path` made absolute, so URLs derived from it stay valid elsewhere.
pub fn absolute(path: &Path) -> Result<PathBuf> {
  std::path::absolute(path).with_context(|| format!("Invalid path {}", path.display()))
}
