//! Implementation of the `pkgver upload` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use pkgver_lib::config::Config;
use pkgver_lib::transfer::LocalStore;
use pkgver_lib::upload::upload_package;

use crate::output::{OutputFormat, print_json, print_stat, print_success};

pub fn cmd_upload(
  config: &Config,
  target: Option<String>,
  package: &str,
  revision: u64,
  remote: &Path,
  output: OutputFormat,
) -> Result<()> {
  let target = super::resolve_target(target)?;
  let store = LocalStore::new(super::absolute(remote)?);

  let outcome = upload_package(&config.cache_dir, &target, package, revision, &store)
    .with_context(|| format!("Failed to upload {}/{}", target, package))?;

  if output.is_json() {
    print_json(&json!({
      "target": target,
      "package": package,
      "revision": revision,
      "manifest_key": outcome.manifest_key,
      "manifest_url": outcome.manifest_url,
      "archives": outcome.manifest.list().collect::<Vec<_>>(),
    }))?;
  } else {
    print_success(&format!("Uploaded {}/{} at revision {}", target, package, revision));
    print_stat("Manifest", &outcome.manifest_url);
    print_stat("Archives", &outcome.manifest.len().to_string());
  }

  Ok(())
}
