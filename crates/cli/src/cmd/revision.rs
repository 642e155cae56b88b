//! Implementation of the `pkgver set-revision` command.

use std::path::Path;

use anyhow::{Context, Result, bail};

use pkgver_lib::config::Config;
use pkgver_lib::revision::set_revision;
use pkgver_lib::transfer::{AnyDownloader, path_to_file_url};

use crate::output::{OutputFormat, print_json, print_stat, print_success};

pub fn cmd_set_revision(
  config: &Config,
  package: &str,
  revision: u64,
  remote: &str,
  targets: Vec<String>,
  output: OutputFormat,
) -> Result<()> {
  let targets = if targets.is_empty() {
    config.targets().map(str::to_string).collect::<Vec<_>>()
  } else {
    targets
  };
  if targets.is_empty() {
    bail!("No targets given and none configured; pass --target");
  }

  let base_url = if remote.contains("://") {
    remote.to_string()
  } else {
    path_to_file_url(&super::absolute(Path::new(remote))?)
  };

  let file = set_revision(
    &config.revisions_dir,
    package,
    revision,
    &targets,
    &base_url,
    &AnyDownloader::new(),
  )
  .with_context(|| format!("Failed to pin {} at revision {}", package, revision))?;

  if output.is_json() {
    print_json(&file)?;
  } else {
    print_success(&format!("Pinned {} at revision {}", package, revision));
    for (target, archives) in &file.targets {
      print_stat(target, &format!("{} archive(s)", archives.len()));
    }
  }

  Ok(())
}
