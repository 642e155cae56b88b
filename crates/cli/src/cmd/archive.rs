//! Implementation of the `pkgver archive` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use pkgver_lib::config::Config;
use pkgver_lib::upload::add_archives;

use crate::output::{OutputFormat, print_json, print_stat, print_success, short_hash};

pub struct ArchiveArgs {
  pub target: Option<String>,
  pub package: String,
  pub url_prefix: Option<String>,
  pub tar_src_dir: String,
  pub extract_dir: String,
  pub files: Vec<PathBuf>,
}

pub fn cmd_archive(config: &Config, args: ArchiveArgs, output: OutputFormat) -> Result<()> {
  let target = super::resolve_target(args.target)?;

  let manifest = add_archives(
    &config.cache_dir,
    &target,
    &args.package,
    &args.files,
    args.url_prefix.as_deref(),
    &args.tar_src_dir,
    &args.extract_dir,
  )
  .with_context(|| format!("Failed to add archives to {}/{}", target, args.package))?;

  if output.is_json() {
    print_json(&manifest.list().collect::<Vec<_>>())?;
  } else {
    print_success(&format!("Package {}/{} has {} archive(s)", target, args.package, manifest.len()));
    for record in manifest.list() {
      print_stat(&record.name, short_hash(&record.hash));
    }
  }

  Ok(())
}
