//! Implementation of the `pkgver list` command.
//!
//! Shows every cached package with its archives, their hashes and sizes.

use std::fs;

use anyhow::{Context, Result};
use serde::Serialize;

use pkgver_lib::archive::ArchiveRecord;
use pkgver_lib::config::Config;
use pkgver_lib::locations::{archive_file, package_file};
use pkgver_lib::manifest::{ManifestSource, PackageManifest, list_packages};

use crate::output::{OutputFormat, format_bytes, print_info, print_json, print_package, print_stat, short_hash};

#[derive(Serialize)]
struct CachedArchive {
  #[serde(flatten)]
  record: ArchiveRecord,
  /// `None` when the bytes are missing from the cache.
  size: Option<u64>,
}

#[derive(Serialize)]
struct CachedPackage {
  target: String,
  package: String,
  /// RFC 3339 time the manifest was last written.
  updated: Option<String>,
  archives: Vec<CachedArchive>,
}

pub fn cmd_list(config: &Config, target: Option<&str>, output: OutputFormat) -> Result<()> {
  let mut packages = Vec::new();
  for (t, package) in list_packages(&config.cache_dir).context("Failed to scan cache")? {
    if target.is_some_and(|only| only != t) {
      continue;
    }

    let path = package_file(&config.cache_dir, &t, &package);
    let manifest = PackageManifest::load(ManifestSource::FromPath(path.clone()), true)
      .with_context(|| format!("Failed to load {}", path.display()))?;
    let updated = fs::metadata(&path)
      .and_then(|m| m.modified())
      .ok()
      .map(|time| humantime::format_rfc3339_seconds(time).to_string());

    let archives = manifest
      .into_iter()
      .map(|record| {
        let size = fs::metadata(archive_file(&config.cache_dir, &t, &package, &record.name))
          .ok()
          .map(|m| m.len());
        CachedArchive { record, size }
      })
      .collect();

    packages.push(CachedPackage {
      target: t,
      package,
      updated,
      archives,
    });
  }

  if output.is_json() {
    return print_json(&packages);
  }

  if packages.is_empty() {
    print_info(&format!("No packages cached in {}", config.cache_dir.display()));
    return Ok(());
  }

  for package in &packages {
    print_package(&package.target, &package.package);
    if let Some(updated) = &package.updated {
      print_stat("Updated", updated);
    }
    for archive in &package.archives {
      let size = archive.size.map(format_bytes).unwrap_or_else(|| "missing".to_string());
      print_stat(
        &archive.record.name,
        &format!("{} ({})", short_hash(&archive.record.hash), size),
      );
    }
  }

  Ok(())
}
