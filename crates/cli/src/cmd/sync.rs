//! Implementation of the `pkgver sync` command.
//!
//! With `--from`, one package is synced from a manifest file. Otherwise every
//! configured package is synced from its revision file.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};

use pkgver_lib::config::Config;
use pkgver_lib::manifest::{ManifestSource, PackageManifest};
use pkgver_lib::revision::configured_manifests;
use pkgver_lib::sync::{SyncReport, sync_all, sync_package};
use pkgver_lib::transfer::AnyDownloader;

use crate::output::{
  Change, OutputFormat, format_duration, print_change, print_info, print_json, print_stat, print_success,
};

pub fn cmd_sync(
  config: &Config,
  target: Option<String>,
  package: Option<String>,
  from: Option<PathBuf>,
  output: OutputFormat,
) -> Result<()> {
  let start = Instant::now();
  let downloader = AnyDownloader::new();

  let reports = match (from, package) {
    (Some(path), Some(package)) => {
      let target = super::resolve_target(target)?;
      let manifest = PackageManifest::load(ManifestSource::FromPath(path.clone()), false)
        .with_context(|| format!("Failed to load manifest {}", path.display()))?;
      vec![
        sync_package(&config.cache_dir, &target, &package, &manifest, &downloader)
          .with_context(|| format!("Failed to sync {}/{}", target, package))?,
      ]
    }
    (_, package) => {
      let mut manifests =
        configured_manifests(config, target.as_deref()).context("Failed to read revision files")?;
      if let Some(package) = &package {
        manifests.retain(|(_, p), _| p == package);
      }
      if manifests.is_empty() {
        print_info("No configured packages to sync");
        return Ok(());
      }
      sync_all(config, &manifests, &downloader).context("Sync failed")?
    }
  };

  if output.is_json() {
    print_json(&reports)?;
  } else {
    print_reports(&reports);
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}

fn print_reports(reports: &[SyncReport]) {
  for report in reports {
    if report.is_noop() {
      print_success(&format!("{}/{} is up to date", report.target, report.package));
      continue;
    }
    print_success(&format!(
      "Synced {}/{}: {} downloaded, {} removed",
      report.target,
      report.package,
      report.downloaded.len(),
      report.removed.len()
    ));
    for name in &report.downloaded {
      print_change(Change::Added, name);
    }
    for name in &report.removed {
      print_change(Change::Removed, name);
    }
  }
}
