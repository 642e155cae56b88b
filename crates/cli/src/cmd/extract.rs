//! Implementation of the `pkgver extract` command.

use std::time::Instant;

use anyhow::{Context, Result};

use pkgver_lib::config::Config;
use pkgver_lib::extract::{ExtractReport, extract_all, extract_package};
use pkgver_lib::transfer::AnyDownloader;

use crate::output::{
  Change, OutputFormat, format_duration, print_change, print_info, print_json, print_stat, print_success, print_warning,
};

pub fn cmd_extract(
  config: &Config,
  target: Option<String>,
  package: Option<String>,
  output: OutputFormat,
) -> Result<()> {
  let start = Instant::now();
  let downloader = AnyDownloader::new();

  let reports = match package {
    Some(package) => {
      let target = super::resolve_target(target)?;
      vec![
        extract_package(&config.cache_dir, &config.dest_dir, &target, &package, &downloader)
          .with_context(|| format!("Failed to extract {}/{}", target, package))?,
      ]
    }
    None => {
      let pairs = config.pairs(target.as_deref());
      if pairs.is_empty() {
        print_info("No configured packages to extract");
        return Ok(());
      }
      extract_all(config, &pairs, &downloader).context("Extract failed")?
    }
  };

  if output.is_json() {
    print_json(&reports)?;
  } else {
    print_reports(&reports);
    print_stat("Destination", &config.dest_dir.display().to_string());
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}

fn print_reports(reports: &[ExtractReport]) {
  for report in reports {
    if !report.extracted {
      print_success(&format!("{}/{} is up to date", report.target, report.package));
      continue;
    }
    print_success(&format!(
      "Extracted {}/{} ({} archive(s))",
      report.target,
      report.package,
      report.archives.len()
    ));
    for name in &report.archives {
      print_change(Change::Added, name);
    }
    for name in &report.redownloaded {
      print_warning(&format!("{} was corrupt in the cache and was downloaded again", name));
    }
  }
}
