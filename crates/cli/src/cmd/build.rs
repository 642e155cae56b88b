//! Implementation of the `pkgver build` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use pkgver_lib::build::{BuildGraph, BuildPlan, BuildRunner};

use crate::output::{Change, OutputFormat, format_duration, print_change, print_json, print_stat, print_success};

pub fn cmd_build(plan: &Path, work_dir: &Path, output: OutputFormat) -> Result<()> {
  let start = Instant::now();

  let plan = BuildPlan::load(plan).context("Failed to load build plan")?;
  let graph = BuildGraph::new(plan.packages).context("Invalid build plan")?;
  let report = BuildRunner::new(work_dir).run(&graph).context("Build failed")?;

  if output.is_json() {
    print_json(&report)?;
  } else {
    print_success(&format!(
      "Build complete: {} built, {} cached",
      report.ran.len(),
      report.cached.len()
    ));
    for name in &report.ran {
      print_change(Change::Added, name);
    }
    for name in &report.cached {
      print_change(Change::Cached, name);
    }
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
