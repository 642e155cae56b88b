//! Terminal and JSON output for the pkgver commands.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// What happened to one archive or build step.
#[derive(Debug, Clone, Copy)]
pub enum Change {
  Added,
  Removed,
  Cached,
}

/// Leading part of a hash, enough to tell archives apart at a glance.
pub fn short_hash(hash: &str) -> &str {
  &hash[..hash.len().min(12)]
}

pub fn format_bytes(bytes: u64) -> String {
  let mut value = bytes as f64;
  for unit in ["B", "KB", "MB"] {
    if value < 1024.0 {
      return if unit == "B" {
        format!("{} B", bytes)
      } else {
        format!("{:.1} {}", value, unit)
      };
    }
    value /= 1024.0;
  }
  format!("{:.1} GB", value)
}

pub fn format_duration(duration: Duration) -> String {
  if duration.as_secs() >= 60 {
    format!("{}m {}s", duration.as_secs() / 60, duration.as_secs() % 60)
  } else if duration.as_secs() > 0 {
    format!("{:.2}s", duration.as_secs_f64())
  } else {
    format!("{}ms", duration.as_millis())
  }
}

pub fn print_success(message: &str) {
  println!("{} {}", "✓".if_supports_color(Stream::Stdout, |s| s.green()), message);
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    "✗".if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    "⚠".if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!("{} {}", "•".if_supports_color(Stream::Stdout, |s| s.blue()), message);
}

/// `target/package` heading for the per-package listings.
pub fn print_package(target: &str, package: &str) {
  println!(
    "{} {}/{}",
    "•".if_supports_color(Stream::Stdout, |s| s.blue()),
    target,
    package.if_supports_color(Stream::Stdout, |s| s.bold())
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_change(change: Change, name: &str) {
  let marker = match change {
    Change::Added => format!("{}", "+".if_supports_color(Stream::Stdout, |s| s.green())),
    Change::Removed => format!("{}", "-".if_supports_color(Stream::Stdout, |s| s.red())),
    Change::Cached => format!("{}", "=".if_supports_color(Stream::Stdout, |s| s.dimmed())),
  };
  println!("    {} {}", marker, name);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_hash_keeps_twelve_chars() {
    assert_eq!(short_hash("0123456789abcdef"), "0123456789ab");
    assert_eq!(short_hash("abc"), "abc");
  }

  #[test]
  fn bytes_pick_the_largest_fitting_unit() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(1023), "1023 B");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
  }

  #[test]
  fn durations() {
    assert_eq!(format_duration(Duration::from_millis(40)), "40ms");
    assert_eq!(format_duration(Duration::from_millis(2250)), "2.25s");
    assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
  }
}
