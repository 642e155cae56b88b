//! Materializing a synced package into a destination tree.
//!
//! The destination for `(target, package)` is `<dest>/<target>/<package>/`,
//! and a copy of the manifest it was built from is kept at
//! `<dest>/.packages/<target>/<package>.json`. When that copy equals the
//! cache's manifest, extraction is skipped entirely. Otherwise the package
//! directory is rebuilt from scratch, archive by archive in name order, so a
//! later archive's files win where two archives overlap.
//!
//! Supported formats:
//! - `.tar`
//! - `.tar.gz` / `.tgz`
//! - `.tar.bz2` / `.tbz2`
//! - `.zip`
//!
//! Any other file is copied into the extraction root as-is.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveError, ArchiveRecord};
use crate::config::Config;
use crate::lock::{CacheLock, LockError, LockMode};
use crate::locations::{self, LocationError, archive_file, dest_package_file, extract_dir, package_file};
use crate::manifest::{ManifestError, ManifestSource, PackageManifest};
use crate::sync::{SyncError, fetch_verified};
use crate::transfer::Downloader;
use crate::util::fs::{remove_dir_if_exists, remove_file_if_exists};

const EXTRACT_TEMP_PREFIX: &str = ".pkgver-extract-";

/// Errors that can occur while extracting a package.
#[derive(Debug, Error)]
pub enum ExtractError {
  #[error("package '{package}' for target '{target}' has not been synced (no manifest at {path})")]
  NotSynced {
    target: String,
    package: String,
    path: PathBuf,
  },

  #[error("failed to unpack archive '{archive}': {message}")]
  Unpack { archive: String, message: String },

  #[error("archive '{archive}' has invalid {field} '{value}': must be a relative path inside the archive")]
  InvalidArchivePath {
    archive: String,
    field: &'static str,
    value: String,
  },

  #[error("extraction directory '{dest}' overlaps the cached package data at '{cache}'")]
  DestinationOverlapsCache { dest: PathBuf, cache: PathBuf },

  #[error("archive '{archive}' has no directory '{tar_src_dir}'")]
  MissingSourceDir { archive: String, tar_src_dir: String },

  #[error("filesystem error at '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Sync(#[from] SyncError),

  #[error(transparent)]
  Location(#[from] LocationError),

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Lock(#[from] LockError),
}

fn io_err(path: &Path) -> impl Fn(io::Error) -> ExtractError + '_ {
  move |source| ExtractError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// What an extraction did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
  pub target: String,
  pub package: String,
  /// `false` when the destination was already up to date.
  pub extracted: bool,
  /// Archives unpacked, in order.
  pub archives: Vec<String>,
  /// Archives that had to be fetched again because the cached copy was bad.
  pub redownloaded: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
  Tar,
  TarGz,
  TarBz2,
  Zip,
  Raw,
}

impl ArchiveFormat {
  fn detect(name: &str) -> Self {
    let name = name.to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
      Self::TarGz
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
      Self::TarBz2
    } else if name.ends_with(".tar") {
      Self::Tar
    } else if name.ends_with(".zip") {
      Self::Zip
    } else {
      Self::Raw
    }
  }
}

/// Unpack `archive_path` into the empty directory `dest`.
fn unpack(record: &ArchiveRecord, archive_path: &Path, dest: &Path) -> Result<(), ExtractError> {
  let unpack_err = |e: &dyn std::fmt::Display| ExtractError::Unpack {
    archive: record.name.clone(),
    message: e.to_string(),
  };

  let format = ArchiveFormat::detect(&record.name);
  debug!(archive = %record.name, ?format, dest = %dest.display(), "unpacking");

  match format {
    ArchiveFormat::Tar | ArchiveFormat::TarGz | ArchiveFormat::TarBz2 => {
      let file = BufReader::new(File::open(archive_path).map_err(io_err(archive_path))?);
      let reader: Box<dyn io::Read> = match format {
        ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(file)),
        ArchiveFormat::TarBz2 => Box::new(bzip2::read::BzDecoder::new(file)),
        _ => Box::new(file),
      };
      let mut archive = tar::Archive::new(reader);
      archive.set_preserve_permissions(true);
      archive.unpack(dest).map_err(|e| unpack_err(&e))?;
    }
    ArchiveFormat::Zip => unpack_zip(record, archive_path, dest)?,
    ArchiveFormat::Raw => {
      let target = dest.join(&record.name);
      fs::copy(archive_path, &target).map_err(io_err(&target))?;
    }
  }

  Ok(())
}

fn unpack_zip(record: &ArchiveRecord, archive_path: &Path, dest: &Path) -> Result<(), ExtractError> {
  let unpack_err = |message: String| ExtractError::Unpack {
    archive: record.name.clone(),
    message,
  };

  let file = File::open(archive_path).map_err(io_err(archive_path))?;
  let mut archive =
    zip::ZipArchive::new(BufReader::new(file)).map_err(|e| unpack_err(format!("failed to open zip: {}", e)))?;

  for i in 0..archive.len() {
    let mut entry = archive
      .by_index(i)
      .map_err(|e| unpack_err(format!("failed to read zip entry: {}", e)))?;

    let path = entry
      .enclosed_name()
      .ok_or_else(|| unpack_err(format!("unsafe zip entry name '{}'", entry.name())))?;
    let dest_path = dest.join(path);

    if entry.is_dir() {
      fs::create_dir_all(&dest_path).map_err(io_err(&dest_path))?;
      continue;
    }

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let mut outfile = File::create(&dest_path).map_err(io_err(&dest_path))?;
    io::copy(&mut entry, &mut outfile).map_err(io_err(&dest_path))?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = entry.unix_mode() {
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode)).map_err(io_err(&dest_path))?;
      }
    }
  }

  Ok(())
}

/// Move everything under `src` into `dst`.
///
/// Directories merge; anything else at the same relative path is replaced.
fn merge_tree(src: &Path, dst: &Path) -> Result<(), ExtractError> {
  fs::create_dir_all(dst).map_err(io_err(dst))?;

  for entry in fs::read_dir(src).map_err(io_err(src))? {
    let entry = entry.map_err(io_err(src))?;
    let from = entry.path();
    let to = dst.join(entry.file_name());
    let is_dir = entry.file_type().map_err(io_err(&from))?.is_dir();

    let existing = fs::symlink_metadata(&to).ok();
    if is_dir {
      if existing.as_ref().is_some_and(|m| !m.is_dir()) {
        remove_file_if_exists(&to).map_err(io_err(&to))?;
      }
      merge_tree(&from, &to)?;
    } else {
      match existing {
        Some(meta) if meta.is_dir() => {
          remove_dir_if_exists(&to).map_err(io_err(&to))?;
        }
        Some(_) => {
          remove_file_if_exists(&to).map_err(io_err(&to))?;
        }
        None => {}
      }
      fs::rename(&from, &to).map_err(io_err(&to))?;
    }
  }

  Ok(())
}

fn check_relative(record: &ArchiveRecord, field: &'static str, value: &str) -> Result<(), ExtractError> {
  if !locations::is_contained_relative(value) {
    return Err(ExtractError::InvalidArchivePath {
      archive: record.name.clone(),
      field,
      value: value.to_string(),
    });
  }
  Ok(())
}

/// Extract one synced package from `cache_root` into `dest_root`.
///
/// Locks the cache (an archive may need re-downloading) and the destination.
/// The two roots must be distinct.
pub fn extract_package(
  cache_root: &Path,
  dest_root: &Path,
  target: &str,
  package: &str,
  downloader: &dyn Downloader,
) -> Result<ExtractReport, ExtractError> {
  locations::validate_component("package target", target)?;
  locations::validate_component("package", package)?;

  let (_cache_lock, _dest_lock) = lock_roots(cache_root, dest_root)?;
  extract_package_locked(cache_root, dest_root, target, package, downloader)
}

fn canonical_or_given(path: &Path) -> PathBuf {
  fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn lock_roots(cache_root: &Path, dest_root: &Path) -> Result<(CacheLock, CacheLock), ExtractError> {
  let cache_lock = CacheLock::acquire(cache_root, LockMode::Exclusive, "extract")?;
  fs::create_dir_all(dest_root).map_err(io_err(dest_root))?;

  let (cache, dest) = (canonical_or_given(cache_root), canonical_or_given(dest_root));
  if cache == dest {
    return Err(ExtractError::DestinationOverlapsCache { dest, cache });
  }
  let dest_lock = CacheLock::acquire(dest_root, LockMode::Exclusive, "extract")?;

  Ok((cache_lock, dest_lock))
}

/// The package's extraction directory is wiped before unpacking, so it must
/// neither contain the cache root nor share any path with the cached archives.
fn check_disjoint(cache_root: &Path, dest_root: &Path, target: &str, package: &str) -> Result<(), ExtractError> {
  let cache = canonical_or_given(cache_root);
  let extracted = extract_dir(&canonical_or_given(dest_root), target, package);
  let archives = locations::archive_dir(&cache, target, package);

  if cache.starts_with(&extracted) || archives.starts_with(&extracted) || extracted.starts_with(&archives) {
    return Err(ExtractError::DestinationOverlapsCache {
      dest: extracted,
      cache: archives,
    });
  }
  Ok(())
}

fn extract_package_locked(
  cache_root: &Path,
  dest_root: &Path,
  target: &str,
  package: &str,
  downloader: &dyn Downloader,
) -> Result<ExtractReport, ExtractError> {
  check_disjoint(cache_root, dest_root, target, package)?;

  let source_path = package_file(cache_root, target, package);
  if !source_path.is_file() {
    return Err(ExtractError::NotSynced {
      target: target.to_string(),
      package: package.to_string(),
      path: source_path,
    });
  }
  let source = PackageManifest::load(ManifestSource::FromPath(source_path), false)?;

  let mut report = ExtractReport {
    target: target.to_string(),
    package: package.to_string(),
    ..Default::default()
  };

  let dest_manifest_path = dest_package_file(dest_root, target, package);
  let package_dir = extract_dir(dest_root, target, package);

  match PackageManifest::load_optional(&dest_manifest_path, false) {
    Ok(Some(existing)) if existing == source && package_dir.is_dir() => {
      info!(target, package, "destination up to date");
      return Ok(report);
    }
    Ok(_) => {}
    Err(e) => warn!(path = %dest_manifest_path.display(), error = %e, "ignoring unreadable destination manifest"),
  }

  for record in source.list() {
    locations::validate_archive_name(&record.name)?;
    check_relative(record, "tar_src_dir", &record.tar_src_dir)?;
    check_relative(record, "extract_dir", &record.extract_dir)?;
  }

  // Forget what was extracted before touching the tree, so a failure below
  // can never leave a manifest describing a half-built directory.
  remove_file_if_exists(&dest_manifest_path).map_err(io_err(&dest_manifest_path))?;
  remove_dir_if_exists(&package_dir).map_err(io_err(&package_dir))?;
  fs::create_dir_all(&package_dir).map_err(io_err(&package_dir))?;

  for record in source.list() {
    let archive_path = archive_file(cache_root, target, package, &record.name);
    if !record.matches_file(&archive_path)? {
      warn!(archive = %record.name, "cached archive missing or corrupt, downloading again");
      fetch_verified(package, record, &archive_path, downloader)?;
      report.redownloaded.push(record.name.clone());
    }

    let scratch = tempfile::Builder::new()
      .prefix(EXTRACT_TEMP_PREFIX)
      .tempdir_in(&package_dir)
      .map_err(io_err(&package_dir))?;

    unpack(record, &archive_path, scratch.path())?;

    let subtree = scratch.path().join(&record.tar_src_dir);
    if !subtree.is_dir() {
      return Err(ExtractError::MissingSourceDir {
        archive: record.name.clone(),
        tar_src_dir: record.tar_src_dir.clone(),
      });
    }
    merge_tree(&subtree, &package_dir.join(&record.extract_dir))?;

    scratch.close().map_err(io_err(&package_dir))?;
    debug!(archive = %record.name, "archive extracted");
    report.archives.push(record.name.clone());
  }

  source.save(&dest_manifest_path)?;
  report.extracted = true;

  info!(target, package, archives = report.archives.len(), "package extracted");
  Ok(report)
}

/// Extract several packages, locking the roots once.
pub fn extract_all(
  config: &Config,
  packages: &[(String, String)],
  downloader: &dyn Downloader,
) -> Result<Vec<ExtractReport>, ExtractError> {
  for (target, package) in packages {
    locations::validate_component("package target", target)?;
    locations::validate_component("package", package)?;
  }

  let (_cache_lock, _dest_lock) = lock_roots(&config.cache_dir, &config.dest_dir)?;
  packages
    .iter()
    .map(|(target, package)| extract_package_locked(&config.cache_dir, &config.dest_dir, target, package, downloader))
    .collect()
}
