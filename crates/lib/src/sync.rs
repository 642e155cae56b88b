//! Bringing a local archive cache in line with a target manifest.
//!
//! # Algorithm
//!
//! 1. Load the previously synced manifest for the package, if any.
//! 2. Hash the local bytes of every previously known archive.
//! 3. For each archive in the target manifest, keep the local file if its
//!    hash already matches; otherwise download it from the record's URL and
//!    verify the fresh bytes.
//! 4. Delete archives that were known before but are no longer wanted.
//! 5. Record the target manifest as the new local manifest.
//!
//! A failure in step 3 aborts before step 5, so the old manifest stays the
//! recorded state and a retry recomputes the same diff.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveError, ArchiveRecord, compute_hash};
use crate::config::Config;
use crate::lock::{CacheLock, LockError, LockMode};
use crate::locations::{self, LocationError, archive_description_file, archive_file, package_file};
use crate::manifest::{ManifestError, PackageManifest};
use crate::transfer::{Downloader, TransferError};
use crate::util::fs::remove_file_if_exists;

/// Errors that can occur while syncing archives.
#[derive(Debug, Error)]
pub enum SyncError {
  /// The archive is not present locally and there is nowhere to get it from.
  #[error("archive '{archive}' of package '{package}' is missing locally and has no URL")]
  MissingUrl { package: String, archive: String },

  /// Freshly downloaded bytes do not hash to the recorded value.
  #[error("hash mismatch for archive '{archive}' downloaded from {url}: expected {expected}, got {actual}")]
  HashMismatch {
    archive: String,
    url: String,
    expected: String,
    actual: String,
  },

  #[error("failed to download archive '{archive}': {source}")]
  Download {
    archive: String,
    #[source]
    source: TransferError,
  },

  #[error("failed to remove stale archive '{path}': {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Location(#[from] LocationError),

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Lock(#[from] LockError),
}

/// What a sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  pub target: String,
  pub package: String,
  /// Archives fetched from their URL.
  pub downloaded: Vec<String>,
  /// Archives already present with the right bytes.
  pub skipped: Vec<String>,
  /// Stale archives deleted from the cache.
  pub removed: Vec<String>,
}

impl SyncReport {
  pub fn is_noop(&self) -> bool {
    self.downloaded.is_empty() && self.removed.is_empty()
  }
}

/// Download `record` to `dest` and check the bytes.
///
/// On a hash mismatch the downloaded file is deleted, so a corrupt file is
/// never left behind under the archive's name.
pub(crate) fn fetch_verified(
  package: &str,
  record: &ArchiveRecord,
  dest: &Path,
  downloader: &dyn Downloader,
) -> Result<(), SyncError> {
  let url = record.url.as_deref().ok_or_else(|| SyncError::MissingUrl {
    package: package.to_string(),
    archive: record.name.clone(),
  })?;

  info!(archive = %record.name, url, "downloading archive");
  downloader.download(url, dest).map_err(|source| SyncError::Download {
    archive: record.name.clone(),
    source,
  })?;

  let actual = compute_hash(dest)?.unwrap_or_default();
  if actual != record.hash {
    if let Err(e) = remove_file_if_exists(dest) {
      warn!(path = %dest.display(), error = %e, "failed to delete corrupt download");
    }
    return Err(SyncError::HashMismatch {
      archive: record.name.clone(),
      url: url.to_string(),
      expected: record.hash.clone(),
      actual,
    });
  }

  debug!(archive = %record.name, hash = %record.hash, "hash verified");
  Ok(())
}

/// Sync one package of one target into the cache at `cache_root`.
///
/// Holds an exclusive lock on `cache_root` for the duration.
pub fn sync_package(
  cache_root: &Path,
  target: &str,
  package: &str,
  target_manifest: &PackageManifest,
  downloader: &dyn Downloader,
) -> Result<SyncReport, SyncError> {
  locations::validate_component("package target", target)?;
  locations::validate_component("package", package)?;
  for name in target_manifest.names() {
    locations::validate_archive_name(name)?;
  }

  let _lock = CacheLock::acquire(cache_root, LockMode::Exclusive, "sync")?;
  sync_package_locked(cache_root, target, package, target_manifest, downloader)
}

fn sync_package_locked(
  cache_root: &Path,
  target: &str,
  package: &str,
  target_manifest: &PackageManifest,
  downloader: &dyn Downloader,
) -> Result<SyncReport, SyncError> {
  let manifest_path = package_file(cache_root, target, package);
  let previous = PackageManifest::load_optional(&manifest_path, true)?.unwrap_or_default();

  let mut previous_hashes: BTreeMap<String, Option<String>> = BTreeMap::new();
  for record in previous.list() {
    let local = archive_file(cache_root, target, package, &record.name);
    previous_hashes.insert(record.name.clone(), compute_hash(&local)?);
  }

  let mut report = SyncReport {
    target: target.to_string(),
    package: package.to_string(),
    ..Default::default()
  };

  for record in target_manifest.list() {
    let local = archive_file(cache_root, target, package, &record.name);

    let known = previous_hashes.remove(&record.name);
    let current = match known {
      Some(hash) => hash,
      // Not in the previous manifest, but the bytes may already be here.
      None => compute_hash(&local)?,
    };

    if record.has_hash() && current.as_deref() == Some(record.hash.as_str()) {
      debug!(archive = %record.name, "archive up to date");
      report.skipped.push(record.name.clone());
      continue;
    }

    fetch_verified(package, record, &local, downloader)?;
    report.downloaded.push(record.name.clone());
  }

  for stale in previous_hashes.into_keys() {
    let local = archive_file(cache_root, target, package, &stale);
    info!(archive = %stale, "removing stale archive");
    remove_file_if_exists(&local).map_err(|source| SyncError::Remove {
      path: local.clone(),
      source,
    })?;
    let description = archive_description_file(&manifest_path, &stale);
    remove_file_if_exists(&description).map_err(|source| SyncError::Remove {
      path: description.clone(),
      source,
    })?;
    report.removed.push(stale);
  }

  target_manifest.save(&manifest_path)?;

  info!(
    target,
    package,
    downloaded = report.downloaded.len(),
    skipped = report.skipped.len(),
    removed = report.removed.len(),
    "package synced"
  );
  Ok(report)
}

/// Sync every `(target, package)` pair under one lock.
pub fn sync_all(
  config: &Config,
  manifests: &BTreeMap<(String, String), PackageManifest>,
  downloader: &dyn Downloader,
) -> Result<Vec<SyncReport>, SyncError> {
  for ((target, package), manifest) in manifests {
    locations::validate_component("package target", target)?;
    locations::validate_component("package", package)?;
    for name in manifest.names() {
      locations::validate_archive_name(name)?;
    }
  }

  let _lock = CacheLock::acquire(&config.cache_dir, LockMode::Exclusive, "sync")?;
  manifests
    .iter()
    .map(|((target, package), manifest)| sync_package_locked(&config.cache_dir, target, package, manifest, downloader))
    .collect()
}
