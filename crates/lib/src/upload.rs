//! Publishing a locally authored package to a remote store.
//!
//! Archives are stored under content-addressed keys
//! (`archives/<hash>/<name>`), so re-uploading an unchanged archive for a new
//! revision is harmless. The manifest itself goes under a revision-addressed
//! key (`builds/<revision>/<target>/<package>.json`) together with its
//! description files.
//!
//! Before anything is published, [`add_archives`] authors the local copy: the
//! archive files land in the cache and the package's manifest records them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::archive::ArchiveError;
use crate::lock::{CacheLock, LockError, LockMode};
use crate::locations::{
  self, LocationError, archive_description_file, archive_file, package_file, remote_archive_key,
  remote_description_key, remote_package_key,
};
use crate::manifest::{ManifestError, ManifestSource, PackageManifest};
use crate::transfer::{TransferError, Uploader};

#[derive(Debug, Error)]
pub enum UploadError {
  #[error("package '{package}' for target '{target}' has no local manifest")]
  NoLocalPackage { target: String, package: String },

  #[error("local archive '{0}' is missing or does not match its recorded hash")]
  CorruptLocalArchive(String),

  #[error("failed to copy '{path}' into the cache: {source}")]
  Copy {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Transfer(#[from] TransferError),

  #[error(transparent)]
  Location(#[from] LocationError),

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Lock(#[from] LockError),
}

/// Result of publishing a package.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
  /// The manifest with every record's URL pointing at the remote copy.
  pub manifest: PackageManifest,
  /// Remote key of the uploaded manifest.
  pub manifest_key: String,
  /// URL of the uploaded manifest.
  pub manifest_url: String,
}

/// Copy archive files into the cache and record them in the package's local
/// manifest.
///
/// Archives already recorded under the same name are replaced; the others are
/// kept. Returns the updated manifest.
pub fn add_archives(
  cache_root: &Path,
  target: &str,
  package: &str,
  files: &[PathBuf],
  url_prefix: Option<&str>,
  tar_src_dir: &str,
  extract_dir: &str,
) -> Result<PackageManifest, UploadError> {
  locations::validate_component("package target", target)?;
  locations::validate_component("package", package)?;

  let _lock = CacheLock::acquire(cache_root, LockMode::Exclusive, "archive")?;

  let dir = locations::archive_dir(cache_root, target, package);
  fs::create_dir_all(&dir).map_err(|source| UploadError::Copy {
    path: dir.clone(),
    source,
  })?;

  let mut copied = Vec::with_capacity(files.len());
  for file in files {
    let name = file
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| ArchiveError::NoFileName(file.clone()))?;
    locations::validate_archive_name(name)?;
    let dest = dir.join(name);
    if fs::canonicalize(file).ok() != fs::canonicalize(&dest).ok() {
      fs::copy(file, &dest).map_err(|source| UploadError::Copy {
        path: file.clone(),
        source,
      })?;
    }
    copied.push(dest);
  }

  let added = PackageManifest::from_archive_files(&copied, url_prefix, tar_src_dir, extract_dir)?;

  let manifest_path = package_file(cache_root, target, package);
  let mut manifest = PackageManifest::load_optional(&manifest_path, false)?.unwrap_or_default();
  for record in added {
    info!(archive = %record.name, hash = %record.hash, "archive added");
    manifest.upsert(record);
  }
  manifest.save(&manifest_path)?;

  Ok(manifest)
}

/// Upload every archive of a cached package, then its manifest.
///
/// The local manifest is rewritten with the returned URLs, so a later sync of
/// the same manifest elsewhere can fetch the bytes.
pub fn upload_package(
  cache_root: &Path,
  target: &str,
  package: &str,
  revision: u64,
  uploader: &dyn Uploader,
) -> Result<UploadOutcome, UploadError> {
  locations::validate_component("package target", target)?;
  locations::validate_component("package", package)?;

  let _lock = CacheLock::acquire(cache_root, LockMode::Exclusive, "upload")?;

  let manifest_path = package_file(cache_root, target, package);
  if !manifest_path.is_file() {
    return Err(UploadError::NoLocalPackage {
      target: target.to_string(),
      package: package.to_string(),
    });
  }
  let local = PackageManifest::load(ManifestSource::FromPath(manifest_path.clone()), false)?;

  let mut published = PackageManifest::new();
  for record in local {
    locations::validate_archive_name(&record.name)?;
    let path = archive_file(cache_root, target, package, &record.name);
    if !record.matches_file(&path)? {
      return Err(UploadError::CorruptLocalArchive(record.name));
    }

    let key = remote_archive_key(&record.name, &record.hash);
    let url = uploader.upload(&path, &key)?;
    info!(archive = %record.name, %url, "archive uploaded");
    published.append(record.with_url(url))?;
  }

  published.save(&manifest_path)?;

  let manifest_key = remote_package_key(revision, target, package);
  for record in published.list() {
    let description = archive_description_file(&manifest_path, &record.name);
    uploader.upload(&description, &remote_description_key(&manifest_key, &record.name))?;
  }
  let manifest_url = uploader.upload(&manifest_path, &manifest_key)?;
  info!(target, package, revision, %manifest_url, "package uploaded");

  Ok(UploadOutcome {
    manifest: published,
    manifest_key,
    manifest_url,
  })
}
