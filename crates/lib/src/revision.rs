//! Revision files: the pinned archive list of one package across all targets.
//!
//! Checkouts keep one revision file per package, which is what `sync` reads to
//! decide what every target's cache should contain.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "package": "gcc",
//!   "revision": 1042,
//!   "revision_hash": "5f0c...",
//!   "targets": {
//!     "linux_x86_64": [ { "name": "gcc.tgz", "hash": "...", "url": "..." } ]
//!   }
//! }
//! ```
//!
//! `revision_hash` is the SHA-256 of the canonical JSON of `targets`. It is
//! refreshed on save and checked on load, which catches hand edits that
//! forgot to go through the tool.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::archive::ArchiveRecord;
use crate::config::Config;
use crate::consts::REVISION_VERSION;
use crate::locations::{self, LocationError, remote_description_key, remote_package_key, revision_file};
use crate::manifest::{ManifestError, ManifestSource, PackageManifest};
use crate::transfer::{Downloader, TransferError};
use crate::util::fs::write_atomic;
use crate::util::hash::hash_bytes;

#[derive(Debug, Error)]
pub enum RevisionError {
  #[error("failed to read revision file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write revision file '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid revision file '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported revision file version {0}, expected {REVISION_VERSION}")]
  UnsupportedVersion(u32),

  #[error("revision file '{path}' was modified by hand: expected hash {expected}, computed {actual}")]
  RevisionHashMismatch {
    path: PathBuf,
    expected: String,
    actual: String,
  },

  #[error("package '{package}' has no archives for target '{target}' at revision {revision}")]
  UnknownTarget {
    package: String,
    target: String,
    revision: u64,
  },

  #[error("failed to fetch remote manifest: {0}")]
  Transfer(#[from] TransferError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Location(#[from] LocationError),
}

/// The archives of one package, pinned at one revision, for every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionFile {
  pub version: u32,
  pub package: String,
  pub revision: u64,
  #[serde(default)]
  pub revision_hash: String,
  pub targets: BTreeMap<String, Vec<ArchiveRecord>>,
}

impl RevisionFile {
  pub fn new(package: impl Into<String>, revision: u64) -> Self {
    Self {
      version: REVISION_VERSION,
      package: package.into(),
      revision,
      revision_hash: String::new(),
      targets: BTreeMap::new(),
    }
  }

  /// Pin `manifest` as the archive set for `target`.
  pub fn set_target(&mut self, target: impl Into<String>, manifest: &PackageManifest) {
    self.targets.insert(target.into(), manifest.list().cloned().collect());
  }

  pub fn target_names(&self) -> impl Iterator<Item = &str> {
    self.targets.keys().map(String::as_str)
  }

  /// The manifest pinned for `target`.
  pub fn manifest_for(&self, target: &str) -> Result<PackageManifest, RevisionError> {
    let records = self.targets.get(target).ok_or_else(|| RevisionError::UnknownTarget {
      package: self.package.clone(),
      target: target.to_string(),
      revision: self.revision,
    })?;
    Ok(PackageManifest::load(
      ManifestSource::FromRecords(records.clone()),
      false,
    )?)
  }

  /// Hash over the canonical JSON of the pinned targets.
  pub fn compute_hash(&self) -> String {
    // BTreeMap keys and name-sorted records make this canonical.
    let canonical = serde_json::to_string(&self.targets).unwrap_or_default();
    hash_bytes(canonical.as_bytes())
  }

  pub fn load(path: &Path) -> Result<Self, RevisionError> {
    let content = fs::read_to_string(path).map_err(|source| RevisionError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let file: RevisionFile = serde_json::from_str(&content).map_err(|source| RevisionError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    if file.version != REVISION_VERSION {
      return Err(RevisionError::UnsupportedVersion(file.version));
    }

    let actual = file.compute_hash();
    if actual != file.revision_hash {
      return Err(RevisionError::RevisionHashMismatch {
        path: path.to_path_buf(),
        expected: file.revision_hash,
        actual,
      });
    }

    Ok(file)
  }

  /// Save with a freshly computed `revision_hash`.
  pub fn save(&mut self, path: &Path) -> Result<(), RevisionError> {
    self.revision_hash = self.compute_hash();

    let write_err = |source| RevisionError::Write {
      path: path.to_path_buf(),
      source,
    };
    let content = serde_json::to_string_pretty(self).map_err(|e| write_err(io::Error::other(e)))?;
    write_atomic(path, content.as_bytes()).map_err(write_err)
  }
}

/// Join a remote key onto a base URL.
pub fn remote_url(base_url: &str, key: &str) -> String {
  format!("{}/{}", base_url.trim_end_matches('/'), key)
}

/// Fetch the published manifest of `package` at `revision` for each target
/// and pin them all in the package's revision file.
pub fn set_revision(
  revisions_dir: &Path,
  package: &str,
  revision: u64,
  targets: &[String],
  remote_base_url: &str,
  downloader: &dyn Downloader,
) -> Result<RevisionFile, RevisionError> {
  locations::validate_component("package", package)?;

  let scratch = tempfile::tempdir().map_err(|source| RevisionError::Write {
    path: std::env::temp_dir(),
    source,
  })?;

  let mut file = RevisionFile::new(package, revision);
  for target in targets {
    locations::validate_component("package target", target)?;

    let key = remote_package_key(revision, target, package);
    let local = locations::package_file(scratch.path(), target, package);
    downloader.download(&remote_url(remote_base_url, &key), &local)?;

    let names = PackageManifest::read_names(&local)?;
    for name in &names {
      locations::validate_archive_name(name)?;
      let description = locations::archive_description_file(&local, name);
      downloader.download(
        &remote_url(remote_base_url, &remote_description_key(&key, name)),
        &description,
      )?;
    }

    let manifest = PackageManifest::load(ManifestSource::FromPath(local), false)?;
    info!(package, target = %target, revision, archives = manifest.len(), "pinned target");
    file.set_target(target.as_str(), &manifest);
  }

  file.save(&revision_file(revisions_dir, package))?;
  Ok(file)
}

/// Target manifests for every configured `(target, package)` pair, read from
/// the revision files.
///
/// `only_target` restricts the result to one target.
pub fn configured_manifests(
  config: &Config,
  only_target: Option<&str>,
) -> Result<BTreeMap<(String, String), PackageManifest>, RevisionError> {
  let mut manifests = BTreeMap::new();
  let mut loaded: BTreeMap<String, RevisionFile> = BTreeMap::new();

  for (target, packages) in &config.packages {
    if only_target.is_some_and(|only| only != target) {
      continue;
    }
    for package in packages {
      if !loaded.contains_key(package) {
        let file = RevisionFile::load(&revision_file(&config.revisions_dir, package))?;
        loaded.insert(package.clone(), file);
      }
      let manifest = loaded[package].manifest_for(target)?;
      manifests.insert((target.clone(), package.clone()), manifest);
    }
  }

  Ok(manifests)
}
