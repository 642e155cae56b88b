//! Archive records: one content-addressed archive and its extraction hints.
//!
//! A record is only a claim about some bytes. Consumers never trust the
//! recorded hash on its own; they re-hash the local file with
//! [`compute_hash`] and compare before using it.
//!
//! # Description file format
//!
//! ```json
//! {
//!   "name": "gcc.tgz",
//!   "hash": "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
//!   "url": "https://storage.example.com/archives/b94d.../gcc.tgz",
//!   "tar_src_dir": "gcc",
//!   "extract_dir": ""
//! }
//! ```
//!
//! `url` is omitted when unknown, and the two directory hints default to the
//! empty string (archive root / destination root).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::fs::write_atomic;
use crate::util::hash::{HashError, hash_file};

/// Errors that can occur when reading, writing or hashing archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
  /// Hashing local bytes failed for a reason other than absence.
  #[error("failed to hash '{path}': {source}")]
  Hash {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// An archive file that must exist is missing.
  #[error("archive file not found: {0}")]
  NotFound(PathBuf),

  /// The archive path has no usable file name.
  #[error("archive path has no file name: {0}")]
  NoFileName(PathBuf),

  /// Failed to read a description file.
  #[error("failed to read archive description '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Failed to write a description file.
  #[error("failed to write archive description '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The description file is not valid JSON or lacks required fields.
  #[error("invalid archive description '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// Compute the content hash of a local file.
///
/// Returns `Ok(None)` when `path` does not exist or is not a regular file, so
/// callers can treat "absent" uniformly. Any other I/O failure is an error.
pub fn compute_hash(path: &Path) -> Result<Option<String>, ArchiveError> {
  match fs::metadata(path) {
    Ok(meta) if meta.is_file() => {}
    Ok(_) => return Ok(None),
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(ArchiveError::Hash {
        path: path.to_path_buf(),
        source,
      });
    }
  }

  match hash_file(path) {
    Ok(hash) => Ok(Some(hash)),
    Err(HashError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(HashError::Read { source, .. }) => Err(ArchiveError::Hash {
      path: path.to_path_buf(),
      source,
    }),
    Err(e @ HashError::WalkDir { .. }) => Err(ArchiveError::Hash {
      path: path.to_path_buf(),
      source: io::Error::other(e),
    }),
  }
}

/// Description of one content-addressed archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArchiveRecord {
  /// Archive file name, unique within a manifest.
  pub name: String,
  /// Lowercase hex SHA-256 of the archive bytes. Empty means unknown.
  pub hash: String,
  /// Where the bytes can be downloaded from.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  /// Directory inside the archive to treat as its root.
  #[serde(default)]
  pub tar_src_dir: String,
  /// Directory under the destination to extract into.
  #[serde(default)]
  pub extract_dir: String,
}

impl ArchiveRecord {
  pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      hash: hash.into(),
      url: None,
      tar_src_dir: String::new(),
      extract_dir: String::new(),
    }
  }

  /// A placeholder for an archive whose description is missing locally.
  ///
  /// It carries no hash, so it never matches local bytes and forces a resync.
  pub fn stub(name: impl Into<String>) -> Self {
    Self::new(name, "")
  }

  /// Author a record from a local archive file.
  pub fn from_file(path: &Path) -> Result<Self, ArchiveError> {
    let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| ArchiveError::NoFileName(path.to_path_buf()))?;
    let hash = compute_hash(path)?.ok_or_else(|| ArchiveError::NotFound(path.to_path_buf()))?;
    Ok(Self::new(name, hash))
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.url = Some(url.into());
    self
  }

  pub fn without_url(mut self) -> Self {
    self.url = None;
    self
  }

  pub fn with_tar_src_dir(mut self, dir: impl Into<String>) -> Self {
    self.tar_src_dir = dir.into();
    self
  }

  pub fn with_extract_dir(mut self, dir: impl Into<String>) -> Self {
    self.extract_dir = dir.into();
    self
  }

  /// Whether the hash is known.
  pub fn has_hash(&self) -> bool {
    !self.hash.is_empty()
  }

  /// Whether the file at `path` holds exactly the bytes this record describes.
  pub fn matches_file(&self, path: &Path) -> Result<bool, ArchiveError> {
    if !self.has_hash() {
      return Ok(false);
    }
    Ok(compute_hash(path)?.as_deref() == Some(self.hash.as_str()))
  }

  /// Parse a record from a JSON value.
  pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
    serde_json::from_value(value)
  }

  pub fn to_json(&self) -> serde_json::Value {
    // Serializing plain strings into a Value cannot fail.
    serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
  }

  /// Load a description file.
  pub fn load(path: &Path) -> Result<Self, ArchiveError> {
    let content = fs::read_to_string(path).map_err(|source| ArchiveError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ArchiveError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Write a description file atomically.
  pub fn save(&self, path: &Path) -> Result<(), ArchiveError> {
    let write_err = |source| ArchiveError::Write {
      path: path.to_path_buf(),
      source,
    };
    let content = serde_json::to_string_pretty(self).map_err(|e| write_err(io::Error::other(e)))?;
    write_atomic(path, content.as_bytes()).map_err(write_err)
  }
}
