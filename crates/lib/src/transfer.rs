//! Moving archive bytes between the local cache and a remote store.
//!
//! The sync and extract code only sees the [`Downloader`] and [`Uploader`]
//! traits. Two implementations ship here:
//!
//! - [`LocalStore`]: a directory acting as the remote store, addressed with
//!   `file://` URLs. Useful for mirrors on shared filesystems and for tests.
//! - [`HttpDownloader`]: blocking HTTP(S) GET.
//!
//! [`AnyDownloader`] picks between them by URL scheme.
//!
//! Downloads are written to `<dest>.part` and renamed into place, so an
//! interrupted transfer never leaves a truncated file under the final name.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::PARTIAL_SUFFIX;

/// Errors that can occur while transferring bytes.
#[derive(Debug, Error)]
pub enum TransferError {
  #[error("failed to fetch '{url}': {message}")]
  FetchFailed { url: String, message: String },

  #[error("unsupported URL scheme: {0}")]
  UnsupportedScheme(String),

  #[error("failed to upload '{path}' to '{key}': {source}")]
  UploadFailed {
    path: PathBuf,
    key: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to write '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Fetches bytes from a URL into a local file.
pub trait Downloader {
  /// Download `url` to `dest`, creating parent directories as needed.
  fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError>;
}

/// Makes local bytes available under a remote key.
pub trait Uploader {
  /// Upload `path` under `key` and return a URL it can be fetched from.
  fn upload(&self, path: &Path, key: &str) -> Result<String, TransferError>;
}

impl<T: Downloader + ?Sized> Downloader for &T {
  fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
    (**self).download(url, dest)
  }
}

impl<T: Uploader + ?Sized> Uploader for &T {
  fn upload(&self, path: &Path, key: &str) -> Result<String, TransferError> {
    (**self).upload(path, key)
  }
}

fn partial_path(dest: &Path) -> PathBuf {
  let mut name = dest.file_name().unwrap_or_default().to_os_string();
  name.push(PARTIAL_SUFFIX);
  dest.with_file_name(name)
}

fn prepare_parent(dest: &Path) -> Result<(), TransferError> {
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).map_err(|source| TransferError::Write {
      path: parent.to_path_buf(),
      source,
    })?;
  }
  Ok(())
}

/// Copy `reader` into `dest` via a `.part` file.
fn write_via_partial(dest: &Path, reader: &mut impl io::Read) -> Result<u64, TransferError> {
  prepare_parent(dest)?;
  let partial = partial_path(dest);
  let write_err = |source| TransferError::Write {
    path: partial.clone(),
    source,
  };

  let written = {
    let mut file = File::create(&partial).map_err(write_err)?;
    let written = io::copy(reader, &mut file).map_err(write_err)?;
    file.flush().map_err(write_err)?;
    written
  };

  fs::rename(&partial, dest).map_err(|source| TransferError::Write {
    path: dest.to_path_buf(),
    source,
  })?;
  Ok(written)
}

/// Convert a `file://` URL (or a bare path) into a filesystem path.
pub fn file_url_to_path(url: &str) -> Option<PathBuf> {
  if let Some(rest) = url.strip_prefix("file://") {
    // file:///C:/x on Windows
    #[cfg(windows)]
    let rest = rest.strip_prefix('/').filter(|r| r.as_bytes().get(1) == Some(&b':')).unwrap_or(rest);
    return Some(PathBuf::from(rest));
  }
  if url.contains("://") {
    return None;
  }
  Some(PathBuf::from(url))
}

/// Convert an absolute path into a `file://` URL.
pub fn path_to_file_url(path: &Path) -> String {
  let display = path.to_string_lossy().replace('\\', "/");
  if display.starts_with('/') {
    format!("file://{}", display)
  } else {
    format!("file:///{}", display)
  }
}

/// A directory used as the remote store.
#[derive(Debug, Clone)]
pub struct LocalStore {
  root: PathBuf,
}

impl LocalStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Filesystem path of a remote key.
  pub fn key_path(&self, key: &str) -> PathBuf {
    key.split('/').fold(self.root.clone(), |path, part| path.join(part))
  }

  /// URL under which a key is served.
  pub fn key_url(&self, key: &str) -> String {
    path_to_file_url(&self.key_path(key))
  }
}

impl Downloader for LocalStore {
  fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
    LocalDownloader.download(url, dest)
  }
}

impl Uploader for LocalStore {
  fn upload(&self, path: &Path, key: &str) -> Result<String, TransferError> {
    let upload_err = |source| TransferError::UploadFailed {
      path: path.to_path_buf(),
      key: key.to_string(),
      source,
    };

    let mut source = File::open(path).map_err(upload_err)?;
    let target = self.key_path(key);
    write_via_partial(&target, &mut source)?;

    info!(key, path = %path.display(), "uploaded");
    Ok(self.key_url(key))
  }
}

/// Copies `file://` URLs and plain paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDownloader;

impl Downloader for LocalDownloader {
  fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
    let source_path = file_url_to_path(url).ok_or_else(|| TransferError::UnsupportedScheme(url.to_string()))?;
    let mut source = File::open(&source_path).map_err(|e| TransferError::FetchFailed {
      url: url.to_string(),
      message: e.to_string(),
    })?;

    let size = write_via_partial(dest, &mut source)?;
    debug!(url, dest = %dest.display(), size, "copied");
    Ok(())
  }
}

/// Blocking HTTP(S) downloader.
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
  client: reqwest::blocking::Client,
}

impl HttpDownloader {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Downloader for HttpDownloader {
  fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
    info!(url = %url, "fetching URL");

    let fetch_err = |message: String| TransferError::FetchFailed {
      url: url.to_string(),
      message,
    };

    let mut response = self.client.get(url).send().map_err(|e| fetch_err(e.to_string()))?;

    if !response.status().is_success() {
      return Err(fetch_err(format!("HTTP {}", response.status())));
    }

    let size = write_via_partial(dest, &mut response)?;
    info!(path = %dest.display(), size, "download complete");
    Ok(())
  }
}

/// Dispatches on the URL scheme: `http(s)://` over the network, everything
/// else through the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct AnyDownloader {
  http: HttpDownloader,
}

impl AnyDownloader {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Downloader for AnyDownloader {
  fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
    if url.starts_with("http://") || url.starts_with("https://") {
      self.http.download(url, dest)
    } else {
      LocalDownloader.download(url, dest)
    }
  }
}
