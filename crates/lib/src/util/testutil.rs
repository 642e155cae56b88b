//! Test utilities for pkgver-lib.
//!
//! Provides an in-memory downloader that records every call, and helpers for
//! building small tar/zip archives on the fly.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::archive::ArchiveRecord;
use crate::transfer::{Downloader, TransferError};
use crate::util::hash::hash_bytes;

/// Serves registered URLs from memory and counts downloads.
#[derive(Default)]
pub struct MockDownloader {
  content: HashMap<String, Vec<u8>>,
  calls: RefCell<Vec<String>>,
}

impl MockDownloader {
  pub fn new() -> Self {
    Self::default()
  }

  /// Serve `bytes` at `url`.
  pub fn serve(&mut self, url: &str, bytes: impl Into<Vec<u8>>) {
    self.content.insert(url.to_string(), bytes.into());
  }

  /// Serve `bytes` at `http://mock/<name>` and return a matching record.
  pub fn publish(&mut self, name: &str, bytes: impl Into<Vec<u8>>) -> ArchiveRecord {
    let bytes = bytes.into();
    let url = format!("http://mock/{}", name);
    let record = ArchiveRecord::new(name, hash_bytes(&bytes)).with_url(&url);
    self.serve(&url, bytes);
    record
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.borrow().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.borrow().len()
  }
}

impl Downloader for MockDownloader {
  fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
    self.calls.borrow_mut().push(url.to_string());
    let bytes = self.content.get(url).ok_or_else(|| TransferError::FetchFailed {
      url: url.to_string(),
      message: "HTTP 404".to_string(),
    })?;
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(dest, bytes).unwrap();
    Ok(())
  }
}

/// Build an uncompressed tar holding `files` (relative path, contents).
pub fn tar_bytes(files: &[(&str, &str)]) -> Vec<u8> {
  let mut builder = tar::Builder::new(Vec::new());
  for (path, contents) in files {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, contents.as_bytes()).unwrap();
  }
  builder.into_inner().unwrap()
}

/// Build a gzip-compressed tar holding `files`.
pub fn tar_gz_bytes(files: &[(&str, &str)]) -> Vec<u8> {
  let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
  encoder.write_all(&tar_bytes(files)).unwrap();
  encoder.finish().unwrap()
}

/// Build a zip holding `files`.
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
  let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
  for (path, contents) in files {
    writer
      .start_file(*path, zip::write::SimpleFileOptions::default())
      .unwrap();
    writer.write_all(contents.as_bytes()).unwrap();
  }
  writer.finish().unwrap().into_inner()
}
