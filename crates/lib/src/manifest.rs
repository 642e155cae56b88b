//! Package manifests: the set of archives making up one package.
//!
//! A manifest is persisted as two kinds of files:
//!
//! ```text
//! <dir>/<package>.json            # ["a.tar", "b.tgz"]  (sorted names)
//! <dir>/<package>/a.tar.json      # full ArchiveRecord
//! <dir>/<package>/b.tgz.json
//! ```
//!
//! The root file is the trust anchor for "this package was synced", so it is
//! written last and atomically, after every description file is on disk.
//!
//! Records are kept in a [`BTreeMap`] keyed by name, which gives both the
//! uniqueness invariant and the canonical sorted order used for output.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::archive::{ArchiveError, ArchiveRecord};
use crate::consts::JSON_EXT;
use crate::locations::{archive_description_file, description_dir};
use crate::util::fs::write_atomic;

/// Errors that can occur when loading or saving manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write manifest '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid manifest '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("manifest references missing archive description '{archive}' (expected at {path})")]
  MissingArchiveDescription { archive: String, path: PathBuf },

  #[error("archive '{0}' appears more than once in manifest")]
  DuplicateArchive(String),

  #[error("archive description for '{expected}' names a different archive '{found}'")]
  NameMismatch { expected: String, found: String },

  #[error(transparent)]
  Archive(#[from] ArchiveError),
}

/// Where to load a manifest from.
#[derive(Debug, Clone)]
pub enum ManifestSource {
  /// A root manifest file with sibling per-archive descriptions.
  FromPath(PathBuf),
  /// Records that were already parsed elsewhere.
  FromRecords(Vec<ArchiveRecord>),
}

/// On-disk shape of a root manifest file.
///
/// Older producers wrote an object carrying a format version; both forms are
/// read, only the plain list is written.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RootFile {
  Names(Vec<String>),
  Versioned {
    #[allow(dead_code)]
    #[serde(default)]
    version: Option<u32>,
    archives: Vec<String>,
  },
}

impl RootFile {
  fn into_names(self) -> Vec<String> {
    match self {
      RootFile::Names(names) => names,
      RootFile::Versioned { archives, .. } => archives,
    }
  }
}

/// The set of archives making up a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
  archives: BTreeMap<String, ArchiveRecord>,
}

impl PackageManifest {
  pub fn new() -> Self {
    Self::default()
  }

  /// Load a manifest.
  ///
  /// With `skip_missing`, an archive listed in the root file whose description
  /// file is absent becomes an [`ArchiveRecord::stub`] instead of an error.
  pub fn load(source: ManifestSource, skip_missing: bool) -> Result<Self, ManifestError> {
    match source {
      ManifestSource::FromRecords(records) => Self::from_records(records),
      ManifestSource::FromPath(path) => Self::load_file(&path, skip_missing),
    }
  }

  /// Load a manifest file, returning `Ok(None)` if the root file does not exist.
  pub fn load_optional(path: &Path, skip_missing: bool) -> Result<Option<Self>, ManifestError> {
    if !path.is_file() {
      return Ok(None);
    }
    Self::load_file(path, skip_missing).map(Some)
  }

  /// Archive names listed by the root manifest file at `path`, in either
  /// on-disk form, without reading any description.
  pub fn read_names(path: &Path) -> Result<Vec<String>, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let root: RootFile = serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(root.into_names())
  }

  fn load_file(path: &Path, skip_missing: bool) -> Result<Self, ManifestError> {
    let mut manifest = Self::new();
    for name in Self::read_names(path)? {
      let description = archive_description_file(path, &name);
      let record = if description.is_file() {
        let record = ArchiveRecord::load(&description)?;
        if record.name != name {
          return Err(ManifestError::NameMismatch {
            expected: name,
            found: record.name,
          });
        }
        record
      } else if skip_missing {
        warn!(archive = %name, path = %description.display(), "archive description missing, using stub");
        ArchiveRecord::stub(name)
      } else {
        return Err(ManifestError::MissingArchiveDescription {
          archive: name,
          path: description,
        });
      };
      manifest.append(record)?;
    }

    debug!(path = %path.display(), archives = manifest.len(), "loaded manifest");
    Ok(manifest)
  }

  /// Build a manifest from already-parsed records.
  pub fn from_records(records: impl IntoIterator<Item = ArchiveRecord>) -> Result<Self, ManifestError> {
    let mut manifest = Self::new();
    for record in records {
      manifest.append(record)?;
    }
    Ok(manifest)
  }

  /// Author a manifest from local archive files, applying the same URL and
  /// extraction hints to each.
  pub fn from_archive_files(
    paths: &[PathBuf],
    url_prefix: Option<&str>,
    tar_src_dir: &str,
    extract_dir: &str,
  ) -> Result<Self, ManifestError> {
    let mut manifest = Self::new();
    for path in paths {
      let mut record = ArchiveRecord::from_file(path)?
        .with_tar_src_dir(tar_src_dir)
        .with_extract_dir(extract_dir);
      if let Some(prefix) = url_prefix {
        let url = format!("{}/{}", prefix.trim_end_matches('/'), record.name);
        record = record.with_url(url);
      }
      manifest.append(record)?;
    }
    Ok(manifest)
  }

  /// Scan a directory's regular files into records without URLs.
  ///
  /// Description files (`*.json`) are skipped, so an archive directory of the
  /// local cache can be rescanned in place.
  pub fn from_directory(dir: &Path) -> Result<Self, ManifestError> {
    let read_err = |source| ManifestError::Read {
      path: dir.to_path_buf(),
      source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
      let entry = entry.map_err(read_err)?;
      let path = entry.path();
      let is_description = path.extension().is_some_and(|ext| ext == JSON_EXT);
      if entry.file_type().map_err(read_err)?.is_file() && !is_description {
        paths.push(path);
      }
    }
    paths.sort();

    Self::from_archive_files(&paths, None, "", "")
  }

  /// Persist the manifest.
  ///
  /// Description files go into `<dirname>/<stem>/`; the root file is written
  /// atomically once they all exist.
  pub fn save(&self, destination: &Path) -> Result<(), ManifestError> {
    let dir = description_dir(destination);
    fs::create_dir_all(&dir).map_err(|source| ManifestError::Write {
      path: dir.clone(),
      source,
    })?;

    for record in self.archives.values() {
      record.save(&archive_description_file(destination, &record.name))?;
    }

    let names: Vec<&str> = self.archives.keys().map(String::as_str).collect();
    let write_err = |source| ManifestError::Write {
      path: destination.to_path_buf(),
      source,
    };
    let content = serde_json::to_string_pretty(&names).map_err(|e| write_err(io::Error::other(e)))?;
    write_atomic(destination, content.as_bytes()).map_err(write_err)?;

    debug!(path = %destination.display(), archives = self.len(), "saved manifest");
    Ok(())
  }

  /// Add a record. Names must be unique.
  pub fn append(&mut self, record: ArchiveRecord) -> Result<(), ManifestError> {
    if self.archives.contains_key(&record.name) {
      return Err(ManifestError::DuplicateArchive(record.name));
    }
    self.archives.insert(record.name.clone(), record);
    Ok(())
  }

  /// Insert or replace a record.
  pub fn upsert(&mut self, record: ArchiveRecord) {
    self.archives.insert(record.name.clone(), record);
  }

  pub fn remove(&mut self, name: &str) -> Option<ArchiveRecord> {
    self.archives.remove(name)
  }

  pub fn clear(&mut self) {
    self.archives.clear();
  }

  pub fn get(&self, name: &str) -> Option<&ArchiveRecord> {
    self.archives.get(name)
  }

  /// Records sorted by name.
  pub fn list(&self) -> impl Iterator<Item = &ArchiveRecord> {
    self.archives.values()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.archives.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.archives.len()
  }

  pub fn is_empty(&self) -> bool {
    self.archives.is_empty()
  }
}

fn read_err_at(path: &Path) -> impl Fn(io::Error) -> ManifestError + '_ {
  move |source| ManifestError::Read {
    path: path.to_path_buf(),
    source,
  }
}

/// Every `(target, package)` with a root manifest under `root`, sorted.
///
/// Dot-prefixed entries (lock files, `.packages`) are not targets.
pub fn list_packages(root: &Path) -> Result<Vec<(String, String)>, ManifestError> {
  let mut found = Vec::new();
  let entries = match fs::read_dir(root) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
    Err(e) => return Err(read_err_at(root)(e)),
  };

  for entry in entries {
    let entry = entry.map_err(read_err_at(root))?;
    let Some(target) = entry.file_name().to_str().map(str::to_string) else {
      continue;
    };
    if target.starts_with('.') || !entry.file_type().map_err(read_err_at(root))?.is_dir() {
      continue;
    }

    let target_dir = entry.path();
    for file in fs::read_dir(&target_dir).map_err(read_err_at(&target_dir))? {
      let path = file.map_err(read_err_at(&target_dir))?.path();
      if !path.is_file() || path.extension().is_none_or(|ext| ext != JSON_EXT) {
        continue;
      }
      if let Some(package) = path.file_stem().and_then(|s| s.to_str()) {
        found.push((target.clone(), package.to_string()));
      }
    }
  }

  found.sort();
  Ok(found)
}

impl IntoIterator for PackageManifest {
  type Item = ArchiveRecord;
  type IntoIter = std::collections::btree_map::IntoValues<String, ArchiveRecord>;

  fn into_iter(self) -> Self::IntoIter {
    self.archives.into_values()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn sample() -> PackageManifest {
    PackageManifest::from_records([
      ArchiveRecord::new("b.tgz", "H2").with_url("http://x/b.tgz"),
      ArchiveRecord::new("a.tar", "H1"),
    ])
    .unwrap()
  }

  mod records {
    use super::*;

    #[test]
    fn list_is_sorted_by_name() {
      let names: Vec<_> = sample().names().map(str::to_string).collect();
      assert_eq!(names, ["a.tar", "b.tgz"]);
    }

    #[test]
    fn duplicate_names_rejected() {
      let mut manifest = sample();
      let result = manifest.append(ArchiveRecord::new("a.tar", "other"));
      assert!(matches!(result, Err(ManifestError::DuplicateArchive(name)) if name == "a.tar"));
    }

    #[test]
    fn equality_ignores_insertion_order() {
      let reversed = PackageManifest::from_records([
        ArchiveRecord::new("a.tar", "H1"),
        ArchiveRecord::new("b.tgz", "H2").with_url("http://x/b.tgz"),
      ])
      .unwrap();
      assert_eq!(sample(), reversed);
    }

    #[test]
    fn equality_sees_field_changes() {
      let mut changed = sample();
      changed.upsert(ArchiveRecord::new("a.tar", "H1").with_extract_dir("bin"));
      assert_ne!(sample(), changed);
    }

    #[test]
    fn clear_empties() {
      let mut manifest = sample();
      manifest.clear();
      assert!(manifest.is_empty());
    }
  }

  mod persistence {
    use super::*;

    #[test]
    fn roundtrip_empty_single_and_many() {
      let temp = TempDir::new().unwrap();
      let cases = [
        PackageManifest::new(),
        PackageManifest::from_records([ArchiveRecord::new("only.zip", "H")]).unwrap(),
        sample(),
      ];

      for (i, manifest) in cases.into_iter().enumerate() {
        let path = temp.path().join(format!("pkg{}.json", i));
        manifest.save(&path).unwrap();
        let loaded = PackageManifest::load(ManifestSource::FromPath(path), false).unwrap();
        assert_eq!(loaded, manifest);
      }
    }

    #[test]
    fn root_file_is_sorted_name_list() {
      let temp = TempDir::new().unwrap();
      let path = temp.path().join("pkg.json");
      sample().save(&path).unwrap();

      let names: Vec<String> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
      assert_eq!(names, ["a.tar", "b.tgz"]);
      assert!(temp.path().join("pkg/a.tar.json").is_file());
      assert!(temp.path().join("pkg/b.tgz.json").is_file());
    }

    #[test]
    fn missing_description_is_error() {
      let temp = TempDir::new().unwrap();
      let path = temp.path().join("pkg.json");
      sample().save(&path).unwrap();
      fs::remove_file(temp.path().join("pkg/a.tar.json")).unwrap();

      let result = PackageManifest::load(ManifestSource::FromPath(path), false);
      assert!(matches!(
        result,
        Err(ManifestError::MissingArchiveDescription { archive, .. }) if archive == "a.tar"
      ));
    }

    #[test]
    fn missing_description_becomes_stub_when_skipping() {
      let temp = TempDir::new().unwrap();
      let path = temp.path().join("pkg.json");
      sample().save(&path).unwrap();
      fs::remove_file(temp.path().join("pkg/a.tar.json")).unwrap();

      let loaded = PackageManifest::load(ManifestSource::FromPath(path), true).unwrap();
      assert_eq!(loaded.get("a.tar"), Some(&ArchiveRecord::stub("a.tar")));
      assert_eq!(loaded.get("b.tgz").unwrap().hash, "H2");
    }

    #[test]
    fn malformed_root_is_parse_error() {
      let temp = TempDir::new().unwrap();
      let path = temp.path().join("pkg.json");
      fs::write(&path, "{oops").unwrap();

      let result = PackageManifest::load(ManifestSource::FromPath(path), false);
      assert!(matches!(result, Err(ManifestError::Parse { .. })));
    }

    #[test]
    fn versioned_root_object_is_accepted() {
      let temp = TempDir::new().unwrap();
      let path = temp.path().join("pkg.json");
      sample().save(&path).unwrap();
      fs::write(&path, r#"{"version": 1, "archives": ["a.tar", "b.tgz"]}"#).unwrap();

      let loaded = PackageManifest::load(ManifestSource::FromPath(path), false).unwrap();
      assert_eq!(loaded, sample());
    }

    #[test]
    fn description_without_hash_is_hard_error() {
      let temp = TempDir::new().unwrap();
      let path = temp.path().join("pkg.json");
      fs::write(&path, r#"["a.tar"]"#).unwrap();
      fs::create_dir_all(temp.path().join("pkg")).unwrap();
      fs::write(temp.path().join("pkg/a.tar.json"), r#"{"name": "a.tar"}"#).unwrap();

      let result = PackageManifest::load(ManifestSource::FromPath(path), true);
      assert!(matches!(result, Err(ManifestError::Archive(ArchiveError::Parse { .. }))));
    }

    #[test]
    fn load_optional_missing_is_none() {
      let temp = TempDir::new().unwrap();
      assert!(
        PackageManifest::load_optional(&temp.path().join("none.json"), false)
          .unwrap()
          .is_none()
      );
    }
  }

  mod authoring {
    use super::*;

    #[test]
    fn from_archive_files_applies_hints() {
      let temp = TempDir::new().unwrap();
      let a = temp.path().join("a.tar");
      fs::write(&a, "aaa").unwrap();

      let manifest = PackageManifest::from_archive_files(&[a], Some("http://x/"), "src", "bin").unwrap();
      let record = manifest.get("a.tar").unwrap();
      assert_eq!(record.url.as_deref(), Some("http://x/a.tar"));
      assert_eq!(record.tar_src_dir, "src");
      assert_eq!(record.extract_dir, "bin");
    }

    #[test]
    fn from_directory_skips_descriptions() {
      let temp = TempDir::new().unwrap();
      fs::write(temp.path().join("a.tar"), "aaa").unwrap();
      fs::write(temp.path().join("a.tar.json"), "{}").unwrap();
      fs::create_dir(temp.path().join("sub")).unwrap();

      let manifest = PackageManifest::from_directory(temp.path()).unwrap();
      assert_eq!(manifest.names().collect::<Vec<_>>(), ["a.tar"]);
    }
  }

  #[test]
  fn list_packages_finds_root_manifests() {
    let temp = TempDir::new().unwrap();
    sample().save(&temp.path().join("linux_x86_64").join("gcc.json")).unwrap();
    sample().save(&temp.path().join("mac_arm64").join("clang.json")).unwrap();
    fs::create_dir_all(temp.path().join(".packages").join("linux_x86_64")).unwrap();
    fs::write(temp.path().join(".packages").join("linux_x86_64").join("x.json"), "[]").unwrap();
    fs::write(temp.path().join(".lock"), "").unwrap();

    let found = list_packages(temp.path()).unwrap();
    assert_eq!(
      found,
      [
        ("linux_x86_64".to_string(), "gcc".to_string()),
        ("mac_arm64".to_string(), "clang".to_string()),
      ]
    );
    assert!(list_packages(&temp.path().join("missing")).unwrap().is_empty());
  }
}
