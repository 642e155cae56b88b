//! Deterministic mapping from package coordinates to paths and remote keys.
//!
//! # Local layout
//!
//! ```text
//! <root>/
//! └── <target>/
//!     ├── <package>.json          # root manifest: sorted archive names
//!     └── <package>/
//!         ├── <archive>           # archive bytes
//!         └── <archive>.json      # archive description
//! ```
//!
//! Destinations mirror this with the extracted tree at `<dest>/<target>/<package>/`
//! and the record of what was extracted under `<dest>/.packages/`.
//!
//! # Remote layout
//!
//! ```text
//! builds/<revision>/<target>/<package>.json
//! archives/<hash>/<archive>
//! ```
//!
//! Every component is validated to be a single path segment, which keeps the
//! mapping collision-free.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::consts::{DEST_PACKAGES_DIR, JSON_EXT, REMOTE_ARCHIVES_PREFIX, REMOTE_BUILDS_PREFIX};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationError {
  #[error("invalid {kind} '{value}': must be a single non-empty path component")]
  InvalidComponent { kind: &'static str, value: String },

  #[error("invalid archive name '{0}': names ending in .json are reserved for description files")]
  ReservedArchiveName(String),
}

/// Check that `value` can be used as one path segment.
pub fn validate_component(kind: &'static str, value: &str) -> Result<(), LocationError> {
  let invalid = value.is_empty()
    || value == "."
    || value == ".."
    || value.contains(['/', '\\', '\0'])
    || Path::new(value).components().count() != 1;

  if invalid {
    return Err(LocationError::InvalidComponent {
      kind,
      value: value.to_string(),
    });
  }
  Ok(())
}

/// Check that `name` can sit next to the other archives of a package.
///
/// Archive bytes share a directory with `<archive>.json` descriptions, so a
/// JSON-suffixed archive name could overwrite, or be overwritten by, one.
pub fn validate_archive_name(name: &str) -> Result<(), LocationError> {
  validate_component("archive", name)?;
  let reserved = Path::new(name)
    .extension()
    .is_some_and(|ext| ext.eq_ignore_ascii_case(JSON_EXT));
  if reserved {
    return Err(LocationError::ReservedArchiveName(name.to_string()));
  }
  Ok(())
}

/// Check that `value` is a relative path staying inside its base directory.
///
/// Empty means "the base itself" and is accepted.
pub fn is_contained_relative(value: &str) -> bool {
  Path::new(value)
    .components()
    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// `<root>/<target>/<package>.json`
pub fn package_file(root: &Path, target: &str, package: &str) -> PathBuf {
  root.join(target).join(format!("{}.{}", package, JSON_EXT))
}

/// `<root>/<target>/<package>/`
pub fn archive_dir(root: &Path, target: &str, package: &str) -> PathBuf {
  root.join(target).join(package)
}

/// `<root>/<target>/<package>/<archive>`
pub fn archive_file(root: &Path, target: &str, package: &str, archive: &str) -> PathBuf {
  archive_dir(root, target, package).join(archive)
}

/// Directory holding the per-archive descriptions of a root manifest file:
/// `<dirname>/<stem>/`.
pub fn description_dir(package_file: &Path) -> PathBuf {
  let stem = package_file.file_stem().unwrap_or_default();
  match package_file.parent() {
    Some(parent) => parent.join(stem),
    None => PathBuf::from(stem),
  }
}

/// `<dirname>/<stem>/<archive>.json`
pub fn archive_description_file(package_file: &Path, archive: &str) -> PathBuf {
  description_dir(package_file).join(format!("{}.{}", archive, JSON_EXT))
}

/// `<dest>/<target>/<package>`
pub fn extract_dir(dest: &Path, target: &str, package: &str) -> PathBuf {
  dest.join(target).join(package)
}

/// `<dest>/.packages/<target>/<package>.json`
pub fn dest_package_file(dest: &Path, target: &str, package: &str) -> PathBuf {
  package_file(&dest.join(DEST_PACKAGES_DIR), target, package)
}

/// `<revisions_dir>/<package>.json`
pub fn revision_file(revisions_dir: &Path, package: &str) -> PathBuf {
  revisions_dir.join(format!("{}.{}", package, JSON_EXT))
}

/// `builds/<revision>/<target>/<package>.json`
pub fn remote_package_key(revision: u64, target: &str, package: &str) -> String {
  format!(
    "{}/{}/{}/{}.{}",
    REMOTE_BUILDS_PREFIX, revision, target, package, JSON_EXT
  )
}

/// `archives/<hash>/<archive>`
pub fn remote_archive_key(archive: &str, hash: &str) -> String {
  format!("{}/{}/{}", REMOTE_ARCHIVES_PREFIX, hash, archive)
}

/// Remote key of an archive description belonging to a remote package key.
pub fn remote_description_key(package_key: &str, archive: &str) -> String {
  let stem = package_key
    .strip_suffix(&format!(".{}", JSON_EXT))
    .unwrap_or(package_key);
  format!("{}/{}.{}", stem, archive, JSON_EXT)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn local_layout() {
    let root = Path::new("/cache");
    assert_eq!(
      package_file(root, "linux_x86_64", "gcc"),
      PathBuf::from("/cache/linux_x86_64/gcc.json")
    );
    assert_eq!(
      archive_dir(root, "linux_x86_64", "gcc"),
      PathBuf::from("/cache/linux_x86_64/gcc")
    );
    assert_eq!(
      archive_file(root, "linux_x86_64", "gcc", "gcc.tgz"),
      PathBuf::from("/cache/linux_x86_64/gcc/gcc.tgz")
    );
  }

  #[test]
  fn description_files_sit_next_to_archives() {
    let root = Path::new("/cache");
    let manifest = package_file(root, "t", "p");
    assert_eq!(
      archive_description_file(&manifest, "a.tar"),
      PathBuf::from("/cache/t/p/a.tar.json")
    );
    assert_eq!(description_dir(&manifest), archive_dir(root, "t", "p"));
  }

  #[test]
  fn destination_layout() {
    let dest = Path::new("/dest");
    assert_eq!(extract_dir(dest, "t", "p"), PathBuf::from("/dest/t/p"));
    assert_eq!(
      dest_package_file(dest, "t", "p"),
      PathBuf::from("/dest/.packages/t/p.json")
    );
  }

  #[test]
  fn remote_keys_are_posix() {
    assert_eq!(remote_package_key(42, "t", "p"), "builds/42/t/p.json");
    assert_eq!(remote_archive_key("a.tar", "abc"), "archives/abc/a.tar");
    assert_eq!(
      remote_description_key("builds/42/t/p.json", "a.tar"),
      "builds/42/t/p/a.tar.json"
    );
  }

  #[test]
  fn distinct_coordinates_never_collide() {
    let root = Path::new("/cache");
    let pairs = [("a", "b"), ("a", "c"), ("b", "a"), ("ab", "c")];
    let mut seen = std::collections::HashSet::new();
    for (target, package) in pairs {
      assert!(seen.insert(package_file(root, target, package)));
      assert!(seen.insert(archive_dir(root, target, package)));
    }
  }

  #[test]
  fn json_archive_names_are_reserved() {
    assert!(validate_archive_name("a.tar").is_ok());
    assert!(validate_archive_name("jsonlib.tgz").is_ok());
    for bad in ["a.tar.json", "a.JSON", "meta.json"] {
      assert_eq!(
        validate_archive_name(bad),
        Err(LocationError::ReservedArchiveName(bad.to_string()))
      );
    }
    assert!(matches!(
      validate_archive_name("a/b"),
      Err(LocationError::InvalidComponent { kind: "archive", .. })
    ));
  }

  #[test]
  fn rejects_multi_segment_components() {
    for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
      assert!(validate_component("package", bad).is_err(), "{:?}", bad);
    }
    assert!(validate_component("package", "gcc-4.9").is_ok());
  }

  #[test]
  fn contained_relative_paths() {
    assert!(is_contained_relative(""));
    assert!(is_contained_relative("bin"));
    assert!(is_contained_relative("./usr/lib"));
    assert!(!is_contained_relative("../escape"));
    assert!(!is_contained_relative("/abs"));
  }
}
