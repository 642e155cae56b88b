//! Where the cache, destination and revision files live, and which packages
//! each target wants.
//!
//! Values are layered: built-in defaults, then `pkgver.json`, then the
//! `PKGVER_*` environment variables, then explicit [`ConfigOverrides`] (the
//! command-line flags). Relative paths in the file are resolved against the
//! file's directory.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::platform;

pub const CONFIG_FILENAME: &str = "pkgver.json";
pub const CACHE_DIR_ENV: &str = "PKGVER_CACHE_DIR";
pub const DEST_DIR_ENV: &str = "PKGVER_DEST_DIR";
pub const REVISIONS_DIR_ENV: &str = "PKGVER_REVISIONS_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid config file '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("cannot determine a cache directory; set {CACHE_DIR_ENV} or HOME")]
  NoCacheDir,
}

/// On-disk shape of `pkgver.json`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
  cache_dir: Option<PathBuf>,
  dest_dir: Option<PathBuf>,
  revisions_dir: Option<PathBuf>,
  #[serde(default)]
  packages: BTreeMap<String, Vec<String>>,
}

/// Values that beat both the file and the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
  pub cache_dir: Option<PathBuf>,
  pub dest_dir: Option<PathBuf>,
  pub revisions_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub cache_dir: PathBuf,
  pub dest_dir: PathBuf,
  pub revisions_dir: PathBuf,
  /// Target name to the packages wanted for it.
  pub packages: BTreeMap<String, Vec<String>>,
}

impl Config {
  /// A config with explicit cache and destination roots and nothing else.
  pub fn with_dirs(cache_dir: PathBuf, dest_dir: PathBuf) -> Self {
    Self {
      cache_dir,
      dest_dir,
      revisions_dir: PathBuf::from("revisions"),
      packages: BTreeMap::new(),
    }
  }

  /// Load `path` (or `./pkgver.json`) and apply environment overrides.
  ///
  /// Only the implicit `./pkgver.json` may be missing, in which case the
  /// defaults apply. A path the caller names must exist.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    Self::load_with(path, ConfigOverrides::default())
  }

  pub fn load_with(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
    match path {
      Some(path) => Self::load_from(path, true, overrides),
      None => Self::load_from(Path::new(CONFIG_FILENAME), false, overrides),
    }
  }

  fn load_from(path: &Path, required: bool, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
    let path = path.to_path_buf();

    let file = match fs::read_to_string(&path) {
      Ok(content) => {
        debug!(path = %path.display(), "loading config");
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
          path: path.clone(),
          source,
        })?
      }
      Err(e) if !required && e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no config file, using defaults");
        ConfigFile::default()
      }
      Err(source) => return Err(ConfigError::Read { path, source }),
    };

    let base = path.parent().unwrap_or(Path::new(""));
    let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };

    let cache_dir = match overrides.cache_dir.or_else(|| env_path(CACHE_DIR_ENV)) {
      Some(dir) => dir,
      None => match file.cache_dir {
        Some(dir) => resolve(dir),
        None => platform::cache_dir().ok_or(ConfigError::NoCacheDir)?,
      },
    };
    let dest_dir = overrides
      .dest_dir
      .or_else(|| env_path(DEST_DIR_ENV))
      .unwrap_or_else(|| resolve(file.dest_dir.unwrap_or_else(|| "toolchain".into())));
    let revisions_dir = overrides
      .revisions_dir
      .or_else(|| env_path(REVISIONS_DIR_ENV))
      .unwrap_or_else(|| resolve(file.revisions_dir.unwrap_or_else(|| "revisions".into())));

    Ok(Self {
      cache_dir,
      dest_dir,
      revisions_dir,
      packages: file.packages,
    })
  }

  /// Packages configured for `target`, empty if none.
  pub fn packages_for(&self, target: &str) -> &[String] {
    self.packages.get(target).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn targets(&self) -> impl Iterator<Item = &str> {
    self.packages.keys().map(String::as_str)
  }

  /// Every configured `(target, package)` pair, optionally for one target.
  pub fn pairs(&self, only_target: Option<&str>) -> Vec<(String, String)> {
    self
      .packages
      .iter()
      .filter(|(target, _)| only_target.is_none_or(|only| only == target.as_str()))
      .flat_map(|(target, packages)| packages.iter().map(move |p| (target.clone(), p.clone())))
      .collect()
  }
}

fn env_path(name: &str) -> Option<PathBuf> {
  std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from)
}
