//! Host detection and per-user directories.

use std::fmt;
use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Operating systems with a target name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  Mac,
  Windows,
}

impl Os {
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::Mac),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::Mac => "mac",
      Self::Windows => "windows",
    }
  }
}

/// CPU architectures with a target name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Arm64,
}

impl Arch {
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Arm64),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Arm64 => "arm64",
    }
  }
}

/// A package target such as `linux_x86_64` or `mac_arm64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostTarget {
  pub os: Os,
  pub arch: Arch,
}

impl HostTarget {
  /// The target of the running machine, if it has a name.
  pub fn current() -> Option<Self> {
    Some(Self {
      os: Os::current()?,
      arch: Arch::current()?,
    })
  }
}

impl fmt::Display for HostTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}_{}", self.os.as_str(), self.arch.as_str())
  }
}

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

/// Returns the per-user cache directory for pkgver
#[cfg(windows)]
pub fn cache_dir() -> Option<PathBuf> {
  std::env::var_os("LOCALAPPDATA").map(|dir| PathBuf::from(dir).join(APP_NAME).join("Cache"))
}

/// Returns the per-user cache directory for pkgver
#[cfg(not(windows))]
pub fn cache_dir() -> Option<PathBuf> {
  let cache_home = match std::env::var_os("XDG_CACHE_HOME") {
    Some(dir) if !dir.is_empty() => PathBuf::from(dir),
    _ => home_dir()?.join(".cache"),
  };
  Some(cache_home.join(APP_NAME))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn target_name_joins_os_and_arch() {
    let target = HostTarget {
      os: Os::Mac,
      arch: Arch::Arm64,
    };
    assert_eq!(target.to_string(), "mac_arm64");
  }

  #[test]
  fn current_target_is_known() {
    // CI only runs on named targets
    assert!(HostTarget::current().is_some());
  }

  #[cfg(not(windows))]
  mod paths {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn xdg_cache_home_takes_precedence() {
      temp_env::with_vars(
        [("XDG_CACHE_HOME", Some("/custom/cache")), ("HOME", Some("/home/user"))],
        || {
          assert_eq!(cache_dir(), Some(PathBuf::from("/custom/cache").join(APP_NAME)));
        },
      );
    }

    #[test]
    #[serial]
    fn cache_falls_back_to_home() {
      temp_env::with_vars(
        [("XDG_CACHE_HOME", None::<&str>), ("HOME", Some("/home/user"))],
        || {
          assert_eq!(cache_dir(), Some(PathBuf::from("/home/user/.cache").join(APP_NAME)));
        },
      );
    }

    #[test]
    #[serial]
    fn no_home_means_no_cache_dir() {
      temp_env::with_vars([("XDG_CACHE_HOME", None::<&str>), ("HOME", None::<&str>)], || {
        assert_eq!(cache_dir(), None);
      });
    }
  }
}
