/// Application name, used for default directories.
pub const APP_NAME: &str = "pkgver";

/// Extension of manifest and per-archive description files.
pub const JSON_EXT: &str = "json";

/// Directory under a destination root holding the manifests of what was extracted.
pub const DEST_PACKAGES_DIR: &str = ".packages";

/// Remote key prefix for package manifests.
pub const REMOTE_BUILDS_PREFIX: &str = "builds";

/// Remote key prefix for archive bytes.
pub const REMOTE_ARCHIVES_PREFIX: &str = "archives";

/// Lock file name placed at the root of a cache or destination directory.
pub const LOCK_FILENAME: &str = ".lock";

/// Suffix for in-flight downloads.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Current revision file format version.
pub const REVISION_VERSION: u32 = 1;
