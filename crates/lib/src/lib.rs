//! pkgver-lib: content-addressed toolchain package cache
//!
//! Build machines author packages (named sets of archives for one target) and
//! upload them; every other machine syncs the archives a manifest names into a
//! local cache and extracts them into a destination tree.
//!
//! - `archive`: one archive record and its description file
//! - `manifest`: the archive set of a package and its on-disk form
//! - `sync` / `extract` / `upload`: moving packages between remote, cache and destination
//! - `revision`: per-package pins across targets
//! - `build`: memoized build steps producing package contents

pub mod archive;
pub mod build;
pub mod config;
pub mod consts;
pub mod extract;
pub mod locations;
pub mod lock;
pub mod manifest;
pub mod platform;
pub mod revision;
pub mod sync;
pub mod transfer;
pub mod upload;
pub mod util;
