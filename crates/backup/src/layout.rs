//! Target root directory layout
//!
//! ```text
//! <root>/
//!   snapshots/
//!     <name>/          committed snapshot
//!     <name>.new/      pending snapshot
//!     <name>.meta      run metadata
//!   snapshot -> snapshots/<name>
//!   <interval>/
//!     <label> -> ../snapshots/<name>
//! ```

use crate::error::IoContext;
use crate::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Directory holding snapshot payloads
pub const SNAPSHOTS_DIR: &str = "snapshots";
/// Latest-snapshot pointer
pub const LATEST_LINK: &str = "snapshot";
/// Suffix of a snapshot still being synchronized
pub const PENDING_SUFFIX: &str = ".new";
/// Suffix of the metadata sidecar
pub const META_SUFFIX: &str = ".meta";

/// Fixed paths below a target root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    pub fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_LINK)
    }

    pub fn interval_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.snapshots_dir().join(name)
    }

    pub fn pending_path(&self, name: &str) -> PathBuf {
        self.snapshots_dir().join(format!("{}{}", name, PENDING_SUFFIX))
    }

    pub fn meta_path(&self, name: &str) -> PathBuf {
        self.snapshots_dir().join(format!("{}{}", name, META_SUFFIX))
    }

    /// Verify the root and `snapshots/` exist, creating them if allowed
    pub fn setup(&self, create: bool) -> Result<()> {
        ensure_dir(&self.root, create)?;
        ensure_dir(&self.snapshots_dir(), create)?;
        Ok(())
    }
}

/// Check a directory exists, optionally creating it
///
/// Returns whether the directory was created.
pub(crate) fn ensure_dir(path: &Path, create: bool) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }

    if !create {
        return Err(Error::MissingDirectory(path.to_path_buf()));
    }

    tracing::warn!("creating directory: {}", path.display());
    fs::create_dir_all(path).at(path)?;
    Ok(true)
}

/// Lexically collapse `.` and `..` without touching the filesystem
///
/// Symlink targets are compared by name, so a dangling pointer must still
/// normalize to where it would point.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }

    out
}
