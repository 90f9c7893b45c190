//! Snapshot creation and enumeration
//!
//! A snapshot is synchronized into `snapshots/<name>.new`, renamed to
//! `snapshots/<name>` once the tool succeeds, and then becomes the target
//! of the `snapshot` pointer. The rename is the commit point.

use crate::error::IoContext;
use crate::layout::{Layout, LATEST_LINK, PENDING_SUFFIX, SNAPSHOTS_DIR};
use crate::meta::SnapshotMeta;
use crate::{Error, Result};
use chrono::{Local, NaiveDateTime};
use rsync::{Options, Source, SyncTool};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Snapshot names sort chronologically as plain strings
pub const SNAPSHOT_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Name of the snapshot started at `now`
pub fn snapshot_name(now: &NaiveDateTime) -> String {
    now.format(SNAPSHOT_FORMAT).to_string()
}

/// Lifecycle stage of a snapshot directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    /// `<name>.new`, still being (or failed being) synchronized
    Pending,
    /// `<name>`, complete
    Committed,
}

/// A snapshot directory found under `snapshots/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Name without any `.new` suffix
    pub name: String,
    pub state: SnapshotState,
}

/// List snapshot directories, sorted by name
///
/// Dotfiles, non-directories and names that are not valid UTF-8 are
/// skipped. Pending snapshots are reported under their committed name.
pub fn list_snapshots(layout: &Layout) -> Result<Vec<SnapshotEntry>> {
    let snapshots_dir = layout.snapshots_dir();
    let mut snapshots = Vec::new();

    for entry in fs::read_dir(&snapshots_dir).at(&snapshots_dir)? {
        let entry = entry.at(&snapshots_dir)?;
        let file_type = entry.file_type().at(&entry.path())?;

        if !file_type.is_dir() {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!("skipping non UTF-8 snapshot: {}", entry.path().display());
            continue;
        };

        if name.starts_with('.') {
            continue;
        }

        let snapshot = match name.strip_suffix(PENDING_SUFFIX) {
            Some(stripped) => SnapshotEntry {
                name: stripped.to_string(),
                state: SnapshotState::Pending,
            },
            None => SnapshotEntry {
                name,
                state: SnapshotState::Committed,
            },
        };
        snapshots.push(snapshot);
    }

    snapshots.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(snapshots)
}

/// Creates snapshot generations chained through the latest pointer
pub struct SnapshotCreator<'a, T: SyncTool> {
    layout: &'a Layout,
    tool: &'a T,
    source: &'a Source,
    options: &'a Options,
    noop: bool,
}

impl<'a, T: SyncTool> SnapshotCreator<'a, T> {
    pub fn new(layout: &'a Layout, tool: &'a T, source: &'a Source, options: &'a Options) -> Self {
        Self {
            layout,
            tool,
            source,
            options,
            noop: false,
        }
    }

    /// Run the tool in dry-run mode and leave the target untouched
    pub fn noop(mut self, noop: bool) -> Self {
        self.noop = noop;
        self
    }

    /// Current hardlink base: the latest pointer resolved to an absolute path
    ///
    /// A dangling pointer yields no base, so the next run is a full copy.
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        let latest = self.layout.latest_path();

        if let Err(err) = fs::symlink_metadata(&latest) {
            return match err.kind() {
                io::ErrorKind::NotFound => Ok(None),
                _ => Err(err).at(&latest),
            };
        }

        match fs::canonicalize(&latest) {
            Ok(base) => Ok(Some(base)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("{} is dangling, making a full copy", latest.display());
                Ok(None)
            }
            Err(err) => Err(err).at(&latest),
        }
    }

    /// Create the snapshot for `now`, returning its name
    ///
    /// On tool failure `<name>.new` is left behind and the latest pointer
    /// is not touched.
    pub fn create(&self, now: NaiveDateTime) -> Result<String> {
        let name = snapshot_name(&now);
        let path = self.layout.snapshot_path(&name);

        if fs::symlink_metadata(&path).is_ok() {
            return Err(Error::SnapshotExists(name));
        }

        let base = self.latest()?;
        let base_name = base
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned());

        let pending = self.layout.pending_path(&name);

        let mut options = self.options.clone();
        options.flag("stats");
        if self.noop {
            options.flag("dry-run");
        }

        match &base_name {
            Some(base_name) => tracing::info!("snapshot {} from {} (base {})", name, self.source, base_name),
            None => tracing::info!("snapshot {} from {} (full)", name, self.source),
        }

        if self.noop {
            tracing::warn!("noop: not creating {}", pending.display());
            self.sync(&name, &pending, base.as_deref(), &options)?;
            return Ok(name);
        }

        // The destination of a based run must start out empty
        fs::create_dir(&pending).at(&pending)?;

        let stats = self.sync(&name, &pending, base.as_deref(), &options)?;

        fs::rename(&pending, &path).at(&pending)?;
        tracing::info!("committed snapshot {}", name);

        let meta = SnapshotMeta {
            rsync_source: self.source.to_string(),
            link_dest: base_name,
            start: now,
            end: Some(Local::now().naive_local()),
            stats,
        };
        if let Err(err) = meta.write(&self.layout.meta_path(&name)) {
            tracing::warn!("{}", err);
        }

        self.update_latest(&name)?;

        Ok(name)
    }

    fn sync(
        &self,
        name: &str,
        dest: &Path,
        base: Option<&Path>,
        options: &Options,
    ) -> Result<Option<rsync::Stats>> {
        let dest = std::path::absolute(dest).at(dest)?;

        self.tool
            .sync(self.source, &dest, base, options)
            .map_err(|source| {
                tracing::warn!("snapshot {} left pending: {}", name, source);
                Error::SyncTool {
                    snapshot: name.to_string(),
                    source,
                }
            })
    }

    /// Point `snapshot` at `snapshots/<name>` with a single rename
    fn update_latest(&self, name: &str) -> Result<()> {
        let latest = self.layout.latest_path();
        let staging = self.layout.root().join(format!(".{}{}", LATEST_LINK, PENDING_SUFFIX));
        let target = Path::new(SNAPSHOTS_DIR).join(name);

        // Leftover from an interrupted update
        if fs::symlink_metadata(&staging).is_ok() {
            fs::remove_file(&staging).at(&staging)?;
        }

        symlink(&target, &staging).at(&staging)?;
        fs::rename(&staging, &latest).at(&latest)?;

        tracing::debug!("{} -> {}", latest.display(), target.display());
        Ok(())
    }
}

#[cfg(unix)]
pub(crate) fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
