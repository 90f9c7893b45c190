//! Interval pointer placement and pruning
//!
//! Each interval directory holds at most one symlink per label, pointing
//! at `../snapshots/<name>`. Placing a pointer for a label that already
//! has one does nothing; pruning drops the pointers to the oldest
//! snapshots beyond the interval's limit. Snapshots themselves are only
//! ever removed by the garbage collector.

use crate::error::IoContext;
use crate::interval::Interval;
use crate::layout::{ensure_dir, normalize, Layout, SNAPSHOTS_DIR};
use crate::snapshot::symlink;
use crate::walk::walk;
use crate::{Error, Result};
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the snapshot a resolved pointer refers to
///
/// The target must sit directly inside `snapshots/`; anything else is a
/// corrupted reference.
pub fn snapshot_ref(layout: &Layout, link: &Path, target: &Path) -> Result<String> {
    let invalid = || Error::InvalidReference {
        link: link.to_path_buf(),
        target: target.to_path_buf(),
    };

    let target = normalize(target);
    if target.parent() != Some(normalize(&layout.snapshots_dir()).as_path()) {
        return Err(invalid());
    }

    target
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(invalid)
}

/// Places and prunes interval pointers for one target
pub struct Retention<'a> {
    layout: &'a Layout,
    noop: bool,
}

impl<'a> Retention<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self {
            layout,
            noop: false,
        }
    }

    /// Log instead of creating or removing pointers
    pub fn noop(mut self, noop: bool) -> Self {
        self.noop = noop;
        self
    }

    /// Point the interval's label for `now` at `snapshot`
    ///
    /// Returns the pointer path if one was created, `None` if the label was
    /// already taken.
    pub fn apply_interval(
        &self,
        interval: &Interval,
        now: &NaiveDateTime,
        snapshot: &str,
        allow_create_dir: bool,
    ) -> Result<Option<PathBuf>> {
        let dir = self.layout.interval_dir(interval.name());

        if !dir.is_dir() {
            if !allow_create_dir {
                return Err(Error::MissingIntervalDirectory {
                    interval: interval.name().to_string(),
                    path: dir,
                });
            }
            if self.noop {
                tracing::warn!("noop: would create {}", dir.display());
            } else {
                ensure_dir(&dir, true)?;
            }
        }

        let label = interval.label_for(now)?;
        let pointer = dir.join(&label);

        if fs::symlink_metadata(&pointer).is_ok() {
            tracing::debug!("{}: {} already exists", interval.name(), label);
            return Ok(None);
        }

        let target = Path::new("..").join(SNAPSHOTS_DIR).join(snapshot);

        if self.noop {
            tracing::warn!("noop: would link {} -> {}", pointer.display(), target.display());
            return Ok(None);
        }

        symlink(&target, &pointer).at(&pointer)?;
        tracing::info!("{}: {} -> {}", interval.name(), label, snapshot);

        Ok(Some(pointer))
    }

    /// Pointers in the interval's directory as `(snapshot, pointer)`,
    /// newest snapshot first
    pub fn interval_links(&self, interval: &Interval) -> Result<Vec<(String, PathBuf)>> {
        let dir = self.layout.interval_dir(interval.name());
        let mut links = Vec::new();

        for link in walk(&dir, 0, &[]) {
            let (link, target) = link?;
            let snapshot = snapshot_ref(self.layout, &link, &target)?;
            links.push((snapshot, link));
        }

        links.sort_by(|a, b| b.cmp(a));
        Ok(links)
    }

    /// Remove pointers beyond the interval's limit
    ///
    /// Returns the removed pointers (or those that would be removed).
    pub fn prune_interval(&self, interval: &Interval) -> Result<Vec<PathBuf>> {
        let Some(limit) = interval.limit() else {
            tracing::debug!("{}: unlimited retention", interval.name());
            return Ok(Vec::new());
        };

        let mut removed = Vec::new();

        for (snapshot, link) in self.interval_links(interval)?.into_iter().skip(limit) {
            if self.noop {
                tracing::warn!("noop: would unlink {} -> {}", link.display(), snapshot);
            } else {
                tracing::info!("{}: unlink {} -> {}", interval.name(), link.display(), snapshot);
                fs::remove_file(&link).at(&link)?;
            }
            removed.push(link);
        }

        Ok(removed)
    }
}
