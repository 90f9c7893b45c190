//! Backup targets
//!
//! A target is one root directory receiving snapshots of one source. The
//! `Target` trait is the capability the CLI drives; `RsyncTarget` is the
//! hardlink-snapshot flavor built from the pieces in this crate.

use crate::error::IoContext;
use crate::gc::{GarbageCollector, GcMetrics};
use crate::interval::Interval;
use crate::layout::{ensure_dir, Layout};
use crate::meta::{snapshot_meta, SnapshotMeta};
use crate::retention::{snapshot_ref, Retention};
use crate::snapshot::{list_snapshots, SnapshotCreator, SnapshotState};
use crate::walk::resolve;
use crate::{Error, Result};
use chrono::NaiveDateTime;
use rsync::{Options, Rsync, Source, SyncTool};
use std::fs;
use std::path::{Path, PathBuf};

/// Operations every target flavor provides
pub trait Target {
    /// Root directory of the target
    fn root(&self) -> &Path;

    /// Verify (or create) the directory structure
    fn setup(&self, create: bool) -> Result<()>;

    /// Create a new snapshot, returning its name
    fn snapshot(&self, now: NaiveDateTime) -> Result<String>;

    /// Place interval pointers for `snapshot`
    fn apply_intervals(&self, now: NaiveDateTime, snapshot: &str) -> Result<()>;

    /// Drop interval pointers beyond each interval's limit
    fn prune(&self) -> Result<Vec<PathBuf>>;

    /// Remove snapshots nothing points at
    fn collect(&self) -> Result<GcMetrics>;

    /// Committed snapshots with their run metadata, oldest first
    fn stats(&self) -> Result<Vec<(String, SnapshotMeta)>>;

    /// Copy a committed snapshot (the latest when `None`) back onto the
    /// source, returning its name
    fn restore(&self, snapshot: Option<&str>) -> Result<String>;

    /// Snapshot, then link intervals
    fn backup(&self, now: NaiveDateTime) -> Result<String> {
        let snapshot = self.snapshot(now)?;
        self.apply_intervals(now, &snapshot)?;
        Ok(snapshot)
    }

    /// Prune every interval, then collect
    fn purge(&self) -> Result<GcMetrics> {
        self.prune()?;
        self.collect()
    }
}

/// Settings shared by every operation on an `RsyncTarget`
#[derive(Debug, Clone, Default)]
pub struct TargetConfig {
    pub source: Option<Source>,
    pub options: Options,
    /// Applied in order
    pub intervals: Vec<Interval>,
    /// Log mutations instead of performing them
    pub noop: bool,
    /// Create missing directories
    pub create: bool,
}

/// Hardlinked rsync snapshots with symlink retention
pub struct RsyncTarget<T: SyncTool = Rsync> {
    layout: Layout,
    tool: T,
    config: TargetConfig,
}

impl<T: SyncTool> RsyncTarget<T> {
    pub fn new(root: impl Into<PathBuf>, tool: T, config: TargetConfig) -> Self {
        Self {
            layout: Layout::new(root),
            tool,
            config,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    /// Snapshot the latest pointer refers to
    fn latest_name(&self) -> Result<Option<String>> {
        let latest = self.layout.latest_path();
        if fs::symlink_metadata(&latest).is_err() {
            return Ok(None);
        }

        let (link, target) = resolve(latest)?;
        snapshot_ref(&self.layout, &link, &target).map(Some)
    }

    fn retention(&self) -> Retention<'_> {
        Retention::new(&self.layout).noop(self.config.noop)
    }
}

impl<T: SyncTool> Target for RsyncTarget<T> {
    fn root(&self) -> &Path {
        self.layout.root()
    }

    fn setup(&self, create: bool) -> Result<()> {
        self.layout.setup(create)?;

        for interval in &self.config.intervals {
            let dir = self.layout.interval_dir(interval.name());
            if !create && !dir.is_dir() {
                return Err(Error::MissingIntervalDirectory {
                    interval: interval.name().to_string(),
                    path: dir,
                });
            }
            ensure_dir(&dir, create)?;
        }

        Ok(())
    }

    fn snapshot(&self, now: NaiveDateTime) -> Result<String> {
        let source = self.config.source.as_ref().ok_or(Error::MissingSource)?;

        SnapshotCreator::new(&self.layout, &self.tool, source, &self.config.options)
            .noop(self.config.noop)
            .create(now)
    }

    fn apply_intervals(&self, now: NaiveDateTime, snapshot: &str) -> Result<()> {
        let retention = self.retention();

        for interval in &self.config.intervals {
            retention.apply_interval(interval, &now, snapshot, self.config.create)?;
        }

        Ok(())
    }

    fn prune(&self) -> Result<Vec<PathBuf>> {
        let retention = self.retention();
        let mut removed = Vec::new();

        for interval in &self.config.intervals {
            removed.extend(retention.prune_interval(interval)?);
        }

        Ok(removed)
    }

    fn collect(&self) -> Result<GcMetrics> {
        GarbageCollector::new(&self.layout)
            .noop(self.config.noop)
            .collect()
    }

    fn stats(&self) -> Result<Vec<(String, SnapshotMeta)>> {
        snapshot_meta(&self.layout)
    }

    fn restore(&self, snapshot: Option<&str>) -> Result<String> {
        let source = self.config.source.as_ref().ok_or(Error::MissingSource)?;

        let name = match snapshot {
            Some(name) => name.to_string(),
            None => self.latest_name()?.ok_or(Error::NoLatestSnapshot)?,
        };

        let committed = list_snapshots(&self.layout)?
            .iter()
            .any(|entry| entry.name == name && entry.state == SnapshotState::Committed);
        if !committed {
            return Err(Error::UnknownSnapshot(name));
        }

        let path = self.layout.snapshot_path(&name);
        let path = std::path::absolute(&path).at(&path)?;

        let mut options = self.config.options.clone();
        options.flag("stats");
        if self.config.noop {
            options.flag("dry-run");
        }

        tracing::warn!("restoring snapshot {} onto {}", name, source);

        self.tool
            .restore(&path, source, &options)
            .map_err(|source| Error::SyncTool {
                snapshot: name.clone(),
                source,
            })?;

        Ok(name)
    }
}
