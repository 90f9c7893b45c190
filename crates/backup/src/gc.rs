//! Garbage collection of unreferenced snapshots
//!
//! Mark: every symlink directly in the target root or one level below it
//! (the latest pointer and all interval pointers) marks its snapshot live.
//! Sweep: committed snapshots that nothing points at lose their metadata
//! sidecar and then their tree. Pending snapshots are reported, never
//! removed.

use crate::error::IoContext;
use crate::layout::{Layout, SNAPSHOTS_DIR};
use crate::retention::snapshot_ref;
use crate::snapshot::{list_snapshots, SnapshotState};
use crate::walk::walk;
use crate::Result;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::time::Instant;

/// GC metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcMetrics {
    /// Snapshots removed (or that would be, in noop mode)
    pub purged: Vec<String>,
    /// Pending `.new` snapshots left in place
    pub pending: Vec<String>,
    /// Referenced names with no committed snapshot behind them
    pub dangling: Vec<String>,
    pub duration_ms: u64,
}

impl GcMetrics {
    pub fn log_summary(&self) {
        tracing::info!(
            "GC completed: {} purged, {} pending, {} dangling in {} ms",
            self.purged.len(),
            self.pending.len(),
            self.dangling.len(),
            self.duration_ms
        );
    }
}

/// Garbage collector
pub struct GarbageCollector<'a> {
    layout: &'a Layout,
    noop: bool,
}

impl<'a> GarbageCollector<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self {
            layout,
            noop: false,
        }
    }

    /// Log instead of deleting
    pub fn noop(mut self, noop: bool) -> Self {
        self.noop = noop;
        self
    }

    /// Run garbage collection
    ///
    /// Must not run concurrently with snapshot creation or retention on
    /// the same target.
    pub fn collect(&self) -> Result<GcMetrics> {
        let start_time = Instant::now();
        let mut metrics = GcMetrics::default();

        // Phase 1: Mark
        let live = self.mark_referenced()?;

        // Phase 2: Sweep
        let mut committed = BTreeSet::new();

        for snapshot in list_snapshots(self.layout)? {
            match snapshot.state {
                SnapshotState::Pending => {
                    tracing::warn!("pending snapshot {} left in place", snapshot.name);
                    metrics.pending.push(snapshot.name);
                }
                SnapshotState::Committed if live.contains(&snapshot.name) => {
                    committed.insert(snapshot.name);
                }
                SnapshotState::Committed => {
                    self.purge(&snapshot.name)?;
                    metrics.purged.push(snapshot.name);
                }
            }
        }

        for name in live.difference(&committed) {
            tracing::warn!("dangling reference to missing snapshot {}", name);
            metrics.dangling.push(name.clone());
        }

        metrics.duration_ms = start_time.elapsed().as_millis() as u64;
        metrics.log_summary();

        Ok(metrics)
    }

    /// Names of all snapshots with at least one pointer
    fn mark_referenced(&self) -> Result<BTreeSet<String>> {
        let mut live = BTreeSet::new();

        for link in walk(self.layout.root(), 1, &[SNAPSHOTS_DIR]) {
            let (link, target) = link?;
            let name = snapshot_ref(self.layout, &link, &target)?;
            tracing::debug!("{} -> {}", link.display(), name);
            live.insert(name);
        }

        Ok(live)
    }

    fn purge(&self, name: &str) -> Result<()> {
        let meta_path = self.layout.meta_path(name);
        let snapshot_path = self.layout.snapshot_path(name);

        if self.noop {
            tracing::warn!("noop: would purge snapshot {}", name);
            return Ok(());
        }

        tracing::info!("purge snapshot {}", name);

        match fs::remove_file(&meta_path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err).at(&meta_path),
        }

        fs::remove_dir_all(&snapshot_path).at(&snapshot_path)?;
        Ok(())
    }
}
