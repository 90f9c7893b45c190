//! Generational hardlink snapshots with symlink retention
//!
//! This crate provides:
//! - Target root layout and setup
//! - Symlink tree walking
//! - Snapshot creation chained through the latest pointer
//! - Interval pointer placement and pruning
//! - Garbage collection of unreferenced snapshots
//! - Per-snapshot run metadata

pub mod error;
pub mod gc;
pub mod interval;
pub mod layout;
pub mod meta;
pub mod retention;
pub mod snapshot;
pub mod target;
pub mod walk;

// Re-exports
pub use error::Error;
pub use gc::{GarbageCollector, GcMetrics};
pub use interval::Interval;
pub use layout::Layout;
pub use meta::{snapshot_meta, SnapshotMeta};
pub use retention::Retention;
pub use snapshot::{list_snapshots, snapshot_name, SnapshotCreator, SnapshotEntry, SnapshotState};
pub use target::{RsyncTarget, Target, TargetConfig};
pub use walk::walk;

/// Result type for snapshot operations
pub type Result<T> = std::result::Result<T, Error>;
