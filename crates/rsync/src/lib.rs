//! rsync handling for hardsnap
//!
//! This crate provides:
//! - Source specification parsing
//! - LVM and ZFS snapshot sources, mounted read-only per transfer
//! - Option sets rendered as `--opt [value]` arguments
//! - `--stats` output parsing
//! - The `SyncTool` seam and its `/usr/bin/rsync` implementation

pub mod command;
pub mod options;
pub mod source;
pub mod stats;
pub mod volume;

// Re-exports
pub use command::{Rsync, SyncTool, RSYNC, SUDO};
pub use options::{OptValue, Options};
pub use source::{MountedSource, Source};
pub use stats::{StatValue, Stats};
pub use volume::{SnapshotMount, Volume};

/// Errors reported by the synchronization tool layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source specification could not be understood
    #[error("invalid rsync source {spec:?}: {reason}")]
    Source { spec: String, reason: String },

    /// A user-supplied option string was malformed
    #[error("invalid rsync option {0:?}")]
    Option(String),

    /// The tool could not be started at all
    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Local filesystem work around a transfer failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and reported failure
    #[error("{command} failed with {status}: {stderr}")]
    Exit {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Result type for rsync operations
pub type Result<T> = std::result::Result<T, Error>;
