//! Error types for snapshot and retention operations

use std::io;
use std::path::{Path, PathBuf};

/// Errors raised by the snapshot engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Target root or `snapshots/` is absent and creation was not requested
    #[error("missing directory: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// An interval directory is absent and creation was not allowed
    #[error("interval {interval}: missing directory {}", .path.display())]
    MissingIntervalDirectory { interval: String, path: PathBuf },

    /// A snapshot was requested without a source to copy from
    #[error("no rsync source configured")]
    MissingSource,

    /// A committed snapshot with this name is already present
    #[error("snapshot already exists: {0}")]
    SnapshotExists(String),

    /// A restore named a snapshot that is not committed
    #[error("no such snapshot: {0}")]
    UnknownSnapshot(String),

    /// A restore found no latest snapshot to fall back on
    #[error("no snapshot to restore")]
    NoLatestSnapshot,

    /// The synchronization tool failed; the pending snapshot is kept
    #[error("snapshot {snapshot}: {source}")]
    SyncTool {
        snapshot: String,
        #[source]
        source: rsync::Error,
    },

    /// A pointer resolves somewhere other than directly inside `snapshots/`
    #[error("invalid snapshot reference {} -> {}", .link.display(), .target.display())]
    InvalidReference { link: PathBuf, target: PathBuf },

    #[error("failed to write metadata {}: {source}", .path.display())]
    MetadataWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse metadata {}: {source}", .path.display())]
    MetadataRead {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid interval {spec:?}: {reason}")]
    InvalidInterval { spec: String, reason: String },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Whether this error stems from configuration rather than operation
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::MissingDirectory(_)
                | Error::MissingIntervalDirectory { .. }
                | Error::MissingSource
                | Error::UnknownSnapshot(_)
                | Error::InvalidInterval { .. }
        )
    }
}

/// Attach the offending path to an `io::Error`
pub(crate) trait IoContext<T> {
    fn at(self, path: &Path) -> crate::Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> crate::Result<T> {
        self.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
