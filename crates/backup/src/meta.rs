//! Per-snapshot run metadata
//!
//! Stored next to each committed snapshot as `<name>.meta` (JSON). The
//! record is informational; nothing in the engine decides anything based
//! on it.

use crate::error::IoContext;
use crate::layout::Layout;
use crate::snapshot::{list_snapshots, SnapshotState};
use crate::{Error, Result};
use chrono::{Duration, NaiveDateTime};
use rsync::Stats;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// What happened during one snapshot run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Source the snapshot was copied from
    pub rsync_source: String,
    /// Name of the snapshot used as hardlink base
    #[serde(default)]
    pub link_dest: Option<String>,
    pub start: NaiveDateTime,
    /// Absent if the run never completed
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    /// Transfer statistics reported by rsync
    #[serde(default)]
    pub stats: Option<Stats>,
}

impl SnapshotMeta {
    /// Wall time of the run
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }

    /// Write to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        let write = || -> io::Result<()> {
            let json = serde_json::to_string_pretty(self)?;
            let mut file = fs::File::create(path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        };

        write().map_err(|source| Error::MetadataWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read from `path`
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).at(path)?;

        serde_json::from_str(&contents).map_err(|source| Error::MetadataRead {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Committed snapshots with metadata, oldest first
///
/// Snapshots without a `.meta` sidecar are left out.
pub fn snapshot_meta(layout: &Layout) -> Result<Vec<(String, SnapshotMeta)>> {
    let mut out = Vec::new();

    for snapshot in list_snapshots(layout)? {
        if snapshot.state != SnapshotState::Committed {
            continue;
        }

        let path = layout.meta_path(&snapshot.name);
        match fs::symlink_metadata(&path) {
            Ok(_) => out.push((snapshot.name, SnapshotMeta::read(&path)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no metadata for snapshot {}", snapshot.name);
            }
            Err(err) => return Err(err).at(&path),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rsync::StatValue;
    use tempfile::TempDir;

    fn sample() -> SnapshotMeta {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap();

        SnapshotMeta {
            rsync_source: "/srv/data/".to_string(),
            link_dest: Some("20231231-030000".to_string()),
            start,
            end: Some(start + Duration::seconds(90)),
            stats: Some(
                [("Number of files".to_string(), StatValue::Int(12))]
                    .into_iter()
                    .collect(),
            ),
        }
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("20240101-030000.meta");

        let meta = sample();
        meta.write(&path).unwrap();

        let loaded = SnapshotMeta::read(&path).unwrap();
        assert_eq!(loaded, meta);
        assert_eq!(loaded.duration(), Some(Duration::seconds(90)));
    }

    #[test]
    fn test_field_names() {
        let json = serde_json::to_value(sample()).unwrap();

        assert_eq!(json["rsync_source"], "/srv/data/");
        assert_eq!(json["link_dest"], "20231231-030000");
        assert_eq!(json["start"], "2024-01-01T03:00:00");
        assert_eq!(json["stats"]["Number of files"], 12);
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let meta: SnapshotMeta = serde_json::from_str(
            r#"{"rsync_source": "host:/etc", "start": "2024-01-01T03:00:00"}"#,
        )
        .unwrap();

        assert_eq!(meta.link_dest, None);
        assert_eq!(meta.end, None);
        assert_eq!(meta.stats, None);
        assert_eq!(meta.duration(), None);
    }

    #[test]
    fn test_corrupt_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.meta");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            SnapshotMeta::read(&path),
            Err(Error::MetadataRead { .. })
        ));
    }
}
