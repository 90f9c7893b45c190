//! Integration tests for the backup crate
//!
//! Drives `RsyncTarget` end to end with an in-process sync tool that
//! hardlinks unchanged content against the base, the way rsync
//! `--link-dest` does.

#![cfg(unix)]

use backup::{snapshot_name, Error, Interval, RsyncTarget, SnapshotMeta, Target, TargetConfig};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rsync::{Options, Source, Stats, SyncTool};
use std::cell::{Cell, RefCell};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Default)]
struct LinkingTool {
    fail_next: Cell<bool>,
    restored: RefCell<Vec<(PathBuf, Vec<String>)>>,
}

impl SyncTool for LinkingTool {
    fn sync(
        &self,
        _source: &Source,
        dest: &Path,
        link_dest: Option<&Path>,
        _options: &Options,
    ) -> rsync::Result<Option<Stats>> {
        let spawn = |source| rsync::Error::Spawn {
            command: "fake".to_string(),
            source,
        };

        match link_dest {
            Some(base) => fs::hard_link(base.join("data"), dest.join("data")).map_err(spawn)?,
            None => fs::write(dest.join("data"), b"unchanged content").map_err(spawn)?,
        }

        if self.fail_next.replace(false) {
            return Err(rsync::Error::Exit {
                command: "fake".to_string(),
                status: "exit status: 12".to_string(),
                stderr: "connection unexpectedly closed".to_string(),
            });
        }

        Ok(Stats::parse("Number of files: 1 (reg: 1)\nTotal file size: 17 bytes\n"))
    }

    fn restore(
        &self,
        snapshot: &Path,
        _source: &Source,
        options: &Options,
    ) -> rsync::Result<Option<Stats>> {
        let args = options
            .to_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        self.restored.borrow_mut().push((snapshot.to_path_buf(), args));
        Ok(None)
    }
}

fn day(d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn target(root: &Path, intervals: &[&str]) -> RsyncTarget<LinkingTool> {
    let config = TargetConfig {
        source: Some(Source::parse("/srv/data/").unwrap()),
        options: Options::defaults(),
        intervals: intervals
            .iter()
            .map(|spec| spec.parse::<Interval>().unwrap())
            .collect(),
        noop: false,
        create: true,
    };

    RsyncTarget::new(root, LinkingTool::default(), config)
}

fn pointers(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut out: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let path = e.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            (name, fs::read_link(&path).unwrap())
        })
        .collect();
    out.sort();
    out
}

#[test]
fn test_daily_retention_lifecycle() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path().join("host");
    let target = target(&root, &["1@daily:%Y-%m-%d"]);
    target.setup(true)?;

    // First run of the day: full transfer
    let s1 = target.backup(day(1, 1))?;
    assert_eq!(
        pointers(&root.join("daily")),
        vec![("2024-06-01".to_string(), PathBuf::from("../snapshots").join(&s1))]
    );

    // Second run the same day: based on S1, daily pointer unchanged
    let s2 = target.backup(day(1, 2))?;
    let meta = SnapshotMeta::read(&target.layout().meta_path(&s2))?;
    assert_eq!(meta.link_dest.as_deref(), Some(s1.as_str()));
    assert_eq!(
        pointers(&root.join("daily")),
        vec![("2024-06-01".to_string(), PathBuf::from("../snapshots").join(&s1))]
    );

    // Unchanged content is shared between generations
    let ino1 = fs::metadata(target.layout().snapshot_path(&s1).join("data"))?.ino();
    let ino2 = fs::metadata(target.layout().snapshot_path(&s2).join("data"))?.ino();
    assert_eq!(ino1, ino2);

    // Within the limit: nothing pruned, S1 still referenced, S2 is latest
    assert!(target.prune()?.is_empty());
    let metrics = target.collect()?;
    assert!(metrics.purged.is_empty());

    // Next day: a new daily pointer pushes the old one out
    let s3 = target.backup(day(2, 1))?;
    let removed = target.prune()?;
    assert_eq!(removed, vec![root.join("daily/2024-06-01")]);

    // S1 has no pointers left; S2 lost the latest pointer to S3
    let metrics = target.collect()?;
    assert_eq!(metrics.purged, vec![s1.clone(), s2.clone()]);
    assert!(!target.layout().snapshot_path(&s1).exists());
    assert!(!target.layout().meta_path(&s1).exists());
    assert!(target.layout().snapshot_path(&s3).is_dir());

    // Content survives through the remaining hardlink
    assert_eq!(
        fs::read(target.layout().snapshot_path(&s3).join("data"))?,
        b"unchanged content"
    );

    Ok(())
}

#[test]
fn test_multiple_intervals_share_snapshots() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path().join("host");
    let target = target(&root, &["2@hourly:%Y-%m-%dT%H", "3@daily:%Y-%m-%d"]);
    target.setup(true)?;

    let mut names = Vec::new();
    for h in 0..5 {
        names.push(target.backup(day(3, h))?);
    }

    target.purge()?;

    let hourly = pointers(&root.join("hourly"));
    let daily = pointers(&root.join("daily"));
    assert_eq!(hourly.len(), 2);
    assert_eq!(daily.len(), 1);

    // Survivors: two newest hours, the first of the day, and the latest
    let mut remaining: Vec<_> = fs::read_dir(target.layout().snapshots_dir())?
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| !n.ends_with(".meta"))
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec![names[0].clone(), names[3].clone(), names[4].clone()]);

    Ok(())
}

#[test]
fn test_failed_run_is_recoverable() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path().join("host");
    let target = target(&root, &["daily:%Y-%m-%d"]);
    target.setup(true)?;

    let s1 = target.backup(day(4, 1))?;

    // A failed run leaves only a pending directory behind
    let failing = RsyncTarget::new(
        &root,
        LinkingTool {
            fail_next: Cell::new(true),
            ..Default::default()
        },
        target.config().clone(),
    );
    let result = failing.backup(day(4, 2));
    assert!(matches!(result, Err(Error::SyncTool { .. })));
    assert_eq!(
        fs::read_link(target.layout().latest_path())?,
        PathBuf::from("snapshots").join(&s1)
    );

    // GC sees it but leaves it alone
    let metrics = target.collect()?;
    assert_eq!(metrics.pending.len(), 1);
    assert!(metrics.purged.is_empty());

    // The next run carries on from S1
    let s2 = target.backup(day(4, 3))?;
    let meta = SnapshotMeta::read(&target.layout().meta_path(&s2))?;
    assert_eq!(meta.link_dest.as_deref(), Some(s1.as_str()));

    Ok(())
}

#[test]
fn test_setup_without_create() {
    let temp_dir = TempDir::new().unwrap();
    let target = target(&temp_dir.path().join("absent"), &["daily:%Y-%m-%d"]);

    let err = target.setup(false).unwrap_err();

    assert!(matches!(err, Error::MissingDirectory(_)));
    assert!(err.is_config());
}

#[test]
fn test_snapshot_requires_source() {
    let temp_dir = TempDir::new().unwrap();
    let target = RsyncTarget::new(temp_dir.path(), LinkingTool::default(), TargetConfig::default());
    target.setup(true).unwrap();

    let err = target.snapshot(day(5, 0) + Duration::minutes(1)).unwrap_err();

    assert!(matches!(err, Error::MissingSource));
}

#[test]
fn test_setup_reports_missing_interval_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("host");
    fs::create_dir_all(root.join("snapshots")).unwrap();
    let target = target(&root, &["7@daily:%Y-%m-%d"]);

    let err = target.setup(false).unwrap_err();

    assert!(
        matches!(&err, Error::MissingIntervalDirectory { interval, path }
            if interval == "daily" && path == &root.join("daily"))
    );
    assert!(err.is_config());
    assert!(!root.join("daily").exists());

    target.setup(true).unwrap();
    target.setup(false).unwrap();
}

#[test]
fn test_restore_latest_or_named_snapshot() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path().join("host");
    let target = target(&root, &["daily:%Y-%m-%d"]);
    target.setup(true)?;

    assert!(matches!(target.restore(None), Err(Error::NoLatestSnapshot)));

    let s1 = target.backup(day(6, 1))?;
    let s2 = target.backup(day(6, 2))?;

    assert_eq!(target.restore(None)?, s2);
    assert_eq!(target.restore(Some(&s1))?, s1);

    let restored = target.tool().restored.borrow();
    assert_eq!(restored.len(), 2);
    assert!(restored[0].0.is_absolute());
    assert!(restored[0].0.ends_with(format!("snapshots/{}", s2)));
    assert!(restored[1].0.ends_with(format!("snapshots/{}", s1)));
    assert!(restored[0].1.contains(&"--stats".to_string()));
    assert!(!restored[0].1.contains(&"--dry-run".to_string()));

    Ok(())
}

#[test]
fn test_restore_rejects_unknown_and_pending_snapshots() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path().join("host");
    let target = target(&root, &[]);
    target.setup(true)?;
    target.backup(day(7, 1))?;

    let failing = RsyncTarget::new(
        &root,
        LinkingTool {
            fail_next: Cell::new(true),
            ..Default::default()
        },
        target.config().clone(),
    );
    assert!(failing.backup(day(7, 2)).is_err());
    let pending = snapshot_name(&day(7, 2));

    for name in ["20990101-000000", "../host", pending.as_str()] {
        let err = target.restore(Some(name)).unwrap_err();
        assert!(matches!(&err, Error::UnknownSnapshot(n) if n == name));
        assert!(err.is_config());
    }
    assert!(target.tool().restored.borrow().is_empty());

    Ok(())
}
