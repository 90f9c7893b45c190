//! Per-snapshot transfer statistics

use crate::util::{format_duration, format_percentage, format_units};
use anyhow::{Context, Result};
use backup::{SnapshotMeta, Target};
use owo_colors::OwoColorize;

const FILES_TRANSFERRED: &[&str] = &[
    "Number of regular files transferred",
    "Number of files transferred",
];

pub fn run(target: &impl Target) -> Result<()> {
    let snapshots = target
        .stats()
        .with_context(|| format!("Failed to read snapshot metadata in {}", target.root().display()))?;

    println!(
        "{}",
        row("NAME", "TIME", ["FILES", "TOTAL", ""], ["SIZE", "TOTAL", ""], ["SEND", "RECV"]).bold()
    );

    for (name, meta) in &snapshots {
        println!("{}", format_snapshot(name, meta));
    }

    Ok(())
}

/// One table row for a snapshot; missing numbers render as `-`
pub fn format_snapshot(name: &str, meta: &SnapshotMeta) -> String {
    let time = meta
        .duration()
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());

    let Some(stats) = &meta.stats else {
        return row(name, &time, ["-", "-", ""], ["-", "-", ""], ["-", "-"]);
    };

    let value = |names: &[&str]| stats.first_of(names).map(|v| v.as_f64());
    let units = |v: Option<f64>| v.map(format_units).unwrap_or_else(|| "-".to_string());
    let pct = |num: Option<f64>, total: Option<f64>| match (num, total) {
        (Some(num), Some(total)) => format_percentage(num, total),
        _ => " ".to_string(),
    };

    let files = value(FILES_TRANSFERRED);
    let files_total = value(&["Number of files"]);
    let size = value(&["Total transferred file size"]);
    let size_total = value(&["Total file size"]);
    let sent = value(&["Total bytes sent"]);
    let received = value(&["Total bytes received"]);

    row(
        name,
        &time,
        [&units(files), &units(files_total), &pct(files, files_total)],
        [&units(size), &units(size_total), &pct(size, size_total)],
        [&units(sent), &units(received)],
    )
}

fn row(name: &str, time: &str, files: [&str; 3], size: [&str; 3], transfer: [&str; 2]) -> String {
    format!(
        "{:18} {:10} | {:>8} / {:>8} = {:>6}% | {:>8} / {:>8} = {:>6}% | {:>8} {:>8}",
        name, time, files[0], files[1], files[2], size[0], size[1], size[2], transfer[0], transfer[1]
    )
}
