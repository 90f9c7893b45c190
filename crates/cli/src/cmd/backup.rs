//! Create a snapshot and link it into every interval

use anyhow::{Context, Result};
use backup::Target;
use chrono::NaiveDateTime;
use owo_colors::OwoColorize;

pub fn run(target: &impl Target, now: NaiveDateTime) -> Result<()> {
    let snapshot = target
        .backup(now)
        .with_context(|| format!("Backup failed for {}", target.root().display()))?;

    println!(
        "{} Created snapshot {} in {}",
        "✓".green(),
        snapshot.cyan(),
        target.root().display()
    );

    Ok(())
}
