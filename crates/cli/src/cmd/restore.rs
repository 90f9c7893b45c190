//! Copy a snapshot back onto the source

use anyhow::{Context, Result};
use backup::Target;
use owo_colors::OwoColorize;

/// Name accepted in place of a snapshot for the latest one
pub const LATEST: &str = "latest";

pub fn run(target: &impl Target, snapshot: &str) -> Result<()> {
    let snapshot = (snapshot != LATEST).then_some(snapshot);

    let restored = target
        .restore(snapshot)
        .with_context(|| format!("Restore failed for {}", target.root().display()))?;

    println!(
        "{} Restored snapshot {} from {}",
        "✓".green(),
        restored.cyan(),
        target.root().display()
    );

    Ok(())
}
