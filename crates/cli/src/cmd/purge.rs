//! Prune interval pointers and collect unreferenced snapshots

use anyhow::{Context, Result};
use backup::Target;
use owo_colors::OwoColorize;

pub fn run(target: &impl Target) -> Result<()> {
    let root = target.root().display();

    // 1. Drop pointers beyond each interval's limit
    let unlinked = target
        .prune()
        .with_context(|| format!("Interval pruning failed for {}", root))?;

    // 2. Remove snapshots nothing points at any more
    let metrics = target
        .collect()
        .with_context(|| format!("Garbage collection failed for {}", root))?;

    println!("{} {}", "Purge complete:".bold(), root);

    if unlinked.is_empty() && metrics.purged.is_empty() {
        println!("{}", "  No garbage found - target is already clean".dimmed());
    } else {
        println!("  Pointers removed:  {}", unlinked.len().to_string().yellow());
        println!("  Snapshots purged:  {}", metrics.purged.len().to_string().yellow());
        for name in &metrics.purged {
            println!("    {}", name.dimmed());
        }
    }

    if !metrics.pending.is_empty() {
        println!(
            "  Pending snapshots: {} ({})",
            metrics.pending.len().to_string().yellow(),
            metrics.pending.join(", ")
        );
    }

    if !metrics.dangling.is_empty() {
        println!(
            "  {} {}",
            "Dangling references:".red(),
            metrics.dangling.join(", ")
        );
    }

    Ok(())
}
