//! Verify or create a target's directory layout

use anyhow::{Context, Result};
use backup::Target;
use owo_colors::OwoColorize;

pub fn run(target: &impl Target, create: bool, noop: bool, report: bool) -> Result<()> {
    if create && noop {
        tracing::warn!("noop: not creating missing directories");
    }

    target
        .setup(create && !noop)
        .with_context(|| format!("Target setup failed for {}", target.root().display()))?;

    if report {
        println!("{} {} is ready", "✓".green(), target.root().display());
    }

    Ok(())
}
