//! Per-target actions

pub mod backup;
pub mod purge;
pub mod restore;
pub mod setup;
pub mod stats;

use anyhow::Result;
use ::backup::Target;
use std::process::ExitCode;

/// What to do with each target, in this order
#[derive(Debug, Clone, Default)]
pub struct Actions {
    pub setup: bool,
    pub create: bool,
    /// Snapshot name, or `latest`
    pub restore: Option<String>,
    pub backup: bool,
    pub purge: bool,
    pub stats: bool,
    pub noop: bool,
}

/// Run the requested actions against one target
///
/// The layout is always verified first; creation only happens with
/// `create`.
pub fn run_target(target: &impl Target, actions: &Actions) -> Result<()> {
    setup::run(target, actions.create, actions.noop, actions.setup || actions.create)?;

    if let Some(snapshot) = &actions.restore {
        restore::run(target, snapshot)?;
    }

    if actions.backup {
        backup::run(target, chrono::Local::now().naive_local())?;
    }

    if actions.purge {
        purge::run(target)?;
    }

    if actions.stats {
        stats::run(target)?;
    }

    Ok(())
}

/// Overall result of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
    Success,
    /// Something went wrong while operating on a target
    Failed,
    /// Arguments, configuration or target layout are wrong
    ConfigError,
}

impl Outcome {
    /// Classify a target failure
    pub fn of_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<::backup::Error>() {
            Some(err) if err.is_config() => Outcome::ConfigError,
            _ => Outcome::Failed,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Failed => ExitCode::from(1),
            Outcome::ConfigError => ExitCode::from(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::path::PathBuf;

    #[test]
    fn test_outcome_classification() {
        let config: anyhow::Error = Err::<(), _>(::backup::Error::MissingDirectory(PathBuf::from("/x")))
            .context("Target setup failed")
            .unwrap_err();
        let failed: anyhow::Error = Err::<(), _>(::backup::Error::SnapshotExists("s".to_string()))
            .context("Backup failed")
            .unwrap_err();
        let other = anyhow::anyhow!("boom");

        assert_eq!(Outcome::of_error(&config), Outcome::ConfigError);
        assert_eq!(Outcome::of_error(&failed), Outcome::Failed);
        assert_eq!(Outcome::of_error(&other), Outcome::Failed);
    }

    #[test]
    fn test_worst_outcome_wins() {
        let outcomes = [Outcome::Success, Outcome::ConfigError, Outcome::Failed];

        assert_eq!(outcomes.into_iter().max(), Some(Outcome::ConfigError));
    }
}
