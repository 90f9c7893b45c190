//! hardsnap - rotating rsync snapshot backups

use anyhow::Result;
use backup::RsyncTarget;
use clap::{ArgGroup, Parser};
use hardsnap::cmd::{self, Actions, Outcome};
use hardsnap::{config, logging};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::filter::LevelFilter;

/// Hardlinked rsync snapshots with interval retention
#[derive(Parser)]
#[command(name = "hardsnap")]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("actions")
        .required(true)
        .multiple(true)
        .args(["setup", "create", "restore", "backup", "purge", "stats"])
))]
struct Cli {
    /// Only log errors
    #[arg(short, long, group = "verbosity")]
    quiet: bool,

    /// Log progress
    #[arg(short, long, group = "verbosity")]
    verbose: bool,

    /// Log everything
    #[arg(short = 'D', long, group = "verbosity")]
    debug: bool,

    /// Raise one module to debug logging (e.g. backup::gc)
    #[arg(long = "debug-module", value_name = "MODULE")]
    debug_modules: Vec<String>,

    /// Configuration file (default: ~/.config/hardsnap/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Show what would change without changing anything
    #[arg(short, long)]
    noop: bool,

    /// Verify the target layout
    #[arg(long)]
    setup: bool,

    /// Create missing target directories
    #[arg(long)]
    create: bool,

    /// Copy a snapshot (or `latest`) back onto the source
    #[arg(long, value_name = "SNAPSHOT", conflicts_with_all = ["backup", "purge"])]
    restore: Option<String>,

    /// Take a snapshot and link it into every interval
    #[arg(long)]
    backup: bool,

    /// Prune interval pointers and remove unreferenced snapshots
    #[arg(long)]
    purge: bool,

    /// Show per-snapshot transfer statistics
    #[arg(long)]
    stats: bool,

    /// rsync source, overriding the configuration
    #[arg(long, value_name = "SRC")]
    source: Option<String>,

    /// Extra rsync option: OPT, OPT=VALUE or OPT= to drop a default
    #[arg(long = "rsync-option", value_name = "OPT")]
    rsync_options: Vec<String>,

    /// Interval as [LIMIT@]NAME:STRFTIME, replacing configured intervals
    #[arg(long = "interval", value_name = "SPEC")]
    intervals: Vec<String>,

    /// Run rsync through sudo
    #[arg(long)]
    sudo: bool,

    /// Target root directories
    #[arg(required = true, value_name = "TARGET")]
    targets: Vec<PathBuf>,
}

impl Cli {
    fn level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::DEBUG
        } else if self.verbose {
            LevelFilter::INFO
        } else if self.quiet {
            LevelFilter::ERROR
        } else {
            LevelFilter::WARN
        }
    }

    fn actions(&self) -> Actions {
        Actions {
            setup: self.setup,
            create: self.create,
            restore: self.restore.clone(),
            backup: self.backup,
            purge: self.purge,
            stats: self.stats,
            noop: self.noop,
        }
    }

    /// Configuration file with command-line overrides applied
    fn load_config(&self) -> Result<config::Config> {
        let mut config = config::load(self.config.as_deref())?;

        if let Some(source) = &self.source {
            config.rsync.source = Some(source.clone());
        }
        config.rsync.options.extend(self.rsync_options.iter().cloned());
        if !self.intervals.is_empty() {
            config.retention.intervals = self.intervals.clone();
        }
        if self.sudo {
            config.rsync.sudo = true;
        }

        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(cli.level(), &cli.debug_modules);

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{:#}", err);
            return Outcome::ConfigError.into();
        }
    };

    let target_config = match config.to_target_config(cli.noop, cli.create) {
        Ok(target_config) => target_config,
        Err(err) => {
            tracing::error!("{:#}", err);
            return Outcome::ConfigError.into();
        }
    };

    let actions = cli.actions();
    let mut outcome = Outcome::Success;

    for root in &cli.targets {
        let span = tracing::info_span!("target", root = %root.display());
        let _enter = span.enter();

        let target = RsyncTarget::new(root, config.rsync(), target_config.clone());

        if let Err(err) = cmd::run_target(&target, &actions) {
            tracing::error!("{:#}", err);
            outcome = outcome.max(Outcome::of_error(&err));
        }
    }

    outcome.into()
}
