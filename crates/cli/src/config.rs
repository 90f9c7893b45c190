//! Configuration for hardsnap
//!
//! Stored at `~/.config/hardsnap/config.toml` (Linux) or the platform
//! equivalent, unless `--config` names another file. Command-line options
//! are layered on top before targets are built.

use anyhow::{Context, Result};
use backup::{Interval, TargetConfig};
use rsync::{Options, Rsync, Source, RSYNC};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// hardsnap configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How snapshots are copied
    pub rsync: RsyncConfig,

    /// Which interval pointers are kept
    pub retention: RetentionConfig,
}

/// rsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RsyncConfig {
    /// Source path, `host:path`, `lvm:VG/LV[/PATH]` or `zfs:DATASET`
    pub source: Option<String>,

    /// Extra options: `OPT`, `OPT=VALUE` or `OPT=` to drop a default
    pub options: Vec<String>,

    /// Run rsync through sudo
    pub sudo: bool,

    /// rsync executable (default: /usr/bin/rsync)
    pub binary: PathBuf,
}

impl Default for RsyncConfig {
    fn default() -> Self {
        Self {
            source: None,
            options: Vec::new(),
            sudo: false,
            binary: PathBuf::from(RSYNC),
        }
    }
}

/// Retention configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// `[LIMIT@]NAME:STRFTIME`, applied in order
    pub intervals: Vec<String>,
}

impl Config {
    /// The rsync invocation to use
    pub fn rsync(&self) -> Rsync {
        Rsync::new(&self.rsync.binary, self.rsync.sudo)
    }

    /// Parse everything a target needs
    pub fn to_target_config(&self, noop: bool, create: bool) -> Result<TargetConfig> {
        let source = self
            .rsync
            .source
            .as_deref()
            .map(Source::parse)
            .transpose()
            .context("Invalid rsync source")?;

        let mut options = Options::defaults();
        for opt in &self.rsync.options {
            options.apply(opt).context("Invalid rsync option")?;
        }

        let intervals = self
            .retention
            .intervals
            .iter()
            .map(|spec| spec.parse::<Interval>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid interval")?;

        Ok(TargetConfig {
            source,
            options,
            intervals,
            noop,
            create,
        })
    }
}

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|c| c.join("hardsnap"))
}

/// Get the default config file path
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration
///
/// An explicit path must exist. The default location is optional and
/// yields defaults when absent.
pub fn load(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return load_from(path);
    }

    let config_path = match config_file_path() {
        Some(p) => p,
        None => {
            tracing::debug!("Could not determine config directory, using defaults");
            return Ok(Config::default());
        }
    };

    if !config_path.exists() {
        tracing::debug!("Config not found at {}, using defaults", config_path.display());
        return Ok(Config::default());
    }

    load_from(&config_path)
}

/// Load configuration from a specific file
pub fn load_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;

    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}
