//! Running rsync

use crate::{Error, Options, Result, Source, Stats};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const RSYNC: &str = "/usr/bin/rsync";
pub const SUDO: &str = "/usr/bin/sudo";

/// A file synchronization tool that can populate a snapshot directory
///
/// On success `dest` holds a complete copy of `source`, with unchanged
/// files hardlinked against `link_dest` when one is given. On failure
/// `dest` is left in whatever partial state the tool produced.
pub trait SyncTool {
    fn sync(
        &self,
        source: &Source,
        dest: &Path,
        link_dest: Option<&Path>,
        options: &Options,
    ) -> Result<Option<Stats>>;

    /// Copy the contents of a snapshot directory back onto `source`
    fn restore(&self, snapshot: &Path, source: &Source, options: &Options)
        -> Result<Option<Stats>>;
}

/// `/usr/bin/rsync`, optionally run under sudo
#[derive(Debug, Clone)]
pub struct Rsync {
    binary: PathBuf,
    sudo: bool,
}

impl Default for Rsync {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(RSYNC),
            sudo: false,
        }
    }
}

impl Rsync {
    pub fn new(binary: impl Into<PathBuf>, sudo: bool) -> Self {
        Self {
            binary: binary.into(),
            sudo,
        }
    }

    /// Full argument vector, program first
    pub fn command_line(
        &self,
        from: &OsStr,
        to: &OsStr,
        link_dest: Option<&Path>,
        options: &Options,
    ) -> Vec<OsString> {
        let mut options = options.clone();
        if let Some(link_dest) = link_dest {
            // rsync resolves --link-dest relative to the destination
            options.set("link-dest", link_dest);
        }

        let mut argv = vec![self.binary.clone().into_os_string()];
        argv.extend(options.to_args());
        argv.push(from.to_os_string());
        argv.push(to.to_os_string());
        sudo_prefix(self.sudo, argv)
    }

    fn run(&self, argv: &[OsString]) -> Result<Option<Stats>> {
        let stdout = invoke(argv)?;

        let stats = Stats::parse(&stdout);
        if stats.is_none() {
            tracing::warn!("no usable --stats output from rsync");
        }

        Ok(stats)
    }
}

impl SyncTool for Rsync {
    fn sync(
        &self,
        source: &Source,
        dest: &Path,
        link_dest: Option<&Path>,
        options: &Options,
    ) -> Result<Option<Stats>> {
        // Volume snapshots stay mounted until the transfer is done
        let mounted = source.mount(self.sudo)?;

        let argv = self.command_line(mounted.arg(), dest.as_os_str(), link_dest, options);
        self.run(&argv)
    }

    fn restore(
        &self,
        snapshot: &Path,
        source: &Source,
        options: &Options,
    ) -> Result<Option<Stats>> {
        let Some(dest) = source.as_arg() else {
            return Err(Error::Source {
                spec: source.to_string(),
                reason: "cannot restore into a volume snapshot source".to_string(),
            });
        };

        // Trailing slash: copy the snapshot's contents, not the directory
        let mut from = snapshot.as_os_str().to_os_string();
        from.push("/");

        let argv = self.command_line(&from, &dest, None, options);
        self.run(&argv)
    }
}

/// Prefix `argv` with sudo when requested
pub(crate) fn sudo_prefix(sudo: bool, argv: Vec<OsString>) -> Vec<OsString> {
    if !sudo {
        return argv;
    }

    let mut prefixed = vec![OsString::from(SUDO)];
    prefixed.extend(argv);
    prefixed
}

/// Run a command to completion, returning its stdout
///
/// A non-zero exit becomes `Error::Exit` carrying stderr.
pub(crate) fn invoke(argv: &[OsString]) -> Result<String> {
    let command_line = argv
        .iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");

    let Some((program, args)) = argv.split_first() else {
        return Err(Error::Option("empty command line".to_string()));
    };

    tracing::info!("{}", command_line);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| Error::Spawn {
            command: command_line.clone(),
            source,
        })?;

    tracing::debug!("{} exit {}", program.to_string_lossy(), output.status);

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::warn!("{} error: {}", program.to_string_lossy(), stderr);
        return Err(Error::Exit {
            command: command_line,
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
