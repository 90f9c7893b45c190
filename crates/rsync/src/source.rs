//! rsync source specifications

use crate::volume::{SnapshotMount, Volume};
use crate::{Error, Result};
use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Where a snapshot is copied from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Absolute local filesystem path
    Local(PathBuf),
    /// `host:path`, handed to rsync verbatim
    Remote(String),
    /// A path inside a volume that is snapshotted and mounted for each run
    Volume(Volume),
}

impl Source {
    /// Parse a source specification
    ///
    /// A trailing `/` is significant to rsync (copy contents, not the
    /// directory itself) and survives normalization.
    ///
    /// `lvm:VG/LV[/PATH]` and `zfs:DATASET` or `zfs:/MOUNTED/PATH` name
    /// volume sources.
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::Source {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        if spec.is_empty() {
            return Err(invalid("no path given"));
        }

        if spec.starts_with('/') {
            let normalized = normalize_keeping_slash(spec);
            tracing::debug!("filesystem source: {:?}", normalized);
            return Ok(Source::Local(PathBuf::from(normalized)));
        }

        if let Some(rest) = spec.strip_prefix("lvm:") {
            let volume = Volume::parse_lvm(rest).map_err(|reason| invalid(&reason))?;
            tracing::debug!("lvm source: {}", volume);
            return Ok(Source::Volume(volume));
        }

        if let Some(rest) = spec.strip_prefix("zfs:") {
            if rest.is_empty() {
                return Err(invalid("no zfs dataset given"));
            }
            let rest = if rest.starts_with('/') {
                normalize_keeping_slash(rest).to_string_lossy().into_owned()
            } else {
                rest.to_string()
            };
            return Ok(Source::Volume(Volume::Zfs(rest)));
        }

        if spec.contains(':') {
            tracing::debug!("remote source: {}", spec);
            return Ok(Source::Remote(spec.to_string()));
        }

        Err(invalid("unknown path format"))
    }

    /// The argument passed to rsync, for sources that need no mounting
    pub fn as_arg(&self) -> Option<OsString> {
        match self {
            Source::Local(path) => Some(path.clone().into_os_string()),
            Source::Remote(spec) => Some(OsString::from(spec)),
            Source::Volume(_) => None,
        }
    }

    /// Make the source readable for one transfer
    ///
    /// Volume sources are snapshotted and mounted read-only until the
    /// returned value is dropped.
    pub fn mount(&self, sudo: bool) -> Result<MountedSource> {
        match self {
            Source::Local(_) | Source::Remote(_) => Ok(MountedSource {
                arg: self.as_arg().unwrap_or_default(),
                _mount: None,
            }),
            Source::Volume(volume) => {
                let mount = volume.mount_snapshot(sudo)?;
                Ok(MountedSource {
                    arg: mount.source_arg(),
                    _mount: Some(mount),
                })
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local(path) => write!(f, "{}", path.display()),
            Source::Remote(spec) => f.write_str(spec),
            Source::Volume(volume) => write!(f, "{}", volume),
        }
    }
}

/// A source ready to be handed to rsync
pub struct MountedSource {
    arg: OsString,
    _mount: Option<SnapshotMount>,
}

impl MountedSource {
    pub fn arg(&self) -> &OsString {
        &self.arg
    }
}

fn normalize_keeping_slash(spec: &str) -> OsString {
    let mut normalized = normalize(Path::new(spec)).into_os_string();
    if spec.ends_with('/') && normalized != "/" {
        normalized.push("/");
    }
    normalized
}

/// Lexically collapse `.`, `..` and repeated separators
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}
