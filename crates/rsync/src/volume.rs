//! Volume snapshot sources
//!
//! An LVM logical volume or ZFS dataset is snapshotted and the snapshot is
//! mounted read-only on a temporary mountpoint, so rsync copies a
//! consistent point-in-time view. Everything is torn down again when the
//! `SnapshotMount` is dropped; teardown failures are logged, not raised.

use crate::command::{invoke, sudo_prefix};
use crate::{Error, Result};
use chrono::Local;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const LVCREATE: &str = "/sbin/lvcreate";
pub const LVREMOVE: &str = "/sbin/lvremove";
pub const ZFS: &str = "/sbin/zfs";
pub const MOUNT: &str = "/bin/mount";
pub const UMOUNT: &str = "/bin/umount";

const PROC_MOUNTS: &str = "/proc/mounts";

/// Tag placed on LVM snapshots
const SNAPSHOT_TAG: &str = "backup";

/// Copy-on-write space reserved for an LVM snapshot
const LVM_SNAPSHOT_EXTENTS: &str = "10%ORIGIN";

/// A volume that can be snapshotted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Volume {
    /// LVM logical volume, with a path inside its filesystem
    Lvm { vg: String, lv: String, path: String },
    /// ZFS dataset name, or an absolute path on a mounted ZFS filesystem
    Zfs(String),
}

impl Volume {
    /// Parse `VG/LV[/PATH]` (or the older `VG:LV[/PATH]`)
    pub(crate) fn parse_lvm(spec: &str) -> std::result::Result<Self, String> {
        let (vg, rest) = if let Some((vg, rest)) = spec.split_once(':') {
            tracing::warn!("old 'lvm:{}:{}' syntax; use 'lvm:{}/{}'", vg, rest, vg, rest);
            (vg, rest)
        } else if let Some((vg, rest)) = spec.split_once('/') {
            (vg, rest)
        } else {
            return Err("invalid vg/lv separator".to_string());
        };

        let (lv, path) = rest.split_once('/').unwrap_or((rest, ""));

        if vg.is_empty() || lv.is_empty() {
            return Err("missing volume group or logical volume".to_string());
        }

        Ok(Volume::Lvm {
            vg: vg.to_string(),
            lv: lv.to_string(),
            path: path.trim_start_matches('/').to_string(),
        })
    }

    /// Snapshot the volume and mount the snapshot read-only
    pub fn mount_snapshot(&self, sudo: bool) -> Result<SnapshotMount> {
        match self {
            Volume::Lvm { vg, lv, path } => {
                tracing::info!("creating LVM snapshot of {}/{}", vg, lv);
                let snapshot = VolumeSnapshot::lvm(vg, lv, sudo)?;

                let hint = format!("lvm_{}_", snapshot.name());
                let mount = Mount::new(&snapshot.device(), None, &hint, sudo)?;

                Ok(SnapshotMount {
                    mount,
                    snapshot,
                    path: path.clone(),
                })
            }
            Volume::Zfs(spec) => {
                let (dataset, path) = if spec.starts_with('/') {
                    self.resolve_zfs_mount(spec)?
                } else {
                    (spec.clone(), String::new())
                };

                tracing::info!("creating ZFS snapshot of {}", dataset);
                let snapshot = VolumeSnapshot::zfs(&dataset, &path, sudo)?;

                let hint = format!("zfs_{}_", dataset.replace('/', "_"));
                let mount = Mount::new(&snapshot.device(), Some("zfs"), &hint, sudo)?;

                Ok(SnapshotMount {
                    mount,
                    snapshot,
                    path,
                })
            }
        }
    }

    /// The dataset mounted at or above `spec`, and the path below it
    fn resolve_zfs_mount(&self, spec: &str) -> Result<(String, String)> {
        let mounts = fs::read_to_string(PROC_MOUNTS).map_err(|source| Error::Io {
            context: format!("failed to read {}", PROC_MOUNTS),
            source,
        })?;

        let invalid = |reason: String| Error::Source {
            spec: self.to_string(),
            reason,
        };

        let entry = find_mount(&mounts, Path::new(spec))
            .ok_or_else(|| invalid("no mount found".to_string()))?;

        if entry.fstype != "zfs" {
            return Err(invalid(format!(
                "not a ZFS mount: {} is {}",
                entry.mountpoint.display(),
                entry.fstype
            )));
        }

        let mut path = Path::new(spec)
            .strip_prefix(&entry.mountpoint)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        if spec.ends_with('/') && !path.is_empty() {
            path.push('/');
        }

        tracing::debug!("{}: dataset={} path={}", spec, entry.device, path);
        Ok((entry.device, path))
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Volume::Lvm { vg, lv, path } if path.is_empty() => write!(f, "lvm:{}/{}", vg, lv),
            Volume::Lvm { vg, lv, path } => write!(f, "lvm:{}/{}/{}", vg, lv, path),
            Volume::Zfs(spec) => write!(f, "zfs:{}", spec),
        }
    }
}

/// A mounted volume snapshot
pub struct SnapshotMount {
    // Fields drop in order: unmount before the snapshot is removed
    mount: Mount,
    snapshot: VolumeSnapshot,
    path: String,
}

impl SnapshotMount {
    pub fn mountpoint(&self) -> &Path {
        &self.mount.path
    }

    /// `MOUNTPOINT/PATH`, handed to rsync as the transfer source
    pub fn source_arg(&self) -> OsString {
        let mut arg = self.mount.path.clone().into_os_string();
        arg.push("/");
        arg.push(&self.path);
        arg
    }
}

impl fmt::Debug for SnapshotMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotMount")
            .field("snapshot", &self.snapshot.name())
            .field("mountpoint", &self.mount.path)
            .field("path", &self.path)
            .finish()
    }
}

enum VolumeSnapshot {
    Lvm { vg: String, name: String, sudo: bool },
    Zfs { name: String, sudo: bool },
}

impl VolumeSnapshot {
    fn lvm(vg: &str, lv: &str, sudo: bool) -> Result<Self> {
        let name = format!("{}-hardsnap", lv);
        invoke(&sudo_prefix(sudo, lvcreate_args(vg, lv, &name)))?;

        Ok(VolumeSnapshot::Lvm {
            vg: vg.to_string(),
            name,
            sudo,
        })
    }

    fn zfs(dataset: &str, path: &str, sudo: bool) -> Result<Self> {
        let name = format!("{}@hardsnap-{}", dataset, Local::now().format("%Y%m%d-%H%M%S"));
        invoke(&sudo_prefix(sudo, zfs_snapshot_args(&name, path)))?;

        Ok(VolumeSnapshot::Zfs { name, sudo })
    }

    fn name(&self) -> &str {
        match self {
            VolumeSnapshot::Lvm { name, .. } | VolumeSnapshot::Zfs { name, .. } => name,
        }
    }

    /// What `mount` is given
    fn device(&self) -> OsString {
        match self {
            VolumeSnapshot::Lvm { vg, name, .. } => {
                Path::new("/dev").join(vg).join(name).into_os_string()
            }
            VolumeSnapshot::Zfs { name, .. } => OsString::from(name),
        }
    }
}

impl Drop for VolumeSnapshot {
    fn drop(&mut self) {
        let argv = match self {
            VolumeSnapshot::Lvm { vg, name, sudo } => sudo_prefix(*sudo, lvremove_args(vg, name)),
            VolumeSnapshot::Zfs { name, sudo } => sudo_prefix(*sudo, zfs_destroy_args(name)),
        };

        tracing::debug!("removing snapshot {}", self.name());
        if let Err(err) = invoke(&argv) {
            tracing::warn!("cleanup: snapshot {}: {}", self.name(), err);
        }
    }
}

/// A read-only mount on a temporary mountpoint
struct Mount {
    path: PathBuf,
    sudo: bool,
}

impl Mount {
    fn new(device: &OsStr, fstype: Option<&str>, name_hint: &str, sudo: bool) -> Result<Self> {
        let path = tempfile::Builder::new()
            .prefix(name_hint)
            .suffix(".mnt")
            .tempdir()
            .map_err(|source| Error::Io {
                context: "failed to create mountpoint".to_string(),
                source,
            })?
            .keep();

        tracing::debug!("mount: {} -> {}", device.to_string_lossy(), path.display());

        if let Err(err) = invoke(&sudo_prefix(sudo, mount_args(device, &path, fstype))) {
            if let Err(rm) = fs::remove_dir(&path) {
                tracing::warn!("cleanup: mountpoint {}: {}", path.display(), rm);
            }
            return Err(err);
        }

        Ok(Self { path, sudo })
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        tracing::debug!("umount: {}", self.path.display());

        if let Err(err) = invoke(&sudo_prefix(self.sudo, umount_args(&self.path))) {
            // Never remove a directory that may still have a filesystem on it
            tracing::warn!("cleanup: umount {}: {}", self.path.display(), err);
            return;
        }

        if let Err(err) = fs::remove_dir(&self.path) {
            tracing::warn!("cleanup: mountpoint {}: {}", self.path.display(), err);
        }
    }
}

/// One `/proc/mounts` entry
#[derive(Debug, Clone, PartialEq, Eq)]
struct MountEntry {
    device: String,
    mountpoint: PathBuf,
    fstype: String,
}

/// The innermost mount containing `path`
fn find_mount(mounts: &str, path: &Path) -> Option<MountEntry> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some(MountEntry {
                device: parts.next()?.to_string(),
                mountpoint: PathBuf::from(parts.next()?),
                fstype: parts.next()?.to_string(),
            })
        })
        .filter(|entry| path.starts_with(&entry.mountpoint))
        .max_by_key(|entry| entry.mountpoint.components().count())
}

fn args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    items.into_iter().map(|s| s.as_ref().to_os_string()).collect()
}

fn lvcreate_args(vg: &str, lv: &str, name: &str) -> Vec<OsString> {
    let origin = format!("{}/{}", vg, lv);
    args([
        LVCREATE,
        "--snapshot",
        "--name",
        name,
        "--addtag",
        SNAPSHOT_TAG,
        "--extents",
        LVM_SNAPSHOT_EXTENTS,
        origin.as_str(),
    ])
}

fn lvremove_args(vg: &str, name: &str) -> Vec<OsString> {
    let volume = format!("{}/{}", vg, name);
    args([LVREMOVE, "--force", volume.as_str()])
}

fn zfs_snapshot_args(name: &str, path: &str) -> Vec<OsString> {
    let property = format!("hardsnap:source={}", path);
    args([ZFS, "snapshot", "-o", property.as_str(), name])
}

fn zfs_destroy_args(name: &str) -> Vec<OsString> {
    args([ZFS, "destroy", name])
}

fn mount_args(device: &OsStr, mountpoint: &Path, fstype: Option<&str>) -> Vec<OsString> {
    let mut argv = args([MOUNT]);
    if let Some(fstype) = fstype {
        argv.extend(args(["-t", fstype]));
    }
    argv.push(device.to_os_string());
    argv.push(mountpoint.as_os_str().to_os_string());
    argv.extend(args(["-o", "ro"]));
    argv
}

fn umount_args(mountpoint: &Path) -> Vec<OsString> {
    args([OsStr::new(UMOUNT), mountpoint.as_os_str()])
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTS: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
tank/srv /srv zfs rw,xattr,noacl 0 0
tank/srv/www /srv/www zfs rw,xattr,noacl 0 0
";

    fn strings(argv: Vec<OsString>) -> Vec<String> {
        argv.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_parse_lvm() {
        assert_eq!(
            Volume::parse_lvm("vg0/home"),
            Ok(Volume::Lvm {
                vg: "vg0".to_string(),
                lv: "home".to_string(),
                path: String::new(),
            })
        );
        assert_eq!(
            Volume::parse_lvm("vg0:home/users/"),
            Ok(Volume::Lvm {
                vg: "vg0".to_string(),
                lv: "home".to_string(),
                path: "users/".to_string(),
            })
        );
        assert!(Volume::parse_lvm("vg0").is_err());
        assert!(Volume::parse_lvm("/home").is_err());
    }

    #[test]
    fn test_find_mount_picks_innermost() {
        let entry = find_mount(MOUNTS, Path::new("/srv/www/htdocs")).unwrap();
        assert_eq!(entry.device, "tank/srv/www");
        assert_eq!(entry.mountpoint, PathBuf::from("/srv/www"));
        assert_eq!(entry.fstype, "zfs");

        let entry = find_mount(MOUNTS, Path::new("/srv/wwwdata")).unwrap();
        assert_eq!(entry.device, "tank/srv");

        let entry = find_mount(MOUNTS, Path::new("/home")).unwrap();
        assert_eq!(entry.fstype, "ext4");
    }

    #[test]
    fn test_lvm_commands() {
        assert_eq!(
            strings(lvcreate_args("vg0", "home", "home-hardsnap")),
            vec![
                LVCREATE,
                "--snapshot",
                "--name",
                "home-hardsnap",
                "--addtag",
                "backup",
                "--extents",
                "10%ORIGIN",
                "vg0/home",
            ]
        );
        assert_eq!(
            strings(sudo_prefix(true, lvremove_args("vg0", "home-hardsnap"))),
            vec![crate::SUDO, LVREMOVE, "--force", "vg0/home-hardsnap"]
        );
    }

    #[test]
    fn test_zfs_and_mount_commands() {
        assert_eq!(
            strings(zfs_snapshot_args("tank/srv@hardsnap-20240101-000000", "www/")),
            vec![ZFS, "snapshot", "-o", "hardsnap:source=www/", "tank/srv@hardsnap-20240101-000000"]
        );
        assert_eq!(
            strings(mount_args(
                OsStr::new("tank/srv@s"),
                Path::new("/tmp/zfs_tank_srv_x.mnt"),
                Some("zfs")
            )),
            vec![MOUNT, "-t", "zfs", "tank/srv@s", "/tmp/zfs_tank_srv_x.mnt", "-o", "ro"]
        );
        assert_eq!(
            strings(mount_args(OsStr::new("/dev/vg0/home-hardsnap"), Path::new("/mnt/x"), None)),
            vec![MOUNT, "/dev/vg0/home-hardsnap", "/mnt/x", "-o", "ro"]
        );
    }

    #[test]
    fn test_display() {
        let volume = Volume::parse_lvm("vg0/home").unwrap();
        assert_eq!(volume.to_string(), "lvm:vg0/home");
        assert_eq!(Volume::Zfs("tank/srv".to_string()).to_string(), "zfs:tank/srv");
    }
}
