//! # Resource records: the in-memory representation of managed disks.
//!
//! Records are created once at process start from command-line configuration,
//! mutated only by the control-loop task (lifecycle actions and the periodic
//! poll), and destroyed only at process exit.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::disk::stats::{DiskStats, StatsSampler};

/// Lifecycle status of one disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskStatus {
    /// Not yet initialized.
    Init,
    /// Initialized and healthy.
    Ok,
    /// Failed; out of service until re-initialized or restarted.
    Bad,
    /// Deliberately taken out of service.
    Stop,
}

impl DiskStatus {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(self) -> &'static str {
        match self {
            DiskStatus::Init => "init",
            DiskStatus::Ok => "ok",
            DiskStatus::Bad => "bad",
            DiskStatus::Stop => "stop",
        }
    }

    /// Wire code used in the published snapshot.
    pub fn code(self) -> i16 {
        match self {
            DiskStatus::Init => 0,
            DiskStatus::Ok => 1,
            DiskStatus::Bad => 2,
            DiskStatus::Stop => 3,
        }
    }
}

/// Per-disk flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskFlags {
    /// Development device: external tooling is skipped, statistics are
    /// synthesized, but the full lifecycle applies.
    pub simulated: bool,
    /// The filesystem was not cleanly unmounted last time. Informational;
    /// initialization still succeeds (availability over strict consistency).
    pub corrupted: bool,
}

impl DiskFlags {
    /// Wire bitmask used in the published snapshot.
    pub fn bits(self) -> i16 {
        (self.simulated as i16) | ((self.corrupted as i16) << 1)
    }
}

/// One `--device` occurrence: a device name, optionally marked simulated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    pub name: String,
    pub simulated: bool,
}

impl FromStr for DiskSpec {
    type Err = String;

    /// Parses `NAME` or `NAME:sim`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, modifier) = match s.split_once(':') {
            Some((name, modifier)) => (name, Some(modifier)),
            None => (s, None),
        };
        if name.is_empty() || name.contains('/') {
            return Err(format!("invalid device name {s:?}"));
        }
        let simulated = match modifier {
            None => false,
            Some("sim") => true,
            Some(other) => return Err(format!("unknown device modifier {other:?}")),
        };
        Ok(Self {
            name: name.to_string(),
            simulated,
        })
    }
}

/// In-memory representation of one managed disk.
#[derive(Debug, Clone)]
pub struct DiskRecord {
    /// Device name as configured (`sdb`, `vdiskA`).
    pub name: String,
    /// Opaque device identifier published in the snapshot.
    pub id: [u8; 8],
    /// Lifecycle status.
    pub status: DiskStatus,
    /// Flags.
    pub flags: DiskFlags,
    /// Filesystem identifier, once probed or created.
    pub fs_uuid: Option<String>,
    /// Block-device path (`/dev/<name>`; unused for simulated disks).
    pub device_path: PathBuf,
    /// Mount point, which is also the exported path.
    pub mount_path: PathBuf,
    /// Latest statistics snapshot.
    pub stats: DiskStats,
    /// Whether the disk is currently mounted and exported.
    pub started: bool,
    /// Counter-delta state behind `stats`; not published.
    pub sampler: StatsSampler,
}

impl DiskRecord {
    /// Builds a record from its spec; status starts at INIT.
    pub fn new(spec: &DiskSpec, mount_root: &Path) -> Self {
        Self {
            id: device_id(&spec.name),
            device_path: PathBuf::from("/dev").join(&spec.name),
            mount_path: mount_root.join(&spec.name),
            name: spec.name.clone(),
            status: DiskStatus::Init,
            flags: DiskFlags {
                simulated: spec.simulated,
                corrupted: false,
            },
            fs_uuid: None,
            stats: DiskStats::default(),
            started: false,
            sampler: StatsSampler::default(),
        }
    }
}

/// Stable-for-the-process opaque identifier derived from the device name.
fn device_id(name: &str) -> [u8; 8] {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish().to_be_bytes()
}
