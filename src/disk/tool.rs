//! # External disk tooling, behind a trait seam.
//!
//! Mount, export, and filesystem operations are delegated to the platform's
//! own tools as child processes. Every invocation is bounded by an explicit
//! timeout (short for routine operations, long for filesystem creation); a
//! child that exceeds its deadline is killed and the operation reported
//! failed — a stuck tool must never hang the control loop.
//!
//! The trait seam exists because lifecycle behavior is tested against fake
//! tooling; [`SystemDiskTool`] is the production implementation.
//!
//! ## Export verification
//! The export tool's exit status is not trusted: after exporting (or
//! revoking) a path, callers confirm the change through
//! [`DiskTool::is_exported`], which consults the tool's own listing.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::error;

use crate::disk::stats::BlockCounters;
use crate::disk::HealthAttrs;

/// Version string written into the layout sentinel file.
const LAYOUT_VERSION: &str = "1";

/// Sentinel file guarding one-time creation of the marker layout.
const LAYOUT_SENTINEL: &str = ".format";

/// Errors from external tooling.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ToolError {
    /// The child process exceeded its deadline and was killed.
    #[error("{cmd} timed out after {timeout:?}")]
    Timeout { cmd: String, timeout: Duration },

    /// The child exited unsuccessfully.
    #[error("{cmd} failed with status {code}: {stderr}")]
    Failed {
        cmd: String,
        code: i32,
        stderr: String,
    },

    /// The child's output could not be interpreted.
    #[error("{cmd} output not understood: {detail}")]
    Parse { cmd: String, detail: String },

    /// Spawn or pipe failure.
    #[error("tool i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ToolError::Timeout { .. } => "tool_timeout",
            ToolError::Failed { .. } => "tool_failed",
            ToolError::Parse { .. } => "tool_parse",
            ToolError::Io(_) => "tool_io",
        }
    }
}

/// Result of probing a device for an existing filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsProbe {
    /// Filesystem identifier.
    pub uuid: String,
    /// Whether the filesystem was cleanly unmounted last time.
    pub clean: bool,
}

/// Capability surface the lifecycle manager consumes.
#[async_trait]
pub trait DiskTool: Send + Sync + 'static {
    /// Unmounts `path`. Idempotent: "not mounted" is success.
    async fn unmount(&self, path: &Path) -> Result<(), ToolError>;

    /// Probes `dev` for an existing filesystem; `None` when the device
    /// carries no recognizable filesystem.
    async fn probe_fs(&self, dev: &Path) -> Result<Option<FsProbe>, ToolError>;

    /// Creates a fresh filesystem on `dev` and returns its identifier.
    async fn make_fs(&self, dev: &Path) -> Result<String, ToolError>;

    /// Mounts `dev` at `path`.
    async fn mount(&self, dev: &Path, path: &Path) -> Result<(), ToolError>;

    /// Exports `path` for network access.
    async fn export(&self, path: &Path) -> Result<(), ToolError>;

    /// Revokes the export of `path`.
    async fn unexport(&self, path: &Path) -> Result<(), ToolError>;

    /// Whether `path` is currently exported, per the export tool's listing.
    async fn is_exported(&self, path: &Path) -> Result<bool, ToolError>;

    /// Whether the marker layout already exists under `path`.
    async fn has_layout(&self, path: &Path) -> Result<bool, ToolError>;

    /// Creates the marker layout under `path`.
    async fn create_layout(&self, path: &Path) -> Result<(), ToolError>;

    /// Filesystem usage of `path`: `(capacity, available)` in bytes.
    async fn fs_usage(&self, path: &Path) -> Result<(u64, u64), ToolError>;

    /// Cumulative block-layer counters for the named device.
    async fn block_counters(&self, name: &str) -> Result<BlockCounters, ToolError>;

    /// Drive health attributes for `dev`.
    async fn health_attrs(&self, dev: &Path) -> Result<HealthAttrs, ToolError>;
}

/// Production tooling: platform commands under bounded timeouts.
pub struct SystemDiskTool {
    short: Duration,
    long: Duration,
}

impl SystemDiskTool {
    /// Creates the tool with the given deadlines (short for routine
    /// operations, long for filesystem creation).
    pub fn new(short: Duration, long: Duration) -> Self {
        Self { short, long }
    }

    /// Runs one child process to completion within `timeout`.
    async fn run(
        &self,
        timeout: Duration,
        program: &str,
        args: &[&str],
    ) -> Result<String, ToolError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(waited) => waited?,
            Err(_) => {
                error!(cmd = program, ?timeout, "external command over deadline; killing");
                child.start_kill().ok();
                let _ = child.wait().await;
                return Err(ToolError::Timeout {
                    cmd: program.to_string(),
                    timeout,
                });
            }
        };

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_string(&mut stdout).await?;
        }
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                pipe.read_to_string(&mut stderr).await?;
            }
            return Err(ToolError::Failed {
                cmd: program.to_string(),
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

#[async_trait]
impl DiskTool for SystemDiskTool {
    async fn unmount(&self, path: &Path) -> Result<(), ToolError> {
        let target = path.to_string_lossy();
        match self.run(self.short, "umount", &[target.as_ref()]).await {
            Ok(_) => Ok(()),
            Err(ToolError::Failed { stderr, .. }) if stderr.contains("not mounted") => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn probe_fs(&self, dev: &Path) -> Result<Option<FsProbe>, ToolError> {
        let dev_str = dev.to_string_lossy();
        let uuid = match self
            .run(
                self.short,
                "blkid",
                &["-o", "value", "-s", "UUID", dev_str.as_ref()],
            )
            .await
        {
            Ok(out) => out.trim().to_string(),
            // blkid exits 2 when the device carries no recognizable filesystem.
            Err(ToolError::Failed { code: 2, .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        if uuid.is_empty() {
            return Ok(None);
        }
        let state = self
            .run(self.short, "tune2fs", &["-l", dev_str.as_ref()])
            .await?;
        Ok(Some(FsProbe {
            uuid,
            clean: parse_fs_state(&state),
        }))
    }

    async fn make_fs(&self, dev: &Path) -> Result<String, ToolError> {
        let dev_str = dev.to_string_lossy();
        self.run(self.long, "mkfs.ext4", &["-F", "-q", dev_str.as_ref()])
            .await?;
        match self.probe_fs(dev).await? {
            Some(probe) => Ok(probe.uuid),
            None => Err(ToolError::Parse {
                cmd: "mkfs.ext4".to_string(),
                detail: format!("no filesystem identifier on {} after creation", dev.display()),
            }),
        }
    }

    async fn mount(&self, dev: &Path, path: &Path) -> Result<(), ToolError> {
        tokio::fs::create_dir_all(path).await?;
        let dev_str = dev.to_string_lossy();
        let target = path.to_string_lossy();
        self.run(self.short, "mount", &[dev_str.as_ref(), target.as_ref()])
            .await
            .map(|_| ())
    }

    async fn export(&self, path: &Path) -> Result<(), ToolError> {
        let spec = format!("*:{}", path.display());
        self.run(
            self.short,
            "exportfs",
            &["-o", "rw,no_root_squash", spec.as_str()],
        )
        .await
        .map(|_| ())
    }

    async fn unexport(&self, path: &Path) -> Result<(), ToolError> {
        let spec = format!("*:{}", path.display());
        self.run(self.short, "exportfs", &["-u", spec.as_str()])
            .await
            .map(|_| ())
    }

    async fn is_exported(&self, path: &Path) -> Result<bool, ToolError> {
        let listing = self.run(self.short, "exportfs", &["-v"]).await?;
        Ok(listing_contains(&listing, path))
    }

    async fn has_layout(&self, path: &Path) -> Result<bool, ToolError> {
        Ok(tokio::fs::try_exists(path.join(LAYOUT_SENTINEL)).await?)
    }

    async fn create_layout(&self, path: &Path) -> Result<(), ToolError> {
        tokio::fs::create_dir_all(path.join("objects")).await?;
        tokio::fs::create_dir_all(path.join("tmp")).await?;
        tokio::fs::write(path.join(LAYOUT_SENTINEL), format!("{LAYOUT_VERSION}\n")).await?;
        Ok(())
    }

    async fn fs_usage(&self, path: &Path) -> Result<(u64, u64), ToolError> {
        let target = path.to_string_lossy();
        let out = self.run(self.short, "df", &["-kP", target.as_ref()]).await?;
        parse_df(&out).ok_or_else(|| ToolError::Parse {
            cmd: "df".to_string(),
            detail: format!("unparseable usage for {}", path.display()),
        })
    }

    async fn block_counters(&self, name: &str) -> Result<BlockCounters, ToolError> {
        let text = tokio::fs::read_to_string("/proc/diskstats").await?;
        parse_diskstats(&text, name).ok_or_else(|| ToolError::Parse {
            cmd: "diskstats".to_string(),
            detail: format!("device {name} not present"),
        })
    }

    async fn health_attrs(&self, dev: &Path) -> Result<HealthAttrs, ToolError> {
        let dev_str = dev.to_string_lossy();
        let out = self
            .run(self.short, "smartctl", &["-A", dev_str.as_ref()])
            .await?;
        Ok(parse_smart(&out))
    }
}

/// `tune2fs -l` reports `Filesystem state: clean` (possibly with qualifiers
/// such as `clean with errors`; only an unqualified state counts).
fn parse_fs_state(output: &str) -> bool {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Filesystem state:"))
        .map(|state| state.trim() == "clean")
        .unwrap_or(false)
}

/// Second line of `df -kP`: filesystem, 1K-blocks, used, available, …
fn parse_df(output: &str) -> Option<(u64, u64)> {
    let line = output.lines().nth(1)?;
    let mut fields = line.split_whitespace();
    let total_kb: u64 = fields.nth(1)?.parse().ok()?;
    let _used = fields.next()?;
    let avail_kb: u64 = fields.next()?.parse().ok()?;
    Some((total_kb * 1024, avail_kb * 1024))
}

/// Finds the row for `name` in `/proc/diskstats` text.
fn parse_diskstats(text: &str, name: &str) -> Option<BlockCounters> {
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 13 || fields[2] != name {
            continue;
        }
        return Some(BlockCounters {
            reads: fields[3].parse().ok()?,
            read_sectors: fields[5].parse().ok()?,
            writes: fields[7].parse().ok()?,
            write_sectors: fields[9].parse().ok()?,
            io_time_ms: fields[12].parse().ok()?,
        });
    }
    None
}

/// Extracts the attributes of interest from a `smartctl -A` table.
///
/// Rows are `ID# ATTRIBUTE_NAME … RAW_VALUE`; the raw value is the tenth
/// column and may carry a qualifier (`33 (Min/Max 20/45)`), so only its first
/// token is taken. Absent attributes read as zero.
fn parse_smart(output: &str) -> HealthAttrs {
    let mut attrs = HealthAttrs::default();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let raw = fields[9].split('(').next().unwrap_or("").trim();
        match fields[0] {
            "5" => attrs.realloc_sectors = raw.parse().unwrap_or(0),
            "194" => attrs.temperature_c = raw.parse().unwrap_or(0.0),
            "197" => attrs.pending_sectors = raw.parse().unwrap_or(0),
            _ => {}
        }
    }
    attrs
}

/// First column of each `exportfs -v` line is the exported path.
fn listing_contains(listing: &str, path: &Path) -> bool {
    let wanted = path.to_string_lossy();
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|exported| exported == wanted)
}
