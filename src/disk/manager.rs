//! # DiskManager: the resource lifecycle manager.
//!
//! Applies supervisor actions to every managed disk, keeps the published
//! statistics current, and takes disks out of service when their health
//! attributes cross the configured thresholds.
//!
//! ## Lifecycle flow
//! ```text
//! INIT  ──► defensive unmount ──► probe filesystem
//!             │                      ├─ none        ──► create fs (long op)
//!             │                      └─ unclean     ──► flag CORRUPTED, keep going
//!             └─ per-disk failure → status BAD, transition continues
//!
//! START ──► mount ──► marker layout (once) ──► export ──► verify export
//!             └─ any failure → roll back (unexport/unmount), status BAD
//!
//! STOP  ──► unexport ──► verify revoked ──► unmount ──► status STOP
//!             └─ failure → status BAD, transition still completes
//! ```
//!
//! ## Rules
//! - The record list is mutated only by the control-loop task; admin commands
//!   run on the same loop, so no locking exists here.
//! - Snapshots are computed into a local value and swapped in whole.
//! - The export tool's exit status is never trusted: both export and revoke
//!   are confirmed through the listing capability.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::{debug, error, info, warn};

use crate::admin::{AdminOp, AdminStatus};
use crate::disk::record::{DiskRecord, DiskSpec, DiskStatus};
use crate::disk::stats::DiskStats;
use crate::disk::tool::{DiskTool, ToolError};
use crate::disk::HealthThresholds;
use crate::error::{MailboxError, ServiceError};
use crate::mailbox::{ChannelRef, MessageWriter, ServiceType, FORMAT_VERSION};
use crate::service::ServiceHandler;

/// Synthetic capacity reported for simulated disks.
const SIM_CAPACITY: u64 = 64 << 30;

/// Synthetic steady-state temperature for simulated disks.
const SIM_TEMPERATURE: f32 = 30.0;

/// Snapshot space figures are published in whole mebibytes.
const MIB: u64 = 1 << 20;

/// The disk lifecycle service.
///
/// Construct once at process start from the configured device list; thread
/// through the control loop. All state lives here — there are no
/// process-wide disk arrays.
pub struct DiskManager {
    channel: ChannelRef,
    tool: Arc<dyn DiskTool>,
    disks: Vec<DiskRecord>,
    thresholds: HealthThresholds,
    health_every: u32,
    polls: u32,
    reset_seq: bool,
}

impl DiskManager {
    /// Creates the manager; one record per configured device spec.
    pub fn new(
        channel: ChannelRef,
        tool: Arc<dyn DiskTool>,
        specs: &[DiskSpec],
        mount_root: &std::path::Path,
        thresholds: HealthThresholds,
        health_every: u32,
    ) -> Self {
        Self {
            channel,
            tool,
            disks: specs.iter().map(|s| DiskRecord::new(s, mount_root)).collect(),
            thresholds,
            health_every: health_every.max(1),
            polls: 0,
            reset_seq: true,
        }
    }

    /// Managed records, in configuration order.
    pub fn disks(&self) -> &[DiskRecord] {
        &self.disks
    }

    /// Applies one operator command to every record whose name contains
    /// `target`.
    ///
    /// A request matching no record is an error and publishes nothing. Any
    /// mutation triggers one snapshot republish and one immediate supervisor
    /// notification for the whole request.
    pub async fn apply_admin(&mut self, op: AdminOp, target: &str) -> AdminStatus {
        let matched: Vec<usize> = (0..self.disks.len())
            .filter(|&i| self.disks[i].name.contains(target))
            .collect();
        if matched.is_empty() {
            warn!(target, op = op.as_label(), "admin command matched no disk");
            return AdminStatus::Error;
        }

        let tool = Arc::clone(&self.tool);
        let mut mutated = false;
        for i in matched {
            let rec = &mut self.disks[i];
            match op {
                AdminOp::Start => mutated |= start_disk(tool.as_ref(), rec, &self.thresholds).await,
                AdminOp::Stop => {
                    if rec.status == DiskStatus::Ok {
                        stop_disk(tool.as_ref(), rec).await;
                        mutated = true;
                    }
                }
                AdminOp::HealthCheck => {
                    mutated |= check_health(tool.as_ref(), rec, &self.thresholds).await;
                }
            }
        }

        if mutated {
            self.republish_and_notify();
        }
        AdminStatus::Ok
    }

    /// Publishes the full snapshot for all records as one mailbox message.
    fn publish_snapshot(&mut self) -> Result<(), MailboxError> {
        let mut writer = MessageWriter::open(
            self.channel.as_ref(),
            ServiceType::Disk,
            FORMAT_VERSION,
            self.reset_seq,
        )?;
        match encode_snapshot(&mut writer, &self.disks) {
            Ok(()) => {
                writer.commit()?;
                self.reset_seq = false;
                Ok(())
            }
            Err(err) => {
                writer.abort();
                Err(err)
            }
        }
    }

    /// Snapshot republish plus immediate notification, the shared tail of
    /// admin mutations and health-threshold trips.
    fn republish_and_notify(&mut self) {
        if let Err(err) = self.publish_snapshot() {
            error!(error = %err, label = err.as_label(), "snapshot republish failed");
        }
        if let Err(err) = self.channel.broadcast() {
            error!(error = %err, label = err.as_label(), "supervisor notification failed");
        }
    }

    async fn sample_all(&mut self) {
        let tool = Arc::clone(&self.tool);
        let now = Instant::now();
        for rec in self.disks.iter_mut().filter(|r| r.status == DiskStatus::Ok) {
            sample_disk(tool.as_ref(), rec, now).await;
        }
    }

    /// Slow-cadence health evaluation; returns whether any disk was tripped.
    async fn evaluate_health(&mut self) -> bool {
        let tool = Arc::clone(&self.tool);
        let mut tripped = false;
        for rec in self.disks.iter_mut().filter(|r| r.status == DiskStatus::Ok) {
            tripped |= check_health(tool.as_ref(), rec, &self.thresholds).await;
        }
        tripped
    }
}

#[async_trait::async_trait]
impl ServiceHandler for DiskManager {
    fn name(&self) -> &str {
        "disk"
    }

    async fn on_init(&mut self) -> Result<(), ServiceError> {
        let tool = Arc::clone(&self.tool);
        for rec in self.disks.iter_mut() {
            init_disk(tool.as_ref(), rec).await;
        }
        self.publish_snapshot().map_err(ServiceError::from)
    }

    async fn on_start(&mut self) -> Result<(), ServiceError> {
        let tool = Arc::clone(&self.tool);
        for rec in self.disks.iter_mut() {
            start_disk(tool.as_ref(), rec, &self.thresholds).await;
        }
        self.publish_snapshot().map_err(ServiceError::from)
    }

    async fn on_stop(&mut self) -> Result<(), ServiceError> {
        let tool = Arc::clone(&self.tool);
        for rec in self.disks.iter_mut().filter(|r| r.status == DiskStatus::Ok) {
            stop_disk(tool.as_ref(), rec).await;
        }
        self.publish_snapshot().map_err(ServiceError::from)
    }

    async fn on_destroy(&mut self) {
        let tool = Arc::clone(&self.tool);
        for rec in self.disks.iter_mut().filter(|r| r.started) {
            stop_disk(tool.as_ref(), rec).await;
        }
        self.disks.clear();
        self.channel.close();
    }

    async fn on_admin(&mut self, request: crate::admin::AdminRequest) -> AdminStatus {
        self.apply_admin(request.op, &request.target).await
    }

    async fn on_poll(&mut self) {
        self.polls = self.polls.wrapping_add(1);
        self.sample_all().await;

        let tripped = if self.polls % self.health_every == 0 {
            self.evaluate_health().await
        } else {
            false
        };

        if tripped {
            self.republish_and_notify();
        } else if let Err(err) = self.publish_snapshot() {
            error!(error = %err, label = err.as_label(), "snapshot publish failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Per-disk lifecycle steps
// ---------------------------------------------------------------------------

async fn init_disk(tool: &dyn DiskTool, rec: &mut DiskRecord) {
    rec.started = false;
    rec.sampler.reset();

    if rec.flags.simulated {
        rec.fs_uuid = Some(format!("sim-{}", rec.name));
        rec.flags.corrupted = false;
        rec.status = DiskStatus::Ok;
        rec.stats = simulated_stats();
        return;
    }

    // The previous run may have died with the disk mounted.
    if let Err(err) = tool.unmount(&rec.mount_path).await {
        mark_bad(rec, "defensive unmount", &err);
        return;
    }

    match tool.probe_fs(&rec.device_path).await {
        Ok(Some(probe)) => {
            rec.flags.corrupted = !probe.clean;
            if rec.flags.corrupted {
                warn!(
                    disk = %rec.name,
                    uuid = %probe.uuid,
                    "filesystem was not cleanly unmounted; continuing"
                );
            }
            rec.fs_uuid = Some(probe.uuid);
        }
        Ok(None) => match tool.make_fs(&rec.device_path).await {
            Ok(uuid) => {
                info!(disk = %rec.name, %uuid, "created fresh filesystem");
                rec.flags.corrupted = false;
                rec.fs_uuid = Some(uuid);
            }
            Err(err) => {
                mark_bad(rec, "filesystem creation", &err);
                return;
            }
        },
        Err(err) => {
            mark_bad(rec, "filesystem probe", &err);
            return;
        }
    }

    rec.status = DiskStatus::Ok;
    info!(disk = %rec.name, corrupted = rec.flags.corrupted, "initialized");
}

/// Brings one disk into service. Returns whether the record changed.
async fn start_disk(tool: &dyn DiskTool, rec: &mut DiskRecord, thresholds: &HealthThresholds) -> bool {
    if rec.started {
        return false;
    }

    if rec.flags.simulated {
        rec.status = DiskStatus::Ok;
        rec.started = true;
        return true;
    }

    if let Err(err) = tool.mount(&rec.device_path, &rec.mount_path).await {
        mark_bad(rec, "mount", &err);
        return true;
    }

    // The marker layout is created exactly once per filesystem; the sentinel
    // guards re-creation across restarts.
    match tool.has_layout(&rec.mount_path).await {
        Ok(true) => {}
        Ok(false) => {
            if let Err(err) = tool.create_layout(&rec.mount_path).await {
                roll_back(tool, rec, false).await;
                mark_bad(rec, "marker layout", &err);
                return true;
            }
        }
        Err(err) => {
            roll_back(tool, rec, false).await;
            mark_bad(rec, "marker layout probe", &err);
            return true;
        }
    }

    if let Err(err) = tool.export(&rec.mount_path).await {
        roll_back(tool, rec, false).await;
        mark_bad(rec, "export", &err);
        return true;
    }

    // The export tool's exit status is unreliable; only the listing counts.
    match tool.is_exported(&rec.mount_path).await {
        Ok(true) => {}
        Ok(false) => {
            roll_back(tool, rec, true).await;
            mark_bad_msg(rec, "export did not take effect");
            return true;
        }
        Err(err) => {
            roll_back(tool, rec, true).await;
            mark_bad(rec, "export verification", &err);
            return true;
        }
    }

    match tool.health_attrs(&rec.device_path).await {
        Ok(attrs) => {
            if let Some(breach) = thresholds.breach(&attrs) {
                roll_back(tool, rec, true).await;
                mark_bad_msg(rec, &format!("post-start health check: {breach}"));
                return true;
            }
        }
        Err(err) => {
            roll_back(tool, rec, true).await;
            mark_bad(rec, "post-start health check", &err);
            return true;
        }
    }

    rec.status = DiskStatus::Ok;
    rec.started = true;
    info!(disk = %rec.name, path = %rec.mount_path.display(), "started");
    true
}

async fn stop_disk(tool: &dyn DiskTool, rec: &mut DiskRecord) {
    if rec.flags.simulated {
        rec.status = DiskStatus::Stop;
        rec.started = false;
        return;
    }

    if rec.started {
        if let Err(err) = tool.unexport(&rec.mount_path).await {
            mark_bad(rec, "unexport", &err);
            return;
        }
        match tool.is_exported(&rec.mount_path).await {
            Ok(false) => {}
            Ok(true) => {
                mark_bad_msg(rec, "export revocation did not take effect");
                return;
            }
            Err(err) => {
                mark_bad(rec, "revocation verification", &err);
                return;
            }
        }
        if let Err(err) = tool.unmount(&rec.mount_path).await {
            mark_bad(rec, "unmount", &err);
            return;
        }
    }

    rec.status = DiskStatus::Stop;
    rec.started = false;
    info!(disk = %rec.name, "stopped");
}

/// Health evaluation for one disk; trips it out of service on a breach.
/// Returns whether the record changed.
async fn check_health(tool: &dyn DiskTool, rec: &mut DiskRecord, thresholds: &HealthThresholds) -> bool {
    if rec.status != DiskStatus::Ok || rec.flags.simulated {
        return false;
    }
    let attrs = match tool.health_attrs(&rec.device_path).await {
        Ok(attrs) => attrs,
        Err(err) => {
            warn!(disk = %rec.name, error = %err, label = err.as_label(), "health read failed");
            return false;
        }
    };

    rec.stats.temperature_c = attrs.temperature_c;
    rec.stats.realloc_sectors = attrs.realloc_sectors;
    rec.stats.pending_sectors = attrs.pending_sectors;

    match thresholds.breach(&attrs) {
        Some(breach) => {
            error!(disk = %rec.name, %breach, "health threshold crossed; taking disk out of service");
            stop_disk(tool, rec).await;
            rec.status = DiskStatus::Bad;
            true
        }
        None => false,
    }
}

async fn sample_disk(tool: &dyn DiskTool, rec: &mut DiskRecord, now: Instant) {
    if rec.flags.simulated {
        rec.stats = simulated_stats();
        return;
    }

    let counters = match tool.block_counters(&rec.name).await {
        Ok(counters) => counters,
        Err(err) => {
            debug!(disk = %rec.name, error = %err, "counter read failed; keeping last sample");
            return;
        }
    };
    let rates = rec.sampler.sample(now, counters);

    // Compute the whole snapshot locally, then swap it in.
    let mut stats = rec.stats;
    stats.read_bps = rates.read_bps;
    stats.write_bps = rates.write_bps;
    stats.avg_latency_ms = rates.avg_latency_ms;
    if rec.started {
        match tool.fs_usage(&rec.mount_path).await {
            Ok((capacity, available)) => {
                stats.capacity_bytes = capacity;
                stats.available_bytes = available;
            }
            Err(err) => {
                debug!(disk = %rec.name, error = %err, "usage read failed; keeping last figures");
            }
        }
    }
    stats.sampled_at = unix_now();
    rec.stats = stats;
}

async fn roll_back(tool: &dyn DiskTool, rec: &DiskRecord, exported: bool) {
    if exported {
        if let Err(err) = tool.unexport(&rec.mount_path).await {
            warn!(disk = %rec.name, error = %err, "rollback unexport failed");
        }
    }
    if let Err(err) = tool.unmount(&rec.mount_path).await {
        warn!(disk = %rec.name, error = %err, "rollback unmount failed");
    }
}

fn mark_bad(rec: &mut DiskRecord, step: &str, err: &ToolError) {
    error!(disk = %rec.name, step, error = %err, label = err.as_label(), "disk failed");
    rec.status = DiskStatus::Bad;
    rec.started = false;
}

fn mark_bad_msg(rec: &mut DiskRecord, reason: &str) {
    error!(disk = %rec.name, reason, "disk failed");
    rec.status = DiskStatus::Bad;
    rec.started = false;
}

fn simulated_stats() -> DiskStats {
    DiskStats {
        capacity_bytes: SIM_CAPACITY,
        available_bytes: SIM_CAPACITY / 4 * 3,
        temperature_c: SIM_TEMPERATURE,
        sampled_at: unix_now(),
        ..DiskStats::default()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Snapshot schema for [`ServiceType::Disk`], version 1: a disk count, then
/// per disk the identifier, name, status, flags, filesystem id, space
/// figures (MiB), throughput, latency, temperature, sector counts, and the
/// sample timestamp.
fn encode_snapshot(
    writer: &mut MessageWriter<'_>,
    disks: &[DiskRecord],
) -> Result<(), MailboxError> {
    writer.write_i16(disks.len() as i16)?;
    for rec in disks {
        writer.write_opaque(&rec.id)?;
        writer.write_str(&rec.name)?;
        writer.write_i16(rec.status.code())?;
        writer.write_i16(rec.flags.bits())?;
        writer.write_str(rec.fs_uuid.as_deref().unwrap_or(""))?;
        writer.write_i32((rec.stats.capacity_bytes / MIB) as i32)?;
        writer.write_i32((rec.stats.available_bytes / MIB) as i32)?;
        writer.write_f32(rec.stats.read_bps)?;
        writer.write_f32(rec.stats.write_bps)?;
        writer.write_f32(rec.stats.avg_latency_ms)?;
        writer.write_f32(rec.stats.temperature_c)?;
        writer.write_i32(rec.stats.realloc_sectors as i32)?;
        writer.write_i32(rec.stats.pending_sectors as i32)?;
        writer.write_i32(rec.stats.sampled_at as i32)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::disk::stats::BlockCounters;
    use crate::disk::tool::FsProbe;
    use crate::disk::HealthAttrs;
    use crate::mailbox::{FieldReader, MemoryChannel};

    #[derive(Default)]
    struct FakeTool {
        fs: Mutex<HashMap<PathBuf, FsProbe>>,
        mounted: Mutex<HashSet<PathBuf>>,
        exported: Mutex<HashSet<PathBuf>>,
        layouts: Mutex<HashSet<PathBuf>>,
        attrs: Mutex<HealthAttrs>,
        export_silently_fails: AtomicBool,
    }

    impl FakeTool {
        fn with_fs(self, dev: &str, uuid: &str, clean: bool) -> Self {
            self.fs.lock().unwrap().insert(
                PathBuf::from(dev),
                FsProbe {
                    uuid: uuid.to_string(),
                    clean,
                },
            );
            self
        }

        fn set_attrs(&self, attrs: HealthAttrs) {
            *self.attrs.lock().unwrap() = attrs;
        }
    }

    #[async_trait::async_trait]
    impl DiskTool for FakeTool {
        async fn unmount(&self, path: &Path) -> Result<(), ToolError> {
            self.mounted.lock().unwrap().remove(path);
            Ok(())
        }

        async fn probe_fs(&self, dev: &Path) -> Result<Option<FsProbe>, ToolError> {
            Ok(self.fs.lock().unwrap().get(dev).cloned())
        }

        async fn make_fs(&self, dev: &Path) -> Result<String, ToolError> {
            let uuid = format!("fresh-{}", dev.display());
            self.fs.lock().unwrap().insert(
                dev.to_path_buf(),
                FsProbe {
                    uuid: uuid.clone(),
                    clean: true,
                },
            );
            Ok(uuid)
        }

        async fn mount(&self, _dev: &Path, path: &Path) -> Result<(), ToolError> {
            self.mounted.lock().unwrap().insert(path.to_path_buf());
            Ok(())
        }

        async fn export(&self, path: &Path) -> Result<(), ToolError> {
            // Reports success either way; only the listing tells the truth.
            if !self.export_silently_fails.load(Ordering::Relaxed) {
                self.exported.lock().unwrap().insert(path.to_path_buf());
            }
            Ok(())
        }

        async fn unexport(&self, path: &Path) -> Result<(), ToolError> {
            self.exported.lock().unwrap().remove(path);
            Ok(())
        }

        async fn is_exported(&self, path: &Path) -> Result<bool, ToolError> {
            Ok(self.exported.lock().unwrap().contains(path))
        }

        async fn has_layout(&self, path: &Path) -> Result<bool, ToolError> {
            Ok(self.layouts.lock().unwrap().contains(path))
        }

        async fn create_layout(&self, path: &Path) -> Result<(), ToolError> {
            self.layouts.lock().unwrap().insert(path.to_path_buf());
            Ok(())
        }

        async fn fs_usage(&self, _path: &Path) -> Result<(u64, u64), ToolError> {
            Ok((100 * MIB, 80 * MIB))
        }

        async fn block_counters(&self, _name: &str) -> Result<BlockCounters, ToolError> {
            Ok(BlockCounters::default())
        }

        async fn health_attrs(&self, _dev: &Path) -> Result<HealthAttrs, ToolError> {
            Ok(*self.attrs.lock().unwrap())
        }
    }

    fn specs(names: &[&str]) -> Vec<DiskSpec> {
        names.iter().map(|n| n.parse().unwrap()).collect()
    }

    fn manager_with(tool: FakeTool, names: &[&str]) -> (DiskManager, std::sync::Arc<MemoryChannel>) {
        let channel = std::sync::Arc::new(MemoryChannel::new(1024));
        let manager = DiskManager::new(
            channel.clone(),
            Arc::new(tool),
            &specs(names),
            Path::new("/export"),
            HealthThresholds::default(),
            1,
        );
        (manager, channel)
    }

    #[tokio::test]
    async fn test_init_fresh_and_unclean_disks() {
        let tool = FakeTool::default().with_fs("/dev/vdiskB", "b-uuid", false);
        let (mut mgr, _ch) = manager_with(tool, &["vdiskA", "vdiskB"]);

        mgr.on_init().await.unwrap();

        let a = &mgr.disks()[0];
        assert_eq!(a.status, DiskStatus::Ok);
        assert!(!a.flags.corrupted);
        assert_eq!(a.fs_uuid.as_deref(), Some("fresh-/dev/vdiskA"));

        let b = &mgr.disks()[1];
        assert_eq!(b.status, DiskStatus::Ok);
        assert!(b.flags.corrupted, "unclean filesystem must be flagged");
        assert_eq!(b.fs_uuid.as_deref(), Some("b-uuid"));
    }

    #[tokio::test]
    async fn test_lifecycle_cycle_is_idempotent() {
        let tool = FakeTool::default();
        let (mut mgr, _ch) = manager_with(tool, &["vdiskA"]);

        mgr.on_init().await.unwrap();
        let after_first_init = mgr.disks()[0].status;

        mgr.on_start().await.unwrap();
        assert!(mgr.disks()[0].started);
        mgr.on_stop().await.unwrap();
        assert_eq!(mgr.disks()[0].status, DiskStatus::Stop);
        mgr.on_init().await.unwrap();

        assert_eq!(mgr.disks()[0].status, after_first_init);
        assert!(!mgr.disks()[0].started);
    }

    #[tokio::test]
    async fn test_export_verification_failure_never_reaches_ok() {
        let tool = FakeTool::default();
        tool.export_silently_fails.store(true, Ordering::Relaxed);
        let (mut mgr, _ch) = manager_with(tool, &["vdiskA"]);

        mgr.on_init().await.unwrap();
        mgr.on_start().await.unwrap();

        let rec = &mgr.disks()[0];
        assert_eq!(rec.status, DiskStatus::Bad);
        assert!(!rec.started);
    }

    #[tokio::test]
    async fn test_start_rolls_back_on_verification_failure() {
        let tool = Arc::new(FakeTool::default());
        tool.export_silently_fails.store(true, Ordering::Relaxed);
        let channel = std::sync::Arc::new(MemoryChannel::new(1024));
        let mut mgr = DiskManager::new(
            channel,
            tool.clone(),
            &specs(&["vdiskA"]),
            Path::new("/export"),
            HealthThresholds::default(),
            1,
        );

        mgr.on_init().await.unwrap();
        mgr.on_start().await.unwrap();

        // Nothing may be left mounted or exported after the rollback.
        assert!(tool.mounted.lock().unwrap().is_empty());
        assert!(tool.exported.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_breach_trips_disk_and_notifies() {
        let tool = FakeTool::default();
        tool.set_attrs(HealthAttrs {
            temperature_c: 90.0,
            ..Default::default()
        });
        let (mut mgr, ch) = manager_with(tool, &["vdiskA"]);

        mgr.on_init().await.unwrap();
        // Start trips the post-start health check instead; relax it first.
        mgr.thresholds = HealthThresholds {
            max_temperature_c: 100.0,
            ..HealthThresholds::default()
        };
        mgr.on_start().await.unwrap();
        mgr.thresholds = HealthThresholds::default();

        let notifies_before = ch.notifies();
        mgr.on_poll().await;

        let rec = &mgr.disks()[0];
        assert_eq!(rec.status, DiskStatus::Bad);
        assert!(!rec.started);
        assert_eq!(ch.notifies(), notifies_before + 1, "breach forces one notification");
    }

    #[tokio::test]
    async fn test_admin_stop_matching_disk() {
        let tool = FakeTool::default();
        let (mut mgr, ch) = manager_with(tool, &["vdiskA"]);
        mgr.on_init().await.unwrap();
        mgr.on_start().await.unwrap();

        let notifies_before = ch.notifies();
        let status = mgr.apply_admin(AdminOp::Stop, "vdiskA").await;

        assert_eq!(status, AdminStatus::Ok);
        assert_eq!(mgr.disks()[0].status, DiskStatus::Stop);
        assert_eq!(ch.notifies(), notifies_before + 1, "exactly one notification");
    }

    #[tokio::test]
    async fn test_admin_no_match_is_error_without_republish() {
        let tool = FakeTool::default();
        let (mut mgr, ch) = manager_with(tool, &["vdiskA"]);
        mgr.on_init().await.unwrap();

        let frame_before = ch.committed_frame();
        let notifies_before = ch.notifies();
        let status = mgr.apply_admin(AdminOp::Stop, "nosuch").await;

        assert_eq!(status, AdminStatus::Error);
        assert_eq!(ch.committed_frame(), frame_before, "no republish on no match");
        assert_eq!(ch.notifies(), notifies_before);
    }

    #[tokio::test]
    async fn test_admin_substring_matches_multiple_disks() {
        let tool = FakeTool::default();
        let (mut mgr, _ch) = manager_with(tool, &["vdiskA", "vdiskB", "other"]);
        mgr.on_init().await.unwrap();
        mgr.on_start().await.unwrap();

        let status = mgr.apply_admin(AdminOp::Stop, "vdisk").await;
        assert_eq!(status, AdminStatus::Ok);
        assert_eq!(mgr.disks()[0].status, DiskStatus::Stop);
        assert_eq!(mgr.disks()[1].status, DiskStatus::Stop);
        assert_eq!(mgr.disks()[2].status, DiskStatus::Ok);
    }

    #[tokio::test]
    async fn test_simulated_disk_follows_lifecycle_without_tooling() {
        let tool = FakeTool::default();
        let (mut mgr, _ch) = manager_with(tool, &["vdiskA:sim"]);

        mgr.on_init().await.unwrap();
        assert_eq!(mgr.disks()[0].status, DiskStatus::Ok);
        assert!(mgr.disks()[0].flags.simulated);

        mgr.on_start().await.unwrap();
        assert!(mgr.disks()[0].started);
        let tool = Arc::clone(&mgr.tool);
        assert!(
            !tool.is_exported(Path::new("/export/vdiskA")).await.unwrap(),
            "simulated disks never touch the export tool"
        );

        mgr.on_stop().await.unwrap();
        assert_eq!(mgr.disks()[0].status, DiskStatus::Stop);
    }

    #[tokio::test]
    async fn test_snapshot_schema_decodes() {
        let tool = FakeTool::default();
        let (mut mgr, ch) = manager_with(tool, &["vdiskA"]);
        mgr.on_init().await.unwrap();

        let frame = ch.committed_frame().unwrap();
        let (header, mut fields) = FieldReader::over(&frame).unwrap();
        assert_eq!(header.tag, ServiceType::Disk.tag());
        assert_eq!(header.seq, 1, "first publish after start resets the sequence");

        assert_eq!(fields.read_i16().unwrap(), 1);
        assert_eq!(fields.read_opaque().unwrap().len(), 8);
        assert_eq!(fields.read_str().unwrap(), "vdiskA");
        assert_eq!(fields.read_i16().unwrap(), DiskStatus::Ok.code());
        assert_eq!(fields.read_i16().unwrap(), 0);
        assert_eq!(fields.read_str().unwrap(), "fresh-/dev/vdiskA");
    }

    #[tokio::test]
    async fn test_publish_failure_disables_service() {
        // A slot too small for the snapshot: every publish overflows.
        let channel = std::sync::Arc::new(MemoryChannel::new(16));
        let mut mgr = DiskManager::new(
            channel,
            Arc::new(FakeTool::default()),
            &specs(&["vdiskA"]),
            Path::new("/export"),
            HealthThresholds::default(),
            1,
        );

        let err = mgr.on_init().await.unwrap_err();
        assert!(matches!(err, ServiceError::Channel(_)));
    }
}
