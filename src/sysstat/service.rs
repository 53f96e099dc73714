//! # StatCollector: the statistics service handler.
//!
//! Wires the counter trackers to the mailbox. Sampling runs while the
//! service is RUNNING; READY keeps the last published snapshot on the
//! channel untouched.

use std::time::{Instant, SystemTime};

use tracing::{error, warn};

use crate::error::{MailboxError, ServiceError};
use crate::mailbox::{ChannelRef, MessageWriter, ServiceType, FORMAT_VERSION};
use crate::service::ServiceHandler;
use crate::sysstat::collect::{
    parse_cpu, parse_meminfo, parse_netdev, CounterReader, CpuTracker, NetTracker,
};

/// Published node snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct NodeSnapshot {
    cpu_busy: f32,
    mem_total_mb: i32,
    mem_avail_mb: i32,
    rx_bps: f32,
    tx_bps: f32,
    sampled_at: u64,
}

/// The runtime-counter collector service.
pub struct StatCollector<R> {
    channel: ChannelRef,
    sources: R,
    cpu: CpuTracker,
    net: NetTracker,
    snapshot: NodeSnapshot,
    sampling: bool,
    reset_seq: bool,
}

impl<R: CounterReader> StatCollector<R> {
    /// Creates the collector over already-opened counter sources.
    pub fn new(channel: ChannelRef, sources: R) -> Self {
        Self {
            channel,
            sources,
            cpu: CpuTracker::default(),
            net: NetTracker::default(),
            snapshot: NodeSnapshot::default(),
            sampling: false,
            reset_seq: true,
        }
    }

    /// Re-reads every source and swaps in a freshly computed snapshot.
    /// A failed read keeps the previous snapshot; counters are retried on
    /// the next interval.
    fn sample(&mut self) {
        let now = Instant::now();
        let mut next = self.snapshot;

        match self.sources.read_stat().map(|t| parse_cpu(&t)) {
            Ok(Some(sample)) => next.cpu_busy = self.cpu.update(sample),
            Ok(None) => warn!("cpu accounting line missing"),
            Err(err) => warn!(error = %err, "cpu counter read failed"),
        }
        match self.sources.read_meminfo().map(|t| parse_meminfo(&t)) {
            Ok(Some(mem)) => {
                next.mem_total_mb = (mem.total_kb / 1024) as i32;
                next.mem_avail_mb = (mem.available_kb / 1024) as i32;
            }
            Ok(None) => warn!("memory figures missing"),
            Err(err) => warn!(error = %err, "memory counter read failed"),
        }
        match self.sources.read_netdev() {
            Ok(text) => {
                let (rx, tx) = self.net.update(now, parse_netdev(&text));
                next.rx_bps = rx;
                next.tx_bps = tx;
            }
            Err(err) => warn!(error = %err, "network counter read failed"),
        }

        next.sampled_at = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.snapshot = next;
    }

    /// Snapshot schema for [`ServiceType::Stats`], version 1.
    fn publish(&mut self) -> Result<(), MailboxError> {
        let mut writer = MessageWriter::open(
            self.channel.as_ref(),
            ServiceType::Stats,
            FORMAT_VERSION,
            self.reset_seq,
        )?;
        let encoded = (|| {
            writer.write_f32(self.snapshot.cpu_busy)?;
            writer.write_i32(self.snapshot.mem_total_mb)?;
            writer.write_i32(self.snapshot.mem_avail_mb)?;
            writer.write_f32(self.snapshot.rx_bps)?;
            writer.write_f32(self.snapshot.tx_bps)?;
            writer.write_i32(self.snapshot.sampled_at as i32)
        })();
        match encoded {
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
}

#[async_trait::async_trait]
impl<R: CounterReader> ServiceHandler for StatCollector<R> {
    fn name(&self) -> &str {
        "stats"
    }

    async fn on_init(&mut self) -> Result<(), ServiceError> {
        self.sample();
        self.publish().map_err(ServiceError::from)
    }

    async fn on_start(&mut self) -> Result<(), ServiceError> {
        self.sampling = true;
        self.publish().map_err(ServiceError::from)
    }

    async fn on_stop(&mut self) -> Result<(), ServiceError> {
        self.sampling = false;
        self.publish().map_err(ServiceError::from)
    }

    async fn on_destroy(&mut self) {
        self.channel.close();
    }

    async fn on_poll(&mut self) {
        if !self.sampling {
            return;
        }
        self.sample();
        if let Err(err) = self.publish() {
            error!(error = %err, label = err.as_label(), "snapshot publish failed");
        }
    }
}
