//! # Statistics snapshots and the counter-delta math behind them.
//!
//! Raw block-layer counters are cumulative; throughput and latency fall out
//! of the difference between two samples. A snapshot is always computed into
//! a local value and swapped in whole, so a concurrent reader of the
//! published message never observes a partially updated snapshot.

use std::time::Instant;

/// Bytes per 512-byte sector, the block layer's accounting unit.
const SECTOR_BYTES: f64 = 512.0;

/// Published per-disk statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiskStats {
    /// Filesystem capacity in bytes.
    pub capacity_bytes: u64,
    /// Available space in bytes.
    pub available_bytes: u64,
    /// Read throughput, bytes per second, over the last sampling interval.
    pub read_bps: f32,
    /// Write throughput, bytes per second, over the last sampling interval.
    pub write_bps: f32,
    /// Average I/O latency in milliseconds over the last sampling interval.
    pub avg_latency_ms: f32,
    /// Drive temperature, degrees Celsius.
    pub temperature_c: f32,
    /// Reallocated sector count.
    pub realloc_sectors: u32,
    /// Sectors pending reallocation.
    pub pending_sectors: u32,
    /// Unix timestamp of the last sample.
    pub sampled_at: u64,
}

/// Cumulative block-layer counters for one device, as read from the kernel's
/// per-disk accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCounters {
    /// Completed read requests.
    pub reads: u64,
    /// Sectors read.
    pub read_sectors: u64,
    /// Completed write requests.
    pub writes: u64,
    /// Sectors written.
    pub write_sectors: u64,
    /// Milliseconds spent in I/O.
    pub io_time_ms: u64,
}

/// Throughput and latency derived from two counter samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rates {
    pub read_bps: f32,
    pub write_bps: f32,
    pub avg_latency_ms: f32,
}

/// Per-disk counter-delta state.
///
/// The first sample only establishes a baseline and yields zero rates;
/// counters that went backwards (device reset) also re-baseline.
#[derive(Debug, Clone, Default)]
pub struct StatsSampler {
    prev: Option<(Instant, BlockCounters)>,
}

impl StatsSampler {
    /// Folds one counter reading into the sampler and returns the rates over
    /// the elapsed interval.
    pub fn sample(&mut self, now: Instant, counters: BlockCounters) -> Rates {
        let rates = match self.prev {
            Some((then, prev)) if counters_advanced(&prev, &counters) => {
                let dt = now.duration_since(then).as_secs_f64();
                if dt <= 0.0 {
                    Rates::default()
                } else {
                    let read_bytes = (counters.read_sectors - prev.read_sectors) as f64 * SECTOR_BYTES;
                    let write_bytes =
                        (counters.write_sectors - prev.write_sectors) as f64 * SECTOR_BYTES;
                    let ios = (counters.reads - prev.reads) + (counters.writes - prev.writes);
                    let io_ms = counters.io_time_ms - prev.io_time_ms;
                    Rates {
                        read_bps: (read_bytes / dt) as f32,
                        write_bps: (write_bytes / dt) as f32,
                        avg_latency_ms: if ios == 0 {
                            0.0
                        } else {
                            (io_ms as f64 / ios as f64) as f32
                        },
                    }
                }
            }
            _ => Rates::default(),
        };
        self.prev = Some((now, counters));
        rates
    }

    /// Drops the baseline; the next sample yields zero rates again.
    pub fn reset(&mut self) {
        self.prev = None;
    }
}

fn counters_advanced(prev: &BlockCounters, next: &BlockCounters) -> bool {
    next.reads >= prev.reads
        && next.read_sectors >= prev.read_sectors
        && next.writes >= prev.writes
        && next.write_sectors >= prev.write_sectors
        && next.io_time_ms >= prev.io_time_ms
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_first_sample_is_baseline_only() {
        let mut sampler = StatsSampler::default();
        let rates = sampler.sample(Instant::now(), BlockCounters::default());
        assert_eq!(rates, Rates::default());
    }

    #[test]
    fn test_rates_from_counter_deltas() {
        let mut sampler = StatsSampler::default();
        let t0 = Instant::now();
        sampler.sample(
            t0,
            BlockCounters {
                reads: 100,
                read_sectors: 2000,
                writes: 50,
                write_sectors: 1000,
                io_time_ms: 300,
            },
        );
        let rates = sampler.sample(
            t0 + Duration::from_secs(2),
            BlockCounters {
                reads: 150,
                read_sectors: 6000,
                writes: 100,
                write_sectors: 3000,
                io_time_ms: 500,
            },
        );
        // 4000 sectors read over 2s = 1 MiB/s; 2000 written = 512 KiB/s.
        assert_eq!(rates.read_bps, 1024.0 * 1024.0);
        assert_eq!(rates.write_bps, 512.0 * 1024.0);
        // 200ms of I/O over 100 requests.
        assert_eq!(rates.avg_latency_ms, 2.0);
    }

    #[test]
    fn test_backwards_counters_rebaseline() {
        let mut sampler = StatsSampler::default();
        let t0 = Instant::now();
        sampler.sample(
            t0,
            BlockCounters {
                reads: 100,
                ..Default::default()
            },
        );
        let rates = sampler.sample(
            t0 + Duration::from_secs(1),
            BlockCounters {
                reads: 10,
                ..Default::default()
            },
        );
        assert_eq!(rates, Rates::default());
    }
}
