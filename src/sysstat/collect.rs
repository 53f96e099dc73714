//! # Counter sources and the delta math over them.
//!
//! The kernel counters are cumulative; usable figures (CPU busy fraction,
//! network byte rates) come from the difference between two reads. Each
//! tracker's first read only establishes a baseline.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::time::Instant;

/// Access to the raw counter text. A trait so the collector can be exercised
/// against canned text.
pub trait CounterReader: Send + 'static {
    /// CPU time accounting (`/proc/stat`).
    fn read_stat(&mut self) -> io::Result<String>;
    /// Memory figures (`/proc/meminfo`).
    fn read_meminfo(&mut self) -> io::Result<String>;
    /// Per-interface byte counters (`/proc/net/dev`).
    fn read_netdev(&mut self) -> io::Result<String>;
}

/// Open handles to the kernel's counter files, re-read in place via seek.
pub struct CounterSources {
    stat: File,
    meminfo: File,
    netdev: File,
}

impl CounterSources {
    /// Opens the standard `/proc` sources. Failure here is a configuration
    /// failure: the process cannot run without its counters.
    pub fn open_proc() -> io::Result<Self> {
        Ok(Self {
            stat: File::open("/proc/stat")?,
            meminfo: File::open("/proc/meminfo")?,
            netdev: File::open("/proc/net/dev")?,
        })
    }
}

fn reread(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(text)
}

impl CounterReader for CounterSources {
    fn read_stat(&mut self) -> io::Result<String> {
        reread(&mut self.stat)
    }

    fn read_meminfo(&mut self) -> io::Result<String> {
        reread(&mut self.meminfo)
    }

    fn read_netdev(&mut self) -> io::Result<String> {
        reread(&mut self.netdev)
    }
}

/// One reading of the aggregate CPU line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSample {
    /// Jiffies spent busy (everything except idle and iowait).
    pub busy: u64,
    /// Total jiffies.
    pub total: u64,
}

/// Parses the aggregate `cpu` line: user nice system idle iowait irq softirq…
pub fn parse_cpu(text: &str) -> Option<CpuSample> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 5 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    let idle = fields[3] + fields[4];
    Some(CpuSample {
        busy: total - idle,
        total,
    })
}

/// Memory figures in kilobytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemSample {
    pub total_kb: u64,
    pub available_kb: u64,
}

/// Parses `MemTotal:` and `MemAvailable:` out of the meminfo text.
pub fn parse_meminfo(text: &str) -> Option<MemSample> {
    let mut sample = MemSample::default();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(key) = fields.next() else { continue };
        match key {
            "MemTotal:" => sample.total_kb = fields.next()?.parse().ok()?,
            "MemAvailable:" => sample.available_kb = fields.next()?.parse().ok()?,
            _ => {}
        }
    }
    if sample.total_kb == 0 {
        return None;
    }
    Some(sample)
}

/// Summed byte counters over all physical interfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetSample {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Parses `/proc/net/dev`, summing every interface except loopback.
///
/// Line shape: `eth0: rx_bytes rx_packets … [8 fields] tx_bytes …`.
pub fn parse_netdev(text: &str) -> NetSample {
    let mut sample = NetSample::default();
    for line in text.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        if name.trim() == "lo" {
            continue;
        }
        let fields: Vec<u64> = rest
            .split_whitespace()
            .filter_map(|f| f.parse().ok())
            .collect();
        if fields.len() < 9 {
            continue;
        }
        sample.rx_bytes += fields[0];
        sample.tx_bytes += fields[8];
    }
    sample
}

/// Busy-fraction tracker over successive CPU samples.
#[derive(Debug, Default)]
pub struct CpuTracker {
    prev: Option<CpuSample>,
}

impl CpuTracker {
    /// Folds one sample in; returns busy fraction 0.0..=1.0 over the
    /// interval, or 0.0 while establishing the baseline.
    pub fn update(&mut self, sample: CpuSample) -> f32 {
        let fraction = match self.prev {
            Some(prev) if sample.total > prev.total && sample.busy >= prev.busy => {
                (sample.busy - prev.busy) as f32 / (sample.total - prev.total) as f32
            }
            _ => 0.0,
        };
        self.prev = Some(sample);
        fraction.clamp(0.0, 1.0)
    }
}

/// Byte-rate tracker over successive network samples.
#[derive(Debug, Default)]
pub struct NetTracker {
    prev: Option<(Instant, NetSample)>,
}

impl NetTracker {
    /// Folds one sample in; returns `(rx, tx)` bytes per second.
    pub fn update(&mut self, now: Instant, sample: NetSample) -> (f32, f32) {
        let rates = match self.prev {
            Some((then, prev))
                if sample.rx_bytes >= prev.rx_bytes && sample.tx_bytes >= prev.tx_bytes =>
            {
                let dt = now.duration_since(then).as_secs_f64();
                if dt <= 0.0 {
                    (0.0, 0.0)
                } else {
                    (
                        ((sample.rx_bytes - prev.rx_bytes) as f64 / dt) as f32,
                        ((sample.tx_bytes - prev.tx_bytes) as f64 / dt) as f32,
                    )
                }
            }
            _ => (0.0, 0.0),
        };
        self.prev = Some((now, sample));
        rates
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_parse_cpu_line() {
        let text = "cpu  100 0 50 800 50 0 0 0\ncpu0 50 0 25 400 25 0 0 0\n";
        let sample = parse_cpu(text).unwrap();
        assert_eq!(sample.total, 1000);
        assert_eq!(sample.busy, 150);
        assert_eq!(parse_cpu("intr 12345"), None);
    }

    #[test]
    fn test_parse_meminfo() {
        let text = "MemTotal:       16384 kB\nMemFree:         1024 kB\nMemAvailable:    8192 kB\n";
        assert_eq!(
            parse_meminfo(text),
            Some(MemSample {
                total_kb: 16384,
                available_kb: 8192
            })
        );
        assert_eq!(parse_meminfo("MemFree: 1 kB\n"), None);
    }

    #[test]
    fn test_parse_netdev_skips_loopback() {
        let text = "Inter-|   Receive                                                |  Transmit\n\
                    \u{20}face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n\
                    \u{20}   lo: 9999 10 0 0 0 0 0 0 9999 10 0 0 0 0 0 0\n\
                    \u{20} eth0: 1000 10 0 0 0 0 0 0 2000 20 0 0 0 0 0 0\n\
                    \u{20} eth1: 500 5 0 0 0 0 0 0 700 7 0 0 0 0 0 0\n";
        assert_eq!(
            parse_netdev(text),
            NetSample {
                rx_bytes: 1500,
                tx_bytes: 2700
            }
        );
    }

    #[test]
    fn test_cpu_tracker_fraction() {
        let mut tracker = CpuTracker::default();
        assert_eq!(tracker.update(CpuSample { busy: 100, total: 1000 }), 0.0);
        let fraction = tracker.update(CpuSample {
            busy: 150,
            total: 1100,
        });
        assert!((fraction - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_net_tracker_rates() {
        let mut tracker = NetTracker::default();
        let t0 = Instant::now();
        tracker.update(
            t0,
            NetSample {
                rx_bytes: 1000,
                tx_bytes: 2000,
            },
        );
        let (rx, tx) = tracker.update(
            t0 + Duration::from_secs(2),
            NetSample {
                rx_bytes: 3000,
                tx_bytes: 6000,
            },
        );
        assert_eq!(rx, 1000.0);
        assert_eq!(tx, 2000.0);
    }
}
