//! Statistics service: node-wide runtime-counter collectors.
//!
//! The second service built on the supervision framework. It samples CPU,
//! memory, and network counters from the kernel's `/proc`-style sources and
//! publishes a compact snapshot through its own mailbox on every statistics
//! interval.
//!
//! All counter handles are fields of an explicit context struct
//! ([`CounterSources`]) constructed once at startup — there are no
//! module-level descriptors.

mod collect;
mod service;

pub use collect::{
    parse_cpu, parse_meminfo, parse_netdev, CounterReader, CounterSources, CpuSample, CpuTracker,
    MemSample, NetSample, NetTracker,
};
pub use service::StatCollector;
