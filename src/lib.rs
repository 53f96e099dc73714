//! # storvisor
//!
//! **Storvisor** is the per-node control plane of a clustered object-storage
//! appliance. Independent local services — a disk lifecycle manager, a
//! runtime-counter collector — publish their lifecycle state and statistics
//! to the cluster supervisor through a shared, versioned, fixed-capacity
//! mailbox, while a heartbeat detects unresponsive peers and a small TCP
//! protocol lets operators drive lifecycle transitions at runtime.
//!
//! ## Architecture
//! ```text
//!                 ┌────────────────────┐        ┌────────────────────┐
//!                 │   diskd (process)  │        │   statd (process)  │
//!                 │  DiskManager       │        │  StatCollector     │
//!                 └─────────┬──────────┘        └─────────┬──────────┘
//!                           ▼                             ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ServiceRuntime (one control loop per process)                    │
//! │  - ActionSource (supervisor commands, delivered in order)         │
//! │  - Heartbeat tick (liveness counter)                              │
//! │  - Statistics poll (handler.on_poll)                              │
//! │  - AdminServer (operator TCP, diskd only)                         │
//! └──────┬──────────────────────┬─────────────────────────┬──────────┘
//!        ▼                      ▼                         ▼
//!  ServiceDescriptor      MessageWriter               serve_connection
//!  (INIT/START/STOP/      (typed fields, seq           (fixed-size
//!   DESTROY → state)       numbers, atomic commit)      request/status)
//!        │                      │
//!        ▼                      ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Channel (shared mailbox slot: state flag, liveness counter,      │
//! │  notify counter, committed frame) — read by the cluster           │
//! │  supervisor on its own poll                                       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//! ```text
//! Action ──► ServiceDescriptor::dispatch ──► handler
//!
//!   INIT    ─► on_init    ─► READY      (DISABLED if the mailbox is unusable)
//!   START   ─► on_start   ─► RUNNING    + immediate supervisor notification
//!   STOP    ─► on_stop    ─► READY      + immediate supervisor notification
//!   DESTROY ─► on_destroy ─► process exit
//! ```
//!
//! | Area            | Description                                         | Key types                                  |
//! |-----------------|-----------------------------------------------------|--------------------------------------------|
//! | **Mailbox**     | Channel client, wire codec, sequence numbering.     | [`Channel`], [`MessageWriter`]             |
//! | **Lifecycle**   | Actions, states, handler seam, dispatch glue.       | [`Action`], [`ServiceHandler`]             |
//! | **Liveness**    | Heartbeat emission, peer outage detection.          | [`Heartbeat`], [`PeerMonitor`]             |
//! | **Disks**       | Probe/init/start/stop, stats, health thresholds.    | [`DiskManager`], [`DiskTool`]              |
//! | **Admin**       | Operator protocol over TCP.                         | [`AdminServer`], [`AdminRequest`]          |
//! | **Counters**    | Node CPU/memory/network collectors.                 | [`StatCollector`]                          |

pub mod admin;
pub mod config;
pub mod core;
pub mod disk;
pub mod error;
pub mod heartbeat;
pub mod mailbox;
pub mod service;
pub mod sysstat;

// ---- Public re-exports ----

pub use admin::{AdminOp, AdminRequest, AdminServer, AdminStatus};
pub use config::{Config, ConfigError, MAILBOX_ENV};
pub use crate::core::{RuntimeOptions, ServiceRuntime};
pub use disk::{DiskManager, DiskSpec, DiskStatus, DiskTool, SystemDiskTool};
pub use error::{MailboxError, ServiceError};
pub use heartbeat::{Heartbeat, PeerMonitor, PeerWatch};
pub use mailbox::{Channel, ChannelRef, FileChannel, MemoryChannel, MessageWriter, ServiceType};
pub use service::{Action, ActionSource, ServiceHandler, ServiceState};
pub use sysstat::StatCollector;
