//! # Global runtime configuration.
//!
//! One [`Config`] per service process, constructed at startup from the
//! environment and command line, then threaded through everything — there is
//! no global configuration state.
//!
//! ## Field semantics
//! - `poll` must be shorter than `heartbeat`: the statistics poll is the
//!   loop's fast timer, liveness the slow one.
//! - `health_every` counts polls between health-attribute evaluations
//!   (minimum 1).
//! - `peer_grace` is the number of missed heartbeat intervals tolerated
//!   before a peer is declared failed (minimum 1; a single miss never is).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::RuntimeOptions;
use crate::disk::HealthThresholds;

/// Environment variable naming this process's mailbox.
pub const MAILBOX_ENV: &str = "STORVISOR_MAILBOX";

/// Errors fatal at startup.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The mailbox environment variable is missing or empty.
    #[error("mailbox name missing: set {MAILBOX_ENV}")]
    MissingMailbox,
}

/// Per-process runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Mailbox name, from [`MAILBOX_ENV`].
    pub mailbox: String,
    /// Directory holding the file-backed mailbox slots.
    pub runtime_dir: PathBuf,
    /// Root under which managed disks are mounted and exported.
    pub mount_root: PathBuf,
    /// Message-area capacity of the mailbox slot, in bytes.
    pub channel_capacity: usize,
    /// Heartbeat interval.
    pub heartbeat: Duration,
    /// Statistics poll interval; keep shorter than `heartbeat`.
    pub poll: Duration,
    /// Health attributes are evaluated every this many polls.
    pub health_every: u32,
    /// Command-cell poll interval for supervisor actions.
    pub command_poll: Duration,
    /// Admin protocol listen address.
    pub admin_addr: SocketAddr,
    /// Deadline for routine external commands.
    pub short_timeout: Duration,
    /// Deadline for filesystem creation.
    pub long_timeout: Duration,
    /// Disk health failure thresholds.
    pub thresholds: HealthThresholds,
    /// Missed heartbeat intervals tolerated from a peer.
    pub peer_grace: u32,
}

impl Config {
    /// Defaults for the given mailbox name.
    ///
    /// - `heartbeat = 5s`, `poll = 2s`, `health_every = 15` (≈30s cadence)
    /// - `command_poll = 500ms`
    /// - `short_timeout = 60s`, `long_timeout = 600s`
    /// - `channel_capacity = 4096`
    /// - `admin_addr = 127.0.0.1:7420`
    /// - `runtime_dir = /var/run/storvisor`, `mount_root = /export`
    pub fn with_mailbox(mailbox: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            runtime_dir: PathBuf::from("/var/run/storvisor"),
            mount_root: PathBuf::from("/export"),
            channel_capacity: 4096,
            heartbeat: Duration::from_secs(5),
            poll: Duration::from_secs(2),
            health_every: 15,
            command_poll: Duration::from_millis(500),
            admin_addr: SocketAddr::from(([127, 0, 0, 1], 7420)),
            short_timeout: Duration::from_secs(60),
            long_timeout: Duration::from_secs(600),
            thresholds: HealthThresholds::default(),
            peer_grace: 1,
        }
    }

    /// Reads the mailbox name from the environment; missing or empty is a
    /// startup failure.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(MAILBOX_ENV) {
            Ok(name) if !name.is_empty() => Ok(Self::with_mailbox(name)),
            _ => Err(ConfigError::MissingMailbox),
        }
    }

    /// Timer settings for the control loop.
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            heartbeat: self.heartbeat,
            poll: self.poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_keep_poll_under_heartbeat() {
        let cfg = Config::with_mailbox("disk0");
        assert!(cfg.poll < cfg.heartbeat);
        assert!(cfg.health_every >= 1);
        assert!(cfg.peer_grace >= 1);
    }
}
