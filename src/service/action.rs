//! # Supervisor-issued actions and their delivery into the control loop.
//!
//! The shared slot's callback contract is re-expressed here as an explicit
//! message-passing boundary: actions arrive as an ordered stream the control
//! loop awaits, instead of a callback invoked behind the service's back.
//!
//! ## Sources
//! - [`QueueActions`] — in-process queue; used by tests and by embedders that
//!   drive a service directly.
//! - [`SlotActions`] — polls the file-backed slot's command cell and delivers
//!   each newly sequenced command exactly once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::mailbox::FileChannel;

/// One supervisor-issued lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Probe and initialize all owned resources.
    Init,
    /// Begin serving.
    Start,
    /// Stop serving, keep resources initialized.
    Stop,
    /// Release everything and terminate the process.
    Destroy,
}

impl Action {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(self) -> &'static str {
        match self {
            Action::Init => "init",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Destroy => "destroy",
        }
    }

    /// Decodes a command-cell opcode; 0 and unknown values carry no action.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            1 => Some(Action::Init),
            2 => Some(Action::Start),
            3 => Some(Action::Stop),
            4 => Some(Action::Destroy),
            _ => None,
        }
    }
}

/// Ordered delivery of actions into a service's control loop.
#[async_trait]
pub trait ActionSource: Send {
    /// Waits for the next action; `None` means the source is exhausted and
    /// no further actions will ever arrive.
    async fn next(&mut self) -> Option<Action>;
}

/// In-process action queue.
pub struct QueueActions {
    rx: mpsc::Receiver<Action>,
}

impl QueueActions {
    /// Creates a queue and the sending half used to drive it.
    pub fn pair(capacity: usize) -> (mpsc::Sender<Action>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl ActionSource for QueueActions {
    async fn next(&mut self) -> Option<Action> {
        self.rx.recv().await
    }
}

/// Polls the file-backed slot's command cell.
///
/// The supervisor writes an opcode together with an incremented command
/// sequence; each sequence change is delivered as one action. A poll failure
/// is logged and retried on the next tick — the supervisor sees a stuck
/// service through the heartbeat, not through a torn-down poller.
pub struct SlotActions {
    channel: Arc<FileChannel>,
    every: Duration,
    last_seq: u16,
}

impl SlotActions {
    /// Creates a poller over `channel`, checking the command cell `every`
    /// interval.
    pub fn new(channel: Arc<FileChannel>, every: Duration) -> Self {
        Self {
            channel,
            every,
            last_seq: 0,
        }
    }
}

#[async_trait]
impl ActionSource for SlotActions {
    async fn next(&mut self) -> Option<Action> {
        let mut tick = tokio::time::interval(self.every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let (opcode, seq) = match self.channel.command() {
                Ok(cell) => cell,
                Err(err) => {
                    warn!(error = %err, label = err.as_label(), "command poll failed");
                    continue;
                }
            };
            if seq == self.last_seq {
                continue;
            }
            self.last_seq = seq;
            match Action::from_opcode(opcode) {
                Some(action) => return Some(action),
                None => warn!(opcode, seq, "unknown command opcode ignored"),
            }
        }
    }
}
