//! # Channel client over the shared mailbox slot.
//!
//! The slot itself is owned jointly by the service process and the
//! cluster-wide supervisor; this module models the service's side of it as an
//! explicit client rather than shared mutable memory — ownership of the
//! backing bytes genuinely transfers to the channel on a committed write.
//!
//! ## Slot anatomy
//! ```text
//! ┌─────────────── control region (32 B) ───────────────┬──── message area ────┐
//! │ state │ heartbeat ctr │ notify ctr │ command │ seq  │ [len][hdr][payload…] │
//! │  1 B  │      8 B      │     8 B    │   1 B   │ 2 B  │   `capacity` bytes   │
//! └───────┴───────────────┴────────────┴─────────┴──────┴──────────────────────┘
//! ```
//! `read`/`write` address the message area only; the control fields are
//! reached through the dedicated operations (`set_state`, `heartbeat`,
//! `broadcast`).
//!
//! ## Rules
//! - A `write` replaces the whole committed frame in one operation; a reader
//!   never observes a half-written message.
//! - `heartbeat` and `broadcast` are cheap counter bumps the supervisor polls.
//! - After `close`, every operation fails with [`MailboxError::Closed`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::MailboxError;
use crate::service::ServiceState;

/// Size of the control region preceding the message area.
const CONTROL_LEN: u64 = 32;

const STATE_OFF: u64 = 0;
const BEAT_OFF: u64 = 1;
const NOTIFY_OFF: u64 = 9;
const COMMAND_OFF: u64 = 17;

/// Client contract of the shared mailbox slot.
///
/// Implementations must be cheap to call from a single-threaded control loop;
/// none of these operations may block for longer than a local file write.
pub trait Channel: Send + Sync + 'static {
    /// Declared capacity of the message area, in bytes.
    fn capacity(&self) -> usize;

    /// Publishes the service's declared lifecycle state.
    fn set_state(&self, state: ServiceState) -> Result<(), MailboxError>;

    /// Reads back the currently declared state, if any was ever set.
    fn state(&self) -> Result<Option<ServiceState>, MailboxError>;

    /// Emits one liveness signal (bumps the heartbeat counter).
    fn heartbeat(&self) -> Result<(), MailboxError>;

    /// Notifies the supervisor immediately instead of waiting for its poll.
    fn broadcast(&self) -> Result<(), MailboxError>;

    /// Reads `len` bytes of the message area starting at `offset`.
    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, MailboxError>;

    /// Replaces the committed frame with `frame`, as one atomic operation.
    fn write(&self, frame: &[u8]) -> Result<(), MailboxError>;

    /// Closes the channel; all further operations fail.
    fn close(&self);
}

/// Shared handle to a channel.
pub type ChannelRef = std::sync::Arc<dyn Channel>;

// ---------------------------------------------------------------------------
// In-memory backing
// ---------------------------------------------------------------------------

struct MemoryInner {
    slot: Vec<u8>,
    state: Option<ServiceState>,
    beats: u64,
    notifies: u64,
    closed: bool,
}

/// In-process channel backing.
///
/// Used by tests and by embedders that host both halves in one process. The
/// message area starts zero-filled, so a sequence-number read on a slot that
/// was never written yields 0 (and the next sequence becomes 1), matching the
/// behavior of a freshly mapped slot.
pub struct MemoryChannel {
    capacity: usize,
    inner: Mutex<MemoryInner>,
}

impl MemoryChannel {
    /// Creates a channel with the given message-area capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(MemoryInner {
                slot: vec![0u8; capacity],
                state: None,
                beats: 0,
                notifies: 0,
                closed: false,
            }),
        }
    }

    /// Supervisor-side view: the committed frame, if any.
    ///
    /// Reads the length prefix and returns exactly that many bytes. Returns
    /// `None` when nothing was ever committed.
    pub fn committed_frame(&self) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let len = u32::from_be_bytes(inner.slot.get(..4)?.try_into().ok()?) as usize;
        if len == 0 || len > inner.slot.len() {
            return None;
        }
        Some(inner.slot[..len].to_vec())
    }

    /// Supervisor-side view: liveness signals observed so far.
    pub fn beats(&self) -> u64 {
        self.inner.lock().unwrap().beats
    }

    /// Supervisor-side view: immediate notifications observed so far.
    pub fn notifies(&self) -> u64 {
        self.inner.lock().unwrap().notifies
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, MailboxError> {
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(MailboxError::Closed);
        }
        Ok(inner)
    }
}

impl Channel for MemoryChannel {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_state(&self, state: ServiceState) -> Result<(), MailboxError> {
        self.guard()?.state = Some(state);
        Ok(())
    }

    fn state(&self) -> Result<Option<ServiceState>, MailboxError> {
        Ok(self.guard()?.state)
    }

    fn heartbeat(&self) -> Result<(), MailboxError> {
        self.guard()?.beats += 1;
        Ok(())
    }

    fn broadcast(&self) -> Result<(), MailboxError> {
        self.guard()?.notifies += 1;
        Ok(())
    }

    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, MailboxError> {
        let inner = self.guard()?;
        let end = offset.checked_add(len).filter(|&e| e <= inner.slot.len());
        match end {
            Some(end) => Ok(inner.slot[offset..end].to_vec()),
            None => Err(MailboxError::OutOfBounds { offset, len }),
        }
    }

    fn write(&self, frame: &[u8]) -> Result<(), MailboxError> {
        let mut inner = self.guard()?;
        if frame.len() > inner.slot.len() {
            return Err(MailboxError::CapacityExceeded {
                needed: frame.len(),
                remaining: inner.slot.len(),
            });
        }
        inner.slot[..frame.len()].copy_from_slice(frame);
        Ok(())
    }

    fn close(&self) {
        self.inner.lock().unwrap().closed = true;
    }
}

// ---------------------------------------------------------------------------
// File backing
// ---------------------------------------------------------------------------

struct FileInner {
    file: std::fs::File,
    closed: bool,
}

/// File-backed channel shared with a co-located supervisor.
///
/// The slot lives at `<dir>/<mailbox>.mbx` and is sized once at open. The
/// supervisor maps the same file: it polls the control region for state and
/// liveness, and writes command opcodes into the command cell (see
/// [`FileChannel::command`]).
pub struct FileChannel {
    path: PathBuf,
    capacity: usize,
    inner: Mutex<FileInner>,
}

impl FileChannel {
    /// Opens (creating if absent) the slot named `mailbox` under `dir`.
    ///
    /// The file is extended to the full slot size so control-region reads
    /// never hit a short file.
    pub fn open(dir: &Path, mailbox: &str, capacity: usize) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{mailbox}.mbx"));
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        file.set_len(CONTROL_LEN + capacity as u64)?;
        Ok(Self {
            path,
            capacity,
            inner: Mutex::new(FileInner {
                file,
                closed: false,
            }),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the command cell: `(opcode, command sequence)`.
    ///
    /// The supervisor writes an opcode together with an incremented sequence;
    /// a poller delivers the command once per sequence change. Opcode mapping
    /// belongs to the service layer.
    pub fn command(&self) -> Result<(u8, u16), MailboxError> {
        let inner = self.guard()?;
        let mut buf = [0u8; 3];
        read_at(&inner.file, COMMAND_OFF, &mut buf)?;
        Ok((buf[0], u16::from_be_bytes([buf[1], buf[2]])))
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, FileInner>, MailboxError> {
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(MailboxError::Closed);
        }
        Ok(inner)
    }

    fn bump_counter(&self, offset: u64) -> Result<(), MailboxError> {
        let inner = self.guard()?;
        let mut buf = [0u8; 8];
        read_at(&inner.file, offset, &mut buf)?;
        let next = u64::from_be_bytes(buf).wrapping_add(1);
        write_at(&inner.file, offset, &next.to_be_bytes())?;
        Ok(())
    }
}

#[cfg(unix)]
fn read_at(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_at(file: &std::fs::File, offset: u64, buf: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

impl Channel for FileChannel {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_state(&self, state: ServiceState) -> Result<(), MailboxError> {
        let inner = self.guard()?;
        write_at(&inner.file, STATE_OFF, &[state.to_wire()])?;
        Ok(())
    }

    fn state(&self) -> Result<Option<ServiceState>, MailboxError> {
        let inner = self.guard()?;
        let mut buf = [0u8; 1];
        read_at(&inner.file, STATE_OFF, &mut buf)?;
        Ok(ServiceState::from_wire(buf[0]))
    }

    fn heartbeat(&self) -> Result<(), MailboxError> {
        self.bump_counter(BEAT_OFF)
    }

    fn broadcast(&self) -> Result<(), MailboxError> {
        self.bump_counter(NOTIFY_OFF)
    }

    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, MailboxError> {
        if offset.checked_add(len).map_or(true, |e| e > self.capacity) {
            return Err(MailboxError::OutOfBounds { offset, len });
        }
        let inner = self.guard()?;
        let mut buf = vec![0u8; len];
        read_at(&inner.file, CONTROL_LEN + offset as u64, &mut buf)?;
        Ok(buf)
    }

    fn write(&self, frame: &[u8]) -> Result<(), MailboxError> {
        if frame.len() > self.capacity {
            return Err(MailboxError::CapacityExceeded {
                needed: frame.len(),
                remaining: self.capacity,
            });
        }
        let inner = self.guard()?;
        write_at(&inner.file, CONTROL_LEN, frame)?;
        Ok(())
    }

    fn close(&self) {
        self.inner.lock().unwrap().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_roundtrip() {
        let ch = MemoryChannel::new(64);
        ch.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(ch.read(0, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(ch.read(60, 4).unwrap(), vec![0, 0, 0, 0]);
        assert!(matches!(
            ch.read(60, 5),
            Err(MailboxError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_memory_counters_and_state() {
        let ch = MemoryChannel::new(16);
        assert_eq!(ch.state().unwrap(), None);
        ch.set_state(ServiceState::Ready).unwrap();
        ch.heartbeat().unwrap();
        ch.heartbeat().unwrap();
        ch.broadcast().unwrap();
        assert_eq!(ch.state().unwrap(), Some(ServiceState::Ready));
        assert_eq!(ch.beats(), 2);
        assert_eq!(ch.notifies(), 1);
    }

    #[test]
    fn test_memory_rejects_after_close() {
        let ch = MemoryChannel::new(16);
        ch.close();
        assert!(matches!(ch.heartbeat(), Err(MailboxError::Closed)));
        assert!(matches!(ch.write(&[0]), Err(MailboxError::Closed)));
    }

    #[test]
    fn test_memory_oversized_frame_rejected() {
        let ch = MemoryChannel::new(8);
        let err = ch.write(&[0u8; 9]).unwrap_err();
        assert!(matches!(err, MailboxError::CapacityExceeded { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_channel_roundtrip() {
        let dir = std::env::temp_dir().join(format!("storvisor-test-{}", std::process::id()));
        let ch = FileChannel::open(&dir, "unit", 128).unwrap();
        ch.set_state(ServiceState::Running).unwrap();
        ch.heartbeat().unwrap();
        ch.broadcast().unwrap();
        ch.write(&[9, 8, 7]).unwrap();
        assert_eq!(ch.state().unwrap(), Some(ServiceState::Running));
        assert_eq!(ch.read(0, 3).unwrap(), vec![9, 8, 7]);
        assert_eq!(ch.command().unwrap(), (0, 0));
        std::fs::remove_dir_all(&dir).ok();
    }
}
