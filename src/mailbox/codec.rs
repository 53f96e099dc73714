//! # Wire codec: field-by-field message encoding with sequence numbering.
//!
//! [`MessageWriter`] accumulates typed fields for one mailbox message and
//! commits them to the channel as a single atomic write. Capacity is enforced
//! per field: a write that would overflow the channel's declared capacity
//! fails without touching the channel, and the caller must treat that as
//! fatal to the whole message.
//!
//! ## Commit discipline
//! ```text
//! open ──► write_* ──► write_* ──► commit ──► one Channel::write(frame)
//!             │
//!             └─ Err(CapacityExceeded) ──► abort (channel untouched)
//! ```
//!
//! ## Sequence numbers
//! The prior sequence number is read from a fixed offset of the committed
//! frame before encoding. The first message after a process restart resets to
//! 1, signaled explicitly by the writer via `reset_sequence`. The value runs
//! 1..=32767 and wraps back to 1 instead of overflowing.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::MailboxError;
use crate::mailbox::{Channel, ServiceType};

/// Frame header: 4-byte length, 2-byte version, 2-byte tag, 2-byte sequence.
pub const HEADER_LEN: usize = 10;

/// Offset of the sequence number within a committed frame.
pub const SEQ_OFFSET: usize = 8;

/// Largest representable sequence number; the next value wraps to 1.
pub const MAX_SEQ: u16 = 32767;

/// Field-by-field encoder for one mailbox message.
///
/// Obtained via [`MessageWriter::open`]; consumed by [`commit`] or [`abort`].
/// Dropping the writer without committing is equivalent to an abort.
///
/// [`commit`]: MessageWriter::commit
/// [`abort`]: MessageWriter::abort
pub struct MessageWriter<'a> {
    channel: &'a dyn Channel,
    buf: BytesMut,
    capacity: usize,
}

impl<'a> MessageWriter<'a> {
    /// Starts a message on `channel`.
    ///
    /// Reads the prior sequence number from the committed frame and advances
    /// it, unless `reset_sequence` is set (first write since process start),
    /// in which case the sequence restarts at 1.
    pub fn open(
        channel: &'a dyn Channel,
        service_type: ServiceType,
        version: u16,
        reset_sequence: bool,
    ) -> Result<Self, MailboxError> {
        let capacity = channel.capacity();
        if capacity < HEADER_LEN {
            return Err(MailboxError::CapacityExceeded {
                needed: HEADER_LEN,
                remaining: capacity,
            });
        }

        let seq = if reset_sequence {
            1
        } else {
            let prior = channel.read(SEQ_OFFSET, 2)?;
            next_seq(u16::from_be_bytes([prior[0], prior[1]]))
        };

        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        buf.put_u32(0); // length prefix, patched at commit
        buf.put_u16(version);
        buf.put_u16(service_type.tag());
        buf.put_u16(seq);

        Ok(Self {
            channel,
            buf,
            capacity,
        })
    }

    /// Sequence number this message will carry.
    pub fn seq(&self) -> u16 {
        u16::from_be_bytes([self.buf[SEQ_OFFSET], self.buf[SEQ_OFFSET + 1]])
    }

    fn ensure(&self, needed: usize) -> Result<(), MailboxError> {
        let remaining = self.capacity - self.buf.len();
        if needed > remaining {
            return Err(MailboxError::CapacityExceeded { needed, remaining });
        }
        Ok(())
    }

    /// Appends a big-endian 16-bit integer.
    pub fn write_i16(&mut self, value: i16) -> Result<(), MailboxError> {
        self.ensure(2)?;
        self.buf.put_i16(value);
        Ok(())
    }

    /// Appends a big-endian 32-bit integer.
    pub fn write_i32(&mut self, value: i32) -> Result<(), MailboxError> {
        self.ensure(4)?;
        self.buf.put_i32(value);
        Ok(())
    }

    /// Appends a big-endian IEEE-754 32-bit float.
    pub fn write_f32(&mut self, value: f32) -> Result<(), MailboxError> {
        self.ensure(4)?;
        self.buf.put_f32(value);
        Ok(())
    }

    /// Appends text as a 2-byte big-endian length prefix plus raw bytes.
    ///
    /// No terminator is written. Text longer than 65535 bytes is not
    /// representable and is rejected before the capacity check.
    pub fn write_str(&mut self, value: &str) -> Result<(), MailboxError> {
        if value.len() > u16::MAX as usize {
            return Err(MailboxError::FieldTooLarge {
                reason: "text exceeds 65535 bytes",
            });
        }
        self.ensure(2 + value.len())?;
        self.buf.put_u16(value.len() as u16);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Appends an opaque identifier as a 1-byte length prefix plus raw bytes.
    pub fn write_opaque(&mut self, value: &[u8]) -> Result<(), MailboxError> {
        if value.len() > u8::MAX as usize {
            return Err(MailboxError::FieldTooLarge {
                reason: "identifier exceeds 255 bytes",
            });
        }
        self.ensure(1 + value.len())?;
        self.buf.put_u8(value.len() as u8);
        self.buf.put_slice(value);
        Ok(())
    }

    /// Finalizes the message: patches the total length into the prefix and
    /// performs the single atomic channel write.
    pub fn commit(mut self) -> Result<(), MailboxError> {
        let total = self.buf.len() as u32;
        self.buf[..4].copy_from_slice(&total.to_be_bytes());
        self.channel.write(&self.buf)
    }

    /// Discards the in-progress buffer; the channel is left untouched.
    pub fn abort(self) {
        drop(self);
    }
}

fn next_seq(prior: u16) -> u16 {
    if prior == 0 || prior >= MAX_SEQ {
        1
    } else {
        prior + 1
    }
}

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame length, including the 4-byte prefix itself.
    pub total_len: u32,
    /// Format version.
    pub version: u16,
    /// Service-type tag; selects the payload schema.
    pub tag: u16,
    /// Sequence number (1..=32767).
    pub seq: u16,
}

impl FrameHeader {
    /// Parses the header from the start of a committed frame.
    pub fn parse(frame: &[u8]) -> Result<Self, MailboxError> {
        if frame.len() < HEADER_LEN {
            return Err(MailboxError::OutOfBounds {
                offset: 0,
                len: HEADER_LEN,
            });
        }
        let mut buf = &frame[..HEADER_LEN];
        Ok(Self {
            total_len: buf.get_u32(),
            version: buf.get_u16(),
            tag: buf.get_u16(),
            seq: buf.get_u16(),
        })
    }
}

/// Schema-driven reader over a frame's payload fields.
///
/// The mailbox carries no self-describing schema: callers must read fields in
/// the exact order the writing service used for this version/tag pair.
pub struct FieldReader {
    buf: Bytes,
}

impl FieldReader {
    /// Creates a reader positioned at the first payload field of `frame`.
    pub fn over(frame: &[u8]) -> Result<(FrameHeader, Self), MailboxError> {
        let header = FrameHeader::parse(frame)?;
        let end = header.total_len as usize;
        if end > frame.len() || end < HEADER_LEN {
            return Err(MailboxError::OutOfBounds {
                offset: HEADER_LEN,
                len: end,
            });
        }
        Ok((
            header,
            Self {
                buf: Bytes::copy_from_slice(&frame[HEADER_LEN..end]),
            },
        ))
    }

    fn take(&mut self, len: usize) -> Result<Bytes, MailboxError> {
        if self.buf.remaining() < len {
            return Err(MailboxError::OutOfBounds {
                offset: 0,
                len,
            });
        }
        Ok(self.buf.split_to(len))
    }

    /// Reads a big-endian 16-bit integer.
    pub fn read_i16(&mut self) -> Result<i16, MailboxError> {
        Ok(self.take(2)?.get_i16())
    }

    /// Reads a big-endian 32-bit integer.
    pub fn read_i32(&mut self) -> Result<i32, MailboxError> {
        Ok(self.take(4)?.get_i32())
    }

    /// Reads a big-endian 32-bit float.
    pub fn read_f32(&mut self) -> Result<f32, MailboxError> {
        Ok(self.take(4)?.get_f32())
    }

    /// Reads a length-prefixed text field.
    pub fn read_str(&mut self) -> Result<String, MailboxError> {
        let len = self.take(2)?.get_u16() as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| MailboxError::FieldTooLarge {
            reason: "text field is not UTF-8",
        })
    }

    /// Reads a length-prefixed opaque identifier.
    pub fn read_opaque(&mut self) -> Result<Vec<u8>, MailboxError> {
        let len = self.take(1)?.get_u8() as usize;
        Ok(self.take(len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{MemoryChannel, FORMAT_VERSION};

    fn commit_empty(ch: &MemoryChannel, reset: bool) -> u16 {
        let w = MessageWriter::open(ch, ServiceType::Disk, FORMAT_VERSION, reset).unwrap();
        let seq = w.seq();
        w.commit().unwrap();
        seq
    }

    #[test]
    fn test_first_commit_resets_sequence_to_one() {
        let ch = MemoryChannel::new(256);
        assert_eq!(commit_empty(&ch, true), 1);
    }

    #[test]
    fn test_sequence_strictly_increases_across_commits() {
        let ch = MemoryChannel::new(256);
        commit_empty(&ch, true);
        for expected in 2..=10u16 {
            assert_eq!(commit_empty(&ch, false), expected);
        }
    }

    #[test]
    fn test_sequence_wraps_to_one_at_max() {
        let ch = MemoryChannel::new(256);
        // Plant a frame carrying the maximum sequence.
        let mut frame = vec![0u8; HEADER_LEN];
        frame[..4].copy_from_slice(&(HEADER_LEN as u32).to_be_bytes());
        frame[SEQ_OFFSET..SEQ_OFFSET + 2].copy_from_slice(&MAX_SEQ.to_be_bytes());
        ch.write(&frame).unwrap();

        assert_eq!(commit_empty(&ch, false), 1);
    }

    #[test]
    fn test_frame_layout() {
        let ch = MemoryChannel::new(256);
        let mut w = MessageWriter::open(&ch, ServiceType::Stats, FORMAT_VERSION, true).unwrap();
        w.write_i16(7).unwrap();
        w.write_str("vdiskA").unwrap();
        w.commit().unwrap();

        let frame = ch.committed_frame().unwrap();
        let (header, mut fields) = FieldReader::over(&frame).unwrap();
        assert_eq!(header.total_len as usize, frame.len());
        assert_eq!(header.version, FORMAT_VERSION);
        assert_eq!(header.tag, ServiceType::Stats.tag());
        assert_eq!(header.seq, 1);
        assert_eq!(fields.read_i16().unwrap(), 7);
        assert_eq!(fields.read_str().unwrap(), "vdiskA");
    }

    #[test]
    fn test_typed_field_encodings() {
        let ch = MemoryChannel::new(256);
        let mut w = MessageWriter::open(&ch, ServiceType::Disk, FORMAT_VERSION, true).unwrap();
        w.write_i32(-5).unwrap();
        w.write_f32(1.5).unwrap();
        w.write_opaque(&[0xAA, 0xBB]).unwrap();
        w.commit().unwrap();

        let frame = ch.committed_frame().unwrap();
        let (_, mut fields) = FieldReader::over(&frame).unwrap();
        assert_eq!(fields.read_i32().unwrap(), -5);
        assert_eq!(fields.read_f32().unwrap(), 1.5);
        assert_eq!(fields.read_opaque().unwrap(), vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_overflowing_write_fails_and_channel_is_unchanged() {
        let ch = MemoryChannel::new(32);
        // Commit a first message so the slot has known prior contents.
        let mut w = MessageWriter::open(&ch, ServiceType::Disk, FORMAT_VERSION, true).unwrap();
        w.write_i16(42).unwrap();
        w.commit().unwrap();
        let before = ch.committed_frame().unwrap();

        let mut w = MessageWriter::open(&ch, ServiceType::Disk, FORMAT_VERSION, false).unwrap();
        w.write_i32(1).unwrap();
        let err = w.write_str("this text cannot possibly fit").unwrap_err();
        assert!(matches!(err, MailboxError::CapacityExceeded { .. }));
        w.abort();

        assert_eq!(ch.committed_frame().unwrap(), before, "abort must not mutate");
    }

    #[test]
    fn test_oversized_identifier_rejected() {
        let ch = MemoryChannel::new(1024);
        let mut w = MessageWriter::open(&ch, ServiceType::Disk, FORMAT_VERSION, true).unwrap();
        let id = vec![0u8; 256];
        assert!(matches!(
            w.write_opaque(&id),
            Err(MailboxError::FieldTooLarge { .. })
        ));
    }
}
