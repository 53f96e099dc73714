//! Error types used by the mailbox layer and the service runtime.
//!
//! This module defines the two core error enums:
//!
//! - [`MailboxError`] — failures of the shared mailbox channel or of the wire
//!   codec writing into it.
//! - [`ServiceError`] — failures raised while driving a service through a
//!   lifecycle transition.
//!
//! Both types provide `as_label` helpers returning short stable strings for
//! logs. Layer-local errors (external tooling, admin protocol, configuration)
//! live next to their modules.

use thiserror::Error;

/// # Errors produced by the mailbox channel and wire codec.
///
/// A codec error aborts the single in-progress message; it never corrupts
/// state that was already committed to the channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MailboxError {
    /// A field write would overflow the channel's declared capacity.
    #[error("message would exceed channel capacity: need {needed}, {remaining} left")]
    CapacityExceeded {
        /// Bytes the rejected write required.
        needed: usize,
        /// Bytes still available for this message.
        remaining: usize,
    },

    /// A field value cannot be represented in its wire encoding.
    #[error("field not encodable: {reason}")]
    FieldTooLarge {
        /// What made the value unencodable (e.g. text longer than 65535 bytes).
        reason: &'static str,
    },

    /// A read touched bytes outside the channel's slot.
    #[error("read out of bounds: offset {offset} len {len}")]
    OutOfBounds { offset: usize, len: usize },

    /// The channel was closed by its owner.
    #[error("channel closed")]
    Closed,

    /// I/O failure against the channel backing.
    #[error("channel i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl MailboxError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            MailboxError::CapacityExceeded { .. } => "mailbox_capacity_exceeded",
            MailboxError::FieldTooLarge { .. } => "mailbox_field_too_large",
            MailboxError::OutOfBounds { .. } => "mailbox_out_of_bounds",
            MailboxError::Closed => "mailbox_closed",
            MailboxError::Io(_) => "mailbox_io",
        }
    }
}

/// # Errors produced while driving a lifecycle transition.
///
/// A `Channel` error means the mailbox itself is unusable; the runtime reacts
/// by declaring the service DISABLED. Resource-level failures are absorbed by
/// the handler (the affected resource is marked BAD) and never surface here.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Publishing through the mailbox failed; the channel is unusable.
    #[error("mailbox unusable: {0}")]
    Channel(#[from] MailboxError),

    /// The service as a whole cannot operate (distinct from one bad resource).
    #[error("service failure: {reason}")]
    Failed {
        /// Human-readable description.
        reason: String,
    },
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Channel(_) => "service_channel",
            ServiceError::Failed { .. } => "service_failed",
        }
    }
}
