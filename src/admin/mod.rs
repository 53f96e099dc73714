//! Admin command server: operator-driven lifecycle actions over TCP.
//!
//! A deliberately small, fixed-schema protocol — one request and one status
//! response per connection, no authentication — multiplexed into the service
//! control loop so commands are serviced synchronously between polls.
//!
//! ## Contents
//! - [`AdminOp`], [`AdminRequest`], [`AdminStatus`] — the wire protocol
//! - [`AdminServer`] — accept loop half; connections are served by the
//!   control loop via [`serve_connection`]

mod proto;
mod server;

pub use proto::{AdminError, AdminOp, AdminRequest, AdminStatus, PARAM_LEN, REQUEST_LEN};
pub use server::{serve_connection, AdminServer};
