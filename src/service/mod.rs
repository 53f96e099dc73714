//! Service state machine: actions, states, and the handler seam.
//!
//! A service publishes one of three lifecycle states through its mailbox and
//! reacts to four supervisor-issued actions. This module provides:
//! - [`ServiceState`] — READY / RUNNING / DISABLED
//! - [`Action`] — INIT / START / STOP / DESTROY, dispatched exhaustively
//! - [`ServiceHandler`] — the trait a concrete service implements
//! - [`ServiceDescriptor`] — glue that drives a handler through a transition
//!   and keeps the channel's state flag consistent
//! - [`ActionSource`] / [`QueueActions`] / [`SlotActions`] — ordered delivery
//!   of actions into the control loop

mod action;
mod descriptor;
mod handler;
mod state;

pub use action::{Action, ActionSource, QueueActions, SlotActions};
pub use descriptor::{Flow, ServiceDescriptor};
pub use handler::ServiceHandler;
pub use state::ServiceState;
