//! Runtime core: the per-service control loop.
//!
//! Each service process is one logical control loop ([`ServiceRuntime`])
//! multiplexing supervisor actions, the heartbeat tick, the statistics poll,
//! and incoming admin connections over a single task.
//!
//! Internal modules:
//! - [`runtime`]: the loop itself;
//! - [`shutdown`]: cross-platform termination-signal handling.

mod runtime;
mod shutdown;

pub use runtime::{RuntimeOptions, ServiceRuntime};
pub use shutdown::wait_for_termination;
