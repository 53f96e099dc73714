//! # Handler seam between the state machine and a concrete service.
//!
//! A service implements [`ServiceHandler`]; the descriptor drives it through
//! lifecycle transitions and owns the resulting state bookkeeping. Handlers
//! absorb per-resource failures themselves (marking the resource BAD); an
//! `Err` from a transition means the service as a whole cannot continue.

use async_trait::async_trait;

use crate::admin::{AdminRequest, AdminStatus};
use crate::error::ServiceError;

/// A service driven by supervisor-issued actions.
///
/// ### Contract
/// - Methods are invoked from the single control-loop task; they must not
///   block indefinitely, since the supervisor is waiting on the state change.
/// - Each transition method publishes the service's full statistics snapshot
///   before returning; a publish failure is the canonical
///   [`ServiceError::Channel`] and disables the service.
/// - `on_poll` runs on the statistics interval regardless of state; the
///   handler decides what (if anything) to sample.
#[async_trait]
pub trait ServiceHandler: Send + 'static {
    /// Stable service name for logs.
    fn name(&self) -> &str;

    /// INIT: probe and initialize every owned resource.
    ///
    /// Resources that fail initialization are marked BAD without aborting the
    /// transition.
    async fn on_init(&mut self) -> Result<(), ServiceError>;

    /// START: begin serving.
    async fn on_start(&mut self) -> Result<(), ServiceError>;

    /// STOP: stop serving; resources stay initialized.
    async fn on_stop(&mut self) -> Result<(), ServiceError>;

    /// DESTROY: release all resources. The process exits right after; no
    /// further states are reported.
    async fn on_destroy(&mut self);

    /// Periodic statistics poll.
    async fn on_poll(&mut self);

    /// Operator command delivered out of band from the supervisor.
    ///
    /// Services without an admin surface keep the default, which rejects
    /// every request.
    async fn on_admin(&mut self, request: AdminRequest) -> AdminStatus {
        let _ = request;
        AdminStatus::Error
    }
}
