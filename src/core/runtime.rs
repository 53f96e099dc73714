//! # ServiceRuntime: the single logical control loop.
//!
//! One task multiplexes everything a service process does:
//!
//! ```text
//! loop {
//!   ├─► supervisor action arrived  ──► dispatch through the descriptor
//!   ├─► heartbeat interval elapsed ──► emit liveness signal
//!   ├─► poll interval elapsed      ──► handler.on_poll() (statistics)
//!   ├─► admin connection accepted  ──► serve synchronously, then resume
//!   └─► cancellation (OS signal)   ──► STOP, then DESTROY, then exit
//! }
//! ```
//!
//! ## Rules
//! - Admin connections are serviced to completion before the wait resumes;
//!   there is no further draining on shutdown.
//! - DESTROY (from the supervisor or via signal) ends the loop; the process
//!   exits right after.
//! - An exhausted action source only disables that arm; timers and admin
//!   keep running.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::admin::{serve_connection, AdminServer};
use crate::heartbeat::Heartbeat;
use crate::mailbox::ChannelRef;
use crate::service::{Action, ActionSource, Flow, ServiceDescriptor, ServiceHandler, ServiceState};

/// Timer settings for the control loop.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Heartbeat interval.
    pub heartbeat: Duration,
    /// Statistics poll interval (shorter than the heartbeat).
    pub poll: Duration,
}

/// The per-service control loop.
pub struct ServiceRuntime<H> {
    descriptor: ServiceDescriptor,
    handler: H,
    actions: Option<Box<dyn ActionSource>>,
    admin: Option<AdminServer>,
    opts: RuntimeOptions,
}

impl<H: ServiceHandler> ServiceRuntime<H> {
    /// Assembles a runtime over a channel, a handler, and an action source.
    /// `admin` is only wired for services that expose the operator protocol.
    pub fn new(
        channel: ChannelRef,
        handler: H,
        actions: Box<dyn ActionSource>,
        admin: Option<AdminServer>,
        opts: RuntimeOptions,
    ) -> Self {
        Self {
            descriptor: ServiceDescriptor::new(channel),
            handler,
            actions: Some(actions),
            admin,
            opts,
        }
    }

    /// Runs until DESTROY or cancellation.
    pub async fn run(mut self, token: CancellationToken) {
        let beat = Heartbeat::new(self.descriptor.channel().clone());

        let mut heartbeat = tokio::time::interval(self.opts.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll = tokio::time::interval(self.opts.poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    if self.descriptor.state() == Some(ServiceState::Running) {
                        self.descriptor.dispatch(Action::Stop, &mut self.handler).await;
                    }
                    self.descriptor.dispatch(Action::Destroy, &mut self.handler).await;
                    return;
                }
                action = next_action(&mut self.actions) => {
                    if let Some(action) = action {
                        let flow = self.descriptor.dispatch(action, &mut self.handler).await;
                        if flow == Flow::Exit {
                            return;
                        }
                    }
                }
                _ = heartbeat.tick() => beat.beat(),
                _ = poll.tick() => self.handler.on_poll().await,
                conn = maybe_accept(&self.admin) => {
                    match conn {
                        Ok(stream) => {
                            let handler = &mut self.handler;
                            let served =
                                serve_connection(stream, |req| handler.on_admin(req)).await;
                            if let Err(err) = served {
                                warn!(error = %err, "admin connection failed");
                            }
                        }
                        Err(err) => warn!(error = %err, "admin accept failed"),
                    }
                }
            }
        }
    }
}

/// Awaits the next action, disabling the source once exhausted so the loop
/// never spins on a closed queue.
async fn next_action(source: &mut Option<Box<dyn ActionSource>>) -> Option<Action> {
    match source {
        Some(actions) => {
            let action = actions.next().await;
            if action.is_none() {
                *source = None;
            }
            action
        }
        None => std::future::pending().await,
    }
}

/// Accept arm; permanently pending for services without an admin surface.
async fn maybe_accept(admin: &Option<AdminServer>) -> std::io::Result<TcpStream> {
    match admin {
        Some(server) => server.accept().await,
        None => std::future::pending().await,
    }
}
