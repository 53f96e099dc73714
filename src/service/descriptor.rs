//! # Service descriptor: channel handle plus declared state.
//!
//! The descriptor owns the transition table. It dispatches each [`Action`] to
//! the matching handler method, derives the end state, and publishes it on
//! the channel **before** the dispatch returns — leaving the state flag unset
//! after an action would leave the channel indeterminate from the
//! supervisor's point of view.
//!
//! ## Transition table
//! ```text
//! INIT    ──► on_init    ──► READY      (DISABLED if the channel is unusable)
//! START   ──► on_start   ──► RUNNING    + immediate supervisor notification
//! STOP    ──► on_stop    ──► READY      + immediate supervisor notification
//! DESTROY ──► on_destroy ──► (exit; nothing further is reported)
//! ```

use tracing::{error, info};

use crate::mailbox::ChannelRef;
use crate::service::{Action, ServiceHandler, ServiceState};

/// What the control loop should do after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep servicing the channel.
    Continue,
    /// DESTROY was handled; terminate the process.
    Exit,
}

/// Channel handle plus the service's declared state.
///
/// Owned exclusively by the hosting process; the state is mutated only inside
/// [`dispatch`](Self::dispatch).
pub struct ServiceDescriptor {
    channel: ChannelRef,
    state: Option<ServiceState>,
}

impl ServiceDescriptor {
    /// Wraps a channel; no state is declared until the first action lands.
    pub fn new(channel: ChannelRef) -> Self {
        Self {
            channel,
            state: None,
        }
    }

    /// Currently declared state, if any action completed yet.
    pub fn state(&self) -> Option<ServiceState> {
        self.state
    }

    /// Shared channel handle.
    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    /// Applies one action to `handler` and publishes the resulting state.
    pub async fn dispatch<H: ServiceHandler>(&mut self, action: Action, handler: &mut H) -> Flow {
        info!(service = handler.name(), action = action.as_label(), "action");

        let (state, notify) = match action {
            Action::Init => (self.complete(handler.on_init().await, ServiceState::Ready), false),
            Action::Start => (
                self.complete(handler.on_start().await, ServiceState::Running),
                true,
            ),
            Action::Stop => (self.complete(handler.on_stop().await, ServiceState::Ready), true),
            Action::Destroy => {
                handler.on_destroy().await;
                return Flow::Exit;
            }
        };

        self.declare(state);
        if notify {
            if let Err(err) = self.channel.broadcast() {
                error!(error = %err, label = err.as_label(), "supervisor notification failed");
            }
        }
        Flow::Continue
    }

    /// Maps a transition result to its end state: the nominal state on
    /// success, DISABLED when the channel itself is unusable.
    fn complete(
        &self,
        result: Result<(), crate::error::ServiceError>,
        nominal: ServiceState,
    ) -> ServiceState {
        match result {
            Ok(()) => nominal,
            Err(err) => {
                error!(error = %err, label = err.as_label(), "transition failed; disabling");
                ServiceState::Disabled
            }
        }
    }

    fn declare(&mut self, state: ServiceState) {
        self.state = Some(state);
        if let Err(err) = self.channel.set_state(state) {
            error!(
                error = %err,
                state = state.as_label(),
                "failed to publish state flag"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{MailboxError, ServiceError};
    use crate::mailbox::{Channel, MemoryChannel};

    struct Scripted {
        fail_init: bool,
        destroyed: bool,
    }

    #[async_trait]
    impl ServiceHandler for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn on_init(&mut self) -> Result<(), ServiceError> {
            if self.fail_init {
                Err(ServiceError::Channel(MailboxError::Closed))
            } else {
                Ok(())
            }
        }

        async fn on_start(&mut self) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn on_stop(&mut self) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn on_destroy(&mut self) {
            self.destroyed = true;
        }

        async fn on_poll(&mut self) {}
    }

    #[tokio::test]
    async fn test_full_cycle_states_and_notifications() {
        let channel = Arc::new(MemoryChannel::new(256));
        let mut desc = ServiceDescriptor::new(channel.clone());
        let mut handler = Scripted {
            fail_init: false,
            destroyed: false,
        };

        assert_eq!(desc.dispatch(Action::Init, &mut handler).await, Flow::Continue);
        assert_eq!(desc.state(), Some(ServiceState::Ready));
        assert_eq!(channel.notifies(), 0, "INIT must not notify immediately");

        desc.dispatch(Action::Start, &mut handler).await;
        assert_eq!(desc.state(), Some(ServiceState::Running));
        assert_eq!(channel.notifies(), 1);

        desc.dispatch(Action::Stop, &mut handler).await;
        assert_eq!(desc.state(), Some(ServiceState::Ready));
        assert_eq!(channel.notifies(), 2);

        assert_eq!(desc.dispatch(Action::Destroy, &mut handler).await, Flow::Exit);
        assert!(handler.destroyed);
        // DESTROY reports nothing further.
        assert_eq!(desc.state(), Some(ServiceState::Ready));
    }

    #[tokio::test]
    async fn test_unusable_channel_disables_service() {
        let channel = Arc::new(MemoryChannel::new(256));
        let mut desc = ServiceDescriptor::new(channel.clone());
        let mut handler = Scripted {
            fail_init: true,
            destroyed: false,
        };

        desc.dispatch(Action::Init, &mut handler).await;
        assert_eq!(desc.state(), Some(ServiceState::Disabled));
        assert_eq!(channel.state().unwrap(), Some(ServiceState::Disabled));
    }
}
