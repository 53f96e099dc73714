//! # Heartbeat: timer-driven liveness emission and peer monitoring.
//!
//! Every service bumps its mailbox's liveness counter on a fixed interval so
//! the supervisor's poll never waits more than one interval to detect a stuck
//! process. The paired-node variant additionally verifies that the peer's
//! signal kept arriving and triggers a recovery action on sustained silence.
//!
//! ## Rules
//! - A missed send is logged and retried on the next tick; it is never fatal
//!   by itself.
//! - A **sustained** absence of peer signals (more than one missed interval)
//!   triggers failure handling — and it fires exactly once per outage, not
//!   once per tick. A fresh signal re-arms the watch.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::mailbox::ChannelRef;

/// Liveness emitter over a service's own mailbox.
pub struct Heartbeat {
    channel: ChannelRef,
}

impl Heartbeat {
    /// Creates an emitter over `channel`.
    pub fn new(channel: ChannelRef) -> Self {
        Self { channel }
    }

    /// Emits one liveness signal; a failure is logged, never propagated.
    pub fn beat(&self) {
        if let Err(err) = self.channel.heartbeat() {
            warn!(error = %err, label = err.as_label(), "liveness signal missed; retrying next tick");
        }
    }
}

/// Decides when a sustained peer outage becomes a failure.
///
/// Pure bookkeeping, one call per heartbeat tick: `observe(true)` when a peer
/// signal arrived since the previous tick, `observe(false)` otherwise. Returns
/// `true` exactly once per sustained outage, after more than `grace` missed
/// intervals.
pub struct PeerWatch {
    grace: u32,
    misses: u32,
    tripped: bool,
}

impl PeerWatch {
    /// Creates a watch tolerating `grace` missed intervals (a single miss is
    /// never a failure; pass at least 1).
    pub fn new(grace: u32) -> Self {
        Self {
            grace: grace.max(1),
            misses: 0,
            tripped: false,
        }
    }

    /// Records one tick's observation; `true` means fire the recovery action.
    pub fn observe(&mut self, signal_seen: bool) -> bool {
        if signal_seen {
            self.misses = 0;
            self.tripped = false;
            return false;
        }
        self.misses = self.misses.saturating_add(1);
        if self.misses > self.grace && !self.tripped {
            self.tripped = true;
            return true;
        }
        false
    }
}

/// Recurring heartbeat timer with peer verification.
///
/// Each tick performs both duties: emit the local liveness signal and check
/// the peer's. The peer signal and the recovery action are injected
/// capabilities — the cluster-side failover mechanism stays external.
pub struct PeerMonitor<S, R> {
    beat: Heartbeat,
    signal: S,
    recover: R,
    watch: PeerWatch,
    last_counter: Option<u64>,
    interval: Duration,
}

impl<S, R> PeerMonitor<S, R>
where
    S: Fn() -> Option<u64> + Send + 'static,
    R: FnMut() + Send + 'static,
{
    /// Creates a monitor.
    ///
    /// ### Parameters
    /// - `channel`: local mailbox to emit liveness into
    /// - `signal`: reads the peer's liveness counter, if reachable
    /// - `recover`: invoked once per sustained outage
    /// - `interval`: heartbeat interval
    /// - `grace`: missed intervals tolerated before the outage is declared
    pub fn new(
        channel: ChannelRef,
        signal: S,
        recover: R,
        interval: Duration,
        grace: u32,
    ) -> Self {
        Self {
            beat: Heartbeat::new(channel),
            signal,
            recover,
            watch: PeerWatch::new(grace),
            last_counter: None,
            interval,
        }
    }

    /// Runs until cancelled.
    pub async fn run(mut self, token: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => self.on_tick(),
            }
        }
    }

    fn on_tick(&mut self) {
        self.beat.beat();

        let fresh = match (self.signal)() {
            Some(counter) => {
                let fresh = self.last_counter != Some(counter);
                self.last_counter = Some(counter);
                fresh
            }
            None => false,
        };
        if self.watch.observe(fresh) {
            error!("peer liveness lost; triggering recovery");
            (self.recover)();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::mailbox::MemoryChannel;

    #[test]
    fn test_single_miss_is_not_an_outage() {
        let mut watch = PeerWatch::new(1);
        assert!(!watch.observe(true));
        assert!(!watch.observe(false));
        assert!(!watch.observe(true));
    }

    #[test]
    fn test_sustained_outage_fires_exactly_once() {
        let mut watch = PeerWatch::new(1);
        assert!(!watch.observe(true));
        assert!(!watch.observe(false)); // first miss: within grace
        assert!(watch.observe(false)); // second miss: outage
        for _ in 0..10 {
            assert!(!watch.observe(false), "must not re-fire during same outage");
        }
    }

    #[test]
    fn test_fresh_signal_rearms_the_watch() {
        let mut watch = PeerWatch::new(1);
        watch.observe(false);
        assert!(watch.observe(false));
        assert!(!watch.observe(true));
        watch.observe(false);
        assert!(watch.observe(false), "a new outage fires again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_emits_and_recovers_once() {
        let channel = Arc::new(MemoryChannel::new(64));
        let peer = Arc::new(AtomicU64::new(1));
        let fired = Arc::new(AtomicUsize::new(0));

        let signal_peer = peer.clone();
        let fired_count = fired.clone();
        let monitor = PeerMonitor::new(
            channel.clone(),
            move || Some(signal_peer.load(Ordering::Relaxed)),
            move || {
                fired_count.fetch_add(1, Ordering::Relaxed);
            },
            Duration::from_secs(5),
            1,
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(monitor.run(token.clone()));

        // Ten intervals with a frozen peer counter: one baseline tick, then
        // misses. Exactly one recovery for the whole outage.
        tokio::time::sleep(Duration::from_secs(51)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert!(channel.beats() >= 10, "local liveness kept flowing");
    }
}
