//! Periodic purge of expired login challenges.

use crate::challenge::ChallengeStore;
use crate::event::{ServiceEvent, ServiceEventsSender};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Default sweep period (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Removes stale challenges on a fixed period, independent of login traffic.
pub struct ExpirySweeper {
    store: ChallengeStore,
    interval: Duration,
    events: Option<ServiceEventsSender>,
}

impl ExpirySweeper {
    /// Create a sweeper for `store` running every `interval`.
    #[must_use]
    pub fn new(store: ChallengeStore, interval: Duration) -> Self {
        Self {
            store,
            interval,
            events: None,
        }
    }

    /// Emit a [`ServiceEvent::ChallengesSwept`] whenever a sweep removes entries.
    #[must_use]
    pub fn with_events(mut self, events: ServiceEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Get the sweep interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single sweep now. Returns the number of challenges removed.
    pub fn run_once(&self) -> usize {
        let removed = self.store.sweep_expired();
        if removed > 0 {
            debug!("Swept {} expired login challenges", removed);
            if let Some(events) = &self.events {
                let _ = events.send(ServiceEvent::ChallengesSwept { removed });
            }
        }
        removed
    }

    /// Spawn the sweep loop.
    ///
    /// The loop exits once `shutdown_rx` reads `true` or its sender is
    /// dropped. A sweep is synchronous, so shutdown only ever lands between
    /// sweeps.
    pub fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Challenge sweeper started (interval={:?})", self.interval);

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing can be stale yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.run_once();
                    }
                }
            }

            info!("Challenge sweeper stopped");
        })
    }
}
