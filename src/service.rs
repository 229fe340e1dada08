//! Worker service wiring the challenge sweeper and the trial scheduler.
//!
//! The service owns the login [`ChallengeStore`] but does not serve logins
//! itself. A process that authenticates users embeds the service and hands
//! [`RunningService::challenges`] to its request handlers; the sweeper then
//! reclaims challenges those handlers issued and never saw verified. The
//! standalone `loyalty-worker` binary attaches no handler, so there the
//! sweeper always finds an empty store.

use crate::challenge::{ChallengeStore, ExpirySweeper};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::event::{create_event_channel, ServiceEvent, ServiceEventsChannel, ServiceEventsSender};
use crate::trial::{
    LogNotifier, MemorySubscriptionStore, NotificationGateway, SubscriptionStore,
    TrialLifecycleProcessor, TrialProcessorConfig,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Builder for constructing the worker service.
pub struct ServiceBuilder {
    config: ServiceConfig,
    store: Option<Arc<dyn SubscriptionStore>>,
    notifier: Option<Arc<dyn NotificationGateway>>,
}

impl ServiceBuilder {
    /// Create a new service builder with the given configuration.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            store: None,
            notifier: None,
        }
    }

    /// Use `store` instead of the bundled JSON-snapshot store.
    #[must_use]
    pub fn with_subscription_store(mut self, store: Arc<dyn SubscriptionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `notifier` instead of logging notices.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationGateway>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled subscription snapshot cannot be loaded.
    pub fn build(self) -> Result<RunningService> {
        info!("Building loyalty worker with config: {:?}", self.config);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        let challenges = ChallengeStore::with_shards(
            self.config.challenge.ttl(),
            self.config.challenge.shards,
        );

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(MemorySubscriptionStore::open(
                &self.config.subscriptions_path,
            )?) as Arc<dyn SubscriptionStore>,
        };
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(LogNotifier) as Arc<dyn NotificationGateway>);

        let processor = Arc::new(TrialLifecycleProcessor::new(
            store,
            notifier,
            TrialProcessorConfig {
                downgrade_plan: self.config.trial.downgrade_plan.clone(),
                max_concurrent: self.config.trial.max_concurrent_sends,
            },
        ));

        Ok(RunningService {
            config: self.config,
            challenges,
            batches: TrialBatches {
                processor,
                events_tx: events_tx.clone(),
            },
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// One scheduled pass over the trial subscriptions.
#[derive(Clone)]
struct TrialBatches {
    processor: Arc<TrialLifecycleProcessor>,
    events_tx: ServiceEventsSender,
}

impl TrialBatches {
    async fn run(&self) {
        match self.processor.send_trial_expiring_emails().await {
            Ok(summary) => {
                let _ = self.events_tx.send(ServiceEvent::WarningsSent {
                    sent: summary.sent,
                    failed: summary.failed,
                });
            }
            Err(e) => self.report(format!("Trial warning run failed: {e}")),
        }

        match self.processor.process_expired_trials().await {
            Ok(summary) => {
                let _ = self.events_tx.send(ServiceEvent::TrialsDowngraded {
                    processed: summary.processed,
                    failed: summary.failed,
                });
            }
            Err(e) => self.report(format!("Trial expiry run failed: {e}")),
        }
    }

    fn report(&self, message: String) {
        warn!("{}", message);
        let _ = self.events_tx.send(ServiceEvent::Error { message });
    }
}

/// Requests shutdown of a [`RunningService`] from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// A running loyalty worker.
pub struct RunningService {
    config: ServiceConfig,
    challenges: ChallengeStore,
    batches: TrialBatches,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: ServiceEventsSender,
    events_rx: Option<ServiceEventsChannel>,
}

impl RunningService {
    /// Handle to the login challenge store.
    ///
    /// Login handlers call `generate` and `verify` on this handle; it shares
    /// state with the store the background sweeper purges.
    #[must_use]
    pub fn challenges(&self) -> ChallengeStore {
        self.challenges.clone()
    }

    /// The trial processor, for manually triggered runs.
    #[must_use]
    pub fn processor(&self) -> Arc<TrialLifecycleProcessor> {
        Arc::clone(&self.batches.processor)
    }

    /// Get the service configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Get a receiver for service events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<ServiceEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to service events.
    #[must_use]
    pub fn subscribe_events(&self) -> ServiceEventsChannel {
        self.events_tx.subscribe()
    }

    /// Handle that can stop the service while [`RunningService::run`] is
    /// borrowed.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Run until shutdown is requested.
    ///
    /// Background tasks finish their current sweep or batch before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the service encounters a fatal error.
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting loyalty worker");
        let _ = self.events_tx.send(ServiceEvent::Started);

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        tasks.push(
            ExpirySweeper::new(self.challenges.clone(), self.config.challenge.sweep_interval())
                .with_events(self.events_tx.clone())
                .spawn(self.shutdown_rx.clone()),
        );

        if self.config.trial.enabled {
            tasks.push(self.spawn_trial_scheduler());
        } else {
            info!("Scheduled trial processing disabled");
        }

        info!("Worker running, waiting for shutdown signal");

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    self.shutdown();
                    break;
                }
            }
        }

        let _ = self.events_tx.send(ServiceEvent::ShuttingDown);
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Worker shutdown complete");
        Ok(())
    }

    /// Request the service to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn spawn_trial_scheduler(&self) -> JoinHandle<()> {
        let batches = self.batches.clone();
        let interval = self.config.trial.run_interval();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            info!("Trial scheduler started (interval={:?})", interval);

            // First tick fires immediately, so a restart catches up at once.
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        batches.run().await;
                    }
                }
            }

            info!("Trial scheduler stopped");
        })
    }
}
