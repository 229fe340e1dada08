//! Test harness around a built worker service.
//!
//! The harness owns an in-memory subscription store and a notifier that
//! records messages and can be told to fail for specific recipients.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use loyalty_core::config::ServiceConfig;
use loyalty_core::trial::TrialLifecycleProcessor;
use loyalty_core::{
    Error, MemorySubscriptionStore, NotificationGateway, Result, RunningService, ServiceBuilder,
    TrialStatus, TrialSubscription,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// A message captured by [`ScriptedNotifier`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Recipient.
    pub to: String,
    /// Subject line.
    pub subject: String,
}

/// Notifier that records deliveries and fails on demand.
#[derive(Default)]
pub struct ScriptedNotifier {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl ScriptedNotifier {
    /// Make every send to `to` fail until [`ScriptedNotifier::recover`].
    pub fn fail_for(&self, to: &str) {
        self.failing.lock().insert(to.to_string());
    }

    /// Let all sends succeed again.
    pub fn recover(&self) {
        self.failing.lock().clear();
    }

    /// Messages delivered so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Messages delivered to `to`.
    pub fn sent_to(&self, to: &str) -> usize {
        self.sent.lock().iter().filter(|m| m.to == to).count()
    }
}

#[async_trait]
impl NotificationGateway for ScriptedNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        if self.failing.lock().contains(to) {
            return Err(Error::Notification(format!("smtp rejected {to}")));
        }
        self.sent.lock().push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
        });
        Ok(())
    }
}

/// Service plus its test doubles.
pub struct TestHarness {
    /// The subscription records.
    pub store: MemorySubscriptionStore,
    /// The recording notifier.
    pub notifier: Arc<ScriptedNotifier>,
    /// The built, not yet running, service.
    pub service: RunningService,
}

impl TestHarness {
    /// Build a service over `records` with the scheduler disabled.
    pub fn with_records(records: impl IntoIterator<Item = TrialSubscription>) -> Self {
        let mut config = ServiceConfig::default();
        config.trial.enabled = false;
        Self::with_config(config, records)
    }

    /// Build a service over `records` with `config`.
    pub fn with_config(
        config: ServiceConfig,
        records: impl IntoIterator<Item = TrialSubscription>,
    ) -> Self {
        let store = MemorySubscriptionStore::from_records(records);
        let notifier = Arc::new(ScriptedNotifier::default());
        let service = ServiceBuilder::new(config)
            .with_subscription_store(Arc::new(store.clone()))
            .with_notifier(Arc::clone(&notifier) as Arc<dyn NotificationGateway>)
            .build()
            .expect("service builds");

        Self {
            store,
            notifier,
            service,
        }
    }

    /// The service's trial processor.
    pub fn processor(&self) -> Arc<TrialLifecycleProcessor> {
        self.service.processor()
    }

    /// Current status of `id`.
    pub fn status(&self, id: &str) -> TrialStatus {
        self.store
            .snapshot()
            .into_iter()
            .find(|s| s.subscription_id == id)
            .map(|s| s.status)
            .expect("subscription exists")
    }

    /// Current plan of `id`.
    pub fn plan(&self, id: &str) -> String {
        self.store
            .snapshot()
            .into_iter()
            .find(|s| s.subscription_id == id)
            .map(|s| s.plan)
            .expect("subscription exists")
    }
}

/// A merchant on the `pro` trial ending at `trial_ends_at`.
pub fn merchant(id: &str, trial_ends_at: DateTime<Utc>, status: TrialStatus) -> TrialSubscription {
    TrialSubscription {
        subscription_id: id.to_string(),
        merchant_name: format!("Cafe {id}"),
        contact_email: email(id),
        plan: "pro".to_string(),
        trial_ends_at,
        status,
    }
}

/// Contact address used by [`merchant`].
pub fn email(id: &str) -> String {
    format!("owner+{id}@cafe.test")
}

/// `days` whole days after `now`.
pub fn in_days(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now + Duration::days(days)
}
