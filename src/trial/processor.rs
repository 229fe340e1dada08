//! Batch processing of trial warnings and expiries.
//!
//! Both operations are meant to be triggered by an at-least-once scheduler,
//! so each one re-checks a record right before acting on it and records the
//! result with a compare-and-set. Running them twice in a row is a no-op the
//! second time.

use crate::error::Result;
use crate::trial::{
    NotificationGateway, SubscriptionStore, TrialStatus, TrialSubscription, WarningNotice,
    WarningThreshold,
};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default plan a trial falls back to.
pub const DEFAULT_DOWNGRADE_PLAN: &str = "free";

/// Default number of records processed concurrently.
const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Configuration for the trial processor.
#[derive(Debug, Clone)]
pub struct TrialProcessorConfig {
    /// Plan tier written when a trial expires.
    pub downgrade_plan: String,
    /// Maximum records handled at once within a run.
    pub max_concurrent: usize,
}

impl Default for TrialProcessorConfig {
    fn default() -> Self {
        Self {
            downgrade_plan: DEFAULT_DOWNGRADE_PLAN.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// What happened to one subscription during a warning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WarningOutcome {
    /// Notice delivered and threshold recorded.
    Sent,
    /// Delivery failed; the record stays eligible.
    SendFailed {
        /// Failure reason.
        reason: String,
    },
    /// The record could not be re-read; nothing was sent.
    ReadFailed {
        /// Failure reason.
        reason: String,
    },
    /// Delivered, but recording the threshold failed.
    RecordFailed {
        /// Failure reason.
        reason: String,
    },
    /// Nothing done.
    Skipped {
        /// Why the record was left alone.
        reason: String,
    },
}

/// Per-subscription detail of a warning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarningDetail {
    /// Subscription identifier.
    pub subscription_id: String,
    /// Warning that was due.
    pub threshold: WarningThreshold,
    /// Calendar days until trial end.
    pub days_left: i64,
    /// Result.
    #[serde(flatten)]
    pub outcome: WarningOutcome,
}

/// Result of [`TrialLifecycleProcessor::send_trial_expiring_emails`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarningRunSummary {
    /// Warnings delivered and recorded.
    pub sent: usize,
    /// Warnings that failed to send or record.
    pub failed: usize,
    /// One entry per subscription that was due.
    pub details: Vec<WarningDetail>,
}

/// What happened to one subscription during an expiry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExpiryOutcome {
    /// Plan downgraded and status set to `EXPIRED_DOWNGRADED`.
    Downgraded,
    /// A store write failed; the record stays eligible.
    Failed {
        /// Failure reason.
        reason: String,
    },
    /// Nothing done.
    Skipped {
        /// Why the record was left alone.
        reason: String,
    },
}

/// Per-subscription detail of an expiry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiryDetail {
    /// Subscription identifier.
    pub subscription_id: String,
    /// Status before the run.
    pub previous_status: TrialStatus,
    /// Result.
    #[serde(flatten)]
    pub outcome: ExpiryOutcome,
}

/// Result of [`TrialLifecycleProcessor::process_expired_trials`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryRunSummary {
    /// Subscriptions downgraded.
    pub processed: usize,
    /// Subscriptions whose downgrade failed.
    pub failed: usize,
    /// One entry per subscription past its trial end.
    pub details: Vec<ExpiryDetail>,
}

/// Sends trial expiry warnings and downgrades expired trials.
pub struct TrialLifecycleProcessor {
    store: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn NotificationGateway>,
    config: TrialProcessorConfig,
    /// Subscriptions currently being handled by a run on this instance.
    in_flight: Mutex<HashSet<String>>,
}

/// Holds a subscription id in the in-flight set until dropped.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    subscription_id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.subscription_id);
    }
}

impl TrialLifecycleProcessor {
    /// Create a processor over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        notifier: Arc<dyn NotificationGateway>,
        config: TrialProcessorConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Get the processor configuration.
    #[must_use]
    pub fn config(&self) -> &TrialProcessorConfig {
        &self.config
    }

    /// Send every outstanding 7/3/1-day trial warning.
    ///
    /// # Errors
    ///
    /// Returns an error only if the candidate subscriptions cannot be read.
    /// Failures on individual records are reported in the summary.
    pub async fn send_trial_expiring_emails(&self) -> Result<WarningRunSummary> {
        self.send_trial_expiring_emails_at(Utc::now()).await
    }

    /// Warning run as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the candidate subscriptions cannot be read.
    pub async fn send_trial_expiring_emails_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<WarningRunSummary> {
        let horizon = now + Duration::days(WarningThreshold::SevenDays.days() + 1);
        let candidates = self.store.trial_candidates(horizon).await.map_err(|e| {
            error!("Cannot list trial subscriptions for warnings: {}", e);
            e
        })?;

        let due: Vec<_> = candidates
            .into_iter()
            .filter_map(|sub| sub.warning_due(now).map(|threshold| (sub, threshold)))
            .collect();
        debug!("{} subscriptions due a trial warning", due.len());

        let mut details: Vec<WarningDetail> = stream::iter(due)
            .map(|(sub, threshold)| self.warn_one(sub, threshold, now))
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;
        details.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));

        let summary = WarningRunSummary {
            sent: count(&details, |d| d.outcome == WarningOutcome::Sent),
            failed: count(&details, |d| {
                matches!(
                    d.outcome,
                    WarningOutcome::SendFailed { .. }
                        | WarningOutcome::ReadFailed { .. }
                        | WarningOutcome::RecordFailed { .. }
                )
            }),
            details,
        };
        info!(
            "Trial warning run complete: {} sent, {} failed",
            summary.sent, summary.failed
        );
        Ok(summary)
    }

    /// Downgrade every subscription whose trial has ended.
    ///
    /// # Errors
    ///
    /// Returns an error only if the candidate subscriptions cannot be read.
    /// Failures on individual records are reported in the summary.
    pub async fn process_expired_trials(&self) -> Result<ExpiryRunSummary> {
        self.process_expired_trials_at(Utc::now()).await
    }

    /// Expiry run as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the candidate subscriptions cannot be read.
    pub async fn process_expired_trials_at(&self, now: DateTime<Utc>) -> Result<ExpiryRunSummary> {
        let candidates = self.store.trial_candidates(now).await.map_err(|e| {
            error!("Cannot list trial subscriptions for expiry: {}", e);
            e
        })?;

        let expired: Vec<_> = candidates
            .into_iter()
            .filter(|sub| sub.downgrade_due(now))
            .collect();
        debug!("{} trial subscriptions past their end date", expired.len());

        let mut details: Vec<ExpiryDetail> = stream::iter(expired)
            .map(|sub| self.expire_one(sub, now))
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;
        details.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));

        let summary = ExpiryRunSummary {
            processed: count(&details, |d| d.outcome == ExpiryOutcome::Downgraded),
            failed: count(&details, |d| matches!(d.outcome, ExpiryOutcome::Failed { .. })),
            details,
        };
        info!(
            "Trial expiry run complete: {} downgraded, {} failed",
            summary.processed, summary.failed
        );
        Ok(summary)
    }

    async fn warn_one(
        &self,
        candidate: TrialSubscription,
        threshold: WarningThreshold,
        now: DateTime<Utc>,
    ) -> WarningDetail {
        let detail = |outcome| WarningDetail {
            subscription_id: candidate.subscription_id.clone(),
            threshold,
            days_left: candidate.days_left(now),
            outcome,
        };

        let Some(_claim) = self.claim(&candidate.subscription_id) else {
            return detail(skipped_warning("already being processed"));
        };

        // Re-read right before sending; the candidate list may be stale.
        let current = match self.store.get(&candidate.subscription_id).await {
            Ok(Some(current)) => current,
            Ok(None) => return detail(skipped_warning("subscription no longer exists")),
            Err(e) => {
                warn!(
                    "Cannot re-read subscription {}: {}",
                    candidate.subscription_id, e
                );
                return detail(WarningOutcome::ReadFailed {
                    reason: e.to_string(),
                });
            }
        };
        if current.warning_due(now) != Some(threshold) {
            return detail(skipped_warning("warning no longer due"));
        }

        let notice =
            WarningNotice::render(&current, current.days_left(now), &self.config.downgrade_plan);
        if let Err(e) = self
            .notifier
            .send(&notice.to, &notice.subject, &notice.body)
            .await
        {
            warn!(
                "Trial warning to {} for {} failed: {}",
                notice.to, current.subscription_id, e
            );
            return detail(WarningOutcome::SendFailed {
                reason: e.to_string(),
            });
        }

        match self
            .store
            .transition(&current.subscription_id, current.status, threshold.status())
            .await
        {
            Ok(true) => {
                info!(
                    "Sent {}-day trial warning for {}",
                    threshold.days(),
                    current.subscription_id
                );
                detail(WarningOutcome::Sent)
            }
            Ok(false) => {
                // Another writer moved the record between our read and write.
                warn!(
                    "Trial warning for {} sent but status changed concurrently",
                    current.subscription_id
                );
                detail(WarningOutcome::RecordFailed {
                    reason: "status changed concurrently".to_string(),
                })
            }
            Err(e) => {
                warn!(
                    "Trial warning for {} sent but not recorded: {}",
                    current.subscription_id, e
                );
                detail(WarningOutcome::RecordFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn expire_one(&self, candidate: TrialSubscription, now: DateTime<Utc>) -> ExpiryDetail {
        let detail = |outcome| ExpiryDetail {
            subscription_id: candidate.subscription_id.clone(),
            previous_status: candidate.status,
            outcome,
        };

        let Some(_claim) = self.claim(&candidate.subscription_id) else {
            return detail(skipped_expiry("already being processed"));
        };

        let current = match self.store.get(&candidate.subscription_id).await {
            Ok(Some(current)) => current,
            Ok(None) => return detail(skipped_expiry("subscription no longer exists")),
            Err(e) => {
                warn!(
                    "Cannot re-read subscription {}: {}",
                    candidate.subscription_id, e
                );
                return detail(ExpiryOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };
        if !current.downgrade_due(now) {
            return detail(skipped_expiry("no longer eligible for downgrade"));
        }

        match self
            .store
            .downgrade(
                &current.subscription_id,
                current.status,
                &self.config.downgrade_plan,
            )
            .await
        {
            Ok(true) => {
                info!(
                    "Trial expired for {}, downgraded to {}",
                    current.subscription_id, self.config.downgrade_plan
                );
                detail(ExpiryOutcome::Downgraded)
            }
            Ok(false) => {
                // Billing or another run moved the record after the re-read.
                debug!(
                    "Subscription {} changed before downgrade, leaving it",
                    current.subscription_id
                );
                detail(skipped_expiry("status changed concurrently"))
            }
            Err(e) => {
                warn!(
                    "Downgrade of {} to {} failed: {}",
                    current.subscription_id, self.config.downgrade_plan, e
                );
                detail(ExpiryOutcome::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn claim(&self, subscription_id: &str) -> Option<Claim<'_>> {
        if self.in_flight.lock().insert(subscription_id.to_string()) {
            Some(Claim {
                in_flight: &self.in_flight,
                subscription_id: subscription_id.to_string(),
            })
        } else {
            debug!("Subscription {} already in flight", subscription_id);
            None
        }
    }
}

fn count<T>(details: &[T], pred: impl Fn(&T) -> bool) -> usize {
    details.iter().filter(|d| pred(*d)).count()
}

fn skipped_warning(reason: &str) -> WarningOutcome {
    WarningOutcome::Skipped {
        reason: reason.to_string(),
    }
}

fn skipped_expiry(reason: &str) -> ExpiryOutcome {
    ExpiryOutcome::Skipped {
        reason: reason.to_string(),
    }
}
