//! Trial subscription lifecycle: expiry warnings and downgrades.
//!
//! Every merchant subscription in trial moves through one forward-only
//! sequence of states, driven by an external scheduler:
//!
//! ```text
//! TRIALING ──► WARNED_7D ──► WARNED_3D ──► WARNED_1D ──► EXPIRED_DOWNGRADED
//!     │            │             │             │
//!     └────────────┴─────────────┴─────────────┴──► ACTIVE (billing event)
//! ```
//!
//! A subscription that is `ACTIVE` or `EXPIRED_DOWNGRADED` is never touched
//! again. Warning states may be skipped (a record first seen two days before
//! its trial ends goes straight to `WARNED_3D`) but are never revisited.

mod notice;
mod notify;
mod processor;
mod store;

pub use notice::WarningNotice;
pub use notify::{LogNotifier, NotificationGateway};
pub use processor::{
    ExpiryDetail, ExpiryOutcome, ExpiryRunSummary, TrialLifecycleProcessor, TrialProcessorConfig,
    WarningDetail, WarningOutcome, WarningRunSummary, DEFAULT_DOWNGRADE_PLAN,
};
pub use store::{MemorySubscriptionStore, SubscriptionStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trial status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrialStatus {
    /// In trial, no warning sent yet.
    Trialing,
    /// Seven-day warning sent.
    #[serde(rename = "WARNED_7D")]
    Warned7d,
    /// Three-day warning sent.
    #[serde(rename = "WARNED_3D")]
    Warned3d,
    /// One-day warning sent.
    #[serde(rename = "WARNED_1D")]
    Warned1d,
    /// Trial ended and the plan was downgraded.
    ExpiredDowngraded,
    /// Converted to a paid plan by billing.
    Active,
}

impl TrialStatus {
    /// Position along the trial sequence, `None` for [`TrialStatus::Active`].
    #[must_use]
    pub fn stage(self) -> Option<u8> {
        match self {
            Self::Trialing => Some(0),
            Self::Warned7d => Some(1),
            Self::Warned3d => Some(2),
            Self::Warned1d => Some(3),
            Self::ExpiredDowngraded => Some(4),
            Self::Active => None,
        }
    }

    /// Whether trial processing has nothing left to do for this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ExpiredDowngraded | Self::Active)
    }

    /// Whether this status is `target` or later in the trial sequence.
    ///
    /// `Active` counts as past every trial state.
    #[must_use]
    pub fn is_at_or_past(self, target: Self) -> bool {
        match (self.stage(), target.stage()) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(current), Some(target)) => current >= target,
        }
    }
}

/// A warning sent ahead of trial end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningThreshold {
    /// Seven days left.
    SevenDays,
    /// Three days left.
    ThreeDays,
    /// One day left.
    OneDay,
}

impl WarningThreshold {
    /// Thresholds, most urgent first.
    pub const BY_URGENCY: [Self; 3] = [Self::OneDay, Self::ThreeDays, Self::SevenDays];

    /// Days before trial end at which this warning becomes due.
    #[must_use]
    pub fn days(self) -> i64 {
        match self {
            Self::SevenDays => 7,
            Self::ThreeDays => 3,
            Self::OneDay => 1,
        }
    }

    /// Status recorded once this warning has been sent.
    #[must_use]
    pub fn status(self) -> TrialStatus {
        match self {
            Self::SevenDays => TrialStatus::Warned7d,
            Self::ThreeDays => TrialStatus::Warned3d,
            Self::OneDay => TrialStatus::Warned1d,
        }
    }

    /// The most urgent warning due with `days_left` calendar days remaining.
    #[must_use]
    pub fn due(days_left: i64) -> Option<Self> {
        if days_left < 0 {
            return None;
        }
        Self::BY_URGENCY
            .into_iter()
            .find(|threshold| days_left <= threshold.days())
    }
}

/// Trial view of a merchant subscription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSubscription {
    /// Subscription identifier.
    pub subscription_id: String,
    /// Merchant display name, used in notices.
    pub merchant_name: String,
    /// Address warnings are sent to.
    pub contact_email: String,
    /// Current plan tier.
    pub plan: String,
    /// When the trial ends.
    pub trial_ends_at: DateTime<Utc>,
    /// Trial status.
    pub status: TrialStatus,
}

impl TrialSubscription {
    /// Calendar days (UTC) from `now` until the trial ends; negative once the
    /// end date is behind us.
    #[must_use]
    pub fn days_left(&self, now: DateTime<Utc>) -> i64 {
        (self.trial_ends_at.date_naive() - now.date_naive()).num_days()
    }

    /// Whether the trial end has passed at `now`.
    #[must_use]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.trial_ends_at <= now
    }

    /// The warning that should go out at `now`, if any is still outstanding.
    #[must_use]
    pub fn warning_due(&self, now: DateTime<Utc>) -> Option<WarningThreshold> {
        if self.status.is_terminal() || self.has_ended(now) {
            return None;
        }
        WarningThreshold::due(self.days_left(now))
            .filter(|threshold| !self.status.is_at_or_past(threshold.status()))
    }

    /// Whether the trial should be downgraded at `now`.
    #[must_use]
    pub fn downgrade_due(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.has_ended(now)
    }
}
