//! Trial expiry warning text.

use crate::trial::TrialSubscription;

/// A rendered trial expiry warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningNotice {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl WarningNotice {
    /// Render the warning for `subscription` with `days_left` calendar days
    /// to go. `downgrade_plan` is the tier the account falls back to when the
    /// trial ends.
    #[must_use]
    pub fn render(subscription: &TrialSubscription, days_left: i64, downgrade_plan: &str) -> Self {
        let ends = subscription.trial_ends_at.format("%B %-d, %Y");

        let subject = match days_left {
            i64::MIN..=0 => "Your free trial ends today".to_string(),
            1 => "Your free trial ends in 1 day".to_string(),
            days => format!("Your free trial ends in {days} days"),
        };
        let body = format!(
            "Hi {name},\n\n\
             Your {plan} trial ends on {ends}. Add a payment method before then \
             to keep your rewards program running without interruption.\n\n\
             If you do nothing, your account moves to the {downgrade_plan} plan when the trial ends. \
             Your customers keep the points they have already earned.\n",
            name = subscription.merchant_name,
            plan = subscription.plan,
        );

        Self {
            to: subscription.contact_email.clone(),
            subject,
            body,
        }
    }
}
