//! Trial warning and expiry batches triggered the way the scheduler does.

use super::harness::{email, in_days, merchant, TestHarness};
use chrono::{Duration, TimeZone, Utc};
use loyalty_core::trial::{ExpiryOutcome, WarningOutcome, WarningThreshold};
use loyalty_core::TrialStatus;
use tokio_test::assert_ok;

fn morning() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0).unwrap()
}

#[tokio::test]
async fn test_seven_day_warning_then_nothing() {
    let now = morning();
    let harness = TestHarness::with_records([merchant("m1", in_days(now, 7), TrialStatus::Trialing)]);
    let processor = harness.processor();

    let first = assert_ok!(processor.send_trial_expiring_emails_at(now).await);
    assert_eq!(first.sent, 1);
    assert_eq!(harness.status("m1"), TrialStatus::Warned7d);
    assert_eq!(harness.notifier.sent()[0].subject, "Your free trial ends in 7 days");

    let second = assert_ok!(processor.send_trial_expiring_emails_at(now).await);
    assert_eq!(second.sent, 0);
    assert_eq!(harness.notifier.sent_to(&email("m1")), 1);
}

#[tokio::test]
async fn test_record_first_seen_on_last_day() {
    let now = morning();
    let ends = now + Duration::hours(6);
    let harness = TestHarness::with_records([merchant("m1", ends, TrialStatus::Trialing)]);

    let summary = harness
        .processor()
        .send_trial_expiring_emails_at(now)
        .await
        .unwrap();
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.details[0].days_left, 0);
    assert_eq!(summary.details[0].threshold, WarningThreshold::OneDay);
    assert_eq!(harness.notifier.sent()[0].subject, "Your free trial ends today");
    assert_eq!(harness.status("m1"), TrialStatus::Warned1d);
}

#[tokio::test]
async fn test_expired_warned_trial_downgraded_once() {
    let now = morning();
    let harness =
        TestHarness::with_records([merchant("m1", now - Duration::days(1), TrialStatus::Warned1d)]);
    let processor = harness.processor();

    let first = processor.process_expired_trials_at(now).await.unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(first.details[0].outcome, ExpiryOutcome::Downgraded);
    assert_eq!(harness.status("m1"), TrialStatus::ExpiredDowngraded);
    assert_eq!(harness.plan("m1"), "free");

    let second = processor.process_expired_trials_at(now).await.unwrap();
    assert_eq!(second.processed, 0);
}

#[tokio::test]
async fn test_full_trial_month() {
    let start = morning();
    let ends = in_days(start, 14);
    let harness = TestHarness::with_records([merchant("m1", ends, TrialStatus::Trialing)]);
    let processor = harness.processor();

    // The scheduler fires twice a day, to model at-least-once delivery.
    for half_day in 0..40 {
        let now = start + Duration::hours(12 * half_day);
        processor.send_trial_expiring_emails_at(now).await.unwrap();
        processor.process_expired_trials_at(now).await.unwrap();
    }

    let subjects: Vec<_> = harness.notifier.sent().into_iter().map(|m| m.subject).collect();
    assert_eq!(
        subjects,
        vec![
            "Your free trial ends in 7 days",
            "Your free trial ends in 3 days",
            "Your free trial ends in 1 day",
        ]
    );
    assert_eq!(harness.status("m1"), TrialStatus::ExpiredDowngraded);
    assert_eq!(harness.plan("m1"), "free");
}

#[tokio::test]
async fn test_billing_activation_stops_processing() {
    let now = morning();
    let harness = TestHarness::with_records([merchant("m1", in_days(now, 3), TrialStatus::Warned7d)]);
    let processor = harness.processor();

    harness.store.force_status("m1", TrialStatus::Active);

    let warnings = processor.send_trial_expiring_emails_at(now).await.unwrap();
    let expiry = processor
        .process_expired_trials_at(in_days(now, 10))
        .await
        .unwrap();

    assert_eq!(warnings.sent, 0);
    assert_eq!(expiry.processed, 0);
    assert_eq!(harness.status("m1"), TrialStatus::Active);
    assert_eq!(harness.plan("m1"), "pro");
}

#[tokio::test]
async fn test_failed_send_does_not_block_batch() {
    let now = morning();
    let harness = TestHarness::with_records([
        merchant("a", in_days(now, 1), TrialStatus::Warned3d),
        merchant("b", in_days(now, 1), TrialStatus::Warned3d),
        merchant("c", in_days(now, 1), TrialStatus::Warned3d),
    ]);
    let processor = harness.processor();
    harness.notifier.fail_for(&email("b"));

    let summary = processor.send_trial_expiring_emails_at(now).await.unwrap();
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.failed, 1);
    let b = summary
        .details
        .iter()
        .find(|d| d.subscription_id == "b")
        .expect("b reported");
    assert_eq!(b.threshold, WarningThreshold::OneDay);
    assert!(matches!(b.outcome, WarningOutcome::SendFailed { .. }));
    assert_eq!(harness.status("b"), TrialStatus::Warned3d);

    harness.notifier.recover();
    let retry = processor.send_trial_expiring_emails_at(now).await.unwrap();
    assert_eq!(retry.sent, 1);
    assert_eq!(harness.status("b"), TrialStatus::Warned1d);
    assert_eq!(harness.notifier.sent().len(), 3);
}

#[tokio::test]
async fn test_summary_serializes_for_trigger_endpoint() {
    let now = morning();
    let harness = TestHarness::with_records([merchant("m1", now - Duration::hours(1), TrialStatus::Trialing)]);

    let summary = harness
        .processor()
        .process_expired_trials_at(now)
        .await
        .unwrap();
    let json = serde_json::to_value(&summary).unwrap();

    assert_eq!(json["processed"], 1);
    assert_eq!(json["details"][0]["subscription_id"], "m1");
    assert_eq!(json["details"][0]["previous_status"], "TRIALING");
    assert_eq!(json["details"][0]["outcome"], "downgraded");
}
