//! Confirmation workflow tests: link quotas, expiry and link clicks.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::TimeDelta;

use kreddig_integration_tests::{
    BASE_URL, MemoryUserStore, RecordingNotifier, email, new_record, t0, test_codec,
};
use kreddig_site::db::UserStore;
use kreddig_site::services::{ConfirmationRequestOutcome, ConfirmationWorkflow, LinkConfirmation};

fn after(secs: i64) -> chrono::DateTime<chrono::Utc> {
    t0() + TimeDelta::seconds(secs)
}

#[tokio::test]
async fn test_new_email_gets_link_then_quota_runs_out() {
    let store = MemoryUserStore::new();
    let notifier = RecordingNotifier::new();
    let codec = test_codec();
    let workflow = ConfirmationWorkflow::new(&store, &notifier, &codec, BASE_URL);
    let address = email("a@b.com");

    // First request creates the record and sends one link.
    let outcome = workflow.request(&address, Some("203.0.113.7"), t0()).await.unwrap();
    assert_eq!(outcome, ConfirmationRequestOutcome::TokenSent { first: true });
    let record = store.record(&address).unwrap();
    assert_eq!(record.email_token_count, 1);
    assert!(!record.email_is_confirmed);
    assert_eq!(record.ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(notifier.count(), 1);

    // Asking again before expiry sends nothing.
    let outcome = workflow.request(&address, None, after(60)).await.unwrap();
    assert_eq!(outcome, ConfirmationRequestOutcome::LinkStillValid);
    assert_eq!(notifier.count(), 1);

    // After expiry, two more links may be sent.
    let outcome = workflow.request(&address, None, after(1_000)).await.unwrap();
    assert_eq!(outcome, ConfirmationRequestOutcome::TokenSent { first: false });
    let outcome = workflow.request(&address, None, after(2_000)).await.unwrap();
    assert_eq!(outcome, ConfirmationRequestOutcome::TokenSent { first: false });
    assert_eq!(store.record(&address).unwrap().email_token_count, 3);
    assert_eq!(notifier.count(), 3);

    // The third link is still live: no reissue, no complaint yet.
    let outcome = workflow.request(&address, None, after(2_100)).await.unwrap();
    assert_eq!(outcome, ConfirmationRequestOutcome::LinkStillValid);

    // Once it expires the quota is exhausted.
    let outcome = workflow.request(&address, None, after(3_000)).await.unwrap();
    assert_eq!(outcome, ConfirmationRequestOutcome::TooManyRequests);
    assert_eq!(store.record(&address).unwrap().email_token_count, 3);
    assert_eq!(notifier.count(), 3);
}

#[tokio::test]
async fn test_link_mail_contains_verifiable_token() {
    let store = MemoryUserStore::new();
    let notifier = RecordingNotifier::new();
    let codec = test_codec();
    let workflow = ConfirmationWorkflow::new(&store, &notifier, &codec, BASE_URL);
    let address = email("a@b.com");

    workflow.request(&address, None, t0()).await.unwrap();

    let sent = notifier.sent();
    assert_eq!(sent[0].subject, "confirmation link kreddig.io");
    assert_eq!(sent[0].recipients, vec![address.clone()]);

    let token = store.record(&address).unwrap().email_token;
    assert!(sent[0].body.contains(&format!("{BASE_URL}/email-confirmation/token/{token}")));
    assert_eq!(codec.verify_at(&token, after(899)), Some(address.clone()));
    assert_eq!(codec.verify_at(&token, after(901)), None);
}

#[tokio::test]
async fn test_confirmed_email_is_left_alone() {
    let store = MemoryUserStore::new();
    let notifier = RecordingNotifier::new();
    let codec = test_codec();
    let workflow = ConfirmationWorkflow::new(&store, &notifier, &codec, BASE_URL);
    let address = email("a@b.com");

    let mut record = new_record(&address, "old", None);
    record.email_is_confirmed = true;
    store.put(record);

    let outcome = workflow.request(&address, None, t0()).await.unwrap();
    assert_eq!(outcome, ConfirmationRequestOutcome::AlreadyConfirmed);
    assert_eq!(notifier.count(), 0);
    assert_eq!(store.record(&address).unwrap().email_token, "old");
}

#[tokio::test]
async fn test_count_above_quota_is_exhausted() {
    let store = MemoryUserStore::new();
    let notifier = RecordingNotifier::new();
    let codec = test_codec();
    let workflow = ConfirmationWorkflow::new(&store, &notifier, &codec, BASE_URL);
    let address = email("a@b.com");

    // Even a live token does not help once the count is past the ceiling.
    let mut record = new_record(&address, &codec.issue_at(&address, t0()), None);
    record.email_token_count = 4;
    store.put(record);

    let outcome = workflow.request(&address, None, t0()).await.unwrap();
    assert_eq!(outcome, ConfirmationRequestOutcome::TooManyRequests);
    assert_eq!(notifier.count(), 0);
}

#[tokio::test]
async fn test_confirm_link_marks_user_confirmed() {
    let store = MemoryUserStore::new();
    let notifier = RecordingNotifier::new();
    let codec = test_codec();
    let workflow = ConfirmationWorkflow::new(&store, &notifier, &codec, BASE_URL);
    let address = email("a@b.com");

    workflow.request(&address, None, t0()).await.unwrap();
    let token = store.record(&address).unwrap().email_token;

    let result = workflow.confirm_link(&token, after(120)).await.unwrap();
    assert_eq!(result, LinkConfirmation::Confirmed(address.clone()));
    assert!(store.record(&address).unwrap().email_is_confirmed);

    // Clicking again is harmless.
    let result = workflow.confirm_link(&token, after(130)).await.unwrap();
    assert_eq!(result, LinkConfirmation::Confirmed(address));
}

#[tokio::test]
async fn test_confirm_link_failures() {
    let store = MemoryUserStore::new();
    let notifier = RecordingNotifier::new();
    let codec = test_codec();
    let workflow = ConfirmationWorkflow::new(&store, &notifier, &codec, BASE_URL);
    let address = email("a@b.com");

    // Garbage and expired tokens are invalid.
    assert_eq!(
        workflow.confirm_link("not-a-token", t0()).await.unwrap(),
        LinkConfirmation::Invalid
    );
    workflow.request(&address, None, t0()).await.unwrap();
    let token = store.record(&address).unwrap().email_token;
    assert_eq!(
        workflow.confirm_link(&token, after(901)).await.unwrap(),
        LinkConfirmation::Invalid
    );
    assert!(!store.record(&address).unwrap().email_is_confirmed);

    // A genuine token for an email with no record.
    let stranger = codec.issue_at(&email("nobody@b.com"), t0());
    assert_eq!(
        workflow.confirm_link(&stranger, t0()).await.unwrap(),
        LinkConfirmation::NotFound
    );
}

#[tokio::test]
async fn test_live_link_not_reissued_after_quota_reset() {
    let store = MemoryUserStore::new();
    let notifier = RecordingNotifier::new();
    let codec = test_codec();
    let workflow = ConfirmationWorkflow::new(&store, &notifier, &codec, BASE_URL);
    let address = email("a@b.com");

    let token = codec.issue_at(&address, t0());
    let mut record = new_record(&address, &token, None);
    record.email_token_count = 3;
    store.put(record);
    assert!(store.reset_quotas(&address).await.unwrap());

    let outcome = workflow.request(&address, None, after(30)).await.unwrap();
    assert_eq!(outcome, ConfirmationRequestOutcome::LinkStillValid);
    assert_eq!(notifier.count(), 0);
    assert_eq!(store.record(&address).unwrap().email_token, token);

    // Once it expires a fresh link goes out against the reset count.
    let outcome = workflow.request(&address, None, after(1_000)).await.unwrap();
    assert_eq!(outcome, ConfirmationRequestOutcome::TokenSent { first: false });
    assert_eq!(store.record(&address).unwrap().email_token_count, 1);
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn test_send_failure_keeps_issued_token() {
    let store = MemoryUserStore::new();
    let notifier = RecordingNotifier::new();
    notifier.fail_sends(true);
    let codec = test_codec();
    let workflow = ConfirmationWorkflow::new(&store, &notifier, &codec, BASE_URL);
    let address = email("a@b.com");

    assert!(workflow.request(&address, None, t0()).await.is_err());

    // The record was written before sending and counts against the quota.
    assert_eq!(store.record(&address).unwrap().email_token_count, 1);
}
