//! Integration tests for kreddig.
//!
//! The workflows are driven end to end against in-memory doubles of their
//! collaborators: [`MemoryUserStore`] for the user table and
//! [`RecordingNotifier`] for outbound mail.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p kreddig-integration-tests
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use kreddig_core::{Email, Quota};
use kreddig_site::db::{RepositoryError, UserStore};
use kreddig_site::models::UserRecord;
use kreddig_site::services::{EmailError, Notifier, OutboundEmail, TokenCodec};

/// Base URL used in confirmation links during tests.
pub const BASE_URL: &str = "http://localhost:5000";

/// A token codec with fixed test keys and the default 900 second lifetime.
#[must_use]
pub fn test_codec() -> TokenCodec {
    TokenCodec::new(
        &SecretString::from("ec944ccb6a6932fbb5192a207b7d4d22"),
        "4a898a15174d98e125b0f5a09764e07e",
        Duration::from_secs(900),
    )
}

/// A fixed point in time to start scenarios from.
#[must_use]
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_000_000, 0).unwrap_or_default()
}

/// Parse an email in tests.
///
/// # Panics
///
/// Panics if `s` is not a valid address.
#[must_use]
pub fn email(s: &str) -> Email {
    Email::parse(s).expect("test email is valid")
}

/// In-memory [`UserStore`] with the same conditional semantics as the
/// `PostgreSQL` repository.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Email, UserRecord>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the stored record, if any.
    #[must_use]
    pub fn record(&self, email: &Email) -> Option<UserRecord> {
        self.lock().get(email).cloned()
    }

    /// Insert or replace a record directly.
    pub fn put(&self, record: UserRecord) {
        self.lock().insert(record.email.clone(), record);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Email, UserRecord>> {
        self.users
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// A fresh unconfirmed record as created by the first token issuance.
#[must_use]
pub fn new_record(email: &Email, token: &str, ip_address: Option<&str>) -> UserRecord {
    let now = Utc::now();
    UserRecord {
        email: email.clone(),
        email_is_confirmed: false,
        email_token: token.to_string(),
        email_token_count: 1,
        ip_address: ip_address.map(String::from),
        inquiry_count: 0,
        created_at: now,
        updated_at: now,
    }
}

impl UserStore for MemoryUserStore {
    async fn get(&self, email: &Email) -> Result<Option<UserRecord>, RepositoryError> {
        Ok(self.record(email))
    }

    async fn record_issued_token(
        &self,
        email: &Email,
        token: &str,
        ip_address: Option<&str>,
        quota: Quota,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let mut users = self.lock();
        let Some(user) = users.get_mut(email) else {
            let record = new_record(email, token, ip_address);
            users.insert(email.clone(), record.clone());
            return Ok(Some(record));
        };

        if user.email_is_confirmed || !quota.allows_another(user.email_token_count) {
            return Ok(None);
        }

        user.email_token = token.to_string();
        user.email_token_count += 1;
        if let Some(ip) = ip_address {
            user.ip_address = Some(ip.to_string());
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn mark_confirmed(&self, email: &Email) -> Result<bool, RepositoryError> {
        Ok(self
            .lock()
            .get_mut(email)
            .map(|user| user.email_is_confirmed = true)
            .is_some())
    }

    async fn reserve_inquiry(&self, email: &Email, quota: Quota) -> Result<bool, RepositoryError> {
        let mut users = self.lock();
        match users.get_mut(email) {
            Some(user) if user.email_is_confirmed && quota.allows_another(user.inquiry_count) => {
                user.inquiry_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_inquiry(&self, email: &Email) -> Result<(), RepositoryError> {
        if let Some(user) = self.lock().get_mut(email) {
            user.inquiry_count = (user.inquiry_count - 1).max(0);
        }
        Ok(())
    }

    async fn reset_quotas(&self, email: &Email) -> Result<bool, RepositoryError> {
        Ok(self
            .lock()
            .get_mut(email)
            .map(|user| {
                user.email_token_count = 0;
                user.inquiry_count = 0;
            })
            .is_some())
    }
}

/// [`Notifier`] that keeps every message instead of sending it.
///
/// With [`RecordingNotifier::fail_sends`] set, every send fails with an
/// invalid address error and nothing is recorded.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundEmail>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail (or succeed again).
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every message sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// How many messages were sent.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sent().len()
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmailError::InvalidAddress("relay refused".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(email);
        Ok(())
    }
}
