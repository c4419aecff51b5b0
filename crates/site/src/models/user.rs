//! User record domain type.

use chrono::{DateTime, Utc};

use kreddig_core::{ConfirmationState, Email, Quota};

/// The persisted state of one email address.
///
/// There is exactly one row per email; both workflows mutate it in place
/// and nothing ever deletes it.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserRecord {
    /// Primary key.
    pub email: Email,
    /// Whether the confirmation link has been clicked.
    pub email_is_confirmed: bool,
    /// Most recently issued confirmation token (possibly expired).
    pub email_token: String,
    /// Confirmation tokens issued so far.
    pub email_token_count: i32,
    /// Client IP seen when the latest token was issued.
    pub ip_address: Option<String>,
    /// Inquiries sent so far.
    pub inquiry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Confirmation state given whether the stored token still verifies.
    #[must_use]
    pub const fn confirmation_state(&self, token_still_valid: bool) -> ConfirmationState {
        ConfirmationState::derive(
            true,
            self.email_is_confirmed,
            self.email_token_count,
            token_still_valid,
        )
    }

    /// Whether another confirmation token may be issued.
    #[must_use]
    pub const fn can_issue_token(&self) -> bool {
        Quota::CONFIRMATION_TOKENS.allows_another(self.email_token_count)
    }

    /// Whether another inquiry may be sent.
    #[must_use]
    pub const fn can_send_inquiry(&self) -> bool {
        self.confirmation_state(false).can_send_inquiries()
            && Quota::INQUIRIES.allows_another(self.inquiry_count)
    }
}
