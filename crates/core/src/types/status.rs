//! Email confirmation state.

use serde::{Deserialize, Serialize};

use crate::Quota;

/// Where an email address stands in the confirmation workflow.
///
/// The state is not stored; it is derived from the user record and from
/// whether the most recently issued token still verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    /// No user record exists for the email.
    #[default]
    NoRecord,
    /// A record exists but no token was ever issued.
    UnconfirmedNoTokenSent,
    /// A token was issued and may still be clicked (or may be re-requested).
    TokenPending,
    /// The email address has been confirmed.
    Confirmed,
    /// Every allowed token has been issued and the last one expired.
    QuotaExhausted,
}

impl ConfirmationState {
    /// Derive the state from the stored counters.
    ///
    /// `token_still_valid` is whether the stored token currently verifies;
    /// a live token keeps the state pending even at the quota ceiling.
    #[must_use]
    pub const fn derive(
        exists: bool,
        confirmed: bool,
        token_count: i32,
        token_still_valid: bool,
    ) -> Self {
        if !exists {
            return Self::NoRecord;
        }
        if confirmed {
            return Self::Confirmed;
        }
        if token_count <= 0 {
            return Self::UnconfirmedNoTokenSent;
        }
        if !token_still_valid && Quota::CONFIRMATION_TOKENS.is_exhausted(token_count) {
            return Self::QuotaExhausted;
        }
        Self::TokenPending
    }

    /// Whether inquiries may be sent in this state.
    #[must_use]
    pub const fn can_send_inquiries(self) -> bool {
        matches!(self, Self::Confirmed)
    }
}
