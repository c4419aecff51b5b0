//! Email confirmation workflow.
//!
//! A visitor asks for a confirmation link, receives it by email and clicks
//! it. Each email gets at most [`Quota::CONFIRMATION_TOKENS`] links; while a
//! link is still valid no new one is sent.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use kreddig_core::{ConfirmationState, Email, Quota};

use crate::db::{RepositoryError, UserStore};
use crate::models::Flash;
use crate::services::email::{EmailError, Notifier, OutboundEmail};
use crate::services::token::TokenCodec;

/// Shown for every kind of bad confirmation link.
pub const INVALID_LINK_MESSAGE: &str = "Oops, something's wrong, please try again!";

/// Errors from the confirmation workflow.
#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Email(#[from] EmailError),
}

/// Result of asking for a confirmation link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationRequestOutcome {
    /// A link was issued and mailed. `first` is true for a new record.
    TokenSent { first: bool },
    /// Nothing to do, the email is already confirmed.
    AlreadyConfirmed,
    /// The last link has not expired yet; nothing was sent.
    LinkStillValid,
    /// Every allowed link has been used up.
    TooManyRequests,
}

impl ConfirmationRequestOutcome {
    /// The flash message shown after the redirect.
    #[must_use]
    pub fn flash(self) -> Flash {
        match self {
            Self::TokenSent { first: true } => {
                Flash::success("Check your email for the confirmation link!")
            }
            Self::TokenSent { first: false } => {
                Flash::success("Check your email for the new confirmation link!")
            }
            Self::AlreadyConfirmed => Flash::notice("Your email is already confirmed!"),
            Self::LinkStillValid => {
                Flash::notice("Your confirmation link is still valid, check your email!")
            }
            Self::TooManyRequests => {
                Flash::error("You've sent too many requests, contact support.")
            }
        }
    }
}

/// Result of clicking a confirmation link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkConfirmation {
    /// The email behind the token is now confirmed.
    Confirmed(Email),
    /// The token is malformed, forged or expired.
    Invalid,
    /// The token verified but no record exists for its email.
    NotFound,
}

/// Issues confirmation links and confirms clicked ones.
pub struct ConfirmationWorkflow<'a, S, N> {
    store: &'a S,
    notifier: &'a N,
    codec: &'a TokenCodec,
    base_url: &'a str,
}

impl<'a, S: UserStore, N: Notifier> ConfirmationWorkflow<'a, S, N> {
    /// `base_url` is the public site URL without a trailing slash.
    #[must_use]
    pub const fn new(store: &'a S, notifier: &'a N, codec: &'a TokenCodec, base_url: &'a str) -> Self {
        Self {
            store,
            notifier,
            codec,
            base_url,
        }
    }

    /// The link mailed for `token`.
    #[must_use]
    pub fn link_for(&self, token: &str) -> String {
        format!("{}/email-confirmation/token/{token}", self.base_url)
    }

    /// Handle a confirmation request for `email` as of `now`.
    ///
    /// The record is written before the email is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the email cannot be sent.
    #[instrument(skip(self, ip_address), fields(email = %email))]
    pub async fn request(
        &self,
        email: &Email,
        ip_address: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationRequestOutcome, ConfirmationError> {
        let first = match self.store.get(email).await? {
            None => true,
            Some(user) => {
                let live = self.codec.verify_at(&user.email_token, now).is_some();
                match user.confirmation_state(live) {
                    ConfirmationState::Confirmed => {
                        return Ok(ConfirmationRequestOutcome::AlreadyConfirmed);
                    }
                    _ if user.email_token_count > Quota::CONFIRMATION_TOKENS.limit() => {
                        return Ok(ConfirmationRequestOutcome::TooManyRequests);
                    }
                    // A live token wins whatever the count, including a count
                    // reset by support.
                    _ if live => return Ok(ConfirmationRequestOutcome::LinkStillValid),
                    ConfirmationState::QuotaExhausted => {
                        tracing::info!("Confirmation link quota exhausted");
                        return Ok(ConfirmationRequestOutcome::TooManyRequests);
                    }
                    _ => false,
                }
            }
        };

        let token = self.codec.issue_at(email, now);
        let Some(user) = self
            .store
            .record_issued_token(email, &token, ip_address, Quota::CONFIRMATION_TOKENS)
            .await?
        else {
            // Another request confirmed the email or used the last link
            // between our read and the write.
            return Ok(self.lost_race(email).await?);
        };

        self.notifier
            .send(OutboundEmail::confirmation(email, &self.link_for(&token))?)
            .await?;

        tracing::info!(
            token_count = user.email_token_count,
            first,
            "Confirmation link sent"
        );
        Ok(ConfirmationRequestOutcome::TokenSent { first })
    }

    /// Confirm the email carried by `token` as of `now`.
    ///
    /// Confirming an already confirmed email succeeds again.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip_all)]
    pub async fn confirm_link(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<LinkConfirmation, RepositoryError> {
        let Some(email) = self.codec.verify_at(token, now) else {
            return Ok(LinkConfirmation::Invalid);
        };

        if !self.store.mark_confirmed(&email).await? {
            tracing::warn!(email = %email, "Valid confirmation token for unknown email");
            return Ok(LinkConfirmation::NotFound);
        }

        tracing::info!(email = %email, "Email confirmed");
        Ok(LinkConfirmation::Confirmed(email))
    }

    async fn lost_race(&self, email: &Email) -> Result<ConfirmationRequestOutcome, RepositoryError> {
        let confirmed = self
            .store
            .get(email)
            .await?
            .is_some_and(|user| user.email_is_confirmed);

        Ok(if confirmed {
            ConfirmationRequestOutcome::AlreadyConfirmed
        } else {
            ConfirmationRequestOutcome::TooManyRequests
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_flash_kinds() {
        use crate::models::FlashKind;

        assert_eq!(
            ConfirmationRequestOutcome::TokenSent { first: true }.flash().kind,
            FlashKind::Success
        );
        assert_eq!(
            ConfirmationRequestOutcome::LinkStillValid.flash().message,
            "Your confirmation link is still valid, check your email!"
        );
        assert_eq!(
            ConfirmationRequestOutcome::TooManyRequests.flash().kind,
            FlashKind::Error
        );
    }
}
