//! Signed, salted, time-limited confirmation tokens.
//!
//! A token carries the email address and the time it was issued, signed with
//! HMAC-SHA256. The signing key is derived from the salt and the secret, so a
//! token minted under another salt never verifies here.
//!
//! ```text
//! base64url(email) "." base64url(issued_at) "." base64url(hmac(email "." issued_at))
//! ```
//!
//! All parts are unpadded URL-safe base64, so a token fits in a path segment.
//! `issued_at` is the Unix timestamp in big-endian bytes with leading zeros
//! dropped.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use thiserror::Error;

use kreddig_core::Email;

use crate::config::TokenConfig;

type HmacSha256 = Hmac<Sha256>;

/// Why a token failed to verify.
///
/// Callers only ever see `None` from [`TokenCodec::verify`]; the reason is
/// kept for debug logging and tests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Not three base64 parts, or the payload is not an email address.
    #[error("malformed token")]
    Malformed,

    /// The signature does not match.
    #[error("bad signature")]
    BadSignature,

    /// Older than the maximum age.
    #[error("token expired ({age_secs}s old)")]
    Expired { age_secs: i64 },

    /// Issued after the verification time.
    #[error("token issued in the future")]
    FromFuture,
}

/// Issues and verifies confirmation tokens.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
    max_age_secs: i64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key", &"[REDACTED]")
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

impl TokenCodec {
    /// Create a codec from a secret, a salt and a maximum token age.
    #[must_use]
    pub fn new(secret_key: &SecretString, salt: &str, max_age: Duration) -> Self {
        let derived_key = Sha256::new()
            .chain_update(salt.as_bytes())
            .chain_update(b"signer")
            .chain_update(secret_key.expose_secret().as_bytes())
            .finalize();

        // HMAC zero-pads short keys to the block size, so padding here
        // yields the same MAC as keying with the 32 byte digest directly.
        let mut key = Key::<HmacSha256>::default();
        for (dst, src) in key.iter_mut().zip(derived_key) {
            *dst = src;
        }
        let mac = <HmacSha256 as KeyInit>::new(&key);

        Self {
            mac,
            max_age_secs: i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Create a codec from the token configuration.
    #[must_use]
    pub fn from_config(config: &TokenConfig) -> Self {
        Self::new(&config.secret_key, &config.salt, config.max_age)
    }

    /// Issue a token for `email`, dated now.
    #[must_use]
    pub fn issue(&self, email: &Email) -> String {
        self.issue_at(email, Utc::now())
    }

    /// Issue a token for `email`, dated `now`.
    #[must_use]
    pub fn issue_at(&self, email: &Email, now: DateTime<Utc>) -> String {
        let payload = URL_SAFE_NO_PAD.encode(email.as_str());
        let timestamp = URL_SAFE_NO_PAD.encode(timestamp_bytes(now.timestamp()));
        let signed = format!("{payload}.{timestamp}");

        let signature = URL_SAFE_NO_PAD.encode(self.sign(signed.as_bytes()));
        format!("{signed}.{signature}")
    }

    /// Verify a token against the current time.
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<Email> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now`.
    ///
    /// Returns `None` for malformed, forged and expired tokens alike.
    #[must_use]
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<Email> {
        match self.decode_at(token, now) {
            Ok(email) => Some(email),
            Err(e) => {
                tracing::debug!(reason = %e, "Confirmation token rejected");
                None
            }
        }
    }

    /// Verify a token as of `now`, keeping the failure reason.
    ///
    /// # Errors
    ///
    /// Returns the [`TokenError`] describing why the token is not acceptable.
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<Email, TokenError> {
        let (signed, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        let (payload, timestamp) = signed.split_once('.').ok_or(TokenError::Malformed)?;
        if timestamp.contains('.') {
            return Err(TokenError::Malformed);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(signed.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let timestamp = URL_SAFE_NO_PAD
            .decode(timestamp)
            .map_err(|_| TokenError::Malformed)?;
        let issued_at = timestamp_from_bytes(&timestamp).ok_or(TokenError::Malformed)?;

        let age_secs = now.timestamp().saturating_sub(issued_at);
        if age_secs < 0 {
            return Err(TokenError::FromFuture);
        }
        if age_secs > self.max_age_secs {
            return Err(TokenError::Expired { age_secs });
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let email = String::from_utf8(payload).map_err(|_| TokenError::Malformed)?;
        Email::parse(&email).map_err(|_| TokenError::Malformed)
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Big-endian bytes of a timestamp with leading zero bytes dropped.
fn timestamp_bytes(timestamp: i64) -> Vec<u8> {
    let bytes = timestamp.max(0).to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes.get(first..).unwrap_or_default().to_vec()
}

fn timestamp_from_bytes(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > 8 {
        return None;
    }
    let value = bytes
        .iter()
        .fold(0_u64, |acc, &b| (acc << 8) | u64::from(b));
    i64::try_from(value).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            &SecretString::from("ec944ccb6a6932fbb5192a207b7d4d22"),
            "4a898a15174d98e125b0f5a09764e07e",
            Duration::from_secs(900),
        )
    }

    fn issued_at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    fn email() -> Email {
        Email::parse("a@b.com").unwrap()
    }

    #[test]
    fn test_padded_key_matches_digest_key() {
        let derived_key = Sha256::new()
            .chain_update("4a898a15174d98e125b0f5a09764e07e".as_bytes())
            .chain_update(b"signer")
            .chain_update(b"ec944ccb6a6932fbb5192a207b7d4d22")
            .finalize();
        let mut direct = <HmacSha256 as Mac>::new_from_slice(&derived_key).unwrap();
        direct.update(b"payload.stamp");

        assert_eq!(
            codec().sign(b"payload.stamp"),
            direct.finalize().into_bytes().to_vec()
        );
    }

    #[test]
    fn test_issue_then_verify() {
        let codec = codec();
        let token = codec.issue_at(&email(), issued_at());
        assert_eq!(codec.verify_at(&token, issued_at()), Some(email()));
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = codec().issue_at(&Email::parse("x+y/z@b.com").unwrap(), issued_at());
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        );
        assert_eq!(token.matches('.').count(), 2);
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let token = codec.issue_at(&email(), issued_at());

        let at_899 = issued_at() + TimeDelta::seconds(899);
        let at_900 = issued_at() + TimeDelta::seconds(900);
        let at_901 = issued_at() + TimeDelta::seconds(901);

        assert_eq!(codec.verify_at(&token, at_899), Some(email()));
        assert_eq!(codec.verify_at(&token, at_900), Some(email()));
        assert_eq!(codec.verify_at(&token, at_901), None);
        assert_eq!(
            codec.decode_at(&token, at_901),
            Err(TokenError::Expired { age_secs: 901 })
        );
    }

    #[test]
    fn test_future_token_rejected() {
        let codec = codec();
        let token = codec.issue_at(&email(), issued_at());
        let before = issued_at() - TimeDelta::seconds(5);
        assert_eq!(codec.decode_at(&token, before), Err(TokenError::FromFuture));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let codec = codec();
        let token = codec.issue_at(&email(), issued_at());
        let (_, rest) = token.split_once('.').unwrap();
        let forged = format!("{}.{rest}", URL_SAFE_NO_PAD.encode("evil@b.com"));

        assert_eq!(
            codec.decode_at(&forged, issued_at()),
            Err(TokenError::BadSignature)
        );
        assert_eq!(codec.verify_at(&forged, issued_at()), None);
    }

    #[test]
    fn test_other_salt_rejected() {
        let other = TokenCodec::new(
            &SecretString::from("ec944ccb6a6932fbb5192a207b7d4d22"),
            "password-reset",
            Duration::from_secs(900),
        );
        let token = other.issue_at(&email(), issued_at());
        assert_eq!(
            codec().decode_at(&token, issued_at()),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_other_secret_rejected() {
        let other = TokenCodec::new(
            &SecretString::from("0d2f8b7a4c1e9d3f6a5b8c7e2d1f0a9b"),
            "4a898a15174d98e125b0f5a09764e07e",
            Duration::from_secs(900),
        );
        let token = other.issue_at(&email(), issued_at());
        assert_eq!(codec().verify_at(&token, issued_at()), None);
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let codec = codec();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.???.***"] {
            assert_eq!(codec.verify_at(token, issued_at()), None, "token: {token:?}");
        }
        assert_eq!(
            codec.decode_at("no-dots-at-all", issued_at()),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_timestamp_bytes_roundtrip_drops_leading_zeros() {
        let bytes = timestamp_bytes(1_760_000_000);
        assert_eq!(bytes.len(), 4);
        assert_eq!(timestamp_from_bytes(&bytes), Some(1_760_000_000));
        assert_eq!(timestamp_from_bytes(&[0; 9]), None);
    }
}
