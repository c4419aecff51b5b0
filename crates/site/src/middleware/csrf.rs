//! Per-session CSRF tokens for form posts.
//!
//! Every rendered form embeds the session's token in a hidden `csrf_token`
//! field; a post is only accepted when the field matches the session.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use tower_sessions::Session;

use crate::models::session_keys;

/// Random bytes in a token.
const TOKEN_BYTES: usize = 32;

fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The session's CSRF token, created on first use.
///
/// # Errors
///
/// Returns an error if the session cannot be read or modified.
pub async fn csrf_token(session: &Session) -> Result<String, tower_sessions::session::Error> {
    if let Some(token) = session.get::<String>(session_keys::CSRF_TOKEN).await? {
        return Ok(token);
    }

    let token = generate_token();
    session.insert(session_keys::CSRF_TOKEN, &token).await?;
    Ok(token)
}

/// Whether `submitted` matches the session's CSRF token.
///
/// A session without a token never matches.
///
/// # Errors
///
/// Returns an error if the session cannot be read.
pub async fn verify_csrf(
    session: &Session,
    submitted: &str,
) -> Result<bool, tower_sessions::session::Error> {
    let stored: Option<String> = session.get(session_keys::CSRF_TOKEN).await?;
    Ok(stored.is_some_and(|token| !submitted.is_empty() && constant_time_eq(&token, submitted)))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}
