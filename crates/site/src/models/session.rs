//! Session-related types.
//!
//! The site has no logins; the session only carries one-shot flash
//! messages and the CSRF token for form posts.

use serde::{Deserialize, Serialize};

/// Which class of message a flash is, for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    /// The action went through.
    Success,
    /// A business rule turned the request away (quota, confirmation state).
    Notice,
    /// Something failed and the user should try again.
    Error,
}

impl FlashKind {
    /// CSS class used by the templates.
    #[must_use]
    pub const fn css_class(self) -> &'static str {
        match self {
            Self::Success => "flash-success",
            Self::Notice => "flash-notice",
            Self::Error => "flash-error",
        }
    }
}

/// A message shown once on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Notice,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }
}

/// Session keys.
pub mod session_keys {
    /// Pending flash messages, consumed on the next page render.
    pub const FLASHES: &str = "flashes";

    /// Per-session CSRF token for form posts.
    pub const CSRF_TOKEN: &str = "csrf_token";
}
