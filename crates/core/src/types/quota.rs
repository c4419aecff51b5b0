//! Per-user quotas.
//!
//! Every email address gets a fixed number of confirmation links and a fixed
//! number of inquiries. The counters live on the user record; this type only
//! holds the ceilings and answers "is there room for one more".

use serde::{Deserialize, Serialize};

/// A fixed ceiling on how many times an action may happen for one email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quota(i32);

impl Quota {
    /// Confirmation links that may ever be issued for one email.
    pub const CONFIRMATION_TOKENS: Self = Self(3);

    /// Inquiries that may ever be sent for one email.
    pub const INQUIRIES: Self = Self(5);

    /// Create a quota with the given ceiling.
    #[must_use]
    pub const fn new(limit: i32) -> Self {
        Self(limit)
    }

    /// The ceiling as stored alongside the counters.
    #[must_use]
    pub const fn limit(self) -> i32 {
        self.0
    }

    /// Whether a counter at `used` still leaves room for one more.
    #[must_use]
    pub const fn allows_another(self, used: i32) -> bool {
        used < self.0
    }

    /// Whether a counter at `used` has reached (or passed) the ceiling.
    #[must_use]
    pub const fn is_exhausted(self, used: i32) -> bool {
        !self.allows_another(used)
    }
}
