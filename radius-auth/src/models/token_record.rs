//! Issued access token bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An issued access token.
///
/// Records are never deleted before they expire; revocation only flips the
/// flag and puts the token id on the blacklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The encoded token, opaque to everything outside the JWT service.
    pub token: String,
    /// JWT id used as the revocation key.
    pub token_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

/// Whole seconds of validity left at `now`, or `None` once `expires_at` has
/// passed. Partial seconds round up, so a blacklist entry with this TTL never
/// expires before the token does.
pub fn ttl_seconds(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<u64> {
    let remaining = (expires_at - now).num_milliseconds();
    if remaining <= 0 {
        return None;
    }
    Some(((remaining as u64) + 999) / 1000)
}

impl TokenRecord {
    pub fn revoke(&mut self) {
        self.revoked = true;
    }
}
