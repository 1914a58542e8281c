//! Refresh session model - server side half of an opaque refresh token.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Refresh session entity. The bearer value itself is never stored, only its
/// digest.
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub session_id: Uuid,
    pub identity_id: Uuid,
    pub token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl RefreshSession {
    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }

    /// Not revoked and not yet expired. The digest is checked separately.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }
}
