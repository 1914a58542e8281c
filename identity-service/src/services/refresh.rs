//! Opaque refresh tokens: random bearer shown once, SHA-256 digest at rest.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::error::ServiceError;
use crate::models::RefreshSession;

/// Token pair returned to the client after login or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenPair {
    pub fn bearer(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshTokenIssuer {
    ttl: Duration,
}

impl RefreshTokenIssuer {
    pub fn new(expiry_days: i64) -> Self {
        Self {
            ttl: Duration::days(expiry_days),
        }
    }

    /// Mint a new bearer value and the session record that backs it.
    ///
    /// The bearer is the session id itself; only its digest is stored.
    pub fn issue(&self, identity_id: Uuid) -> (String, RefreshSession) {
        let session_id = Uuid::new_v4();
        let bearer = session_id.to_string();
        let now = Utc::now();

        let session = RefreshSession {
            session_id,
            identity_id,
            token_hash: hash_token(&bearer),
            expiry_utc: now + self.ttl,
            revoked_utc: None,
            created_utc: now,
        };

        (bearer, session)
    }

    /// Step 1 of rotation: the bearer must parse as a session id.
    pub fn parse_bearer(bearer: &str) -> Result<Uuid, ServiceError> {
        Uuid::parse_str(bearer.trim()).map_err(|_| ServiceError::InvalidToken)
    }

    /// Steps 3 and 4 of rotation: the record must be active and its digest
    /// must match the whole presented bearer.
    pub fn check_usable(
        session: &RefreshSession,
        bearer: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if !session.is_active_at(now) {
            return Err(ServiceError::TokenExpiredOrRevoked);
        }

        let presented = hash_token(bearer.trim());
        if !bool::from(presented.as_bytes().ct_eq(session.token_hash.as_bytes())) {
            return Err(ServiceError::InvalidToken);
        }

        Ok(())
    }
}

/// Hash a token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
