//! Identity model - a person who can authenticate with a natural id.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::MemberProject;
use crate::utils::{NaturalId, PasswordHashString};

/// Identity entity.
#[derive(Debug, Clone)]
pub struct Identity {
    pub identity_id: Uuid,
    pub natural_id: NaturalId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// `None` means the account cannot log in with a password.
    pub password_hash: Option<PasswordHashString>,
    pub must_change_password: bool,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Fields supplied when provisioning an identity.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub natural_id: NaturalId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl Identity {
    /// Create a new active identity that must replace its initial password.
    pub fn new(draft: NewIdentity, password_hash: PasswordHashString) -> Self {
        let now = Utc::now();
        Self {
            identity_id: Uuid::new_v4(),
            natural_id: draft.natural_id,
            email: normalize_email(&draft.email),
            first_name: draft.first_name.trim().to_string(),
            last_name: draft.last_name.trim().to_string(),
            password_hash: Some(password_hash),
            must_change_password: true,
            is_active: true,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Convert to sanitized response (no sensitive fields).
    pub fn sanitized(&self) -> IdentityResponse {
        IdentityResponse::from(self)
    }
}

/// Emails are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Identity as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityResponse {
    pub id: Uuid,
    pub rut: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub must_change_password: bool,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.identity_id,
            rut: identity.natural_id.to_string(),
            email: identity.email.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            must_change_password: identity.must_change_password,
            is_active: identity.is_active,
            created_utc: identity.created_utc,
        }
    }
}

/// Identity together with every active membership it holds.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityWithProjects {
    #[serde(flatten)]
    pub identity: IdentityResponse,
    pub projects: Vec<MemberProject>,
}
