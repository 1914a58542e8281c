//! Tenant (project) model and memberships.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Tenant entity.
#[derive(Debug, Clone, Serialize)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    /// Where the client should send the user after login.
    pub frontend_url: Option<String>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Fields supplied when creating a tenant.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub frontend_url: Option<String>,
}

impl Tenant {
    /// Create a new active tenant.
    pub fn new(draft: NewTenant) -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            code: draft.code.trim().to_string(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            frontend_url: draft.frontend_url,
            is_active: true,
            created_utc: Utc::now(),
        }
    }
}

/// One active membership of an identity, with its role codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberProject {
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub roles: Vec<i32>,
}
