//! Storage contracts consumed by the identity flows.
//!
//! Each capability is its own trait so flows depend only on what they use.
//! "Not found" is `Ok(None)`, never an error.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AuditEvent, Identity, MemberProject, RefreshSession, Tenant};
use crate::utils::PasswordHashString;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule rejected the write. Carries what collided.
    #[error("{0} already exists")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_natural_id(&self, body: u32) -> StoreResult<Option<Identity>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>>;

    async fn find_by_id(&self, identity_id: Uuid) -> StoreResult<Option<Identity>>;

    async fn create(&self, identity: &Identity) -> StoreResult<()>;

    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        password_hash: &PasswordHashString,
        must_change_password: bool,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_tenant_by_code(&self, code: &str) -> StoreResult<Option<Tenant>>;

    async fn create_tenant(&self, tenant: &Tenant) -> StoreResult<()>;

    /// Role codes of an active membership, `None` when there is none.
    async fn list_roles_for_member(
        &self,
        identity_id: Uuid,
        tenant_code: &str,
    ) -> StoreResult<Option<Vec<i32>>>;

    /// Create the membership and all of its roles, or nothing.
    async fn add_member_with_roles(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
        roles: &[i32],
    ) -> StoreResult<()>;

    async fn list_memberships(&self, identity_id: Uuid) -> StoreResult<Vec<MemberProject>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create_refresh_session(&self, session: &RefreshSession) -> StoreResult<()>;

    async fn find_refresh_session(&self, session_id: Uuid) -> StoreResult<Option<RefreshSession>>;

    /// Returns true only when this call moved the session from active to
    /// revoked.
    async fn revoke_refresh_session(&self, session_id: Uuid) -> StoreResult<bool>;

    /// Returns the number of sessions revoked.
    async fn revoke_sessions_for_identity(&self, identity_id: Uuid) -> StoreResult<u64>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;
}

/// Handles to every storage capability.
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn IdentityStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub audit: Arc<dyn AuditSink>,
    pub health: Arc<dyn HealthCheck>,
}

impl Stores {
    /// Wire one backend into every capability.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: IdentityStore + TenantStore + TokenStore + AuditSink + HealthCheck + 'static,
    {
        Self {
            identities: backend.clone(),
            tenants: backend.clone(),
            tokens: backend.clone(),
            audit: backend.clone(),
            health: backend,
        }
    }
}
