//! In-process store used by tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    AuditSink, HealthCheck, IdentityStore, StoreError, StoreResult, TenantStore, TokenStore,
};
use crate::models::{AuditEvent, Identity, MemberProject, RefreshSession, Tenant};
use crate::utils::PasswordHashString;

#[derive(Debug, Clone)]
struct Membership {
    is_active: bool,
    roles: Vec<i32>,
}

#[derive(Default)]
struct MemoryState {
    identities: HashMap<Uuid, Identity>,
    tenants: HashMap<Uuid, Tenant>,
    memberships: HashMap<(Uuid, Uuid), Membership>,
    sessions: HashMap<Uuid, RefreshSession>,
    audit: Vec<AuditEvent>,
}

/// Same uniqueness rules as the relational schema, kept in one mutex.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_revocations: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Memory store mutex poisoned: {}", e)))
    }

    /// Make every revocation call fail with a backend error.
    pub fn set_fail_revocations(&self, fail: bool) {
        self.fail_revocations.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the audit events appended so far.
    pub fn audit_events(&self) -> StoreResult<Vec<AuditEvent>> {
        Ok(self.state()?.audit.clone())
    }

    pub fn set_identity_active(&self, identity_id: Uuid, is_active: bool) -> StoreResult<()> {
        if let Some(identity) = self.state()?.identities.get_mut(&identity_id) {
            identity.is_active = is_active;
        }
        Ok(())
    }

    pub fn set_tenant_active(&self, tenant_id: Uuid, is_active: bool) -> StoreResult<()> {
        if let Some(tenant) = self.state()?.tenants.get_mut(&tenant_id) {
            tenant.is_active = is_active;
        }
        Ok(())
    }

    pub fn set_membership_active(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
        is_active: bool,
    ) -> StoreResult<()> {
        if let Some(membership) = self.state()?.memberships.get_mut(&(identity_id, tenant_id)) {
            membership.is_active = is_active;
        }
        Ok(())
    }

    fn check_revocations_enabled(&self) -> StoreResult<()> {
        if self.fail_revocations.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "revocation rejected by memory store"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_by_natural_id(&self, body: u32) -> StoreResult<Option<Identity>> {
        Ok(self
            .state()?
            .identities
            .values()
            .find(|i| i.natural_id.body == body)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .state()?
            .identities
            .values()
            .find(|i| i.email == email)
            .cloned())
    }

    async fn find_by_id(&self, identity_id: Uuid) -> StoreResult<Option<Identity>> {
        Ok(self.state()?.identities.get(&identity_id).cloned())
    }

    async fn create(&self, identity: &Identity) -> StoreResult<()> {
        let mut state = self.state()?;
        if state
            .identities
            .values()
            .any(|i| i.natural_id.body == identity.natural_id.body)
        {
            return Err(StoreError::Conflict("User with this RUT".to_string()));
        }
        if state.identities.values().any(|i| i.email == identity.email) {
            return Err(StoreError::Conflict("User with this email".to_string()));
        }
        state
            .identities
            .insert(identity.identity_id, identity.clone());
        Ok(())
    }

    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        password_hash: &PasswordHashString,
        must_change_password: bool,
    ) -> StoreResult<()> {
        let mut state = self.state()?;
        let identity = state.identities.get_mut(&identity_id).ok_or_else(|| {
            StoreError::Backend(anyhow::anyhow!("identity {} does not exist", identity_id))
        })?;
        identity.password_hash = Some(password_hash.clone());
        identity.must_change_password = must_change_password;
        identity.updated_utc = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn find_tenant_by_code(&self, code: &str) -> StoreResult<Option<Tenant>> {
        Ok(self
            .state()?
            .tenants
            .values()
            .find(|t| t.code == code)
            .cloned())
    }

    async fn create_tenant(&self, tenant: &Tenant) -> StoreResult<()> {
        let mut state = self.state()?;
        if state.tenants.values().any(|t| t.code == tenant.code) {
            return Err(StoreError::Conflict("Project with this code".to_string()));
        }
        state.tenants.insert(tenant.tenant_id, tenant.clone());
        Ok(())
    }

    async fn list_roles_for_member(
        &self,
        identity_id: Uuid,
        tenant_code: &str,
    ) -> StoreResult<Option<Vec<i32>>> {
        let state = self.state()?;
        let Some(tenant) = state.tenants.values().find(|t| t.code == tenant_code) else {
            return Ok(None);
        };
        Ok(state
            .memberships
            .get(&(identity_id, tenant.tenant_id))
            .filter(|m| m.is_active)
            .map(|m| m.roles.clone()))
    }

    async fn add_member_with_roles(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
        roles: &[i32],
    ) -> StoreResult<()> {
        let mut state = self.state()?;
        if !state.identities.contains_key(&identity_id) || !state.tenants.contains_key(&tenant_id)
        {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "membership references a missing identity or project"
            )));
        }
        if state.memberships.contains_key(&(identity_id, tenant_id)) {
            return Err(StoreError::Conflict("Membership".to_string()));
        }
        state.memberships.insert(
            (identity_id, tenant_id),
            Membership {
                is_active: true,
                roles: roles.to_vec(),
            },
        );
        Ok(())
    }

    async fn list_memberships(&self, identity_id: Uuid) -> StoreResult<Vec<MemberProject>> {
        let state = self.state()?;
        let mut projects: Vec<MemberProject> = state
            .memberships
            .iter()
            .filter(|((member, _), m)| *member == identity_id && m.is_active)
            .filter_map(|((_, tenant_id), m)| {
                state.tenants.get(tenant_id).map(|t| MemberProject {
                    tenant_id: t.tenant_id,
                    code: t.code.clone(),
                    name: t.name.clone(),
                    roles: m.roles.clone(),
                })
            })
            .collect();
        projects.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(projects)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create_refresh_session(&self, session: &RefreshSession) -> StoreResult<()> {
        let mut state = self.state()?;
        if state.sessions.contains_key(&session.session_id) {
            return Err(StoreError::Conflict("Refresh session".to_string()));
        }
        state.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_refresh_session(&self, session_id: Uuid) -> StoreResult<Option<RefreshSession>> {
        Ok(self.state()?.sessions.get(&session_id).cloned())
    }

    async fn revoke_refresh_session(&self, session_id: Uuid) -> StoreResult<bool> {
        self.check_revocations_enabled()?;
        let mut state = self.state()?;
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.revoked_utc.is_none() => {
                session.revoked_utc = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_sessions_for_identity(&self, identity_id: Uuid) -> StoreResult<u64> {
        self.check_revocations_enabled()?;
        let mut state = self.state()?;
        let now = Utc::now();
        let mut revoked = 0;
        for session in state
            .sessions
            .values_mut()
            .filter(|s| s.identity_id == identity_id && s.revoked_utc.is_none())
        {
            session.revoked_utc = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        self.state()?.audit.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.state().map(|_| ())
    }
}
