use std::sync::Arc;

use super::{
    audit::AuditDispatcher,
    auth::{stamp_context, RequestContext},
    error::ServiceError,
    store::{IdentityStore, Stores, TenantStore},
};
use crate::{
    models::{AuditAction, AuditEvent, MemberProject, NewTenant, Tenant},
    utils::NaturalId,
};

/// Project (tenant) administration: creation and membership grants.
#[derive(Clone)]
pub struct ProjectService {
    identities: Arc<dyn IdentityStore>,
    tenants: Arc<dyn TenantStore>,
    audit: AuditDispatcher,
}

impl ProjectService {
    pub fn new(stores: &Stores, audit: AuditDispatcher) -> Self {
        Self {
            identities: stores.identities.clone(),
            tenants: stores.tenants.clone(),
            audit,
        }
    }

    pub async fn create_project(
        &self,
        ctx: &RequestContext,
        draft: NewTenant,
    ) -> Result<Tenant, ServiceError> {
        if draft.code.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "project code must not be empty".to_string(),
            ));
        }

        let tenant = Tenant::new(draft);
        self.tenants.create_tenant(&tenant).await?;

        tracing::info!(tenant_code = %tenant.code, "Project created");
        let mut event = AuditEvent::new(
            AuditAction::ProjectCreated,
            format!("Created project {}", tenant.code),
        )
        .with_tenant(tenant.tenant_id);
        if let Some(actor_id) = ctx.actor_id {
            event = event.with_actor(actor_id);
        }
        self.audit.emit(stamp_context(ctx, event));

        Ok(tenant)
    }

    /// Grant an identity membership in a project with the given role codes.
    pub async fn add_member(
        &self,
        ctx: &RequestContext,
        tenant_code: &str,
        natural_id: NaturalId,
        roles: Vec<i32>,
    ) -> Result<MemberProject, ServiceError> {
        let mut roles = roles;
        roles.sort_unstable();
        roles.dedup();
        if roles.is_empty() {
            return Err(ServiceError::InvalidInput(
                "at least one role is required".to_string(),
            ));
        }

        let tenant = self
            .tenants
            .find_tenant_by_code(tenant_code.trim())
            .await?
            .ok_or(ServiceError::TenantNotFound)?;

        let identity = self
            .identities
            .find_by_natural_id(natural_id.body)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        self.tenants
            .add_member_with_roles(identity.identity_id, tenant.tenant_id, &roles)
            .await?;

        tracing::info!(
            user_id = %identity.identity_id,
            tenant_code = %tenant.code,
            roles = ?roles,
            "Member added to project"
        );
        let mut event = AuditEvent::new(
            AuditAction::MemberAdded,
            format!("Added {} to project {}", identity.natural_id, tenant.code),
        )
        .with_tenant(tenant.tenant_id)
        .with_metadata(serde_json::json!({
            "user_id": identity.identity_id,
            "roles": roles,
        }));
        if let Some(actor_id) = ctx.actor_id {
            event = event.with_actor(actor_id);
        }
        self.audit.emit(stamp_context(ctx, event));

        Ok(MemberProject {
            tenant_id: tenant.tenant_id,
            code: tenant.code,
            name: tenant.name,
            roles,
        })
    }
}
