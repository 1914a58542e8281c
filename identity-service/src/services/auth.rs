use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::{
    audit::AuditDispatcher,
    error::ServiceError,
    jwt::{JwtService, Principal},
    refresh::{RefreshTokenIssuer, TokenPair},
    store::{IdentityStore, Stores, TenantStore, TokenStore},
};
use crate::{
    models::{
        AuditAction, AuditEvent, Identity, IdentityWithProjects, NewIdentity, Tenant,
    },
    utils::{
        derive_initial_password, NaturalId, Password, PasswordHashString, PasswordHasher,
        PasswordPolicy,
    },
};

/// Caller details copied into audit events.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub source_addr: Option<String>,
    pub request_id: Option<String>,
    /// Authenticated caller, when the route requires one.
    pub actor_id: Option<Uuid>,
}

/// Everything a successful login produces.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub identity: Identity,
    pub roles: Vec<i32>,
    pub tenant: Tenant,
}

/// Session orchestrator: login, registration, password changes and the
/// refresh token lifecycle.
#[derive(Clone)]
pub struct AuthService {
    identities: Arc<dyn IdentityStore>,
    tenants: Arc<dyn TenantStore>,
    tokens: Arc<dyn TokenStore>,
    hasher: Arc<PasswordHasher>,
    policy: PasswordPolicy,
    jwt: JwtService,
    refresh: RefreshTokenIssuer,
    audit: AuditDispatcher,
}

impl AuthService {
    pub fn new(
        stores: &Stores,
        hasher: Arc<PasswordHasher>,
        policy: PasswordPolicy,
        jwt: JwtService,
        refresh: RefreshTokenIssuer,
        audit: AuditDispatcher,
    ) -> Self {
        Self {
            identities: stores.identities.clone(),
            tenants: stores.tenants.clone(),
            tokens: stores.tokens.clone(),
            hasher,
            policy,
            jwt,
            refresh,
            audit,
        }
    }

    pub async fn login(
        &self,
        ctx: &RequestContext,
        natural_id: NaturalId,
        password: Password,
        tenant_code: &str,
    ) -> Result<LoginOutcome, ServiceError> {
        let identity = self.identities.find_by_natural_id(natural_id.body).await?;

        // Unknown identities burn the same hashing work as a wrong password.
        let identity = match identity {
            Some(identity) if identity.is_active => identity,
            other => {
                self.verify_password(password, None).await?;
                let reason = if other.is_some() {
                    "inactive_identity"
                } else {
                    "unknown_identity"
                };
                self.emit_login_failed(ctx, other.map(|i| i.identity_id), reason);
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if !self
            .verify_password(password, identity.password_hash.clone())
            .await?
        {
            tracing::info!(user_id = %identity.identity_id, "Login rejected: wrong password");
            self.emit_login_failed(ctx, Some(identity.identity_id), "wrong_password");
            return Err(ServiceError::InvalidCredentials);
        }

        if identity.must_change_password {
            tracing::info!(user_id = %identity.identity_id, "Login blocked until password is changed");
            self.emit_login_failed(ctx, Some(identity.identity_id), "password_change_required");
            return Err(ServiceError::PasswordChangeRequired);
        }

        let tenant = self.resolve_tenant(tenant_code).await?;
        let roles = self.resolve_roles(&identity, &tenant).await?;

        let tokens = self.issue_tokens(&identity, &roles).await?;

        tracing::info!(
            user_id = %identity.identity_id,
            tenant_code = %tenant.code,
            "User logged in"
        );
        self.emit(
            ctx,
            AuditEvent::new(AuditAction::LoginSuccess, "User logged in")
                .with_actor(identity.identity_id)
                .with_tenant(tenant.tenant_id),
        );

        Ok(LoginOutcome {
            tokens,
            identity,
            roles,
            tenant,
        })
    }

    /// Provision an identity with its derived initial password. The account
    /// must change that password before it can log in.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        draft: NewIdentity,
    ) -> Result<Identity, ServiceError> {
        let initial = derive_initial_password(&draft.natural_id)?;
        let password_hash = self.hash_password(initial).await?;

        let identity = Identity::new(draft, password_hash);
        self.identities.create(&identity).await?;

        tracing::info!(user_id = %identity.identity_id, "User registered");
        self.emit(
            ctx,
            AuditEvent::new(
                AuditAction::UserRegistered,
                format!("Registered user {}", identity.natural_id),
            )
            .with_actor(ctx.actor_id.unwrap_or(identity.identity_id))
            .with_metadata(serde_json::json!({ "user_id": identity.identity_id })),
        );

        Ok(identity)
    }

    /// Replace the password and close every open session of the identity.
    pub async fn change_password(
        &self,
        ctx: &RequestContext,
        natural_id: NaturalId,
        old_password: Password,
        new_password: Password,
    ) -> Result<(), ServiceError> {
        self.policy.check(&new_password)?;

        let identity = self
            .identities
            .find_by_natural_id(natural_id.body)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        if !self
            .verify_password(old_password, identity.password_hash.clone())
            .await?
        {
            return Err(ServiceError::InvalidCredentials);
        }

        let password_hash = self.hash_password(new_password).await?;
        self.identities
            .update_password_hash(identity.identity_id, &password_hash, false)
            .await?;

        // The new secret is already stored; a failed sweep must not report
        // the change as failed.
        match self
            .tokens
            .revoke_sessions_for_identity(identity.identity_id)
            .await
        {
            Ok(revoked) => tracing::info!(
                user_id = %identity.identity_id,
                revoked_sessions = revoked,
                "Password changed"
            ),
            Err(e) => tracing::error!(
                user_id = %identity.identity_id,
                error = %e,
                "Failed to revoke sessions after password change"
            ),
        }
        self.emit(
            ctx,
            AuditEvent::new(AuditAction::PasswordChanged, "Password changed")
                .with_actor(identity.identity_id),
        );

        Ok(())
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// revoked once its replacement exists.
    pub async fn refresh(
        &self,
        ctx: &RequestContext,
        bearer: &str,
        tenant_code: &str,
    ) -> Result<TokenPair, ServiceError> {
        let session_id = RefreshTokenIssuer::parse_bearer(bearer)?;

        let session = self
            .tokens
            .find_refresh_session(session_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        RefreshTokenIssuer::check_usable(&session, bearer, Utc::now())?;

        let identity = self
            .identities
            .find_by_id(session.identity_id)
            .await?
            .filter(|i| i.is_active)
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        // An unknown or inactive project is just another project without access.
        let tenant = match self.resolve_tenant(tenant_code).await {
            Err(ServiceError::TenantNotFound) => return Err(ServiceError::NoTenantAccess),
            other => other?,
        };
        let roles = self.resolve_roles(&identity, &tenant).await?;

        let tokens = self.issue_tokens(&identity, &roles).await?;

        // The new pair is already out; a failed revoke must not take it back.
        match self.tokens.revoke_refresh_session(session.session_id).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                session_id = %session.session_id,
                user_id = %identity.identity_id,
                "Refresh token was revoked concurrently during rotation"
            ),
            Err(e) => tracing::error!(
                session_id = %session.session_id,
                user_id = %identity.identity_id,
                error = %e,
                "Failed to revoke rotated refresh token"
            ),
        }

        tracing::debug!(user_id = %identity.identity_id, tenant_code = %tenant.code, "Tokens refreshed");
        self.emit(
            ctx,
            AuditEvent::new(AuditAction::TokenRefreshed, "Refresh token rotated")
                .with_actor(identity.identity_id)
                .with_tenant(tenant.tenant_id),
        );

        Ok(tokens)
    }

    /// Revoke a refresh token without issuing a replacement.
    pub async fn logout(&self, ctx: &RequestContext, bearer: &str) -> Result<(), ServiceError> {
        let session_id = RefreshTokenIssuer::parse_bearer(bearer)?;

        let session = self
            .tokens
            .find_refresh_session(session_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        RefreshTokenIssuer::check_usable(&session, bearer, Utc::now())?;

        if !self.tokens.revoke_refresh_session(session.session_id).await? {
            tracing::debug!(session_id = %session.session_id, "Session already revoked at logout");
        }

        tracing::info!(user_id = %session.identity_id, "User logged out");
        self.emit(
            ctx,
            AuditEvent::new(AuditAction::Logout, "User logged out").with_actor(session.identity_id),
        );

        Ok(())
    }

    /// Check an access token. Never touches a store, so a deactivated
    /// account keeps access until its token expires.
    pub fn validate_token(&self, access_token: &str) -> Result<Principal, ServiceError> {
        Ok(self.jwt.validate_access_token(access_token)?)
    }

    pub async fn identity_by_id(&self, identity_id: Uuid) -> Result<Identity, ServiceError> {
        self.identities
            .find_by_id(identity_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))
    }

    pub async fn identity_with_projects(
        &self,
        natural_id: NaturalId,
    ) -> Result<IdentityWithProjects, ServiceError> {
        let identity = self
            .identities
            .find_by_natural_id(natural_id.body)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        let projects = self.tenants.list_memberships(identity.identity_id).await?;

        Ok(IdentityWithProjects {
            identity: identity.sanitized(),
            projects,
        })
    }

    async fn resolve_tenant(&self, tenant_code: &str) -> Result<Tenant, ServiceError> {
        self.tenants
            .find_tenant_by_code(tenant_code.trim())
            .await?
            .filter(|t| t.is_active)
            .ok_or(ServiceError::TenantNotFound)
    }

    async fn resolve_roles(
        &self,
        identity: &Identity,
        tenant: &Tenant,
    ) -> Result<Vec<i32>, ServiceError> {
        match self
            .tenants
            .list_roles_for_member(identity.identity_id, &tenant.code)
            .await?
        {
            Some(roles) if !roles.is_empty() => Ok(roles),
            _ => {
                tracing::info!(
                    user_id = %identity.identity_id,
                    tenant_code = %tenant.code,
                    "No active membership in project"
                );
                Err(ServiceError::NoTenantAccess)
            }
        }
    }

    async fn issue_tokens(
        &self,
        identity: &Identity,
        roles: &[i32],
    ) -> Result<TokenPair, ServiceError> {
        let access_token = self.jwt.issue_access_token(identity, roles)?;

        let (refresh_token, session) = self.refresh.issue(identity.identity_id);
        self.tokens.create_refresh_session(&session).await?;

        Ok(TokenPair::bearer(
            access_token,
            refresh_token,
            self.jwt.access_token_expiry_seconds(),
        ))
    }

    async fn hash_password(&self, password: Password) -> Result<PasswordHashString, ServiceError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing task failed: {}", e)))?
            .map_err(ServiceError::from)
    }

    /// `None` for the stored hash runs the dummy verification and reports a
    /// mismatch.
    async fn verify_password(
        &self,
        password: Password,
        password_hash: Option<PasswordHashString>,
    ) -> Result<bool, ServiceError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || match password_hash {
            Some(hash) => hasher.verify(&password, &hash),
            None => {
                hasher.verify_dummy(&password);
                Ok(false)
            }
        })
        .await
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password verification task failed: {}", e)))?
        .map_err(ServiceError::from)
    }

    fn emit_login_failed(&self, ctx: &RequestContext, actor_id: Option<Uuid>, reason: &str) {
        let mut event = AuditEvent::new(AuditAction::LoginFailed, "Login failed")
            .with_metadata(serde_json::json!({ "reason": reason }));
        if let Some(actor_id) = actor_id {
            event = event.with_actor(actor_id);
        }
        self.emit(ctx, event);
    }

    fn emit(&self, ctx: &RequestContext, event: AuditEvent) {
        self.audit.emit(stamp_context(ctx, event));
    }
}

/// Copy the caller's address and request id onto an event.
pub(crate) fn stamp_context(ctx: &RequestContext, event: AuditEvent) -> AuditEvent {
    let mut event = event.with_source(ctx.source_addr.clone());
    if let Some(request_id) = &ctx.request_id {
        let mut metadata = match event.metadata.take() {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        metadata.insert(
            "request_id".to_string(),
            serde_json::Value::String(request_id.clone()),
        );
        event.metadata = Some(serde_json::Value::Object(metadata));
    }
    event
}
