//! PostgreSQL adapter built on sqlx. Schema lives in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use super::{
    AuditSink, HealthCheck, IdentityStore, StoreError, StoreResult, TenantStore, TokenStore,
};
use crate::models::{AuditEvent, Identity, MemberProject, RefreshSession, Tenant};
use crate::utils::{NaturalId, PasswordHashString};

/// PostgreSQL store wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(anyhow::anyhow!(e))
}

/// Translate a uniqueness violation into `Conflict`, anything else is opaque.
fn write_error(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            let what = match db_err.constraint() {
                Some("users_rut_body_key") => "User with this RUT",
                Some("users_email_key") => "User with this email",
                _ => what,
            };
            StoreError::Conflict(what.to_string())
        }
        _ => backend(e),
    }
}

#[derive(Debug, FromRow)]
struct IdentityRow {
    user_id: Uuid,
    rut_body: i64,
    rut_check: String,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: Option<String>,
    must_change_password: bool,
    is_active: bool,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = StoreError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        let body = u32::try_from(row.rut_body)
            .map_err(|_| anyhow::anyhow!("stored RUT body {} out of range", row.rut_body))?;
        let natural_id = NaturalId::from_parts(body, &row.rut_check)
            .map_err(|e| anyhow::anyhow!("stored RUT for {} is invalid: {}", row.user_id, e))?;

        Ok(Identity {
            identity_id: row.user_id,
            natural_id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            password_hash: row.password_hash.map(PasswordHashString::new),
            must_change_password: row.must_change_password,
            is_active: row.is_active,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct TenantRow {
    project_id: Uuid,
    code: String,
    name: String,
    description: Option<String>,
    frontend_url: Option<String>,
    is_active: bool,
    created_utc: DateTime<Utc>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            tenant_id: row.project_id,
            code: row.code,
            name: row.name,
            description: row.description,
            frontend_url: row.frontend_url,
            is_active: row.is_active,
            created_utc: row.created_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    token_id: Uuid,
    user_id: Uuid,
    token_hash: String,
    expiry_utc: DateTime<Utc>,
    revoked_utc: Option<DateTime<Utc>>,
    created_utc: DateTime<Utc>,
}

impl From<SessionRow> for RefreshSession {
    fn from(row: SessionRow) -> Self {
        RefreshSession {
            session_id: row.token_id,
            identity_id: row.user_id,
            token_hash: row.token_hash,
            expiry_utc: row.expiry_utc,
            revoked_utc: row.revoked_utc,
            created_utc: row.created_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct MembershipRow {
    project_id: Uuid,
    code: String,
    name: String,
    roles: Vec<i32>,
}

const IDENTITY_COLUMNS: &str = "user_id, rut_body, rut_check, email, first_name, last_name, \
     password_hash, must_change_password, is_active, created_utc, updated_utc";

#[async_trait]
impl IdentityStore for PgStore {
    async fn find_by_natural_id(&self, body: u32) -> StoreResult<Option<Identity>> {
        let query = format!("SELECT {} FROM users WHERE rut_body = $1", IDENTITY_COLUMNS);
        sqlx::query_as::<_, IdentityRow>(&query)
            .bind(i64::from(body))
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Identity::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let query = format!("SELECT {} FROM users WHERE email = $1", IDENTITY_COLUMNS);
        sqlx::query_as::<_, IdentityRow>(&query)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Identity::try_from)
            .transpose()
    }

    async fn find_by_id(&self, identity_id: Uuid) -> StoreResult<Option<Identity>> {
        let query = format!("SELECT {} FROM users WHERE user_id = $1", IDENTITY_COLUMNS);
        sqlx::query_as::<_, IdentityRow>(&query)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Identity::try_from)
            .transpose()
    }

    async fn create(&self, identity: &Identity) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, rut_body, rut_check, email, first_name, last_name,
                               password_hash, must_change_password, is_active, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(identity.identity_id)
        .bind(i64::from(identity.natural_id.body))
        .bind(identity.natural_id.check.to_string())
        .bind(&identity.email)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(identity.password_hash.as_ref().map(|h| h.as_str()))
        .bind(identity.must_change_password)
        .bind(identity.is_active)
        .bind(identity.created_utc)
        .bind(identity.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "User"))?;
        Ok(())
    }

    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        password_hash: &PasswordHashString,
        must_change_password: bool,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, must_change_password = $3, updated_utc = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(identity_id)
        .bind(password_hash.as_str())
        .bind(must_change_password)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl TenantStore for PgStore {
    async fn find_tenant_by_code(&self, code: &str) -> StoreResult<Option<Tenant>> {
        sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT project_id, code, name, description, frontend_url, is_active, created_utc
            FROM projects WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Tenant::from))
        .map_err(backend)
    }

    async fn create_tenant(&self, tenant: &Tenant) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (project_id, code, name, description, frontend_url, is_active, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tenant.tenant_id)
        .bind(&tenant.code)
        .bind(&tenant.name)
        .bind(&tenant.description)
        .bind(&tenant.frontend_url)
        .bind(tenant.is_active)
        .bind(tenant.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "Project with this code"))?;
        Ok(())
    }

    async fn list_roles_for_member(
        &self,
        identity_id: Uuid,
        tenant_code: &str,
    ) -> StoreResult<Option<Vec<i32>>> {
        let member_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT m.member_id
            FROM project_members m
            JOIN projects p ON p.project_id = m.project_id
            WHERE m.user_id = $1 AND p.code = $2 AND m.is_active = true
            "#,
        )
        .bind(identity_id)
        .bind(tenant_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(member_id) = member_id else {
            return Ok(None);
        };

        let roles: Vec<i32> = sqlx::query_scalar(
            "SELECT role_code FROM project_member_roles WHERE member_id = $1 ORDER BY role_code",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(Some(roles))
    }

    async fn add_member_with_roles(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
        roles: &[i32],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let member_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO project_members (member_id, user_id, project_id, is_active, created_utc)
            VALUES ($1, $2, $3, true, NOW())
            "#,
        )
        .bind(member_id)
        .bind(identity_id)
        .bind(tenant_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, "Membership"))?;

        for role in roles {
            sqlx::query("INSERT INTO project_member_roles (member_id, role_code) VALUES ($1, $2)")
                .bind(member_id)
                .bind(role)
                .execute(&mut *tx)
                .await
                .map_err(|e| write_error(e, "Role assignment"))?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn list_memberships(&self, identity_id: Uuid) -> StoreResult<Vec<MemberProject>> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT p.project_id, p.code, p.name,
                   COALESCE(array_agg(r.role_code ORDER BY r.role_code)
                            FILTER (WHERE r.role_code IS NOT NULL), '{}') AS roles
            FROM project_members m
            JOIN projects p ON p.project_id = m.project_id
            LEFT JOIN project_member_roles r ON r.member_id = m.member_id
            WHERE m.user_id = $1 AND m.is_active = true
            GROUP BY p.project_id, p.code, p.name
            ORDER BY p.code
            "#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| MemberProject {
                tenant_id: row.project_id,
                code: row.code,
                name: row.name,
                roles: row.roles,
            })
            .collect())
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn create_refresh_session(&self, session: &RefreshSession) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_id, user_id, token_hash, expiry_utc, revoked_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.session_id)
        .bind(session.identity_id)
        .bind(&session.token_hash)
        .bind(session.expiry_utc)
        .bind(session.revoked_utc)
        .bind(session.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "Refresh session"))?;
        Ok(())
    }

    async fn find_refresh_session(&self, session_id: Uuid) -> StoreResult<Option<RefreshSession>> {
        sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT token_id, user_id, token_hash, expiry_utc, revoked_utc, created_utc
            FROM refresh_tokens WHERE token_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(RefreshSession::from))
        .map_err(backend)
    }

    async fn revoke_refresh_session(&self, session_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = NOW() WHERE token_id = $1 AND revoked_utc IS NULL",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_sessions_for_identity(&self, identity_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = NOW() WHERE user_id = $1 AND revoked_utc IS NULL",
        )
        .bind(identity_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (event_id, user_id, project_id, action, description, ip_address, metadata, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.event_id)
        .bind(event.actor_id)
        .bind(event.tenant_id)
        .bind(event.action.as_str())
        .bind(&event.description)
        .bind(&event.source_addr)
        .bind(&event.metadata)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                backend(e)
            })?;
        Ok(())
    }
}
