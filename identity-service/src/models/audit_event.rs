//! Audit event model - append-only security log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit action tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LoginSuccess,
    LoginFailed,
    UserRegistered,
    PasswordChanged,
    TokenRefreshed,
    Logout,
    ProjectCreated,
    MemberAdded,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "login_success",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::UserRegistered => "user_registered",
            AuditAction::PasswordChanged => "password_changed",
            AuditAction::TokenRefreshed => "token_refreshed",
            AuditAction::Logout => "logout",
            AuditAction::ProjectCreated => "project_created",
            AuditAction::MemberAdded => "member_added",
        }
    }
}

/// Audit event entity.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: AuditAction,
    pub description: String,
    pub source_addr: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, description: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            actor_id: None,
            tenant_id: None,
            action,
            description: description.into(),
            source_addr: None,
            metadata: None,
            created_utc: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_source(mut self, source_addr: Option<String>) -> Self {
        self.source_addr = source_addr;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
