//! Shared setup for identity-service integration tests.
//!
//! Everything runs against `MemoryStore`; no database is required.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use identity_service::{
    build_router,
    config::JwtConfig,
    models::{AuditAction, AuditEvent, Identity, NewIdentity, NewTenant, Tenant},
    services::{
        store::{IdentityStore, TenantStore},
        AuditDispatcher, AuthService, JwtService, MemoryStore, ProjectService,
        RefreshTokenIssuer, RequestContext, Stores,
    },
    utils::{HashCost, NaturalId, Password, PasswordHasher, PasswordPolicy},
    AppState,
};
use secrecy::SecretString;
use tower::util::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-signing-secret-0123456789";
pub const ADMIN_LEVEL: i32 = 90;

pub const ADMIN_RUT: &str = "11.111.111-1";
pub const ADMIN_PASSWORD: &str = "admin-secret";
pub const PROJECT_CODE: &str = "ops";
pub const PROJECT_URL: &str = "https://ops.example.com";

/// Application wired to an in-memory store, with one project and one admin.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub hasher: Arc<PasswordHasher>,
    pub jwt: JwtService,
    pub project: Tenant,
    pub admin: Identity,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::from_backend(store.clone());

        let hasher = Arc::new(
            PasswordHasher::new(HashCost {
                memory_kib: 256,
                iterations: 1,
                parallelism: 1,
            })
            .expect("hasher"),
        );

        let jwt = JwtService::new(&JwtConfig {
            signing_secret: SecretString::new(TEST_SECRET.to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        });

        let audit = AuditDispatcher::spawn(stores.audit.clone());

        let auth_service = AuthService::new(
            &stores,
            hasher.clone(),
            PasswordPolicy::default(),
            jwt.clone(),
            RefreshTokenIssuer::new(7),
            audit.clone(),
        );
        let project_service = ProjectService::new(&stores, audit);

        let state = AppState {
            stores,
            auth_service,
            project_service,
            admin_role_level: ADMIN_LEVEL,
            service_name: Arc::from("identity-service-test"),
        };

        let project = Tenant::new(NewTenant {
            code: PROJECT_CODE.to_string(),
            name: "Operations".to_string(),
            description: Some("Back office".to_string()),
            frontend_url: Some(PROJECT_URL.to_string()),
        });
        store.create_tenant(&project).await.expect("seed project");

        let admin = insert_identity(
            &store,
            &hasher,
            ADMIN_RUT,
            "admin@example.com",
            ADMIN_PASSWORD,
            false,
        )
        .await;
        store
            .add_member_with_roles(admin.identity_id, project.tenant_id, &[10, 99])
            .await
            .expect("seed admin membership");

        Self {
            store,
            state,
            hasher,
            jwt,
            project,
            admin,
        }
    }

    pub fn auth(&self) -> &AuthService {
        &self.state.auth_service
    }

    pub fn projects(&self) -> &ProjectService {
        &self.state.project_service
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Insert an identity directly with a known password.
    pub async fn seed_identity(
        &self,
        rut: &str,
        email: &str,
        password: &str,
        must_change_password: bool,
    ) -> Identity {
        insert_identity(
            &self.store,
            &self.hasher,
            rut,
            email,
            password,
            must_change_password,
        )
        .await
    }

    /// Add a membership in the seeded project.
    pub async fn grant(&self, identity: &Identity, roles: &[i32]) {
        self.store
            .add_member_with_roles(identity.identity_id, self.project.tenant_id, roles)
            .await
            .expect("seed membership");
    }

    pub async fn admin_access_token(&self) -> String {
        self.auth()
            .login(
                &ctx(),
                NaturalId::parse(ADMIN_RUT).unwrap(),
                Password::new(ADMIN_PASSWORD),
                PROJECT_CODE,
            )
            .await
            .expect("admin login")
            .tokens
            .access_token
    }

    /// Send a request through the router and decode the JSON body.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }
}

impl TestApp {
    /// Wait until the audit worker has stored an event with the given action.
    pub async fn wait_for_audit(&self, action: AuditAction) -> Vec<AuditEvent> {
        for _ in 0..100 {
            let events = self.store.audit_events().expect("audit snapshot");
            let matching: Vec<AuditEvent> =
                events.into_iter().filter(|e| e.action == action).collect();
            if !matching.is_empty() {
                return matching;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no {} audit event recorded", action.as_str());
    }
}

pub fn ctx() -> RequestContext {
    RequestContext {
        source_addr: Some("127.0.0.1".to_string()),
        request_id: Some("test-request".to_string()),
        actor_id: None,
    }
}

async fn insert_identity(
    store: &MemoryStore,
    hasher: &PasswordHasher,
    rut: &str,
    email: &str,
    password: &str,
    must_change_password: bool,
) -> Identity {
    let hash = hasher.hash(&Password::new(password)).expect("hash");
    let mut identity = Identity::new(
        NewIdentity {
            natural_id: NaturalId::parse(rut).expect("valid rut"),
            email: email.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
        },
        hash,
    );
    identity.must_change_password = must_change_password;
    store.create(&identity).await.expect("seed identity");
    identity
}
