//! Session lifecycle tests driven through `AuthService` and `ProjectService`.

mod common;

use common::{ctx, TestApp, ADMIN_PASSWORD, ADMIN_RUT, PROJECT_CODE};
use identity_service::{
    models::{AuditAction, NewIdentity, NewTenant},
    services::{store::TokenStore, ServiceError},
    utils::{NaturalId, Password},
};

fn rut(value: &str) -> NaturalId {
    NaturalId::parse(value).unwrap()
}

fn new_identity(value: &str, email: &str) -> NewIdentity {
    NewIdentity {
        natural_id: rut(value),
        email: email.to_string(),
        first_name: "Ana".to_string(),
        last_name: "Rojas".to_string(),
    }
}

#[tokio::test]
async fn test_unknown_identity_and_wrong_password_look_the_same() {
    let app = TestApp::new().await;

    let unknown = app
        .auth()
        .login(&ctx(), rut("99.999.999-9"), Password::new("whatever"), PROJECT_CODE)
        .await;
    let wrong = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new("not-it"), PROJECT_CODE)
        .await;

    assert!(matches!(unknown, Err(ServiceError::InvalidCredentials)));
    assert!(matches!(wrong, Err(ServiceError::InvalidCredentials)));
    assert_eq!(
        unknown.unwrap_err().to_string(),
        wrong.unwrap_err().to_string()
    );
}

#[tokio::test]
async fn test_login_ignores_check_character() {
    let app = TestApp::new().await;

    let outcome = app
        .auth()
        .login(&ctx(), rut("11.111.111-K"), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await
        .expect("login by body");

    assert_eq!(outcome.identity.identity_id, app.admin.identity_id);
}

#[tokio::test]
async fn test_register_then_change_password_then_login() {
    let app = TestApp::new().await;

    let identity = app
        .auth()
        .register(&ctx(), new_identity("12.345.678-5", "Ana.Rojas@Example.com"))
        .await
        .expect("register");
    assert!(identity.must_change_password);
    assert_eq!(identity.email, "ana.rojas@example.com");
    app.grant(&identity, &[10]).await;

    // The initial password is the first four digits of the body.
    let blocked = app
        .auth()
        .login(&ctx(), rut("12345678-5"), Password::new("1234"), PROJECT_CODE)
        .await;
    assert!(matches!(blocked, Err(ServiceError::PasswordChangeRequired)));

    app.auth()
        .change_password(
            &ctx(),
            rut("12345678-5"),
            Password::new("1234"),
            Password::new("fresh-secret"),
        )
        .await
        .expect("change password");

    let outcome = app
        .auth()
        .login(&ctx(), rut("12345678-5"), Password::new("fresh-secret"), PROJECT_CODE)
        .await
        .expect("login after change");

    assert_eq!(outcome.roles, vec![10]);
    assert_eq!(outcome.tokens.token_type, "Bearer");
    assert_eq!(outcome.tokens.expires_in, 15 * 60);
    assert_eq!(outcome.tenant.code, PROJECT_CODE);

    let principal = app
        .auth()
        .validate_token(&outcome.tokens.access_token)
        .expect("access token validates");
    assert_eq!(principal.subject_id, identity.identity_id);
    assert_eq!(principal.roles, vec![10]);
}

#[tokio::test]
async fn test_register_duplicate_natural_id_conflicts() {
    let app = TestApp::new().await;

    app.auth()
        .register(&ctx(), new_identity("12.345.678-5", "first@example.com"))
        .await
        .unwrap();
    let again = app
        .auth()
        .register(&ctx(), new_identity("12.345.678-5", "second@example.com"))
        .await;
    assert!(matches!(again, Err(ServiceError::AlreadyExists(_))));

    let same_email = app
        .auth()
        .register(&ctx(), new_identity("15.555.555-0", "FIRST@example.com"))
        .await;
    assert!(matches!(same_email, Err(ServiceError::AlreadyExists(_))));
}

#[tokio::test]
async fn test_register_rejects_short_body() {
    let app = TestApp::new().await;

    let result = app
        .auth()
        .register(&ctx(), new_identity("987-6", "short@example.com"))
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
}

#[tokio::test]
async fn test_change_password_policy_runs_before_lookup() {
    let app = TestApp::new().await;

    let result = app
        .auth()
        .change_password(
            &ctx(),
            rut("99.999.999-9"),
            Password::new("whatever"),
            Password::new("short"),
        )
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidInput(_))));

    let missing = app
        .auth()
        .change_password(
            &ctx(),
            rut("99.999.999-9"),
            Password::new("whatever"),
            Password::new("long-enough"),
        )
        .await;
    assert!(matches!(missing, Err(ServiceError::NotFound(_))));

    let wrong_old = app
        .auth()
        .change_password(
            &ctx(),
            rut(ADMIN_RUT),
            Password::new("not-the-old-one"),
            Password::new("long-enough"),
        )
        .await;
    assert!(matches!(wrong_old, Err(ServiceError::InvalidCredentials)));
}

#[tokio::test]
async fn test_change_password_revokes_open_sessions() {
    let app = TestApp::new().await;

    let outcome = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await
        .unwrap();

    app.auth()
        .change_password(
            &ctx(),
            rut(ADMIN_RUT),
            Password::new(ADMIN_PASSWORD),
            Password::new("rotated-secret"),
        )
        .await
        .unwrap();

    let refreshed = app
        .auth()
        .refresh(&ctx(), &outcome.tokens.refresh_token, PROJECT_CODE)
        .await;
    assert!(matches!(
        refreshed,
        Err(ServiceError::TokenExpiredOrRevoked)
    ));

    let old_login = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await;
    assert!(matches!(old_login, Err(ServiceError::InvalidCredentials)));
}

#[tokio::test]
async fn test_change_password_succeeds_when_session_sweep_fails() {
    let app = TestApp::new().await;

    app.store.set_fail_revocations(true);
    app.auth()
        .change_password(
            &ctx(),
            rut(ADMIN_RUT),
            Password::new(ADMIN_PASSWORD),
            Password::new("rotated-secret"),
        )
        .await
        .expect("password change is reported as done");
    app.store.set_fail_revocations(false);

    app.auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new("rotated-secret"), PROJECT_CODE)
        .await
        .expect("new password works");
}

#[tokio::test]
async fn test_refresh_rotates_the_token() {
    let app = TestApp::new().await;

    let outcome = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await
        .unwrap();
    let first = outcome.tokens.refresh_token;

    let pair = app
        .auth()
        .refresh(&ctx(), &first, PROJECT_CODE)
        .await
        .expect("first refresh");
    assert_ne!(pair.refresh_token, first);

    let replay = app.auth().refresh(&ctx(), &first, PROJECT_CODE).await;
    assert!(matches!(replay, Err(ServiceError::TokenExpiredOrRevoked)));

    app.auth()
        .refresh(&ctx(), &pair.refresh_token, PROJECT_CODE)
        .await
        .expect("rotated token works");
}

#[tokio::test]
async fn test_refresh_rejects_unknown_and_malformed_tokens() {
    let app = TestApp::new().await;

    let malformed = app.auth().refresh(&ctx(), "not-a-token", PROJECT_CODE).await;
    assert!(matches!(malformed, Err(ServiceError::InvalidToken)));

    let unknown = app
        .auth()
        .refresh(&ctx(), &uuid::Uuid::new_v4().to_string(), PROJECT_CODE)
        .await;
    assert!(matches!(unknown, Err(ServiceError::InvalidToken)));
}

#[tokio::test]
async fn test_refresh_survives_failed_revocation() {
    let app = TestApp::new().await;

    let outcome = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await
        .unwrap();

    app.store.set_fail_revocations(true);
    let pair = app
        .auth()
        .refresh(&ctx(), &outcome.tokens.refresh_token, PROJECT_CODE)
        .await
        .expect("new pair despite revocation failure");
    app.store.set_fail_revocations(false);

    assert!(!pair.access_token.is_empty());
    let old_session: uuid::Uuid = outcome.tokens.refresh_token.parse().unwrap();
    let stored = app
        .store
        .find_refresh_session(old_session)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_revoked());
}

#[tokio::test]
async fn test_refresh_for_other_project_requires_membership() {
    let app = TestApp::new().await;

    app.projects()
        .create_project(
            &ctx(),
            NewTenant {
                code: "billing".to_string(),
                name: "Billing".to_string(),
                description: None,
                frontend_url: None,
            },
        )
        .await
        .unwrap();

    let outcome = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await
        .unwrap();

    let result = app
        .auth()
        .refresh(&ctx(), &outcome.tokens.refresh_token, "billing")
        .await;
    assert!(matches!(result, Err(ServiceError::NoTenantAccess)));
}

#[tokio::test]
async fn test_refresh_for_unknown_or_inactive_project_is_no_access() {
    let app = TestApp::new().await;

    let outcome = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await
        .unwrap();

    let unknown = app
        .auth()
        .refresh(&ctx(), &outcome.tokens.refresh_token, "no-such-project")
        .await;
    assert!(matches!(unknown, Err(ServiceError::NoTenantAccess)));

    app.store
        .set_tenant_active(app.project.tenant_id, false)
        .unwrap();
    let inactive = app
        .auth()
        .refresh(&ctx(), &outcome.tokens.refresh_token, PROJECT_CODE)
        .await;
    assert!(matches!(inactive, Err(ServiceError::NoTenantAccess)));
}

#[tokio::test]
async fn test_logout_twice_fails_the_second_time() {
    let app = TestApp::new().await;

    let outcome = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await
        .unwrap();

    app.auth()
        .logout(&ctx(), &outcome.tokens.refresh_token)
        .await
        .expect("first logout");

    let second = app.auth().logout(&ctx(), &outcome.tokens.refresh_token).await;
    assert!(matches!(second, Err(ServiceError::TokenExpiredOrRevoked)));

    let refresh = app
        .auth()
        .refresh(&ctx(), &outcome.tokens.refresh_token, PROJECT_CODE)
        .await;
    assert!(matches!(refresh, Err(ServiceError::TokenExpiredOrRevoked)));
}

#[tokio::test]
async fn test_login_tenant_errors() {
    let app = TestApp::new().await;

    let missing = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), "nope")
        .await;
    assert!(matches!(missing, Err(ServiceError::TenantNotFound)));

    app.store
        .set_tenant_active(app.project.tenant_id, false)
        .unwrap();
    let inactive = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await;
    assert!(matches!(inactive, Err(ServiceError::TenantNotFound)));
}

#[tokio::test]
async fn test_login_without_membership_is_denied() {
    let app = TestApp::new().await;

    app.seed_identity("13.131.313-1", "outsider@example.com", "outsider-pass", false)
        .await;
    let result = app
        .auth()
        .login(&ctx(), rut("13.131.313-1"), Password::new("outsider-pass"), PROJECT_CODE)
        .await;
    assert!(matches!(result, Err(ServiceError::NoTenantAccess)));

    app.store
        .set_membership_active(app.admin.identity_id, app.project.tenant_id, false)
        .unwrap();
    let revoked = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await;
    assert!(matches!(revoked, Err(ServiceError::NoTenantAccess)));
}

#[tokio::test]
async fn test_inactive_identity_cannot_log_in() {
    let app = TestApp::new().await;

    app.store
        .set_identity_active(app.admin.identity_id, false)
        .unwrap();
    let result = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidCredentials)));
}

#[tokio::test]
async fn test_add_member_and_list_projects() {
    let app = TestApp::new().await;

    app.seed_identity("14.141.414-2", "member@example.com", "member-pass", false)
        .await;
    let membership = app
        .projects()
        .add_member(&ctx(), PROJECT_CODE, rut("14.141.414-2"), vec![20, 5, 20])
        .await
        .expect("add member");
    assert_eq!(membership.roles, vec![5, 20]);

    let profile = app
        .auth()
        .identity_with_projects(rut("14.141.414-2"))
        .await
        .unwrap();
    assert_eq!(profile.projects.len(), 1);
    assert_eq!(profile.projects[0].code, PROJECT_CODE);

    let unknown_project = app
        .projects()
        .add_member(&ctx(), "nope", rut("14.141.414-2"), vec![1])
        .await;
    assert!(matches!(unknown_project, Err(ServiceError::TenantNotFound)));

    let no_roles = app
        .projects()
        .add_member(&ctx(), PROJECT_CODE, rut("14.141.414-2"), vec![])
        .await;
    assert!(matches!(no_roles, Err(ServiceError::InvalidInput(_))));
}

#[tokio::test]
async fn test_audit_events_are_recorded() {
    let app = TestApp::new().await;

    let _ = app
        .auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new("not-it"), PROJECT_CODE)
        .await;
    app.auth()
        .login(&ctx(), rut(ADMIN_RUT), Password::new(ADMIN_PASSWORD), PROJECT_CODE)
        .await
        .unwrap();

    let failed = app.wait_for_audit(AuditAction::LoginFailed).await;
    assert_eq!(failed[0].actor_id, Some(app.admin.identity_id));
    assert_eq!(
        failed[0].metadata.as_ref().unwrap()["reason"],
        "wrong_password"
    );

    let success = app.wait_for_audit(AuditAction::LoginSuccess).await;
    assert_eq!(success[0].tenant_id, Some(app.project.tenant_id));
    assert_eq!(success[0].source_addr.as_deref(), Some("127.0.0.1"));
    assert_eq!(
        success[0].metadata.as_ref().unwrap()["request_id"],
        "test-request"
    );
}
