use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::auth::{
        ChangePasswordRequest, LoginRequest, LoginResponse, LogoutRequest, MessageResponse,
        RefreshRequest, RegisterRequest, RegisterResponse,
    },
    middleware::{AuthUser, Caller},
    models::NewIdentity,
    utils::{NaturalId, Password, ValidatedJson},
    AppState,
};

/// Login with natural id and password for one project
pub async fn login(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let natural_id = req.rut.resolve()?;

    let outcome = state
        .auth_service
        .login(&ctx, natural_id, Password::new(req.password), &req.project_code)
        .await?;

    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            access_token: outcome.tokens.access_token,
            refresh_token: outcome.tokens.refresh_token,
            token_type: outcome.tokens.token_type,
            expires_in: outcome.tokens.expires_in,
            user: outcome.identity.sanitized(),
            roles: outcome.roles,
            frontend_url: outcome.tenant.frontend_url,
        }),
    ))
}

/// Provision a new identity with its initial password (admin only)
pub async fn register(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let natural_id = NaturalId::from_parts(req.rut, &req.dv)
        .map_err(crate::services::ServiceError::from)?;

    let identity = state
        .auth_service
        .register(
            &ctx,
            NewIdentity {
                natural_id,
                email: req.email,
                first_name: req.first_name,
                last_name: req.last_name,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: identity.identity_id,
            rut: identity.natural_id.to_string(),
            email: identity.email,
            must_change_password: identity.must_change_password,
        }),
    ))
}

/// Replace the current password
pub async fn change_password(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let natural_id = req.rut.resolve()?;

    state
        .auth_service
        .change_password(
            &ctx,
            natural_id,
            Password::new(req.old_password),
            Password::new(req.new_password),
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password updated successfully")),
    ))
}

/// Rotate a refresh token into a new token pair
pub async fn refresh(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state
        .auth_service
        .refresh(&ctx, &req.refresh_token, &req.project_code)
        .await?;
    Ok((StatusCode::OK, Json(tokens)))
}

/// Revoke a refresh token
pub async fn logout(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.logout(&ctx, &req.refresh_token).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

/// Current identity, as named by the access token
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let identity = state.auth_service.identity_by_id(user.0.subject_id).await?;
    Ok(Json(identity.sanitized()))
}

/// Identity and project memberships by natural id (admin only)
pub async fn get_user(
    State(state): State<AppState>,
    Path(rut): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let natural_id = NaturalId::parse(&rut).map_err(crate::services::ServiceError::from)?;
    let user = state.auth_service.identity_with_projects(natural_id).await?;
    Ok(Json(user))
}
