use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::project::{AddMemberRequest, CreateProjectRequest},
    middleware::Caller,
    models::NewTenant,
    utils::ValidatedJson,
    AppState,
};

/// Create a project (admin only)
pub async fn create_project(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<CreateProjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tenant = state
        .project_service
        .create_project(
            &ctx,
            NewTenant {
                code: req.code,
                name: req.name,
                description: req.description,
                frontend_url: req.frontend_url,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

/// Add an identity to a project with a set of roles (admin only)
pub async fn add_member(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(code): Path<String>,
    ValidatedJson(req): ValidatedJson<AddMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    let natural_id = req.rut.resolve()?;
    let membership = state
        .project_service
        .add_member(&ctx, &code, natural_id, req.roles)
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}
