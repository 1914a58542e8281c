pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::{error::AppError, middleware::request_id_middleware};
use tower_http::trace::TraceLayer;

use crate::middleware::{require_role, RoleGate};
use crate::services::{AuthService, ProjectService, Stores};

/// Level that only requires a valid access token.
pub const AUTHENTICATED_LEVEL: i32 = 0;

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub auth_service: AuthService,
    pub project_service: ProjectService,
    pub admin_role_level: i32,
    pub service_name: Arc<str>,
}

pub fn build_router(state: AppState) -> Router {
    let authenticated = RoleGate::new(state.clone(), AUTHENTICATED_LEVEL);
    let admin = RoleGate::new(state.clone(), state.admin_role_level);

    let public_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/change-password", post(handlers::auth::change_password));

    let authenticated_routes = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .layer(from_fn_with_state(authenticated, require_role));

    let admin_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/users/:rut", get(handlers::auth::get_user))
        .route("/projects", post(handlers::project::create_project))
        .route(
            "/projects/:code/members",
            post(handlers::project::add_member),
        )
        .layer(from_fn_with_state(admin, require_role));

    let api = Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .merge(admin_routes);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(service_core::middleware::REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.stores.health.ping().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name.as_ref(),
    })))
}
