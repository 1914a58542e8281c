use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::{error::AppError, middleware::RequestId};

use crate::{
    services::{authorize, Principal, RequestContext},
    AppState,
};

/// State for one `require_role` layer: the application plus the level the
/// wrapped routes demand.
#[derive(Clone)]
pub struct RoleGate {
    pub state: AppState,
    pub required_level: i32,
}

impl RoleGate {
    pub fn new(state: AppState, required_level: i32) -> Self {
        Self {
            state,
            required_level,
        }
    }
}

/// Require a valid bearer access token whose roles meet the gate's level.
pub async fn require_role(
    State(gate): State<RoleGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let principal = gate.state.auth_service.validate_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    })?;

    if !authorize(&principal.roles, gate.required_level) {
        tracing::info!(
            user_id = %principal.subject_id,
            required_level = gate.required_level,
            "Insufficient role for route"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!("Insufficient permissions")));
    }

    // Store the principal in request extensions so handlers can access it
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Extractor to easily get the principal in handlers behind `require_role`
pub struct AuthUser(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts.extensions.get::<Principal>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Principal missing from request extensions"
            ))
        })?;

        Ok(AuthUser(principal.clone()))
    }
}

/// Caller details for audit events: peer address, request id and, behind a
/// gate, the authenticated principal. Never rejects.
pub struct Caller(pub RequestContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let source_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.as_str().to_string());
        let actor_id = parts.extensions.get::<Principal>().map(|p| p.subject_id);

        Ok(Caller(RequestContext {
            source_addr,
            request_id,
            actor_id,
        }))
    }
}
