use service_core::error::AppError;
use thiserror::Error;

use super::jwt::TokenError;
use super::store::StoreError;
use crate::utils::{NaturalIdError, PasswordError};

/// Failure kinds of the identity flows. Transport status codes live in the
/// `AppError` conversion below, never in the flows themselves.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Password change required")]
    PasswordChangeRequired,

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Project not found")]
    TenantNotFound,

    #[error("No access to this project")]
    NoTenantAccess,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired or revoked")]
    TokenExpiredOrRevoked,

    #[error("Stored password hash is corrupt")]
    CorruptHash,

    #[error("Store error: {0}")]
    Store(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<NaturalIdError> for ServiceError {
    fn from(err: NaturalIdError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
            PasswordError::CorruptHash => ServiceError::CorruptHash,
            PasswordError::Hashing(msg) => ServiceError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => ServiceError::AlreadyExists(what),
            StoreError::Backend(e) => ServiceError::Store(e),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(e) => ServiceError::Internal(e),
            _ => ServiceError::InvalidToken,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::PasswordChangeRequired => {
                AppError::Forbidden(anyhow::anyhow!("PASSWORD_CHANGE_REQUIRED"))
            }
            ServiceError::AlreadyExists(what) => {
                AppError::Conflict(anyhow::anyhow!("{} already exists", what))
            }
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            ServiceError::TenantNotFound => AppError::NotFound(anyhow::anyhow!("Project not found")),
            ServiceError::NoTenantAccess => {
                AppError::Forbidden(anyhow::anyhow!("No access to this project"))
            }
            ServiceError::InvalidToken => AppError::Unauthorized(anyhow::anyhow!("Invalid token")),
            ServiceError::TokenExpiredOrRevoked => {
                AppError::Unauthorized(anyhow::anyhow!("Token expired or revoked"))
            }
            ServiceError::CorruptHash => {
                AppError::InternalError(anyhow::anyhow!("Stored password hash is corrupt"))
            }
            ServiceError::Store(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
