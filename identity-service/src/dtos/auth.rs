use serde::{Deserialize, Serialize};
use validator::Validate;

use super::NaturalIdInput;
use crate::models::IdentityResponse;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    pub rut: NaturalIdInput,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    #[validate(length(min = 1, max = 64, message = "Project code is required"))]
    pub project_code: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: IdentityResponse,
    pub roles: Vec<i32>,
    pub frontend_url: Option<String>,
}

/// Register takes the body and check character as separate fields.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    pub rut: u32,

    #[validate(length(equal = 1, message = "dv must be a single character"))]
    pub dv: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: uuid::Uuid,
    pub rut: String,
    pub email: String,
    pub must_change_password: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub rut: NaturalIdInput,

    #[validate(length(min = 1, message = "Current password is required"))]
    pub old_password: String,

    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,

    #[validate(length(min = 1, max = 64, message = "Project code is required"))]
    pub project_code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LogoutRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
