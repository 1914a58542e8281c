use serde::Deserialize;
use validator::Validate;

use super::NaturalIdInput;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,

    #[validate(length(min = 1, max = 64, message = "Code is required"))]
    pub code: String,

    pub description: Option<String>,

    #[validate(url(message = "frontend_url must be a valid URL"))]
    pub frontend_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    pub rut: NaturalIdInput,

    #[validate(length(min = 1, message = "At least one role is required"))]
    pub roles: Vec<i32>,
}
