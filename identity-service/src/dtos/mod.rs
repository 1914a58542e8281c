pub mod auth;
pub mod project;

use serde::Deserialize;

use crate::{services::ServiceError, utils::NaturalId};

/// Natural id as clients send it: a formatted string such as `"12.345.678-5"`
/// or the bare numeric body.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NaturalIdInput {
    Number(u32),
    Text(String),
}

impl NaturalIdInput {
    /// Normalize to a complete body and check character pair. A bare number
    /// gets its check character computed.
    pub fn resolve(&self) -> Result<NaturalId, ServiceError> {
        match self {
            NaturalIdInput::Number(body) => Ok(NaturalId::from_body(*body)),
            NaturalIdInput::Text(text) => Ok(NaturalId::parse(text)?),
        }
    }
}
