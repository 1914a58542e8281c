use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::Identity;

/// JWT service for access token generation and validation
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_expiry_minutes: i64,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (identity ID)
    pub sub: String,
    /// Email
    pub email: String,
    /// Role codes in the project the token was issued for
    pub roles: Vec<i32>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Authenticated caller, as read back from a valid access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject_id: Uuid,
    pub email: String,
    pub roles: Vec<i32>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed or its signature does not verify")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("token subject is not a valid id")]
    InvalidSubject,

    #[error("failed to sign token: {0}")]
    Signing(anyhow::Error),
}

impl JwtService {
    /// Build the service around the process-wide HS256 secret.
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.signing_secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_token_expiry_minutes: config.access_token_expiry_minutes,
        }
    }

    /// Generate an access token for an identity acting in one project
    pub fn issue_access_token(
        &self,
        identity: &Identity,
        roles: &[i32],
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: identity.identity_id.to_string(),
            email: identity.email.clone(),
            roles: roles.to_vec(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(anyhow::anyhow!("Failed to encode access token: {}", e)))
    }

    /// Validate and decode an access token. Pure: no store is consulted.
    pub fn validate_access_token(&self, token: &str) -> Result<Principal, TokenError> {
        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        let claims = token_data.claims;

        // The library accepts exp == now; expiry here is exact.
        if Utc::now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        let subject_id = Uuid::parse_str(&claims.sub).map_err(|_| TokenError::InvalidSubject)?;

        Ok(Principal {
            subject_id,
            email: claims.email,
            roles: claims.roles,
        })
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}
