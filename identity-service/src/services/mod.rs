//! Services layer for identity-service.

pub mod audit;
pub mod auth;
pub mod authz;
pub mod error;
pub mod jwt;
pub mod project;
pub mod refresh;
pub mod store;

pub use audit::AuditDispatcher;
pub use auth::{AuthService, LoginOutcome, RequestContext};
pub use authz::authorize;
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, Principal, TokenError};
pub use project::ProjectService;
pub use refresh::{RefreshTokenIssuer, TokenPair};
pub use store::{MemoryStore, PgStore, StoreError, Stores};
