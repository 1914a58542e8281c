//! service-core: plumbing shared by the identity workspace.
//!
//! Transport errors, base configuration, logging bootstrap and request
//! correlation. Domain logic lives in the service crates.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use error::{AppError, ErrorResponse};
