//! API handlers for the registrar backend

pub mod auth;
mod extract;
pub mod health;

pub use auth::*;
pub use extract::ValidatedJson;
pub use health::health_check;

// Re-export AuthenticatedUser from middleware for handler use
pub use crate::middleware::auth::{AdminUser, AuthenticatedUser, OptionalUser};
