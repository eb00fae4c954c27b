//! Middleware for the registrar API
//!
//! This module provides middleware for request tracing, rate limiting,
//! security headers, and authentication.

pub mod auth;
pub mod rate_limiter;
mod security;
mod tracing;

pub use auth::{
    authenticate, AdminUser, AuthOutcome, AuthenticatedUser, AuthenticationGate, InvalidReason,
    OptionalUser, Principal,
};
pub use rate_limiter::{auth_rate_limit, RateDecision, RateLimiter};
pub use security::{hsts_header, no_store, security_headers};
pub use tracing::request_tracing;
