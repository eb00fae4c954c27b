//! Authentication module for the registrar backend
//!
//! - JWT access/refresh token signing and verification
//! - bcrypt password hashing
//! - Registration, login and single-use refresh-token rotation

mod codec;
mod password;
mod service;

pub use codec::{ClaimSet, Claims, TokenCodec, TokenError, TokenType, MIN_SECRET_BYTES};
pub use password::{BcryptHasher, HashError, PasswordHasher};
pub use service::{normalize_email, AuthError, CredentialService, TokenTtls};
