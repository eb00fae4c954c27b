//! Password hashing
//!
//! Passwords are only ever handled through [`PasswordHasher`]; plaintext is
//! never stored or compared directly.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HashError {
    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Stored password hash is unreadable: {0}")]
    InvalidHash(String),
}

/// Adaptive one-way password hashing capability
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, HashError>;

    /// Constant-time check of `plain` against a stored hash
    fn verify(&self, plain: &str, hash: &str) -> Result<bool, HashError>;
}

/// bcrypt-backed hasher
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plain: &str) -> Result<String, HashError> {
        bcrypt::hash(plain, self.cost).map_err(|e| HashError::Hash(e.to_string()))
    }

    fn verify(&self, plain: &str, hash: &str) -> Result<bool, HashError> {
        bcrypt::verify(plain, hash).map_err(|e| HashError::InvalidHash(e.to_string()))
    }
}
