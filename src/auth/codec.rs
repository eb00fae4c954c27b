//! JWT token generation and validation
//!
//! Handles creation and verification of access and refresh tokens. The
//! signing key is loaded once at startup and never changes afterwards.

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{Role, User};

/// Minimum HS256 secret length in bytes
pub const MIN_SECRET_BYTES: usize = 32;

/// JWT-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("JWT secret must be at least 32 bytes, got {0}")]
    WeakSecret(usize),

    #[error("Token encoding failed: {0}")]
    Encoding(String),

    #[error("Malformed token")]
    Malformed,

    #[error("Token signature mismatch")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Expected {expected} token, got {actual}")]
    WrongType {
        expected: TokenType,
        actual: TokenType,
    },
}

/// Token type claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied part of a token's claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSet {
    pub uid: Uuid,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub token_type: TokenType,
}

impl ClaimSet {
    /// Access tokens carry identity and role
    pub fn access(user: &User) -> Self {
        Self {
            uid: user.id,
            email: Some(user.email.clone()),
            role: Some(user.role),
            token_type: TokenType::Access,
        }
    }

    /// Refresh tokens carry only the user id; identity is re-read from the store
    pub fn refresh(user: &User) -> Self {
        Self {
            uid: user.id,
            email: None,
            role: None,
            token_type: TokenType::Refresh,
        }
    }
}

/// Full JWT claims as they appear on the wire
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (email)
    pub sub: String,
    pub uid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Unique token id; keeps tokens minted in the same second distinct
    pub jti: String,
}

/// Stateless HS256 token signer/verifier
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Build a codec, refusing secrets shorter than 256 bits
    pub fn new(
        secret: &[u8],
        issuer: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(TokenError::WeakSecret(secret.len()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            clock,
        })
    }

    /// Sign `claims` for `subject`, valid for `ttl_seconds`
    pub fn issue(
        &self,
        subject: &str,
        claims: ClaimSet,
        ttl_seconds: i64,
    ) -> Result<String, TokenError> {
        let now = self.clock.now();
        let exp = Duration::try_seconds(ttl_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                TokenError::Encoding(format!("ttl of {}s is out of range", ttl_seconds))
            })?;

        let claims = Claims {
            sub: subject.to_string(),
            uid: claims.uid,
            email: claims.email,
            role: claims.role,
            token_type: claims.token_type,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify signature and issuer, decode claims and check expiry
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock below.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.set_issuer(&[&self.issuer]);

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::InvalidSignature => TokenError::BadSignature,
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::Malformed,
                }
            })?;

        let claims = token_data.claims;
        if claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// [`verify`](Self::verify) plus a check of the `type` claim
    pub fn verify_as(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != expected {
            return Err(TokenError::WrongType {
                expected,
                actual: claims.token_type,
            });
        }
        Ok(claims)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}
