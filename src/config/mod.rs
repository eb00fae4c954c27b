//! Configuration management for the registrar server
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::auth::MIN_SECRET_BYTES;

/// Upper bound for either token TTL: ten years
pub const MAX_TTL_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("JWT_SECRET must be at least 32 bytes, got {0}")]
    WeakSecret(usize),
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; `None` selects the in-memory store
    pub database_url: Option<String>,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// HMAC secret for token signing
    pub jwt_secret: String,

    /// `iss` claim stamped on and required of every token
    pub jwt_issuer: String,

    /// Access token TTL in seconds (default: 900 = 15 minutes)
    pub jwt_access_token_ttl_seconds: i64,

    /// Refresh token TTL in seconds (default: 604800 = 7 days)
    pub jwt_refresh_token_ttl_seconds: i64,

    /// Register/login attempts allowed per client and path each minute
    pub auth_rate_limit_per_minute: u32,

    /// Key the rate limiter on X-Forwarded-For / X-Real-IP
    pub rate_limit_trust_proxy: bool,

    /// Answer 401 at the gate for presented but unacceptable tokens
    pub auth_reject_invalid_tokens: bool,

    /// bcrypt work factor
    pub bcrypt_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            environment: Environment::Development,
            port: 3001,
            db_max_connections: 5,
            cors_allowed_origins: None,
            log_level: "info".to_string(),
            jwt_secret: String::new(),
            jwt_issuer: "registrar-server".to_string(),
            jwt_access_token_ttl_seconds: 900,
            jwt_refresh_token_ttl_seconds: 604_800,
            auth_rate_limit_per_minute: 10,
            rate_limit_trust_proxy: false,
            auth_reject_invalid_tokens: false,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .unwrap_or(5);

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("JWT_SECRET".to_string()))?;

        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer);

        let config = Config {
            database_url,
            environment,
            port,
            db_max_connections,
            cors_allowed_origins,
            log_level,
            jwt_secret,
            jwt_issuer,
            jwt_access_token_ttl_seconds: parse_var(
                "JWT_ACCESS_TOKEN_TTL_SECONDS",
                defaults.jwt_access_token_ttl_seconds,
            )?,
            jwt_refresh_token_ttl_seconds: parse_var(
                "JWT_REFRESH_TOKEN_TTL_SECONDS",
                defaults.jwt_refresh_token_ttl_seconds,
            )?,
            auth_rate_limit_per_minute: parse_var(
                "AUTH_RATE_LIMIT_PER_MINUTE",
                defaults.auth_rate_limit_per_minute,
            )?,
            rate_limit_trust_proxy: parse_flag("RATE_LIMIT_TRUST_PROXY")?,
            auth_reject_invalid_tokens: parse_flag("AUTH_REJECT_INVALID_TOKENS")?,
            bcrypt_cost: parse_var("BCRYPT_COST", defaults.bcrypt_cost)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every value constraint
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::WeakSecret(self.jwt_secret.len()));
        }
        if self.jwt_issuer.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "JWT_ISSUER must not be empty".to_string(),
            ));
        }
        if self.jwt_access_token_ttl_seconds < 60 {
            return Err(ConfigError::InvalidValue(
                "JWT_ACCESS_TOKEN_TTL_SECONDS must be at least 60".to_string(),
            ));
        }
        if self.jwt_refresh_token_ttl_seconds < 300 {
            return Err(ConfigError::InvalidValue(
                "JWT_REFRESH_TOKEN_TTL_SECONDS must be at least 300".to_string(),
            ));
        }
        if self.jwt_access_token_ttl_seconds > MAX_TTL_SECONDS
            || self.jwt_refresh_token_ttl_seconds > MAX_TTL_SECONDS
        {
            return Err(ConfigError::InvalidValue(format!(
                "Token TTLs must not exceed {} seconds",
                MAX_TTL_SECONDS
            )));
        }
        if self.auth_rate_limit_per_minute < 1 {
            return Err(ConfigError::InvalidValue(
                "AUTH_RATE_LIMIT_PER_MINUTE must be at least 1".to_string(),
            ));
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::InvalidValue(
                "BCRYPT_COST must be between 4 and 31".to_string(),
            ));
        }
        if self.environment.is_production() && self.database_url.is_none() {
            return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
        }
        Ok(())
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        let Some(url) = self.database_url.as_deref() else {
            return "<in-memory>".to_string();
        };
        if let Some(at_pos) = url.find('@') {
            if let Some(colon_pos) = url[..at_pos].rfind(':') {
                let prefix = &url[..colon_pos + 1];
                let suffix = &url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        url.to_string()
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has an invalid value", name))),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &str) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidValue(format!(
                "{} must be true or false",
                name
            ))),
        },
        Err(_) => Ok(false),
    }
}
