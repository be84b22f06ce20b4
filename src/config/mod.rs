use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::lookup::TokenLookup;

/// Errors raised while assembling configuration at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; `None` selects the in-memory store
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub middleware_key: String,
    pub realm: String,
    pub token_lookup: TokenLookup,
    pub token_head_name: String,
    pub identity_key: String,
    pub timeout_secs: u64,
    pub max_refresh_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl AppConfig {
    /// Build configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, so tests can supply
    /// their own variables without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let middleware_key = lookup("MIDDLEWARE_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::Missing("MIDDLEWARE_KEY"))?;

        Self::defaults(middleware_key).with_overrides(&lookup)
    }

    fn defaults(middleware_key: String) -> Self {
        Self {
            server: ServerConfig {
                port: 8080,
                request_timeout_secs: 30,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                middleware_key,
                realm: "test zone".to_string(),
                token_lookup: TokenLookup::default(),
                token_head_name: "Bearer".to_string(),
                identity_key: "id".to_string(),
                timeout_secs: 60 * 60,
                max_refresh_secs: 60 * 60,
            },
            cors: CorsConfig {
                allow_methods: vec!["POST".to_string()],
                allow_headers: ["Origin", "X-Requested-With", "Content-Type", "Accept", "Authorization"]
                    .iter()
                    .map(|h| h.to_string())
                    .collect(),
                expose_headers: vec!["Content-Length".to_string()],
                allow_credentials: true,
                max_age_secs: 12 * 60 * 60,
            },
        }
    }

    fn with_overrides<F>(mut self, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(v) = lookup("PORT").filter(|v| !v.is_empty()) {
            self.server.port = parse_var("PORT", &v)?;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = parse_var("REQUEST_TIMEOUT_SECS", &v)?;
        }

        // Database overrides
        if let Some(v) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.database.url = Some(v);
        }
        if let Some(v) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_var("DATABASE_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = parse_var("DATABASE_CONNECTION_TIMEOUT", &v)?;
        }

        // Security overrides
        if let Some(v) = lookup("AUTH_REALM") {
            self.security.realm = v;
        }
        // A malformed lookup order is rejected here instead of on the first request
        if let Some(v) = lookup("AUTH_TOKEN_LOOKUP") {
            self.security.token_lookup = TokenLookup::parse(&v).map_err(|reason| ConfigError::Invalid {
                key: "AUTH_TOKEN_LOOKUP",
                reason,
            })?;
        }
        if let Some(v) = lookup("AUTH_TOKEN_HEAD_NAME") {
            self.security.token_head_name = v;
        }
        if let Some(v) = lookup("AUTH_IDENTITY_KEY") {
            self.security.identity_key = v;
        }
        if let Some(v) = lookup("AUTH_TIMEOUT_SECS") {
            self.security.timeout_secs = parse_var("AUTH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("AUTH_MAX_REFRESH_SECS") {
            self.security.max_refresh_secs = parse_var("AUTH_MAX_REFRESH_SECS", &v)?;
        }

        // CORS overrides
        if let Some(v) = lookup("CORS_MAX_AGE_SECS") {
            self.cors.max_age_secs = parse_var("CORS_MAX_AGE_SECS", &v)?;
        }

        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

fn parse_var<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
