use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header::WWW_AUTHENTICATE, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{ConfigError, SecurityConfig};
use crate::error::ApiError;

pub mod lookup;

use lookup::TokenLookup;

/// Reasons the gate refuses a request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("auth header is empty")]
    EmptyAuthHeader,

    #[error("auth header is invalid")]
    InvalidAuthHeader,

    #[error("query token is empty")]
    EmptyQueryToken,

    #[error("cookie token is empty")]
    EmptyCookieToken,

    #[error("missing exp field")]
    MissingExpField,

    #[error("exp must be float64 format")]
    WrongFormatOfExp,

    #[error("token is expired")]
    Expired,

    #[error("{0}")]
    Invalid(String),

    #[error("you don't have permission to access this resource")]
    Forbidden,
}

impl TokenError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TokenError::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::Invalid("signature is invalid".to_string()),
            ErrorKind::InvalidAlgorithm => TokenError::Invalid("signing method is invalid".to_string()),
            _ => TokenError::Invalid(err.to_string()),
        }
    }
}

/// Decoded token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_iat: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Resolve the caller identity from the claim named `identity_key`
    pub fn identity(&self, identity_key: &str) -> Identity {
        match self.extra.get(identity_key) {
            Some(Value::String(s)) if !s.is_empty() => Identity::Subject(s.clone()),
            Some(Value::Number(n)) => Identity::Subject(n.to_string()),
            _ => Identity::Anonymous,
        }
    }
}

/// Who the token speaks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Subject(String),
}

/// Authorization policy consulted after a token validates
pub trait Authorizer: Send + Sync {
    fn authorize(&self, identity: &Identity, claims: &Claims, request: &Parts) -> bool;
}

/// Grants every validated token
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _identity: &Identity, _claims: &Claims, _request: &Parts) -> bool {
        true
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Bearer-token gate for the catch-all route
pub struct AuthGate {
    realm: String,
    lookup: TokenLookup,
    token_head_name: String,
    identity_key: String,
    timeout: Duration,
    max_refresh: Duration,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Clock,
    authorizer: Arc<dyn Authorizer>,
}

impl AuthGate {
    /// Build a gate from security settings. The signing key comes from the
    /// settings so a test can hand in its own.
    pub fn new(settings: &SecurityConfig) -> Result<Self, ConfigError> {
        if settings.middleware_key.is_empty() {
            return Err(ConfigError::Missing("MIDDLEWARE_KEY"));
        }

        // Expiry is checked against our own clock, not the decoder's
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        Ok(Self {
            realm: settings.realm.clone(),
            lookup: settings.token_lookup.clone(),
            token_head_name: settings.token_head_name.clone(),
            identity_key: settings.identity_key.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_refresh: Duration::from_secs(settings.max_refresh_secs),
            decoding_key: DecodingKey::from_secret(settings.middleware_key.as_bytes()),
            validation,
            clock: Arc::new(Utc::now),
            authorizer: Arc::new(AllowAll),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_refresh(&self) -> Duration {
        self.max_refresh
    }

    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// Extract, validate and authorize the token carried by a request
    pub fn authenticate(&self, request: &Parts) -> Result<Claims, TokenError> {
        let token = self.lookup.extract(request, &self.token_head_name)?;
        let claims = self.validate(&token)?;

        let identity = claims.identity(&self.identity_key);
        if !self.authorizer.authorize(&identity, &claims, request) {
            return Err(TokenError::Forbidden);
        }

        Ok(claims)
    }

    /// Check signature and expiry of a raw token
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)?;
        let mut fields = data.claims;

        let exp = match fields.remove("exp") {
            None => return Err(TokenError::MissingExpField),
            Some(v) => v.as_f64().ok_or(TokenError::WrongFormatOfExp)? as i64,
        };
        if exp < (self.clock)().timestamp() {
            return Err(TokenError::Expired);
        }

        let orig_iat = fields.remove("orig_iat").and_then(|v| v.as_f64()).map(|v| v as i64);

        Ok(Claims {
            exp,
            orig_iat,
            extra: fields,
        })
    }

    /// Render a refusal as `{status, message}` with a realm challenge
    pub fn unauthorized(&self, err: &TokenError) -> Response {
        let mut response = ApiError::from(err.clone()).into_response();
        if let Ok(challenge) = HeaderValue::from_str(&format!("JWT realm={}", self.realm)) {
            response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
        }
        response
    }
}
