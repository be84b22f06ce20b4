// auth/lookup.rs - where the gate looks for a bearer token
//
// The lookup order is written as "<source>: <name>" pairs separated by
// commas, e.g. "header: Authorization, query: token, cookie: jwt".

use std::collections::HashMap;
use std::fmt;

use axum::{extract::Query, http::request::Parts};
use serde::{Deserialize, Serialize};

use super::TokenError;

/// One place a token may be carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Header(String),
    Query(String),
    Cookie(String),
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Header(name) => write!(f, "header: {}", name),
            TokenSource::Query(name) => write!(f, "query: {}", name),
            TokenSource::Cookie(name) => write!(f, "cookie: {}", name),
        }
    }
}

/// Ordered list of token sources; the first source yielding a token wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenLookup {
    sources: Vec<TokenSource>,
}

impl Default for TokenLookup {
    fn default() -> Self {
        Self {
            sources: vec![
                TokenSource::Header("Authorization".to_string()),
                TokenSource::Query("token".to_string()),
                TokenSource::Cookie("jwt".to_string()),
            ],
        }
    }
}

impl fmt::Display for TokenLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, source) in self.sources.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", source)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for TokenLookup {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TokenLookup> for String {
    fn from(lookup: TokenLookup) -> Self {
        lookup.to_string()
    }
}

impl TokenLookup {
    pub fn parse(value: &str) -> Result<Self, String> {
        let mut sources = Vec::new();

        for method in value.split(',').map(str::trim).filter(|m| !m.is_empty()) {
            let (kind, name) = method
                .split_once(':')
                .ok_or_else(|| format!("expected '<source>: <name>', got '{}'", method))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(format!("missing name in '{}'", method));
            }

            let source = match kind.trim() {
                "header" => TokenSource::Header(name.to_string()),
                "query" => TokenSource::Query(name.to_string()),
                "cookie" => TokenSource::Cookie(name.to_string()),
                other => return Err(format!("unsupported token source '{}'", other)),
            };
            sources.push(source);
        }

        if sources.is_empty() {
            return Err("token lookup must name at least one source".to_string());
        }

        Ok(Self { sources })
    }

    /// Walk the sources in order. When none yields a token, the error of the
    /// last source tried is reported.
    pub fn extract(&self, parts: &Parts, head_name: &str) -> Result<String, TokenError> {
        let mut last_error = TokenError::EmptyAuthHeader;

        for source in &self.sources {
            let found = match source {
                TokenSource::Header(name) => from_header(parts, name, head_name),
                TokenSource::Query(name) => from_query(parts, name),
                TokenSource::Cookie(name) => from_cookie(parts, name),
            };
            match found {
                Ok(token) => return Ok(token),
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }
}

fn from_header(parts: &Parts, name: &str, head_name: &str) -> Result<String, TokenError> {
    let value = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(TokenError::EmptyAuthHeader)?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme == head_name => Ok(token.to_string()),
        _ => Err(TokenError::InvalidAuthHeader),
    }
}

fn from_query(parts: &Parts, name: &str) -> Result<String, TokenError> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map_err(|_| TokenError::EmptyQueryToken)?;

    params
        .get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or(TokenError::EmptyQueryToken)
}

fn from_cookie(parts: &Parts, name: &str) -> Result<String, TokenError> {
    for header in parts.headers.get_all(axum::http::header::COOKIE) {
        let Ok(value) = header.to_str() else { continue };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else { continue };
            if key.trim() == name && !val.trim().is_empty() {
                return Ok(val.trim().to_string());
            }
        }
    }
    Err(TokenError::EmptyCookieToken)
}
