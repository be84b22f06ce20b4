// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::TokenError;

/// HTTP API error with its status code and client-facing message.
///
/// Every variant renders as `{status, message}`; variants tied to a submitted
/// entry also carry `resourceId`.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 408 Request Timeout
    RequestTimeout(String),

    // 409 Conflict. The store being unreachable has always been reported as
    // 409 and clients depend on it.
    StoreUnavailable { resource_id: String },
    Conflict { message: String, resource_id: String },

    // 500 Internal Server Error
    StoreWrite { resource_id: String },
    InternalServerError(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::StoreUnavailable { .. } => StatusCode::CONFLICT,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::StoreWrite { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::RequestTimeout(msg) => msg,
            ApiError::StoreUnavailable { .. } => "Unable to open a mongo session",
            ApiError::Conflict { message, .. } => message,
            ApiError::StoreWrite { .. } => "Cannot insert into database",
            ApiError::InternalServerError(msg) => msg,
        }
    }

    pub fn resource_id(&self) -> Option<&str> {
        match self {
            ApiError::StoreUnavailable { resource_id }
            | ApiError::Conflict { resource_id, .. }
            | ApiError::StoreWrite { resource_id } => Some(resource_id),
            _ => None,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "status": self.status_code().as_u16(),
            "message": self.message(),
        });

        if let Some(resource_id) = self.resource_id() {
            response["resourceId"] = json!(resource_id);
        }
        if let ApiError::ValidationError {
            field_errors: Some(field_errors),
            ..
        } = self
        {
            response["fieldErrors"] = json!(field_errors);
        }

        response
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn request_timeout(message: impl Into<String>) -> Self {
        ApiError::RequestTimeout(message.into())
    }

    pub fn store_unavailable(resource_id: impl Into<String>) -> Self {
        ApiError::StoreUnavailable {
            resource_id: resource_id.into(),
        }
    }

    pub fn already_exists(resource_id: impl Into<String>) -> Self {
        ApiError::Conflict {
            message: "Already exist".to_string(),
            resource_id: resource_id.into(),
        }
    }

    pub fn store_write(resource_id: impl Into<String>) -> Self {
        ApiError::StoreWrite {
            resource_id: resource_id.into(),
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Forbidden => ApiError::forbidden(err.to_string()),
            _ => ApiError::unauthorized(err.to_string()),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_unavailable_keeps_conflict_status() {
        let err = ApiError::store_unavailable("abc");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            err.to_json(),
            json!({"status": 409, "message": "Unable to open a mongo session", "resourceId": "abc"})
        );
    }

    #[test]
    fn conflict_and_write_bodies() {
        assert_eq!(
            ApiError::already_exists("abc").to_json(),
            json!({"status": 409, "message": "Already exist", "resourceId": "abc"})
        );
        assert_eq!(
            ApiError::store_write("abc").to_json(),
            json!({"status": 500, "message": "Cannot insert into database", "resourceId": "abc"})
        );
    }

    #[test]
    fn plain_errors_have_no_resource_id() {
        let body = ApiError::not_found("Page not found").to_json();
        assert_eq!(body, json!({"status": 404, "message": "Page not found"}));
    }

    #[test]
    fn validation_error_lists_fields() {
        let mut fields = HashMap::new();
        fields.insert("key".to_string(), "This field is required".to_string());
        let body = ApiError::validation_error("Missing required fields", Some(fields)).to_json();
        assert_eq!(body["status"], 400);
        assert_eq!(body["fieldErrors"]["key"], "This field is required");
    }

    #[test]
    fn token_errors_map_to_401_and_403() {
        assert_eq!(
            ApiError::from(TokenError::Expired).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(TokenError::Forbidden).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
