// handlers/public/register.rs - POST /register handler

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    Form, Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

/// Submitted registration. `key` is required but otherwise unused.
#[derive(Debug, Default, Deserialize)]
pub struct RegistrationRequest {
    #[serde(rename = "dataString", default)]
    pub data_string: String,
    #[serde(default)]
    pub key: String,
}

impl RegistrationRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut field_errors = HashMap::new();
        if self.data_string.is_empty() {
            field_errors.insert("dataString".to_string(), "This field is required".to_string());
        }
        if self.key.is_empty() {
            field_errors.insert("key".to_string(), "This field is required".to_string());
        }

        if field_errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error("Missing required fields", Some(field_errors)))
        }
    }
}

/// Binds a [`RegistrationRequest`] from a JSON body or from form fields,
/// depending on the request content type, then validates it.
pub struct RegistrationForm(pub RegistrationRequest);

#[async_trait]
impl<S> FromRequest<S> for RegistrationForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request = if is_json_content_type(req.headers()) {
            let Json(request) = Json::<RegistrationRequest>::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
            request
        } else {
            let Form(request) = Form::<RegistrationRequest>::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
            request
        };

        request.validate()?;
        Ok(Self(request))
    }
}

/// Same rule axum's `Json` applies: `application/json` or any
/// `application/*+json`, parameters ignored
fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

    match essence.split_once('/') {
        Some(("application", subtype)) => subtype == "json" || subtype.ends_with("+json"),
        _ => false,
    }
}

/**
 * POST /register - Register a data string if it is not already stored
 *
 * Expected Input (JSON or form fields):
 * ```json
 * {
 *   "dataString": "string",   // Required: value to register
 *   "key": "string"           // Required: accepted, not persisted
 * }
 * ```
 *
 * Responses:
 * - 201 `{status, message: "Entry created", resourceId}`
 * - 400 missing or malformed fields
 * - 409 `"Already exist"` or `"Unable to open a mongo session"`
 * - 500 `"Cannot insert into database"`
 */
pub async fn register_post(State(state): State<AppState>, RegistrationForm(request): RegistrationForm) -> ApiResult {
    let entry = state.registrations.register(&request.data_string).await?;
    Ok(ApiResponse::created("Entry created", entry.data_string))
}
