use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

/// Success body shared by all endpoints: `{status, message, resourceId?}`
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    #[serde(skip)]
    pub status_code: StatusCode,
    pub status: u16,
    pub message: String,
    #[serde(rename = "resourceId", skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiResponse {
    /// Create an API response with custom status code
    pub fn with_status(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            status: status_code.as_u16(),
            message: message.into(),
            resource_id: None,
        }
    }

    /// Create a 201 Created response naming the created resource
    pub fn created(message: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CREATED, message).resource(resource_id)
    }

    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}

pub type ApiResult = Result<ApiResponse, crate::error::ApiError>;
