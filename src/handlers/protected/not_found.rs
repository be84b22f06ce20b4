// handlers/protected/not_found.rs - catch-all behind the token gate

use axum::Extension;

use crate::auth::Claims;
use crate::error::ApiError;

/// Fallback for every request no route claims. Only reached once the token
/// gate has accepted the caller, so the claims are always present.
pub async fn not_found(Extension(claims): Extension<Claims>) -> ApiError {
    tracing::info!("NoRoute claims: {:?}", claims);
    ApiError::not_found("Page not found")
}
