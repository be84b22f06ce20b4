use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::auth::AuthGate;

/// Token gate middleware: validates the bearer token and injects the decoded
/// `Claims` into request extensions, or answers with the gate's refusal.
pub async fn auth_gate_middleware(State(gate): State<Arc<AuthGate>>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    match gate.authenticate(&parts) {
        Ok(claims) => {
            let mut request = Request::from_parts(parts, body);
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(err) => {
            tracing::debug!("Token gate refused {} {}: {}", parts.method, parts.uri.path(), err);
            gate.unauthorized(&err)
        }
    }
}
