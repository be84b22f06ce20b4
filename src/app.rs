use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    handler::Handler,
    http::{HeaderName, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    BoxError, Router,
};
use tower::{timeout::error::Elapsed, timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::AuthGate;
use crate::config::{AppConfig, ConfigError, CorsConfig};
use crate::database::DocumentStore;
use crate::error::ApiError;
use crate::handlers::{protected, public};
use crate::middleware::auth_gate_middleware;
use crate::services::RegistrationService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registrations: RegistrationService,
    pub gate: Arc<AuthGate>,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Arc<dyn DocumentStore>) -> Result<Self, ConfigError> {
        let gate = AuthGate::new(&config.security)?;
        Ok(Self::with_gate(store, gate))
    }

    /// Build state around a prepared gate (custom clock or authorizer)
    pub fn with_gate(store: Arc<dyn DocumentStore>, gate: AuthGate) -> Self {
        Self {
            registrations: RegistrationService::new(store),
            gate: Arc::new(gate),
        }
    }
}

pub fn app(state: AppState, config: &AppConfig) -> Router {
    // Everything no route claims, including other methods on /register,
    // goes through the token gate before answering 404.
    let gated_not_found =
        protected::not_found.layer(middleware::from_fn_with_state(state.gate.clone(), auth_gate_middleware));

    let routes = Router::new()
        .route(
            "/register",
            post(public::register_post).fallback(gated_not_found.clone()),
        )
        .fallback(gated_not_found);

    // Global middleware
    with_request_timeout(routes, config.request_timeout())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors))
        .with_state(state)
}

/// Bound every request by `timeout`, answering 408 in the usual error shape
pub fn with_request_timeout<S>(router: Router<S>, timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_timeout_error))
            .layer(TimeoutLayer::new(timeout)),
    )
}

async fn handle_timeout_error(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        tracing::warn!("Request timed out");
        ApiError::request_timeout("Request timed out")
    } else {
        tracing::error!("Unhandled middleware error: {}", err);
        ApiError::internal_server_error("Internal Server Error")
    }
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Request handler panicked");
    ApiError::internal_server_error("Internal Server Error").into_response()
}

/// CORS policy. Credentials rule out a literal `*` origin, so the caller's
/// origin is mirrored back, which admits every origin.
pub fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = cors.allow_methods.iter().filter_map(|m| m.parse().ok()).collect();
    let allow_headers: Vec<HeaderName> = cors.allow_headers.iter().filter_map(|h| h.parse().ok()).collect();
    let expose_headers: Vec<HeaderName> = cors.expose_headers.iter().filter_map(|h| h.parse().ok()).collect();

    CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(allow_headers)
        .expose_headers(expose_headers)
        .allow_credentials(cors.allow_credentials)
        .allow_origin(AllowOrigin::mirror_request())
        .max_age(Duration::from_secs(cors.max_age_secs))
}
