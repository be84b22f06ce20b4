#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use entry_registrar::config::AppConfig;
use entry_registrar::database::{MemoryStore, StoredEntry};
use entry_registrar::{app, AppState};

pub const SECRET: &str = "integration-secret";

pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "MIDDLEWARE_KEY" => Some(SECRET.to_string()),
        _ => None,
    })
    .expect("test configuration")
}

pub fn memory_store() -> MemoryStore {
    MemoryStore::new(StoredEntry::unique_indexes())
}

/// Router over a fresh in-memory store; the store handle is shared with the router
pub fn test_app() -> (Router, MemoryStore) {
    let config = test_config();
    let store = memory_store();
    let state = AppState::new(&config, Arc::new(store.clone())).expect("app state");
    (app(state, &config), store)
}

pub fn sign_token(claims: Value) -> String {
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).expect("sign token")
}

pub fn valid_token() -> String {
    let now = Utc::now().timestamp();
    sign_token(json!({"id": "tester", "exp": now + 3600, "orig_iat": now}))
}

pub fn expired_token() -> String {
    let now = Utc::now().timestamp();
    sign_token(json!({"id": "tester", "exp": now - 60, "orig_iat": now - 3660}))
}

pub fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Drive one request through the router; an empty or non-JSON body reads as `Null`
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub store: MemoryStore,
}

impl TestServer {
    /// Serve the app on a free port in the background
    pub async fn spawn() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let (app, store) = test_app();
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { port, base_url, store })
    }
}
