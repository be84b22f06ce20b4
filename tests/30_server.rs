mod common;

use anyhow::Result;
use axum::{body::Body, http::Request};
use entry_registrar::database::{StoredEntry, ENTRIES};
use reqwest::StatusCode;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn register_over_http_then_conflict() -> Result<()> {
    let server = common::TestServer::spawn().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/register", server.base_url))
        .json(&json!({"dataString": "over-http", "key": "k1"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{}/register", server.base_url))
        .form(&[("dataString", "over-http"), ("key", "k2")])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["message"], "Already exist");

    Ok(())
}

#[tokio::test]
async fn concurrent_registrations_create_one_entry() -> Result<()> {
    let server = common::TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/register", server.base_url);

    let requests = (0..8).map(|i| {
        let client = client.clone();
        let url = url.clone();
        async move {
            client
                .post(url)
                .json(&json!({"dataString": "contended", "key": format!("k{}", i)}))
                .send()
                .await
                .map(|res| res.status())
        }
    });
    let statuses = futures::future::join_all(requests).await;

    let mut created = 0;
    for status in statuses {
        match status? {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => {}
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(
        server.store.count(ENTRIES, &StoredEntry::filter_by_data_string("contended")).await,
        1
    );
    assert_eq!(server.store.open_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn cors_preflight_allows_post_with_credentials() {
    let (app, _store) = common::test_app();

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/register")
        .header("Origin", "https://client.example")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type, authorization")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "https://client.example");
    assert_eq!(headers["access-control-allow-credentials"], "true");
    assert_eq!(headers["access-control-allow-methods"], "POST");
    assert_eq!(headers["access-control-max-age"], "43200");
    let allowed = headers["access-control-allow-headers"].to_str().unwrap().to_ascii_lowercase();
    assert!(allowed.contains("authorization"));
    assert!(allowed.contains("content-type"));
}
