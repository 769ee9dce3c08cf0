//! Integration tests for the HTTP surface.
//!
//! The server runs in-process on an ephemeral port. No engine is installed at
//! the configured path, so requests that pass validation answer 503.

mod common;

use analysis_worker::WorkerConfig;
use serde_json::{json, Value};
use server::config::Config;

fn config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        max_concurrent_jobs: 2,
        worker: WorkerConfig {
            stockfish_path: Some("/definitely/not/here/stockfish".into()),
            ..common::test_config()
        },
    }
}

async fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
    let res = common::client()
        .post(format!("{base}{path}"))
        .json(&body)
        .send()
        .await
        .expect("Failed to send request");
    let status = res.status().as_u16();
    let body = res.json().await.expect("Response is not JSON");
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let base = common::spawn_server(config()).await;
    for path in ["/health", "/"] {
        let res = common::client()
            .get(format!("{base}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, json!({ "ok": true }));
    }
}

#[tokio::test]
async fn test_missing_pgn_is_rejected() {
    let base = common::spawn_server(config()).await;

    let (status, body) = post(&base, "/analyze", json!({ "depth": 12 })).await;
    assert_eq!(status, 400);
    assert_eq!(body["detail"], "Missing pgn");

    let (status, _) = post(&base, "/scan", json!({ "pgn": "  " })).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_invalid_settings_are_rejected() {
    let base = common::spawn_server(config()).await;

    let (status, body) = post(&base, "/analyze", json!({ "pgn": "1. e4", "depth": 99 })).await;
    assert_eq!(status, 400);
    assert!(body["detail"].as_str().unwrap().contains("depth"));

    let (status, _) = post(&base, "/analyze", json!({ "pgn": "1. e4", "depth": -3 })).await;
    assert_eq!(status, 400);

    let thresholds = json!({ "inaccuracy": 500, "mistake": 150, "blunder": 300 });
    let (status, _) = post(&base, "/scan", json!({ "pgn": "1. e4", "thresholds": thresholds })).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_non_array_candidates_are_rejected() {
    let base = common::spawn_server(config()).await;
    let (status, body) = post(&base, "/analyze-candidates", json!({ "candidates": "e2e4" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["detail"], "candidates must be an array");
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let base = common::spawn_server(config()).await;
    let res = common::client()
        .post(format!("{base}/analyze"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_missing_engine_is_service_unavailable() {
    let base = common::spawn_server(config()).await;
    let (status, body) = post(&base, "/analyze", json!({ "pgn": "1. e4 e5 2. Nf3" })).await;
    assert_eq!(status, 503);
    assert!(body["detail"].as_str().unwrap().contains("stockfish"));
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let base = common::spawn_server(config()).await;
    let res = common::client()
        .get(format!("{base}/health"))
        .header("origin", "https://example.org")
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
