//! Integration Tests for the API Fallback Manager
//!
//! Runs a throwaway local HTTP server and exercises the full retry /
//! response-cache / fallback-chain behavior against it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use loft_cache::fallback::{
    ApiFallbackManager, ApiResponse, EndpointStatus, RequestOptions, StaticSnapshotProvider,
};
use loft_cache::FallbackConfig;
use serde_json::json;

// == Helper Functions ==

/// Opt-in request logging via RUST_LOG when debugging a failure.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn fast_config(max_retries: u32, enable_fallback: bool) -> FallbackConfig {
    FallbackConfig {
        max_retries,
        retry_delay: Duration::from_millis(10),
        timeout: Duration::from_millis(1000),
        enable_fallback,
        fallback_delay: Duration::from_millis(10),
    }
}

async fn spawn_server(router: Router) -> String {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn lofts_handler() -> Json<serde_json::Value> {
    Json(json!([{"id": 1, "name": "Loft Aroma"}]))
}

// == Live Path ==

#[tokio::test]
async fn test_successful_fetch_decodes_payload() {
    let base = spawn_server(Router::new().route("/api/lofts", get(lofts_handler))).await;
    let manager = ApiFallbackManager::new(fast_config(0, false));

    let response: ApiResponse<serde_json::Value> = manager
        .fetch_with_fallback(
            &format!("{}/api/lofts", base),
            RequestOptions::default(),
            None,
            None,
        )
        .await;

    assert!(response.error.is_none());
    assert!(!response.is_from_fallback);
    assert!(!response.is_from_cache);
    assert_eq!(response.retry_count, 1);
    assert_eq!(response.data.unwrap()[0]["name"], "Loft Aroma");
}

#[tokio::test]
async fn test_second_fetch_hits_response_cache() {
    let base = spawn_server(Router::new().route("/api/lofts", get(lofts_handler))).await;
    let manager = ApiFallbackManager::new(fast_config(0, false));
    let endpoint = format!("{}/api/lofts", base);

    let first: ApiResponse<serde_json::Value> = manager
        .fetch_with_fallback(&endpoint, RequestOptions::default(), None, None)
        .await;
    assert!(!first.is_from_cache);

    let second: ApiResponse<serde_json::Value> = manager
        .fetch_with_fallback(&endpoint, RequestOptions::default(), None, None)
        .await;
    assert!(second.is_from_cache);
    assert_eq!(second.retry_count, 0);
    assert_eq!(second.data, first.data);
}

// == Retry Path ==

#[tokio::test]
async fn test_retries_until_server_recovers() {
    // Fails twice, then answers.
    async fn flaky(State(hits): State<Arc<AtomicUsize>>) -> Result<Json<serde_json::Value>, StatusCode> {
        if hits.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        } else {
            Ok(Json(json!({"ok": true})))
        }
    }

    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route("/api/flaky", get(flaky))
        .with_state(hits.clone());
    let base = spawn_server(router).await;

    let manager = ApiFallbackManager::new(fast_config(3, false));
    let response: ApiResponse<serde_json::Value> = manager
        .fetch_with_fallback(
            &format!("{}/api/flaky", base),
            RequestOptions::default(),
            None,
            None,
        )
        .await;

    assert_eq!(response.retry_count, 3);
    assert_eq!(response.data.unwrap()["ok"], true);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhausted_retries_resolve_with_error() {
    // Nothing listens on this port.
    let manager = ApiFallbackManager::new(fast_config(2, false));

    let response: ApiResponse<serde_json::Value> = manager
        .fetch_with_fallback(
            "http://127.0.0.1:9/unreachable",
            RequestOptions::default(),
            None,
            None,
        )
        .await;

    assert!(response.data.is_none());
    assert!(response.error.is_some());
    assert_eq!(response.retry_count, 3, "initial attempt plus two retries");
    assert!(!response.is_from_fallback);
    assert!(!response.is_from_cache);
}

// == Fallback Chain ==

#[tokio::test]
async fn test_snapshot_serves_when_server_always_errors() {
    async fn broken() -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }

    let base = spawn_server(Router::new().route("/api/lofts", get(broken))).await;
    let provider =
        StaticSnapshotProvider::new().insert("lofts", "fr", json!([{"id": 99, "name": "Secours"}]));
    let manager =
        ApiFallbackManager::new(fast_config(1, true)).with_snapshot_provider(Arc::new(provider));

    let response: ApiResponse<serde_json::Value> = manager
        .fetch_with_fallback(
            &format!("{}/api/lofts", base),
            RequestOptions::default(),
            Some("lofts"),
            Some("fr"),
        )
        .await;

    assert!(response.is_from_fallback);
    assert_eq!(response.data.unwrap()[0]["name"], "Secours");
}

#[tokio::test]
async fn test_backup_from_earlier_success_serves_after_outage() {
    let hits = Arc::new(AtomicUsize::new(0));

    // First request succeeds, everything after is a 500.
    async fn once(State(hits): State<Arc<AtomicUsize>>) -> Result<Json<serde_json::Value>, StatusCode> {
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(Json(json!([42])))
        } else {
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }

    let router = Router::new()
        .route("/api/lofts", get(once))
        .with_state(hits);
    let base = spawn_server(router).await;
    let endpoint = format!("{}/api/lofts", base);

    let manager = ApiFallbackManager::new(fast_config(0, true));

    let first: ApiResponse<Vec<u32>> = manager
        .fetch_with_fallback(&endpoint, RequestOptions::default(), None, None)
        .await;
    assert_eq!(first.data, Some(vec![42]));

    // Evict the in-memory response cache so only the persisted backup can
    // answer once the endpoint starts failing.
    manager.clear_response_cache();

    let second: ApiResponse<Vec<u32>> = manager
        .fetch_with_fallback(&endpoint, RequestOptions::default(), None, None)
        .await;
    assert_eq!(second.data, Some(vec![42]));
    assert!(second.is_from_fallback);
}

// == Health Check ==

#[tokio::test]
async fn test_health_check_classifies_endpoints() {
    let base = spawn_server(Router::new().route("/api/lofts", get(lofts_handler))).await;
    let manager = ApiFallbackManager::new(fast_config(0, false));

    let results = manager
        .health_check(&[
            format!("{}/api/lofts", base),
            "http://127.0.0.1:9/dead".to_string(),
        ])
        .await;

    assert_eq!(results.len(), 2);
    let healthy = results.iter().find(|h| h.endpoint.contains("/api/lofts")).unwrap();
    let dead = results.iter().find(|h| h.endpoint.contains("dead")).unwrap();
    assert_eq!(healthy.status, EndpointStatus::Healthy);
    assert_eq!(dead.status, EndpointStatus::Down);
}
