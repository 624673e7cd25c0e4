//! Integration tests for the watcher HTTP API.
//!
//! Each test binds the router to an ephemeral port, backed by a
//! `MockRuntime`, and drives it over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use seqclock_request::{Metrics, Request, ResetRequest};
use seqclock_watcher::controller::{QuotaBounds, UNRESTRICTED_QUOTA};
use seqclock_watcher::{api, state::AppState, ConflictResolver, MockRuntime};
use tokio::net::TcpListener;

struct TestWatcher {
    addr: SocketAddr,
    runtime: Arc<MockRuntime>,
    client: reqwest::Client,
}

impl TestWatcher {
    async fn spawn(runtime: MockRuntime) -> Self {
        let runtime = Arc::new(runtime);
        let resolver = ConflictResolver::new(runtime.clone(), 4, QuotaBounds::default());
        let app = api::create_router(AppState::new(resolver, "10.0.0.7"));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            runtime,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn request(&self, id: u64, function: &str, slack: i64) -> reqwest::StatusCode {
        let mut request = Request::new(
            function,
            Metrics {
                slack,
                ..Metrics::default()
            },
        );
        request.id = id;
        self.client
            .post(self.url("/function/requestResources"))
            .json(&request)
            .send()
            .await
            .unwrap()
            .status()
    }

    async fn reset(&self, id: u64, function: &str) -> reqwest::StatusCode {
        self.client
            .post(self.url("/function/resetRequest"))
            .json(&ResetRequest::new(id, function))
            .send()
            .await
            .unwrap()
            .status()
    }
}

#[tokio::test]
async fn check_reports_host() {
    let watcher = TestWatcher::spawn(MockRuntime::new()).await;
    let body = reqwest::get(watcher.url("/check"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "Hello from watcher inside node 10.0.0.7!");
}

#[tokio::test]
async fn request_for_missing_container_is_404() {
    let watcher = TestWatcher::spawn(MockRuntime::new()).await;
    assert_eq!(watcher.request(0, "resize", 0).await, 404);
}

#[tokio::test]
async fn malformed_request_is_400() {
    let watcher = TestWatcher::spawn(MockRuntime::new()).await;

    let response = watcher
        .client
        .post(watcher.url("/function/requestResources"))
        .json(&serde_json::json!({ "function": "resize" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(
        response.headers()["content-type"],
        "application/problem+json"
    );

    assert_eq!(watcher.request(0, "", 0).await, 400);
}

#[tokio::test]
async fn request_and_reset_lifecycle() {
    let watcher = TestWatcher::spawn(MockRuntime::new().with_container("resize", "ctr-resize")).await;

    // On schedule: baseline quota.
    assert_eq!(watcher.request(0, "resize", 0).await, 200);
    assert_eq!(watcher.runtime.last_quota("ctr-resize"), Some(100_000));

    // Running 15s late: 250000.
    assert_eq!(watcher.request(1, "resize", -15_000_000_000).await, 200);
    assert_eq!(watcher.runtime.last_quota("ctr-resize"), Some(250_000));

    let registry: serde_json::Value = reqwest::get(watcher.url("/registry"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(registry["functions"]["resize"]["requests"]["current_id"], 1);
    assert_eq!(registry["functions"]["resize"]["requests"]["active"]["0"], 100_000);

    assert_eq!(watcher.reset(1, "resize").await, 200);
    assert_eq!(watcher.runtime.last_quota("ctr-resize"), Some(100_000));

    assert_eq!(watcher.reset(0, "resize").await, 200);
    assert_eq!(
        watcher.runtime.last_quota("ctr-resize"),
        Some(UNRESTRICTED_QUOTA)
    );

    // Nothing left to release.
    assert_eq!(watcher.reset(0, "resize").await, 404);
}

#[tokio::test]
async fn get_container_metadata() {
    let watcher = TestWatcher::spawn(MockRuntime::new().with_container("resize", "0123456789abcdef")).await;

    let response = reqwest::get(watcher.url("/function/resize")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ID"], "0123456789");

    let response = reqwest::get(watcher.url("/function/resize?type=POD")).await.unwrap();
    assert_eq!(response.status(), 404);

    let response = reqwest::get(watcher.url("/function/resize?type=sidecar")).await.unwrap();
    assert_eq!(response.status(), 400);
}
