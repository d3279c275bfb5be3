//! API integration tests.
//!
//! These tests drive the complete router with axum's test utilities and a
//! hub backed by the in-process mock driver.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use session_hub::api::{create_router_with_state, AppState};
use session_hub::driver::{DriverEvent, MockDriverFactory};
use session_hub::hub::{HubConfig, SessionHub};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    state: AppState,
    driver: MockDriverFactory,
    _store: TempDir,
    _auth: TempDir,
}

impl TestApp {
    fn new(max_qr_attempts: u32) -> Self {
        let store = TempDir::new().unwrap();
        let auth = TempDir::new().unwrap();
        let driver = MockDriverFactory::new(auth.path());
        let hub = SessionHub::new(
            HubConfig::new(max_qr_attempts, store.path()),
            Arc::new(driver.clone()),
        );
        Self {
            state: AppState::new(Arc::new(hub)),
            driver,
            _store: store,
            _auth: auth,
        }
    }

    fn router(&self) -> Router {
        create_router_with_state(self.state.clone())
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> axum::response::Response {
        self.router()
            .oneshot(json_request(method, uri, body))
            .await
            .unwrap()
    }
}

/// Helper to create a JSON request.
fn json_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Helper to extract body as string.
async fn response_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&body).to_string()
}

/// Helper to extract JSON from response.
async fn response_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// Poll a session's status until `check` passes.
async fn wait_for_status(app: &TestApp, name: &str, check: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..200 {
        let response = app
            .call(Method::GET, &format!("/api/v1/sessions/{name}"), None)
            .await;
        let json = response_json(response).await;
        if check(&json) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("status of {name} never matched");
}

// ============================================================================
// Health & Info Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new(3);

    let response = app.call(Method::GET, "/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response).await, "OK");
}

#[tokio::test]
async fn test_api_info_endpoint() {
    let app = TestApp::new(3);

    let response = app.call(Method::GET, "/api/v1", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["name"], "session-hub");
    assert_eq!(json["status"], "running");
}

// ============================================================================
// Session Management Tests
// ============================================================================

#[tokio::test]
async fn test_list_sessions_empty() {
    let app = TestApp::new(3);

    let response = app.call(Method::GET, "/api/v1/sessions", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert!(json["sessions"].is_array());
    assert_eq!(json["count"], 0);
}

#[tokio::test]
async fn test_create_session() {
    let app = TestApp::new(3);

    let response = app
        .call(Method::POST, "/api/v1/sessions", Some(json!({"name": "alice"})))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = response_json(response).await;
    assert_eq!(json["name"], "alice");

    let response = app.call(Method::GET, "/api/v1/sessions", None).await;
    let json = response_json(response).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["sessions"][0], json!({"name": "alice", "connected": false}));
}

#[tokio::test]
async fn test_create_duplicate_session() {
    let app = TestApp::new(3);

    let first = app
        .call(Method::POST, "/api/v1/sessions", Some(json!({"name": "alice"})))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .call(Method::POST, "/api/v1/sessions", Some(json!({"name": "alice"})))
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let json = response_json(second).await;
    assert_eq!(json["code"], "SESSION_EXISTS");
}

#[tokio::test]
async fn test_create_session_invalid_name() {
    let app = TestApp::new(3);

    let response = app
        .call(Method::POST, "/api/v1/sessions", Some(json!({"name": "   "})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert_eq!(json["code"], "INVALID_NAME");
}

#[tokio::test]
async fn test_get_session_not_found() {
    let app = TestApp::new(3);

    let response = app.call(Method::GET, "/api/v1/sessions/ghost", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_session_not_found() {
    let app = TestApp::new(3);

    let response = app
        .call(Method::DELETE, "/api/v1/sessions/ghost", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_session_twice() {
    let app = TestApp::new(3);
    app.call(Method::POST, "/api/v1/sessions", Some(json!({"name": "alice"})))
        .await;

    let first = app
        .call(Method::DELETE, "/api/v1/sessions/alice", None)
        .await;
    assert_eq!(first.status(), StatusCode::NO_CONTENT);

    let second = app
        .call(Method::DELETE, "/api/v1/sessions/alice", None)
        .await;
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Pairing Flow Tests
// ============================================================================

#[tokio::test]
async fn test_pairing_flow_over_http() {
    let app = TestApp::new(5);
    app.call(Method::POST, "/api/v1/sessions", Some(json!({"name": "alice"})))
        .await;

    app.driver.emit(
        "alice",
        DriverEvent::Qr {
            payload: "2@first".into(),
        },
    );
    let json = wait_for_status(&app, "alice", |s| s["qr_present"] == true).await;
    assert_eq!(json["state"], "pairing");
    assert_eq!(json["connected"], false);
    assert_eq!(json["qr"], "2@first");
    assert_eq!(json["attempts"], 1);

    app.driver.emit("alice", DriverEvent::Ready { info: json!({}) });
    let json = wait_for_status(&app, "alice", |s| s["connected"] == true).await;
    assert_eq!(json["state"], "connected");
    assert_eq!(json["qr_present"], false);
    assert!(json.get("qr").is_none());
}

#[tokio::test]
async fn test_credentials_endpoint() {
    let app = TestApp::new(3);

    let response = app
        .call(Method::GET, "/api/v1/sessions/nobody/credentials", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({}));
}

#[tokio::test]
async fn test_credentials_saved_after_ready() {
    let app = TestApp::new(3);
    app.call(Method::POST, "/api/v1/sessions", Some(json!({"name": "alice"})))
        .await;

    let auth_dir = app.driver.auth_root().join("alice");
    std::fs::create_dir_all(&auth_dir).unwrap();
    std::fs::write(auth_dir.join("creds.json"), r#"{"token": "t0k"}"#).unwrap();

    app.driver.emit("alice", DriverEvent::Ready { info: json!({}) });
    wait_for_status(&app, "alice", |s| s["connected"] == true).await;

    let mut snapshot = Value::Null;
    for _ in 0..200 {
        let response = app
            .call(Method::GET, "/api/v1/sessions/alice/credentials", None)
            .await;
        snapshot = response_json(response).await;
        if snapshot.get("creds.json").is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(snapshot["creds.json"]["kind"], "document");
    assert_eq!(snapshot["creds.json"]["value"]["token"], "t0k");

    let response = app
        .call(Method::DELETE, "/api/v1/sessions/alice?purge=true", None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .call(Method::GET, "/api/v1/sessions/alice/credentials", None)
        .await;
    assert_eq!(response_json(response).await, json!({}));
}
