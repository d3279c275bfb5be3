//! Session lifecycle integration tests.
//!
//! These tests drive the hub through the mock driver, playing the part of
//! the messaging service.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use session_hub::credentials::CredentialEntry;
use session_hub::driver::{DriverEvent, MockDriverFactory};
use session_hub::events::{SessionEvent, REASON_ATTEMPT_LIMIT, REASON_AUTH_FAILURE};
use session_hub::hub::{HubConfig, SessionHub};
use session_hub::session::SessionState;
use session_hub::HubError;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    hub: Arc<SessionHub>,
    driver: MockDriverFactory,
    store: TempDir,
    _auth: TempDir,
}

fn harness(max_qr_attempts: u32) -> Harness {
    let store = TempDir::new().unwrap();
    let auth = TempDir::new().unwrap();
    let driver = MockDriverFactory::new(auth.path());
    let hub = SessionHub::new(
        HubConfig::new(max_qr_attempts, store.path()),
        Arc::new(driver.clone()),
    );
    Harness {
        hub: Arc::new(hub),
        driver,
        store,
        _auth: auth,
    }
}

fn qr(n: u32) -> DriverEvent {
    DriverEvent::Qr {
        payload: format!("2@code-{n}"),
    }
}

async fn recv(rx: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
}

/// Collect events up to and including `session_ended`.
async fn until_ended(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        let event = recv(rx).await;
        let done = matches!(event, SessionEvent::SessionEnded { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

async fn wait_until_gone(hub: &SessionHub, name: &str) {
    for _ in 0..500 {
        let handles = hub.registry().handles().unwrap();
        if !handles.iter().any(|h| h.name().as_str() == name) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session {name} was never released");
}

// ============================================================================
// Pairing
// ============================================================================

#[tokio::test]
async fn test_alice_pairs_after_three_codes() {
    let h = harness(5);
    let mut events = h.hub.subscribe("alice").unwrap();
    assert_ok!(h.hub.create_session("alice"));

    for n in 1..=3 {
        h.driver.emit("alice", qr(n));
    }
    h.driver.emit("alice", DriverEvent::Ready { info: json!({}) });

    for n in 1..=3 {
        assert_eq!(
            recv(&mut events.receiver).await,
            SessionEvent::Qr {
                attempt: n,
                payload: format!("2@code-{n}"),
            }
        );
    }
    assert!(matches!(
        recv(&mut events.receiver).await,
        SessionEvent::Connected { .. }
    ));

    let status = h.hub.session_status("alice").unwrap();
    assert!(status.connected());
    assert!(!status.qr_present());
}

#[tokio::test]
async fn test_alice_exceeds_attempt_limit() {
    let h = harness(2);
    let mut events = h.hub.subscribe("alice").unwrap();
    assert_ok!(h.hub.create_session("alice"));

    for n in 1..=3 {
        h.driver.emit("alice", qr(n));
    }

    let events = until_ended(&mut events.receiver).await;
    let kinds: Vec<_> = events.iter().map(SessionEvent::kind).collect();
    assert_eq!(
        kinds,
        vec!["qr", "qr", "qr", "disconnected", "session_ended"]
    );
    assert_eq!(events[4], SessionEvent::ended(REASON_ATTEMPT_LIMIT));

    wait_until_gone(&h.hub, "alice").await;
    assert!(matches!(
        h.hub.session_status("alice"),
        Err(HubError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_exactly_threshold_codes_keeps_pairing() {
    let h = harness(3);
    let mut events = h.hub.subscribe("bob").unwrap();
    assert_ok!(h.hub.create_session("bob"));

    for n in 1..=3 {
        h.driver.emit("bob", qr(n));
    }
    for _ in 1..=3 {
        recv(&mut events.receiver).await;
    }

    let status = h.hub.session_status("bob").unwrap();
    assert_eq!(status.status.state, SessionState::Pairing);
    assert_eq!(status.status.attempts, 3);
    assert!(status.qr_present());

    h.driver.emit("bob", qr(4));
    let rest = until_ended(&mut events.receiver).await;
    assert_eq!(rest.last(), Some(&SessionEvent::ended(REASON_ATTEMPT_LIMIT)));
}

#[tokio::test]
async fn test_qr_after_connected_is_discarded() {
    let h = harness(2);
    let mut events = h.hub.subscribe("carol").unwrap();
    assert_ok!(h.hub.create_session("carol"));

    h.driver.emit("carol", qr(1));
    h.driver.emit("carol", DriverEvent::Ready { info: json!({}) });
    for n in 2..=5 {
        h.driver.emit("carol", qr(n));
    }
    h.driver.emit(
        "carol",
        DriverEvent::Message {
            from: "+5511".into(),
            body: "hi".into(),
        },
    );

    assert!(matches!(recv(&mut events.receiver).await, SessionEvent::Qr { .. }));
    assert!(matches!(
        recv(&mut events.receiver).await,
        SessionEvent::Connected { .. }
    ));
    assert!(matches!(
        recv(&mut events.receiver).await,
        SessionEvent::Credentials { .. }
    ));
    // The stray codes produced nothing; the message is next.
    assert!(matches!(
        recv(&mut events.receiver).await,
        SessionEvent::Message { .. }
    ));

    let status = h.hub.session_status("carol").unwrap();
    assert!(status.connected());
    assert_eq!(status.status.attempts, 1);
}

#[tokio::test]
async fn test_auth_failure_ends_session() {
    let h = harness(3);
    let mut events = h.hub.subscribe("dave").unwrap();
    assert_ok!(h.hub.create_session("dave"));

    h.driver.emit(
        "dave",
        DriverEvent::AuthFailure {
            reason: "bad credentials".into(),
        },
    );

    let events = until_ended(&mut events.receiver).await;
    assert_eq!(
        events.last(),
        Some(&SessionEvent::ended(REASON_AUTH_FAILURE))
    );
    wait_until_gone(&h.hub, "dave").await;
    assert_eq!(h.driver.destroy_calls("dave"), 1);
}

// ============================================================================
// Registry behaviour
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_same_name() {
    let h = harness(3);

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let hub = Arc::clone(&h.hub);
        tasks.push(tokio::spawn(async move { hub.create_session("shared").is_ok() }));
    }

    let mut accepted = 0;
    for task in tasks {
        if task.await.unwrap() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(h.hub.list_sessions().unwrap().len(), 1);
}

#[tokio::test]
async fn test_destroy_then_not_found() {
    let h = harness(3);
    assert_ok!(h.hub.create_session("erin"));

    assert_ok!(h.hub.destroy_session("erin"));
    let err = assert_err!(h.hub.destroy_session("erin"));
    assert!(matches!(err, HubError::NotFound(_)));

    wait_until_gone(&h.hub, "erin").await;
    assert_eq!(h.driver.destroy_calls("erin"), 1);

    // The name can be reused once the driver is gone.
    assert_ok!(h.hub.create_session("erin"));
}

#[tokio::test]
async fn test_connected_destroy_reports_disconnect() {
    let h = harness(3);
    let mut events = h.hub.subscribe("frank").unwrap();
    assert_ok!(h.hub.create_session("frank"));

    h.driver.emit("frank", DriverEvent::Ready { info: json!({}) });
    assert!(matches!(
        recv(&mut events.receiver).await,
        SessionEvent::Connected { .. }
    ));
    recv(&mut events.receiver).await; // credentials

    assert_ok!(h.hub.destroy_session("frank"));
    let events = until_ended(&mut events.receiver).await;
    let kinds: Vec<_> = events.iter().map(SessionEvent::kind).collect();
    assert_eq!(kinds, vec!["disconnected", "session_ended"]);
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
async fn test_credentials_saved_and_loaded() {
    let h = harness(3);
    let mut events = h.hub.subscribe("grace").unwrap();
    assert_ok!(h.hub.create_session("grace"));

    let auth_dir = h.driver.auth_root().join("grace");
    std::fs::create_dir_all(auth_dir.join("session")).unwrap();
    std::fs::write(auth_dir.join("creds.json"), r#"{"me": {"id": "5511"}}"#).unwrap();
    std::fs::write(auth_dir.join("session/keys.txt"), "k".repeat(1999)).unwrap();
    std::fs::write(auth_dir.join("session/blob.bin"), "b".repeat(2000)).unwrap();

    h.driver.emit("grace", DriverEvent::Ready { info: json!({}) });
    recv(&mut events.receiver).await; // connected

    let (outcome, snapshot) = match recv(&mut events.receiver).await {
        SessionEvent::Credentials { outcome, snapshot } => (outcome, snapshot),
        other => panic!("expected credentials, got {other:?}"),
    };
    assert!(outcome.is_success());
    assert_eq!(outcome.files(), 3);

    assert_eq!(
        snapshot.get("creds.json"),
        Some(&CredentialEntry::Document {
            value: json!({"me": {"id": "5511"}})
        })
    );
    assert_eq!(
        snapshot.get("session/keys.txt"),
        Some(&CredentialEntry::Text {
            content: "k".repeat(1999)
        })
    );
    assert_eq!(
        snapshot.get("session/blob.bin"),
        Some(&CredentialEntry::Placeholder { size: 2000 })
    );

    assert!(h.store.path().join("grace/creds.json").is_file());
    let reloaded = h.hub.credentials("grace").await.unwrap();
    assert_eq!(reloaded, snapshot);
}

#[tokio::test]
async fn test_credentials_restored_on_restart() {
    let h = harness(3);
    let stored = h.store.path().join("heidi");
    std::fs::create_dir_all(&stored).unwrap();
    std::fs::write(stored.join("creds.json"), r#"{"token": "abc"}"#).unwrap();

    let handle = h.hub.create_session("heidi").unwrap();
    let restored = handle.driver().auth_dir().join("creds.json");

    for _ in 0..500 {
        if restored.is_file() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        std::fs::read_to_string(restored).unwrap(),
        r#"{"token": "abc"}"#
    );
}

#[tokio::test]
async fn test_purge_credentials() {
    let h = harness(3);
    let stored = h.store.path().join("ivan");
    std::fs::create_dir_all(&stored).unwrap();
    std::fs::write(stored.join("creds.json"), "{}").unwrap();

    assert!(h.hub.purge_credentials("ivan").await.unwrap());
    assert!(!h.hub.purge_credentials("ivan").await.unwrap());
    assert!(h.hub.credentials("ivan").await.unwrap().is_empty());
}
