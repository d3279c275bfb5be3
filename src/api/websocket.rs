//! WebSocket handler for live session events.
//!
//! One socket can follow any number of sessions. Each joined session gets a
//! forwarding task that copies its events into the socket's outbound queue.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::handlers::AppState;
use super::types::{ClientMessage, ServerMessage};
use crate::events::SubscriberId;
use crate::session::SessionName;
use crate::Result;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

struct Joined {
    id: SubscriberId,
    forwarder: JoinHandle<()>,
}

/// Per-connection subscriptions.
struct Connection {
    state: AppState,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    joined: HashMap<SessionName, Joined>,
}

impl Connection {
    fn send(&self, msg: ServerMessage) {
        let _ = self.outbound.send(msg);
    }

    /// Follow a session's events. Joining twice is a no-op.
    fn join(&mut self, raw_name: &str) -> Result<SessionName> {
        let name = SessionName::new(raw_name)?;
        if self.joined.contains_key(&name) {
            return Ok(name);
        }

        let mut subscription = self.state.hub.subscribe(name.as_str())?;
        let outbound = self.outbound.clone();
        let session = name.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = subscription.receiver.recv().await {
                let msg = ServerMessage::Event {
                    session: session.clone(),
                    event,
                };
                if outbound.send(msg).is_err() {
                    break;
                }
            }
        });

        self.joined.insert(
            name.clone(),
            Joined {
                id: subscription.id,
                forwarder,
            },
        );
        Ok(name)
    }

    fn leave(&mut self, name: &SessionName) {
        if let Some(joined) = self.joined.remove(name) {
            self.state.hub.events().leave(name, joined.id);
            joined.forwarder.abort();
        }
    }

    fn leave_all(&mut self) {
        let names: Vec<_> = self.joined.keys().cloned().collect();
        for name in names {
            self.leave(&name);
        }
    }

    fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::StartSession { name } => {
                let already_joined = SessionName::new(&name)
                    .map(|n| self.joined.contains_key(&n))
                    .unwrap_or(false);

                // Join first so the first QR code cannot be missed.
                let joined = match self.join(&name) {
                    Ok(joined) => joined,
                    Err(e) => return self.send(ServerMessage::from(&e)),
                };
                match self.state.hub.create_session(joined.as_str()) {
                    Ok(_) => self.send(ServerMessage::log(format!(
                        "session '{}' started",
                        joined
                    ))),
                    Err(e) => {
                        if !already_joined {
                            self.leave(&joined);
                        }
                        self.send(ServerMessage::from(&e));
                    }
                }
            }
            ClientMessage::Join { name } => match self.join(&name) {
                Ok(joined) => self.send(ServerMessage::log(format!("joined '{}'", joined))),
                Err(e) => self.send(ServerMessage::from(&e)),
            },
            ClientMessage::Leave { name } => match SessionName::new(&name) {
                Ok(name) => {
                    self.leave(&name);
                    self.send(ServerMessage::log(format!("left '{}'", name)));
                }
                Err(e) => self.send(ServerMessage::from(&e)),
            },
            ClientMessage::Ping => self.send(ServerMessage::Pong),
        }
    }
}

/// Handle WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut conn = Connection {
        state,
        outbound,
        joined: HashMap::new(),
    };

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(_) => break,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(msg) => conn.handle(msg),
            Err(e) => conn.send(ServerMessage::error("PARSE_ERROR", e.to_string())),
        }
    }

    debug!(sessions = conn.joined.len(), "websocket closed");
    conn.leave_all();
    drop(conn);
    let _ = writer.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::driver::{DriverEvent, MockDriverFactory};
    use crate::events::SessionEvent;
    use crate::hub::{HubConfig, SessionHub};

    fn connection() -> (
        Connection,
        mpsc::UnboundedReceiver<ServerMessage>,
        MockDriverFactory,
        tempfile::TempDir,
    ) {
        let store = tempfile::TempDir::new().unwrap();
        let driver = MockDriverFactory::default();
        let hub = SessionHub::new(HubConfig::new(3, store.path()), Arc::new(driver.clone()));
        let (outbound, rx) = mpsc::unbounded_channel();
        let conn = Connection {
            state: AppState::new(Arc::new(hub)),
            outbound,
            joined: HashMap::new(),
        };
        (conn, rx, driver, store)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_client_message_leave_parse() {
        let json = r#"{"type": "leave", "name": "alice"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Leave {
                name: "alice".into()
            }
        );
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (mut conn, mut rx, _driver, _store) = connection();
        conn.handle(ClientMessage::Ping);
        assert!(matches!(next(&mut rx).await, ServerMessage::Pong));
    }

    #[tokio::test]
    async fn test_start_session_forwards_events() {
        let (mut conn, mut rx, driver, _store) = connection();
        conn.handle(ClientMessage::StartSession {
            name: "alice".into(),
        });
        assert!(matches!(next(&mut rx).await, ServerMessage::Log { .. }));

        driver.emit(
            "alice",
            DriverEvent::Qr {
                payload: "2@qr".into(),
            },
        );
        match next(&mut rx).await {
            ServerMessage::Event { session, event } => {
                assert_eq!(session, "alice");
                assert!(matches!(event, SessionEvent::Qr { attempt: 1, .. }));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_start_reports_error() {
        let (mut conn, mut rx, _driver, _store) = connection();
        conn.handle(ClientMessage::StartSession {
            name: "alice".into(),
        });
        next(&mut rx).await;

        conn.handle(ClientMessage::StartSession {
            name: "alice".into(),
        });
        match next(&mut rx).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, "SESSION_EXISTS"),
            other => panic!("unexpected message: {other:?}"),
        }
        // The earlier join survives the failed start.
        assert_eq!(conn.joined.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let (mut conn, mut rx, _driver, _store) = connection();
        conn.handle(ClientMessage::Join { name: "  ".into() });
        match next(&mut rx).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, "INVALID_NAME"),
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(conn.joined.is_empty());
    }

    #[tokio::test]
    async fn test_leave_unsubscribes() {
        let (mut conn, mut rx, _driver, _store) = connection();
        conn.handle(ClientMessage::Join {
            name: "alice".into(),
        });
        next(&mut rx).await;

        let name = SessionName::new("alice").unwrap();
        assert_eq!(conn.state.hub.events().subscriber_count(&name), 1);

        conn.handle(ClientMessage::Leave {
            name: "alice".into(),
        });
        assert_eq!(conn.state.hub.events().subscriber_count(&name), 0);
        assert!(conn.joined.is_empty());
    }
}
