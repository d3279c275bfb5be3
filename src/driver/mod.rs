//! Messaging driver abstraction.
//!
//! A driver automates one connection to the messaging service. The hub
//! never calls back into a driver for events; instead each driver is
//! handed a [`DriverEventSender`] at construction and pushes its events
//! into the owning session's ordered input stream.

mod mock;
mod process;

pub use mock::{MockDriver, MockDriverFactory};
pub use process::{ProcessDriver, ProcessDriverFactory, ENV_AUTH_DIR, ENV_SESSION};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::session::{SessionInput, SessionName};

/// An event emitted by a driver.
///
/// This is also the wire format of [`ProcessDriver`]: one JSON object per
/// line, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverEvent {
    /// A pairing QR code was generated.
    Qr { payload: String },
    /// Pairing succeeded and the client is usable.
    Ready {
        #[serde(default)]
        info: serde_json::Value,
    },
    /// An inbound message.
    Message { from: String, body: String },
    /// The service rejected the stored or scanned credentials.
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    /// The connection closed.
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

/// Driver errors.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The driver process could not be started.
    #[error("failed to spawn driver: {0}")]
    Spawn(#[from] std::io::Error),

    /// The driver started but could not initialize.
    #[error("initialization failed: {0}")]
    Init(String),

    /// The driver was destroyed before or during initialization.
    #[error("driver destroyed")]
    Destroyed,
}

/// Handle a driver uses to push events into its session.
///
/// Sends after the session has finished are silently dropped.
#[derive(Debug, Clone)]
pub struct DriverEventSender {
    tx: mpsc::UnboundedSender<SessionInput>,
}

impl DriverEventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionInput>) -> Self {
        Self { tx }
    }

    /// Push an event. Returns `false` once the session no longer listens.
    pub fn send(&self, event: DriverEvent) -> bool {
        self.tx.send(SessionInput::Driver(event)).is_ok()
    }

    /// Report that initialization failed after `initialize` returned.
    pub fn init_failed(&self, reason: impl Into<String>) -> bool {
        self.tx.send(SessionInput::InitFailed(reason.into())).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One driver instance, bound to a single session.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Start the driver. Returns once startup has been kicked off; pairing
    /// progress is reported through the session's event sender.
    async fn initialize(&self) -> Result<(), DriverError>;

    /// Stop the driver and release its resources. Must be idempotent and
    /// safe to call while `initialize` is still running.
    async fn destroy(&self);

    /// Directory where the driver keeps its volatile credential tree.
    fn auth_dir(&self) -> &Path;
}

/// Builds drivers for new sessions.
///
/// `create` must not perform I/O; the driver only starts working when
/// `initialize` is called. A driver built for a name that turns out to be
/// taken is dropped without being initialized.
pub trait DriverFactory: Send + Sync {
    fn create(
        &self,
        name: &SessionName,
        events: DriverEventSender,
    ) -> Result<Arc<dyn SessionDriver>, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wire_events() {
        let qr: DriverEvent = serde_json::from_str(r#"{"type":"qr","payload":"1@xyz"}"#).unwrap();
        assert_eq!(
            qr,
            DriverEvent::Qr {
                payload: "1@xyz".into()
            }
        );

        let ready: DriverEvent = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(
            ready,
            DriverEvent::Ready {
                info: serde_json::Value::Null
            }
        );

        let msg: DriverEvent =
            serde_json::from_str(r#"{"type":"message","from":"5511@c.us","body":"oi"}"#).unwrap();
        assert!(matches!(msg, DriverEvent::Message { ref body, .. } if body == "oi"));

        let failure: DriverEvent =
            serde_json::from_str(r#"{"type":"auth_failure","reason":"bad"}"#).unwrap();
        assert!(matches!(failure, DriverEvent::AuthFailure { .. }));
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(serde_json::from_str::<DriverEvent>(r#"{"type":"loading"}"#).is_err());
    }

    #[test]
    fn test_sender_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = DriverEventSender::new(tx);
        assert!(sender.send(DriverEvent::Qr {
            payload: "a".into()
        }));
        drop(rx);
        assert!(sender.is_closed());
        assert!(!sender.send(DriverEvent::Qr {
            payload: "b".into()
        }));
    }
}
