//! Outbound session events.

use serde::Serialize;

use crate::credentials::{CredentialSnapshot, SaveOutcome};

/// Reason published when the QR attempt limit is exceeded.
pub const REASON_ATTEMPT_LIMIT: &str = "attempt-limit-exceeded";
/// Reason published when the driver rejects authentication.
pub const REASON_AUTH_FAILURE: &str = "auth-failure";
/// Reason published when a session is torn down on request.
pub const REASON_DESTROYED: &str = "destroyed";

/// An event delivered to subscribers of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new QR code was issued; `attempt` starts at 1.
    Qr { attempt: u32, payload: String },
    /// The driver reported ready.
    Connected { info: serde_json::Value },
    /// Result of persisting credentials after connecting.
    Credentials {
        outcome: SaveOutcome,
        snapshot: CredentialSnapshot,
    },
    /// The connection is gone.
    Disconnected { reason: String },
    /// Inbound message from the messaging service.
    Message { from: String, body: String },
    /// The driver rejected authentication.
    AuthFailure { reason: String },
    /// The session was destroyed. Always the last event of a session.
    SessionEnded { reason: String },
}

impl SessionEvent {
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }

    pub fn ended(reason: impl Into<String>) -> Self {
        Self::SessionEnded {
            reason: reason.into(),
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Qr { .. } => "qr",
            Self::Connected { .. } => "connected",
            Self::Credentials { .. } => "credentials",
            Self::Disconnected { .. } => "disconnected",
            Self::Message { .. } => "message",
            Self::AuthFailure { .. } => "auth_failure",
            Self::SessionEnded { .. } => "session_ended",
        }
    }
}
