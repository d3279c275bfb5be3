//! API request and response types.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::HubError;
use crate::events::SessionEvent;
use crate::hub::StatusReport;
use crate::session::{SessionHandle, SessionState, SessionSummary};

/// Request to create a new session.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    /// Session name; surrounding whitespace is ignored.
    pub name: String,
}

/// Response for session creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    pub name: String,
    pub state: SessionState,
}

impl CreateSessionResponse {
    pub fn from_handle(handle: &SessionHandle) -> Self {
        Self {
            name: handle.name().to_string(),
            state: handle.status().state,
        }
    }
}

/// Response for session status query.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusResponse {
    pub name: String,
    pub state: SessionState,
    pub connected: bool,
    pub qr_present: bool,
    /// Latest QR payload while pairing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    /// QR codes issued in the current pairing phase.
    pub attempts: u32,
    pub age_seconds: f64,
}

impl SessionStatusResponse {
    pub fn from_report(report: &StatusReport) -> Self {
        Self {
            name: report.name.to_string(),
            state: report.status.state,
            connected: report.connected(),
            qr_present: report.qr_present(),
            qr: report.status.qr.clone(),
            attempts: report.status.attempts,
            age_seconds: report.age.as_secs_f64(),
        }
    }
}

/// List sessions response.
#[derive(Debug, Clone, Serialize)]
pub struct ListSessionsResponse {
    /// Total number of sessions.
    pub count: usize,
    /// Session summaries.
    pub sessions: Vec<SessionSummary>,
}

/// Query string of `DELETE /sessions/{name}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestroyQuery {
    /// Also delete the persisted credentials.
    #[serde(default)]
    pub purge: bool,
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "SESSION_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn session_not_found(name: &str) -> Self {
        Self::new("SESSION_NOT_FOUND", format!("Session '{}' not found", name))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl From<&HubError> for ErrorResponse {
    fn from(err: &HubError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// HTTP status for a hub error.
pub fn status_for(err: &HubError) -> StatusCode {
    match err {
        HubError::InvalidName { .. } => StatusCode::BAD_REQUEST,
        HubError::NotFound(_) => StatusCode::NOT_FOUND,
        HubError::AlreadyExists(_) | HubError::InvalidStateTransition { .. } => {
            StatusCode::CONFLICT
        }
        HubError::DriverInit { .. } | HubError::Io(_) | HubError::LockPoisoned => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Messages a WebSocket client sends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a session and join its event stream.
    StartSession { name: String },
    /// Join an existing or future session's event stream.
    Join { name: String },
    /// Stop receiving a session's events.
    Leave { name: String },
    Ping,
}

/// Messages the server sends over a WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A lifecycle event of a joined session.
    Event {
        session: String,
        event: SessionEvent,
    },
    /// Informational text.
    Log { message: String },
    /// Error message.
    Error { code: String, message: String },
    Pong,
}

impl ServerMessage {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&HubError> for ServerMessage {
    fn from(err: &HubError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}
