//! Error types for session-hub.

use thiserror::Error;

use crate::session::SessionState;

/// Main error type for session-hub operations.
#[derive(Error, Debug)]
pub enum HubError {
    /// The supplied session name failed validation.
    #[error("invalid session name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A session with the given name is already active.
    #[error("session already exists: {0}")]
    AlreadyExists(String),

    /// No active session with the given name.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The driver could not be created or initialized.
    #[error("driver initialization failed for session {session}: {reason}")]
    DriverInit { session: String, reason: String },

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition { from: SessionState, to: SessionState },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl HubError {
    /// Stable machine-readable code, used by the API layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidName { .. } => "INVALID_NAME",
            Self::AlreadyExists(_) => "SESSION_EXISTS",
            Self::NotFound(_) => "SESSION_NOT_FOUND",
            Self::DriverInit { .. } => "DRIVER_INIT_FAILED",
            Self::InvalidStateTransition { .. } => "INVALID_STATE",
            Self::Io(_) | Self::LockPoisoned => "INTERNAL_ERROR",
        }
    }
}

/// Convenience Result type for session-hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
