//! REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::types::{
    status_for, CreateSessionRequest, CreateSessionResponse, DestroyQuery, ErrorResponse,
    ListSessionsResponse, SessionStatusResponse,
};
use crate::credentials::CredentialSnapshot;
use crate::error::HubError;
use crate::hub::SessionHub;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SessionHub>,
}

impl AppState {
    pub fn new(hub: Arc<SessionHub>) -> Self {
        Self { hub }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: HubError) -> ApiError {
    (status_for(&err), Json(ErrorResponse::from(&err)))
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// API information endpoint.
pub async fn api_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "session-hub",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "max_qr_attempts": state.hub.throttle().threshold(),
    }))
}

/// List all sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let sessions = state.hub.list_sessions().map_err(api_error)?;

    Ok(Json(ListSessionsResponse {
        count: sessions.len(),
        sessions,
    }))
}

/// Create a new session.
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let handle = state.hub.create_session(&req.name).map_err(api_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse::from_handle(&handle)),
    ))
}

/// Get session status.
pub async fn get_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let report = state.hub.session_status(&name).map_err(api_error)?;
    Ok(Json(SessionStatusResponse::from_report(&report)))
}

/// Destroy a session, optionally deleting its persisted credentials.
///
/// With `purge=true` the credentials of a session that is no longer
/// running are still removed.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DestroyQuery>,
) -> Result<StatusCode, ApiError> {
    let destroyed = match state.hub.destroy_session(&name) {
        Ok(()) => true,
        Err(HubError::NotFound(_)) if query.purge => false,
        Err(e) => return Err(api_error(e)),
    };

    if query.purge {
        let purged = state.hub.purge_credentials(&name).await.map_err(api_error)?;
        if purged {
            info!(session = %name.trim(), "credentials purged");
        }
        if !destroyed && !purged {
            return Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::session_not_found(name.trim())),
            ));
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Read a session's persisted credentials.
pub async fn get_credentials(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CredentialSnapshot>, ApiError> {
    let snapshot = state.hub.credentials(&name).await.map_err(api_error)?;
    Ok(Json(snapshot))
}
