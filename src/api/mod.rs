//! API layer for session-hub.
//!
//! This module provides REST API and WebSocket endpoints wrapping a
//! [`SessionHub`](crate::hub::SessionHub).
//!
//! ## Endpoints
//!
//! ### Health & Info
//! - `GET /health` - Health check
//! - `GET /api/v1/` - API information
//!
//! ### Sessions
//! - `GET /api/v1/sessions` - List live sessions
//! - `POST /api/v1/sessions` - Create and start a session
//! - `GET /api/v1/sessions/{name}` - Get session status
//! - `DELETE /api/v1/sessions/{name}[?purge=true]` - Destroy a session
//! - `GET /api/v1/sessions/{name}/credentials` - Persisted credentials
//!
//! ### Events
//! - `WS /api/v1/ws` - Start, join and leave sessions; receive their events
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use session_hub::api::{serve, ServerConfig};
//! use session_hub::driver::MockDriverFactory;
//! use session_hub::hub::{HubConfig, SessionHub};
//!
//! #[tokio::main]
//! async fn main() -> session_hub::Result<()> {
//!     let hub = SessionHub::new(
//!         HubConfig::new(5, "./sessions"),
//!         Arc::new(MockDriverFactory::default()),
//!     );
//!     serve(ServerConfig::new("127.0.0.1", 3000), Arc::new(hub)).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;
pub mod websocket;

// Re-export commonly used types
pub use handlers::AppState;
pub use router::{create_router, create_router_with_state, serve, serve_with_state, ServerConfig};
pub use types::{
    ClientMessage, CreateSessionRequest, CreateSessionResponse, DestroyQuery, ErrorResponse,
    ListSessionsResponse, ServerMessage, SessionStatusResponse,
};
