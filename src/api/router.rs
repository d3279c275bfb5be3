//! API router configuration.

use std::sync::Arc;

use axum::{
    routing::{any, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    api_info, create_session, delete_session, get_credentials, get_session, health,
    list_sessions, AppState,
};
use super::websocket::ws_handler;
use crate::error::HubError;
use crate::hub::SessionHub;

/// Create the API router for a hub.
pub fn create_router(hub: Arc<SessionHub>) -> Router {
    create_router_with_state(AppState::new(hub))
}

/// Create the API router with custom state.
pub fn create_router_with_state(state: AppState) -> Router {
    let session_routes = Router::new()
        .route("/", get(list_sessions).post(create_session))
        .route("/{name}", get(get_session).delete(delete_session))
        .route("/{name}/credentials", get(get_credentials));

    let api_v1 = Router::new()
        .route("/", get(api_info))
        .route("/ws", any(ws_handler))
        .nest("/sessions", session_routes);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Stop on Ctrl-C after destroying every session.
    pub graceful_shutdown: bool,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            graceful_shutdown: true,
        }
    }

    pub fn without_graceful_shutdown(mut self) -> Self {
        self.graceful_shutdown = false;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 3000)
    }
}

/// Start the API server for a hub.
pub async fn serve(config: ServerConfig, hub: Arc<SessionHub>) -> crate::Result<()> {
    serve_with_state(config, AppState::new(hub)).await
}

/// Start the API server with custom state.
pub async fn serve_with_state(config: ServerConfig, state: AppState) -> crate::Result<()> {
    let addr = config.bind_address();
    let hub = Arc::clone(&state.hub);
    let router = create_router_with_state(state);

    tracing::info!("Starting session-hub API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(HubError::Io)?;

    let served = if config.graceful_shutdown {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(Arc::clone(&hub)))
            .await
    } else {
        axum::serve(listener, router).await
    };
    served.map_err(|e| HubError::Io(std::io::Error::other(e.to_string())))?;

    Ok(())
}

async fn shutdown_signal(hub: Arc<SessionHub>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
    hub.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriverFactory;
    use crate::hub::HubConfig;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert!(config.graceful_shutdown);
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_server_config_custom() {
        let config = ServerConfig::new("0.0.0.0", 8080).without_graceful_shutdown();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(!config.graceful_shutdown);
    }

    #[test]
    fn test_router_creation() {
        let hub = SessionHub::new(
            HubConfig::new(3, std::env::temp_dir().join("session-hub-router-test")),
            Arc::new(MockDriverFactory::default()),
        );
        let _router = create_router(Arc::new(hub));
    }
}
