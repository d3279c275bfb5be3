//! Transport-agnostic control surface.
//!
//! [`SessionHub`] ties the registry, the state machines, credential
//! persistence and event fan-out to a [`DriverFactory`]. The HTTP and
//! WebSocket layer in [`crate::api`] is a thin wrapper around it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::credentials::{CredentialSnapshot, CredentialStore, DEFAULT_INLINE_LIMIT};
use crate::driver::{DriverEventSender, DriverFactory};
use crate::error::HubError;
use crate::events::{EventBroadcaster, SessionEvent, SubscriberId, Subscription};
use crate::session::runner::{run_session, SessionServices};
use crate::session::{
    PairingThrottle, SessionHandle, SessionName, SessionRegistry, SessionStateMachine,
    SessionStatus, SessionSummary,
};
use crate::Result;

/// How long [`SessionHub::shutdown`] waits for each session to release its driver.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Settings the hub needs to run sessions.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// QR codes a session may issue before it is destroyed.
    pub max_qr_attempts: u32,
    /// Root of the durable credential store.
    pub store_root: PathBuf,
    /// Files below this size are inlined in credential snapshots.
    pub inline_limit: u64,
    /// Copy persisted credentials into the driver's directory before start.
    pub restore_credentials: bool,
}

impl HubConfig {
    pub fn new(max_qr_attempts: u32, store_root: impl Into<PathBuf>) -> Self {
        Self {
            max_qr_attempts,
            store_root: store_root.into(),
            inline_limit: DEFAULT_INLINE_LIMIT,
            restore_credentials: true,
        }
    }
}

/// Status of one session as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub name: SessionName,
    pub status: SessionStatus,
    pub age: Duration,
}

impl StatusReport {
    pub fn connected(&self) -> bool {
        self.status.connected()
    }

    pub fn qr_present(&self) -> bool {
        self.status.qr_present()
    }
}

/// Manages many independently paired sessions.
pub struct SessionHub {
    registry: Arc<SessionRegistry>,
    events: Arc<EventBroadcaster>,
    credentials: Arc<CredentialStore>,
    factory: Arc<dyn DriverFactory>,
    throttle: PairingThrottle,
    restore_credentials: bool,
}

impl SessionHub {
    pub fn new(config: HubConfig, factory: Arc<dyn DriverFactory>) -> Self {
        let credentials =
            CredentialStore::new(config.store_root).with_inline_limit(config.inline_limit);
        Self {
            registry: Arc::new(SessionRegistry::new()),
            events: Arc::new(EventBroadcaster::new()),
            credentials: Arc::new(credentials),
            factory,
            throttle: PairingThrottle::new(config.max_qr_attempts),
            restore_credentials: config.restore_credentials,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.events
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn throttle(&self) -> PairingThrottle {
        self.throttle
    }

    /// Create and start a session.
    ///
    /// Must be called from within a tokio runtime. A name stays taken until
    /// the previous session under it has fully released its driver.
    pub fn create_session(&self, raw_name: &str) -> Result<Arc<SessionHandle>> {
        let name = SessionName::new(raw_name)?;
        // `register` below stays the authoritative check.
        if self.registry.contains(&name)? {
            return Err(HubError::AlreadyExists(name.to_string()));
        }

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        let driver = self
            .factory
            .create(&name, DriverEventSender::new(input_tx.clone()))
            .map_err(|e| HubError::DriverInit {
                session: name.to_string(),
                reason: e.to_string(),
            })?;

        let handle = Arc::new(SessionHandle::new(name.clone(), driver, input_tx, status_rx));
        let handle = self.registry.register(handle)?;
        info!(session = %name, "session created");

        let machine = SessionStateMachine::new(name.clone(), self.throttle);
        let services = SessionServices {
            registry: Arc::clone(&self.registry),
            events: Arc::clone(&self.events),
            credentials: Arc::clone(&self.credentials),
            restore_credentials: self.restore_credentials,
        };

        let task = tokio::spawn(run_session(
            Arc::clone(&handle),
            machine,
            input_rx,
            status_tx,
            services.clone(),
        ));

        // A panicking session must not leave its name registered.
        let supervised = Arc::clone(&handle);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(session = %supervised.name(), "session task failed: {}", e);
                supervised.mark_torn_down();
                supervised.driver().destroy().await;
                let _ = services.registry.remove_handle(&supervised);
                services
                    .events
                    .publish(supervised.name(), SessionEvent::ended("internal-error"));
            }
        });

        Ok(handle)
    }

    /// Current status of a live session.
    pub fn session_status(&self, raw_name: &str) -> Result<StatusReport> {
        let handle = self.live_handle(raw_name)?;
        Ok(StatusReport {
            name: handle.name().clone(),
            status: handle.status(),
            age: handle.age(),
        })
    }

    /// Snapshot of all live sessions.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.registry.list()
    }

    /// Request teardown of a session.
    ///
    /// Returns once teardown has been requested; the driver is released in
    /// the background. A second call for the same session is `NotFound`.
    pub fn destroy_session(&self, raw_name: &str) -> Result<()> {
        let handle = self.live_handle(raw_name)?;
        if !handle.request_teardown() {
            return Err(HubError::NotFound(handle.name().to_string()));
        }
        Ok(())
    }

    /// Join a session's event stream. The session need not exist yet.
    pub fn subscribe(&self, raw_name: &str) -> Result<Subscription> {
        let name = SessionName::new(raw_name)?;
        Ok(self.events.join(&name))
    }

    /// Leave a session's event stream.
    pub fn unsubscribe(&self, raw_name: &str, id: SubscriberId) {
        if let Ok(name) = SessionName::new(raw_name) {
            self.events.leave(&name, id);
        }
    }

    /// Read the persisted credentials of a session.
    ///
    /// Works for sessions that are not currently running.
    pub async fn credentials(&self, raw_name: &str) -> Result<CredentialSnapshot> {
        let name = SessionName::new(raw_name)?;
        Ok(self.credentials.load(&name).await)
    }

    /// Delete the persisted credentials of a session.
    pub async fn purge_credentials(&self, raw_name: &str) -> Result<bool> {
        let name = SessionName::new(raw_name)?;
        self.credentials.remove(&name).await
    }

    /// Destroy every session and wait for their drivers to be released.
    pub async fn shutdown(&self) {
        let handles = match self.registry.handles() {
            Ok(handles) => handles,
            Err(e) => {
                error!("cannot enumerate sessions for shutdown: {}", e);
                return;
            }
        };
        info!(sessions = handles.len(), "shutting down sessions");

        let waits = handles.into_iter().map(|handle| async move {
            let mut status = handle.watch_status();
            handle.request_teardown();
            let finished = tokio::time::timeout(
                SHUTDOWN_GRACE,
                status.wait_for(|s| s.state.is_terminal()),
            )
            .await;
            if finished.is_err() {
                warn!(session = %handle.name(), "session did not stop in time");
            }
        });
        join_all(waits).await;
    }

    fn live_handle(&self, raw_name: &str) -> Result<Arc<SessionHandle>> {
        let name = SessionName::new(raw_name)?;
        let handle = self.registry.get(&name)?;
        if handle.is_torn_down() {
            return Err(HubError::NotFound(name.to_string()));
        }
        Ok(handle)
    }
}
