//! Registry entry for one live session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use super::{SessionInput, SessionName, SessionState};
use crate::driver::SessionDriver;

/// Point-in-time view of a session, published by its state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// QR codes issued in the current pairing phase.
    pub attempts: u32,
    /// Most recent QR payload, while pairing.
    pub qr: Option<String>,
}

impl SessionStatus {
    pub fn connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn qr_present(&self) -> bool {
        self.qr.is_some()
    }
}

/// A live session: its driver, its input stream, and its published status.
///
/// The handle is shared between the registry and the session's own task.
/// Status reads never touch the registry lock.
pub struct SessionHandle {
    name: SessionName,
    driver: Arc<dyn SessionDriver>,
    inputs: mpsc::UnboundedSender<SessionInput>,
    status: watch::Receiver<SessionStatus>,
    torn_down: AtomicBool,
    created_at: Instant,
}

impl SessionHandle {
    pub fn new(
        name: SessionName,
        driver: Arc<dyn SessionDriver>,
        inputs: mpsc::UnboundedSender<SessionInput>,
        status: watch::Receiver<SessionStatus>,
    ) -> Self {
        Self {
            name,
            driver,
            inputs,
            status,
            torn_down: AtomicBool::new(false),
            created_at: Instant::now(),
        }
    }

    pub fn name(&self) -> &SessionName {
        &self.name
    }

    pub fn driver(&self) -> &Arc<dyn SessionDriver> {
        &self.driver
    }

    /// Latest published status.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected()
    }

    /// A receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Ask the session to tear down.
    ///
    /// Returns `true` for the call that initiated teardown, `false` if one
    /// was already requested. Driver events still queued behind this point
    /// are discarded.
    pub fn request_teardown(&self) -> bool {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        // The task may already have finished on its own.
        let _ = self.inputs.send(SessionInput::Teardown);
        true
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Record that the session is ending on its own.
    pub(crate) fn mark_torn_down(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }

    pub(crate) fn input_sender(&self) -> mpsc::UnboundedSender<SessionInput> {
        self.inputs.clone()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("name", &self.name)
            .field("status", &*self.status.borrow())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
