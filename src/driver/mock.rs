//! In-process driver for tests and embedding.
//!
//! [`MockDriverFactory`] keeps the event sender of every driver it builds,
//! so callers can play the role of the messaging service and inject
//! events by session name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{DriverError, DriverEvent, DriverEventSender, DriverFactory, SessionDriver};
use crate::session::SessionName;

#[derive(Default)]
struct MockState {
    /// Every live sender per name, oldest first.
    senders: HashMap<SessionName, Vec<DriverEventSender>>,
    initialized: HashMap<SessionName, usize>,
    destroyed: HashMap<SessionName, usize>,
    fail_create: Option<String>,
    fail_init: Option<String>,
}

/// Factory for [`MockDriver`]s.
#[derive(Clone)]
pub struct MockDriverFactory {
    state: Arc<Mutex<MockState>>,
    auth_root: PathBuf,
}

impl MockDriverFactory {
    /// Drivers get `auth_root/<session>` as their credential directory.
    pub fn new(auth_root: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            auth_root: auth_root.into(),
        }
    }

    pub fn auth_root(&self) -> &Path {
        &self.auth_root
    }

    /// Every driver's `initialize` fails with `reason`.
    pub fn failing_init(self, reason: impl Into<String>) -> Self {
        self.lock().fail_init = Some(reason.into());
        self
    }

    /// `create` itself fails with `reason`.
    pub fn failing_create(self, reason: impl Into<String>) -> Self {
        self.lock().fail_create = Some(reason.into());
        self
    }

    /// Inject an event into the most recent driver for `name`.
    ///
    /// Returns `false` if there is no such driver or its session has ended.
    pub fn emit(&self, name: &str, event: DriverEvent) -> bool {
        self.sender(name).is_some_and(|tx| tx.send(event))
    }

    /// Event sender of the most recent driver for `name` whose session is
    /// still listening.
    ///
    /// Drivers built for a create that lost the name to an existing
    /// session are never returned once that create has failed.
    pub fn sender(&self, name: &str) -> Option<DriverEventSender> {
        let name = SessionName::new(name).ok()?;
        let state = self.lock();
        let senders = state.senders.get(&name)?;
        let sender = senders
            .iter()
            .rev()
            .find(|tx| !tx.is_closed())
            .or_else(|| senders.last())
            .cloned();
        sender
    }

    /// How many times `initialize` ran for `name`.
    pub fn init_calls(&self, name: &str) -> usize {
        let Ok(name) = SessionName::new(name) else {
            return 0;
        };
        self.lock().initialized.get(&name).copied().unwrap_or(0)
    }

    /// How many times `destroy` ran for `name`.
    pub fn destroy_calls(&self, name: &str) -> usize {
        let Ok(name) = SessionName::new(name) else {
            return 0;
        };
        self.lock().destroyed.get(&name).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockDriverFactory {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("session-hub-mock-auth"))
    }
}

impl DriverFactory for MockDriverFactory {
    fn create(
        &self,
        name: &SessionName,
        events: DriverEventSender,
    ) -> Result<Arc<dyn SessionDriver>, DriverError> {
        let mut state = self.lock();
        if let Some(reason) = &state.fail_create {
            return Err(DriverError::Init(reason.clone()));
        }
        let senders = state.senders.entry(name.clone()).or_default();
        senders.retain(|tx| !tx.is_closed());
        senders.push(events);
        drop(state);

        Ok(Arc::new(MockDriver {
            name: name.clone(),
            auth_dir: self.auth_root.join(name.as_str()),
            state: Arc::clone(&self.state),
        }))
    }
}

/// A driver that does nothing on its own.
pub struct MockDriver {
    name: SessionName,
    auth_dir: PathBuf,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SessionDriver for MockDriver {
    async fn initialize(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state.initialized.entry(self.name.clone()).or_default() += 1;
        match &state.fail_init {
            Some(reason) => Err(DriverError::Init(reason.clone())),
            None => Ok(()),
        }
    }

    async fn destroy(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state.destroyed.entry(self.name.clone()).or_default() += 1;
    }

    fn auth_dir(&self) -> &Path {
        &self.auth_dir
    }
}
