//! Registry of live sessions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use super::{SessionHandle, SessionName};
use crate::error::HubError;
use crate::Result;

/// Brief session summary for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub name: String,
    pub connected: bool,
}

/// Thread-safe mapping from session name to handle.
///
/// The write lock is only taken to insert or remove entries; per-session
/// state lives behind each handle.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionName, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a handle unless its name is already taken.
    ///
    /// The check and the insert happen under one write lock.
    pub fn register(&self, handle: Arc<SessionHandle>) -> Result<Arc<SessionHandle>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| HubError::LockPoisoned)?;

        if sessions.contains_key(handle.name()) {
            return Err(HubError::AlreadyExists(handle.name().to_string()));
        }
        sessions.insert(handle.name().clone(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Get the handle registered under `name`.
    pub fn get(&self, name: &SessionName) -> Result<Arc<SessionHandle>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| HubError::LockPoisoned)?;
        sessions
            .get(name)
            .cloned()
            .ok_or_else(|| HubError::NotFound(name.to_string()))
    }

    /// Check if a session exists.
    pub fn contains(&self, name: &SessionName) -> Result<bool> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| HubError::LockPoisoned)?;
        Ok(sessions.contains_key(name))
    }

    /// Remove a session from the registry.
    ///
    /// Returns the removed handle, or None if it didn't exist.
    pub fn remove(&self, name: &SessionName) -> Result<Option<Arc<SessionHandle>>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| HubError::LockPoisoned)?;
        Ok(sessions.remove(name))
    }

    /// Remove `handle`, but only if it is still the one registered under
    /// its name. A successor created under the same name is left alone.
    pub fn remove_handle(&self, handle: &Arc<SessionHandle>) -> Result<bool> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| HubError::LockPoisoned)?;

        match sessions.get(handle.name()) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                sessions.remove(handle.name());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Get the number of sessions in the registry.
    pub fn count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Snapshot of `(name, connected)` for every session, sorted by name.
    ///
    /// Sessions already being torn down are left out.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries: Vec<_> = self
            .handles()?
            .into_iter()
            .filter(|h| !h.is_torn_down())
            .map(|h| SessionSummary {
                name: h.name().to_string(),
                connected: h.is_connected(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Snapshot of all registered handles.
    pub fn handles(&self) -> Result<Vec<Arc<SessionHandle>>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| HubError::LockPoisoned)?;
        Ok(sessions.values().cloned().collect())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
