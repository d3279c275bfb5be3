//! Session lifecycle state machine.

use serde::Serialize;

/// Represents the lifecycle state of a paired session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session has been registered but the driver has not started.
    #[default]
    Created,
    /// Driver is initializing and issuing QR codes.
    Pairing,
    /// Driver reported ready; messages flow.
    Connected,
    /// Connection was lost or rejected; teardown follows.
    Disconnected,
    /// Driver released and session removed. Terminal.
    Destroyed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Created -> Pairing
    /// - Created -> Destroyed
    /// - Pairing -> Connected
    /// - Pairing -> Disconnected
    /// - Pairing -> Destroyed
    /// - Connected -> Disconnected
    /// - Disconnected -> Destroyed
    ///
    /// Connected never goes straight to Destroyed.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Created, Pairing)
                | (Created, Destroyed)
                | (Pairing, Connected)
                | (Pairing, Disconnected)
                | (Pairing, Destroyed)
                | (Connected, Disconnected)
                | (Disconnected, Destroyed)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::HubError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Destroyed)
    }

    /// Check if the session is connected to the messaging service.
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}
