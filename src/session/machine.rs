//! Per-session pairing and connection state machine.
//!
//! The machine is a plain synchronous transition function: it consumes one
//! [`SessionInput`] at a time and returns the [`Effect`]s the session task
//! must carry out, in order. Keeping I/O out of here lets every transition
//! be tested without a runtime.

use tracing::{debug, info, warn};

use super::{PairingThrottle, SessionName, SessionState, SessionStatus};
use crate::driver::DriverEvent;
use crate::events::{SessionEvent, REASON_ATTEMPT_LIMIT, REASON_AUTH_FAILURE, REASON_DESTROYED};

/// Everything a session task consumes, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Event emitted by the driver.
    Driver(DriverEvent),
    /// Driver initialization failed in the background.
    InitFailed(String),
    /// External destroy request.
    Teardown,
}

/// Work the session task performs after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver an event to the session's subscribers.
    Publish(SessionEvent),
    /// Persist the driver's credential tree and publish the result.
    SaveCredentials,
    /// Destroy the driver and drop the session from the registry.
    ReleaseDriver,
}

/// Lifecycle of one session.
#[derive(Debug)]
pub struct SessionStateMachine {
    name: SessionName,
    state: SessionState,
    attempts: u32,
    qr: Option<String>,
    throttle: PairingThrottle,
}

impl SessionStateMachine {
    pub fn new(name: SessionName, throttle: PairingThrottle) -> Self {
        Self {
            name,
            state: SessionState::Created,
            attempts: 0,
            qr: None,
            throttle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            attempts: self.attempts,
            qr: self.qr.clone(),
        }
    }

    /// Driver initialization is starting.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.state != SessionState::Created {
            return Vec::new();
        }
        self.enter(SessionState::Pairing);
        self.attempts = 0;
        self.qr = None;
        info!(session = %self.name, "pairing started");
        Vec::new()
    }

    /// Advance the machine by one input.
    pub fn apply(&mut self, input: SessionInput) -> Vec<Effect> {
        if self.state.is_terminal() {
            debug!(session = %self.name, ?input, "discarding input after destroy");
            return Vec::new();
        }

        match input {
            SessionInput::Driver(event) => self.on_driver_event(event),
            SessionInput::InitFailed(reason) => self.on_init_failed(reason),
            SessionInput::Teardown => self.on_teardown(),
        }
    }

    fn on_driver_event(&mut self, event: DriverEvent) -> Vec<Effect> {
        match (self.state, event) {
            (SessionState::Pairing, DriverEvent::Qr { payload }) => self.on_qr(payload),
            (SessionState::Pairing, DriverEvent::Ready { info }) => {
                self.enter(SessionState::Connected);
                self.qr = None;
                info!(session = %self.name, attempts = self.attempts, "session connected");
                vec![
                    Effect::Publish(SessionEvent::Connected { info }),
                    Effect::SaveCredentials,
                ]
            }
            (SessionState::Connected, DriverEvent::Message { from, body }) => {
                vec![Effect::Publish(SessionEvent::Message { from, body })]
            }
            (SessionState::Pairing | SessionState::Connected, DriverEvent::AuthFailure { reason }) => {
                warn!(session = %self.name, %reason, "authentication failed");
                self.enter(SessionState::Disconnected);
                let mut effects = vec![
                    Effect::Publish(SessionEvent::AuthFailure { reason }),
                    Effect::Publish(SessionEvent::disconnected(REASON_AUTH_FAILURE)),
                ];
                effects.extend(self.finish(REASON_AUTH_FAILURE));
                effects
            }
            (
                SessionState::Pairing | SessionState::Connected,
                DriverEvent::Disconnected { reason },
            ) => {
                info!(session = %self.name, %reason, "session disconnected");
                self.enter(SessionState::Disconnected);
                let mut effects = vec![Effect::Publish(SessionEvent::disconnected(reason.clone()))];
                effects.extend(self.finish(&reason));
                effects
            }
            (state, event) => {
                debug!(session = %self.name, ?state, ?event, "discarding out-of-phase driver event");
                Vec::new()
            }
        }
    }

    fn on_qr(&mut self, payload: String) -> Vec<Effect> {
        self.attempts += 1;
        self.qr = Some(payload.clone());
        debug!(session = %self.name, attempt = self.attempts, "QR code issued");

        let mut effects = vec![Effect::Publish(SessionEvent::Qr {
            attempt: self.attempts,
            payload,
        })];

        if !self.throttle.should_continue(self.attempts) {
            warn!(
                session = %self.name,
                attempts = self.attempts,
                threshold = self.throttle.threshold(),
                "pairing attempts exhausted"
            );
            effects.push(Effect::Publish(SessionEvent::disconnected(
                REASON_ATTEMPT_LIMIT,
            )));
            effects.extend(self.finish(REASON_ATTEMPT_LIMIT));
        }
        effects
    }

    fn on_init_failed(&mut self, reason: String) -> Vec<Effect> {
        match self.state {
            SessionState::Created | SessionState::Pairing => {
                warn!(session = %self.name, %reason, "driver initialization failed");
                self.finish(&format!("driver-init-failed: {reason}"))
            }
            state => {
                debug!(session = %self.name, ?state, %reason, "ignoring late init failure");
                Vec::new()
            }
        }
    }

    fn on_teardown(&mut self) -> Vec<Effect> {
        info!(session = %self.name, state = ?self.state, "destroy requested");
        let mut effects = Vec::new();
        if self.state == SessionState::Connected {
            self.enter(SessionState::Disconnected);
            effects.push(Effect::Publish(SessionEvent::disconnected(REASON_DESTROYED)));
        }
        effects.extend(self.finish(REASON_DESTROYED));
        effects
    }

    /// Move to Destroyed and clear pairing state.
    fn finish(&mut self, reason: &str) -> Vec<Effect> {
        self.enter(SessionState::Destroyed);
        self.attempts = 0;
        self.qr = None;
        vec![
            Effect::ReleaseDriver,
            Effect::Publish(SessionEvent::ended(reason)),
        ]
    }

    fn enter(&mut self, target: SessionState) {
        if let Err(e) = self.state.transition_to(target) {
            warn!(session = %self.name, "{}", e);
        }
    }
}
