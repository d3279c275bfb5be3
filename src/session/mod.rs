//! Session management module.
//!
//! This module provides the pieces of a session's lifecycle: naming,
//! states, the QR attempt throttle, the per-session state machine and the
//! task that runs it, and the registry of live sessions.

mod handle;
mod machine;
mod name;
mod registry;
pub(crate) mod runner;
mod state;
mod throttle;

pub use handle::{SessionHandle, SessionStatus};
pub use machine::{Effect, SessionInput, SessionStateMachine};
pub use name::{SessionName, MAX_NAME_LEN};
pub use registry::{SessionRegistry, SessionSummary};
pub use state::SessionState;
pub use throttle::PairingThrottle;
