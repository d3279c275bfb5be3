//! # session-hub
//!
//! Multi-session QR pairing manager for messaging automation drivers.
//!
//! Each named session wraps one driver instance that pairs with a
//! messaging service by showing QR codes. The hub tracks every session's
//! lifecycle, limits how many QR codes a session may issue, persists the
//! driver's credential files once pairing succeeds, and fans lifecycle
//! events out to subscribers.
//!
//! ## Features
//!
//! - **Independent sessions**: one task and one ordered event stream per session
//! - **Pairing throttle**: sessions are destroyed after too many QR codes
//! - **Credential persistence**: typed, per-file save results and snapshots
//! - **Pluggable drivers**: external processes speaking JSON lines, or an
//!   in-process mock for tests
//! - **HTTP and WebSocket API** built on axum
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use session_hub::driver::{DriverEvent, MockDriverFactory};
//! use session_hub::hub::{HubConfig, SessionHub};
//!
//! #[tokio::main]
//! async fn main() -> session_hub::Result<()> {
//!     session_hub::logging::try_init().ok();
//!
//!     let driver = MockDriverFactory::default();
//!     let hub = SessionHub::new(HubConfig::new(3, "./sessions"), Arc::new(driver.clone()));
//!
//!     let mut events = hub.subscribe("alice")?;
//!     hub.create_session("alice")?;
//!     driver.emit("alice", DriverEvent::Qr { payload: "2@abc".into() });
//!
//!     if let Some(event) = events.receiver.recv().await {
//!         println!("alice: {:?}", event);
//!     }
//!
//!     hub.destroy_session("alice")
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod events;
pub mod hub;
pub mod logging;
pub mod session;

// Re-export commonly used types
pub use credentials::{CredentialEntry, CredentialSnapshot, CredentialStore, SaveOutcome};
pub use driver::{DriverEvent, DriverFactory, SessionDriver};
pub use error::{HubError, Result};
pub use events::{EventBroadcaster, SessionEvent};
pub use hub::{HubConfig, SessionHub, StatusReport};
pub use session::{PairingThrottle, SessionName, SessionRegistry, SessionState};
