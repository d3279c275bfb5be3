//! The task that drives one session.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::{Effect, SessionHandle, SessionInput, SessionRegistry, SessionStateMachine, SessionStatus};
use crate::credentials::CredentialStore;
use crate::events::{EventBroadcaster, SessionEvent};

/// Shared services a session task needs.
#[derive(Clone)]
pub(crate) struct SessionServices {
    pub registry: Arc<SessionRegistry>,
    pub events: Arc<EventBroadcaster>,
    pub credentials: Arc<CredentialStore>,
    pub restore_credentials: bool,
}

/// Run a session until it is destroyed.
///
/// Inputs are processed strictly one at a time in arrival order. Driver
/// initialization runs on its own task and reports failure back through
/// the same input stream.
pub(crate) async fn run_session(
    handle: Arc<SessionHandle>,
    mut machine: SessionStateMachine,
    mut inputs: mpsc::UnboundedReceiver<SessionInput>,
    status: watch::Sender<SessionStatus>,
    services: SessionServices,
) {
    let name = handle.name().clone();

    if services.restore_credentials {
        services
            .credentials
            .restore(&name, handle.driver().auth_dir())
            .await;
    }

    let effects = machine.start();
    status.send_replace(machine.status());
    execute(&handle, effects, &services).await;

    let driver = Arc::clone(handle.driver());
    let init_tx = handle.input_sender();
    tokio::spawn(async move {
        if let Err(e) = driver.initialize().await {
            let _ = init_tx.send(SessionInput::InitFailed(e.to_string()));
        }
    });

    while let Some(input) = inputs.recv().await {
        if handle.is_torn_down() && input != SessionInput::Teardown {
            debug!(session = %name, ?input, "discarding input after destroy request");
            continue;
        }

        let effects = machine.apply(input);
        let terminal = machine.state().is_terminal();
        if terminal {
            handle.mark_torn_down();
        } else {
            status.send_replace(machine.status());
        }

        execute(&handle, effects, &services).await;

        // Watchers of a terminal status may rely on the driver being gone.
        if terminal {
            status.send_replace(machine.status());
            break;
        }
    }

    debug!(session = %name, "session task finished");
}

async fn execute(handle: &Arc<SessionHandle>, effects: Vec<Effect>, services: &SessionServices) {
    let name = handle.name();
    for effect in effects {
        match effect {
            Effect::Publish(event) => {
                services.events.publish(name, event);
            }
            Effect::SaveCredentials => {
                let outcome = services
                    .credentials
                    .save(name, handle.driver().auth_dir())
                    .await;
                let snapshot = services.credentials.load(name).await;
                services
                    .events
                    .publish(name, SessionEvent::Credentials { outcome, snapshot });
            }
            Effect::ReleaseDriver => {
                handle.driver().destroy().await;
                if let Err(e) = services.registry.remove_handle(handle) {
                    warn!(session = %name, "failed to unregister session: {}", e);
                }
            }
        }
    }
}
