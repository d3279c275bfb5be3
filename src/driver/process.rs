//! Driver backed by an external bridge process.
//!
//! The bridge is started once per session with the session name and its
//! credential directory in the environment. It reports events as
//! line-delimited JSON on stdout (see [`DriverEvent`]). Anything it writes
//! to stderr is passed through.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{DriverError, DriverEvent, DriverEventSender, DriverFactory, SessionDriver};
use crate::session::SessionName;

/// Environment variable carrying the session name.
pub const ENV_SESSION: &str = "SESSION_HUB_SESSION";
/// Environment variable carrying the credential directory.
pub const ENV_AUTH_DIR: &str = "SESSION_HUB_AUTH_DIR";

/// Creates a [`ProcessDriver`] per session.
#[derive(Debug, Clone)]
pub struct ProcessDriverFactory {
    command: String,
    args: Vec<String>,
    auth_root: PathBuf,
}

impl ProcessDriverFactory {
    /// `auth_root/<session>` becomes each driver's credential directory.
    pub fn new(command: impl Into<String>, args: Vec<String>, auth_root: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args,
            auth_root: auth_root.into(),
        }
    }
}

impl DriverFactory for ProcessDriverFactory {
    fn create(
        &self,
        name: &SessionName,
        events: DriverEventSender,
    ) -> Result<Arc<dyn SessionDriver>, DriverError> {
        Ok(Arc::new(ProcessDriver {
            session: name.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            auth_dir: self.auth_root.join(name.as_str()),
            events,
            child: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }))
    }
}

/// A session driver running as a child process.
pub struct ProcessDriver {
    session: SessionName,
    command: String,
    args: Vec<String>,
    auth_dir: PathBuf,
    events: DriverEventSender,
    child: Mutex<Option<Child>>,
    destroyed: AtomicBool,
}

#[async_trait]
impl SessionDriver for ProcessDriver {
    async fn initialize(&self) -> Result<(), DriverError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DriverError::Destroyed);
        }

        tokio::fs::create_dir_all(&self.auth_dir).await?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env(ENV_SESSION, self.session.as_str())
            .env(ENV_AUTH_DIR, &self.auth_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Init("driver stdout unavailable".into()))?;

        let mut slot = self.child.lock().await;
        // destroy() may have run while we were spawning.
        if self.destroyed.load(Ordering::SeqCst) {
            let _ = child.start_kill();
            return Err(DriverError::Destroyed);
        }
        info!(session = %self.session, pid = ?child.id(), "driver process started");
        *slot = Some(child);
        drop(slot);

        tokio::spawn(pump_events(
            self.session.clone(),
            stdout,
            self.events.clone(),
        ));
        Ok(())
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill().await {
                warn!(session = %self.session, "failed to kill driver process: {}", e);
            } else {
                debug!(session = %self.session, "driver process stopped");
            }
        }
    }

    fn auth_dir(&self) -> &Path {
        &self.auth_dir
    }
}

/// Forward stdout events until the process closes its output.
async fn pump_events(session: SessionName, stdout: ChildStdout, events: DriverEventSender) {
    let mut lines = BufReader::new(stdout).lines();
    let mut ready = false;
    let mut finished = false;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(session = %session, "driver output error: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<DriverEvent>(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(session = %session, "skipping unparseable driver line: {}", e);
                continue;
            }
        };

        match &event {
            DriverEvent::Ready { .. } => ready = true,
            DriverEvent::AuthFailure { .. } | DriverEvent::Disconnected { .. } => finished = true,
            _ => {}
        }

        if !events.send(event) {
            debug!(session = %session, "session stopped listening to driver");
            return;
        }
    }

    if finished {
        return;
    }
    if ready {
        events.send(DriverEvent::Disconnected {
            reason: "driver exited".into(),
        });
    } else {
        events.init_failed("driver exited before ready");
    }
}
