//! Sandbox lifecycle controller.
//!
//! Owns the [`SandboxSession`] of one whiteboard session and publishes it on
//! a watch channel. Only the controller mutates the session; consumers such
//! as the host bridge subscribe to it.

use crate::launcher::{LaunchError, SandboxLauncher};
use crate::probe::{HealthCheck, HealthProber, ProbeError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tutorboard_core::session::{
    SandboxSession, SandboxStatus, SessionError, SessionRecord, StartPath,
};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

pub struct SandboxController<L, C> {
    launcher: L,
    prober: HealthProber<C>,
    state: watch::Sender<SandboxSession>,
}

impl<L: SandboxLauncher, C: HealthCheck> SandboxController<L, C> {
    /// Controller for the session described by `record`, starting idle.
    pub fn new(record: &SessionRecord, launcher: L, prober: HealthProber<C>) -> Self {
        let (state, _) = watch::channel(SandboxSession::from_record(record));
        Self {
            launcher,
            prober,
            state,
        }
    }

    pub fn status(&self) -> SandboxStatus {
        self.state.borrow().status
    }

    /// Current session snapshot.
    pub fn session(&self) -> SandboxSession {
        self.state.borrow().clone()
    }

    /// Observe session changes.
    pub fn subscribe(&self) -> watch::Receiver<SandboxSession> {
        self.state.subscribe()
    }

    /// Bring the sandbox up and return its URL.
    ///
    /// Only proceeds from `Idle`; concurrent or repeated calls are refused
    /// with [`SessionError::InvalidTransition`] and leave the state alone.
    pub async fn start(&self) -> Result<String, ControllerError> {
        let mut begun = Ok(StartPath::Launch);
        self.state.send_if_modified(|session| {
            begun = session.begin();
            begun.is_ok()
        });
        let path = begun?;

        let session_id = self.state.borrow().id.clone();
        let (url, reattached) = match path {
            StartPath::Launch => match self.launcher.launch(&session_id).await {
                Ok(url) => (url, false),
                Err(e) => {
                    error!("Launching sandbox for session {} failed: {}", session_id, e);
                    self.fail();
                    return Err(e.into());
                }
            },
            StartPath::Reattach(url) => {
                info!("Reattaching session {} to {}", session_id, url);
                (url, true)
            }
        };

        if let Err(e) = self.prober.wait_until_ready(&url).await {
            if reattached {
                warn!("Existing sandbox {} for session {} never became healthy", url, session_id);
            } else {
                error!("Sandbox {} for session {} never became healthy", url, session_id);
            }
            self.fail();
            return Err(e.into());
        }

        let mut published = Ok(());
        self.state.send_modify(|session| published = session.mark_ready(url.clone()));
        published?;
        info!("Sandbox for session {} is ready at {}", session_id, url);
        Ok(url)
    }

    /// Return from `Ready` or `Error` to `Idle` so `start` may run again.
    pub fn reset(&self) -> Result<(), ControllerError> {
        let mut result = Ok(());
        self.state.send_if_modified(|session| {
            let before = session.status;
            result = session.reset();
            session.status != before
        });
        Ok(result?)
    }

    fn fail(&self) {
        self.state.send_modify(|session| {
            if let Err(e) = session.mark_failed() {
                warn!("Could not mark session {} failed: {}", session.id, e);
            }
        });
    }
}
