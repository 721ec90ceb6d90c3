//! Sandbox session state machine.
//!
//! ```text
//!   idle --begin--> starting --mark_ready--> ready
//!                       |                      |
//!                       +--mark_failed--> error|
//!                                          |   |
//!   idle <-------------- reset ------------+---+
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of a sandbox session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    #[default]
    Idle,
    Starting,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Cannot {action} while {from:?}")]
    InvalidTransition {
        from: SandboxStatus,
        action: &'static str,
    },
}

/// Session record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_url: Option<String>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sandbox_url: None,
        }
    }

    pub fn with_sandbox_url(mut self, url: impl Into<String>) -> Self {
        self.sandbox_url = Some(url.into());
        self
    }
}

/// How a start attempt reaches a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPath {
    /// No sandbox yet: launch one.
    Launch,
    /// The session already points at a sandbox: probe it.
    Reattach(String),
}

/// A sandbox session as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSession {
    pub id: String,
    pub url: Option<String>,
    pub status: SandboxStatus,
}

impl SandboxSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
            status: SandboxStatus::Idle,
        }
    }

    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            url: record.sandbox_url.clone(),
            status: SandboxStatus::Idle,
        }
    }

    /// Idle -> Starting. Refuses when an attempt is already running or done.
    pub fn begin(&mut self) -> Result<StartPath, SessionError> {
        if self.status != SandboxStatus::Idle {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                action: "begin",
            });
        }
        self.status = SandboxStatus::Starting;
        Ok(match &self.url {
            Some(url) => StartPath::Reattach(url.clone()),
            None => StartPath::Launch,
        })
    }

    /// Starting -> Ready, publishing the reachable URL.
    pub fn mark_ready(&mut self, url: impl Into<String>) -> Result<(), SessionError> {
        self.expect(SandboxStatus::Starting, "mark ready")?;
        self.url = Some(url.into());
        self.status = SandboxStatus::Ready;
        Ok(())
    }

    /// Starting -> Error.
    pub fn mark_failed(&mut self) -> Result<(), SessionError> {
        self.expect(SandboxStatus::Starting, "mark failed")?;
        self.status = SandboxStatus::Error;
        Ok(())
    }

    /// Ready/Error -> Idle. Idle stays idle.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if self.status == SandboxStatus::Starting {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                action: "reset",
            });
        }
        self.status = SandboxStatus::Idle;
        Ok(())
    }

    /// URL consumers may connect to, only once the sandbox is ready.
    pub fn ready_url(&self) -> Option<&str> {
        match self.status {
            SandboxStatus::Ready => self.url.as_deref(),
            _ => None,
        }
    }

    fn expect(&self, status: SandboxStatus, action: &'static str) -> Result<(), SessionError> {
        if self.status == status {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_path() {
        let mut session = SandboxSession::new("s1");
        assert_eq!(session.begin().unwrap(), StartPath::Launch);
        assert_eq!(session.status, SandboxStatus::Starting);
        assert_eq!(session.ready_url(), None);

        session.mark_ready("https://sbx.example").unwrap();
        assert_eq!(session.status, SandboxStatus::Ready);
        assert_eq!(session.ready_url(), Some("https://sbx.example"));
    }

    #[test]
    fn test_reattach_path() {
        let record = SessionRecord::new("s1").with_sandbox_url("https://old.example");
        let mut session = SandboxSession::from_record(&record);
        assert_eq!(
            session.begin().unwrap(),
            StartPath::Reattach("https://old.example".to_string())
        );
    }

    #[test]
    fn test_begin_only_from_idle() {
        let mut session = SandboxSession::new("s1");
        session.begin().unwrap();
        assert!(session.begin().is_err());

        session.mark_failed().unwrap();
        assert!(session.begin().is_err());

        session.reset().unwrap();
        assert_eq!(session.status, SandboxStatus::Idle);
        assert!(session.begin().is_ok());
    }

    #[test]
    fn test_reset_refused_while_starting() {
        let mut session = SandboxSession::new("s1");
        session.begin().unwrap();
        assert!(session.reset().is_err());
    }

    #[test]
    fn test_terminal_transitions_need_starting() {
        let mut session = SandboxSession::new("s1");
        assert!(session.mark_ready("https://x").is_err());
        assert!(session.mark_failed().is_err());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&SandboxStatus::Starting).unwrap(), "\"starting\"");
    }
}
