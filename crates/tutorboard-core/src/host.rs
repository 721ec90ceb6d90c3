//! Host side of the cross-frame protocol.
//!
//! The host page embeds the board in an iframe. It answers the board's
//! `ready` with an `init` handshake, keeps re-sending the same `init`
//! periodically so a reloaded frame resynchronizes, and persists the
//! snapshots the board reports.

use crate::backend::BackendOp;
use crate::objects::ObjectSpec;
use crate::protocol::{
    Command, CommandPayload, FrameMessage, InitPayload, JumpPayload, SnapshotPayload, TargetOrigin,
    origin_of,
};
use serde_json::Value;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

#[cfg(target_arch = "wasm32")]
use web_time::Duration;

/// Period of the `init` re-send.
pub const REINIT_INTERVAL: Duration = Duration::from_secs(2);

/// Something the host runtime must do in response to a message.
#[derive(Debug, Clone, PartialEq)]
pub enum HostAction {
    /// Post a message to the embedded frame.
    Post {
        target: TargetOrigin,
        message: FrameMessage,
    },
    /// Run a backend mutation; failures are logged, never retried.
    Persist(BackendOp),
    /// A widget inside the board failed. Informational only.
    WidgetFailed { error: String, info: Value },
}

/// Host-side protocol state.
#[derive(Debug, Clone, Default)]
pub struct HostBridge {
    session_id: Option<String>,
    sandbox_url: Option<String>,
    backend_url: Option<String>,
    token: Option<String>,
}

impl HostBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_session(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
    }

    /// The URL the board is served from; `None` once it goes away.
    pub fn set_sandbox_url(&mut self, url: Option<String>) {
        self.sandbox_url = url;
    }

    pub fn set_backend(&mut self, backend_url: Option<String>, token: Option<String>) {
        self.backend_url = backend_url;
        self.token = token;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn sandbox_url(&self) -> Option<&str> {
        self.sandbox_url.as_deref()
    }

    /// Origin of the embedded frame, derived from the sandbox URL.
    pub fn frame_origin(&self) -> Option<String> {
        self.sandbox_url.as_deref().and_then(origin_of)
    }

    /// Handle an inbound message sent from `origin`.
    ///
    /// Only the embedded frame's origin is trusted, so nothing is accepted
    /// until the sandbox URL is known.
    pub fn handle_message(&mut self, origin: &str, raw: &Value) -> Vec<HostAction> {
        match self.frame_origin() {
            Some(frame) if frame == origin => {}
            Some(frame) => {
                log::debug!("Dropping message from {}: board is {}", origin, frame);
                return Vec::new();
            }
            None => {
                log::debug!("Dropping message from {}: board origin unknown", origin);
                return Vec::new();
            }
        }

        let message = match FrameMessage::parse(raw) {
            Ok(Some(message)) => message,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::warn!("Dropping board message: {}", e);
                return Vec::new();
            }
        };

        match message {
            FrameMessage::Ready => match self.handshake() {
                Some(action) => vec![action],
                None => {
                    log::warn!("Board is ready but the session context is incomplete");
                    Vec::new()
                }
            },
            FrameMessage::Snapshot(SnapshotPayload { index, objects }) => {
                match &self.session_id {
                    Some(session_id) => vec![HostAction::Persist(BackendOp::InsertSnapshot {
                        session_id: session_id.clone(),
                        index,
                        objects,
                    })],
                    None => {
                        log::warn!("Dropping snapshot {}: no session", index);
                        Vec::new()
                    }
                }
            }
            FrameMessage::WidgetError(payload) => {
                log::warn!("Board widget error: {}", payload.error);
                vec![HostAction::WidgetFailed {
                    error: payload.error,
                    info: payload.info,
                }]
            }
            other => {
                log::debug!("Ignoring host-bound {} message", other.kind());
                Vec::new()
            }
        }
    }

    /// Whether the periodic re-init should be running.
    pub fn reinit_ready(&self) -> bool {
        self.sandbox_url.is_some() && self.backend_url.is_some() && self.session_id.is_some()
    }

    /// The periodic `init` re-send. `None` when the timer should be stopped.
    pub fn reinit_message(&self) -> Option<HostAction> {
        if !self.reinit_ready() {
            return None;
        }
        self.handshake()
    }

    /// Forward an undo/redo/zoom command to the board.
    pub fn command(&self, command: Command) -> Option<HostAction> {
        self.post(FrameMessage::Command(CommandPayload::new(command)))
    }

    /// Ask the board to show a historical object list read-only.
    pub fn jump(&self, index: Option<u64>, objects: Vec<ObjectSpec>) -> Option<HostAction> {
        self.post(FrameMessage::Jump(JumpPayload { index, objects }))
    }

    fn post(&self, message: FrameMessage) -> Option<HostAction> {
        let Some(origin) = self.frame_origin() else {
            log::warn!("Cannot derive the board origin; not sending {}", message.kind());
            return None;
        };
        Some(HostAction::Post {
            target: TargetOrigin::Exact(origin),
            message,
        })
    }

    fn init_payload(&self) -> Option<InitPayload> {
        Some(InitPayload {
            session_id: self.session_id.clone()?,
            convex_url: Some(self.backend_url.clone()?),
            token: self.token.clone(),
        })
    }

    fn handshake(&self) -> Option<HostAction> {
        let payload = self.init_payload()?;
        self.post(FrameMessage::Init(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PROTOCOL_NS;
    use serde_json::json;

    fn bridge() -> HostBridge {
        let mut bridge = HostBridge::new();
        bridge.set_session(Some("s1".to_string()));
        bridge.set_sandbox_url(Some("https://sbx-1.example.com/board".to_string()));
        bridge.set_backend(Some("https://db.example".to_string()), Some("tok".to_string()));
        bridge
    }

    const FRAME: &str = "https://sbx-1.example.com";

    fn envelope(kind: &str, payload: Value) -> Value {
        json!({ "ns": PROTOCOL_NS, "v": 1, "type": kind, "payload": payload })
    }

    #[test]
    fn test_ready_gets_origin_restricted_init() {
        let mut bridge = bridge();
        let actions = bridge.handle_message(FRAME, &json!({ "ns": PROTOCOL_NS, "v": 1, "type": "ready" }));
        assert_eq!(
            actions,
            vec![HostAction::Post {
                target: TargetOrigin::Exact("https://sbx-1.example.com".to_string()),
                message: FrameMessage::Init(InitPayload {
                    session_id: "s1".to_string(),
                    convex_url: Some("https://db.example".to_string()),
                    token: Some("tok".to_string()),
                }),
            }]
        );
    }

    #[test]
    fn test_foreign_messages_have_no_effect() {
        let mut bridge = bridge();
        let raw = json!({ "ns": "devtools", "type": "ready" });
        assert!(bridge.handle_message(FRAME, &raw).is_empty());
        let raw = json!({ "ns": "devtools", "type": "snapshot", "payload": { "index": 1, "objects": [] } });
        assert!(bridge.handle_message(FRAME, &raw).is_empty());
    }

    #[test]
    fn test_snapshot_is_persisted() {
        let mut bridge = bridge();
        let actions = bridge.handle_message(FRAME, &envelope("snapshot", json!({ "index": 4, "objects": [] })));
        assert_eq!(
            actions,
            vec![HostAction::Persist(BackendOp::InsertSnapshot {
                session_id: "s1".to_string(),
                index: 4,
                objects: vec![],
            })]
        );
    }

    #[test]
    fn test_snapshot_without_session_is_dropped() {
        let mut bridge = bridge();
        bridge.set_session(None);
        let actions = bridge.handle_message(FRAME, &envelope("snapshot", json!({ "index": 4, "objects": [] })));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_messages_need_the_frame_origin() {
        let snapshot = envelope("snapshot", json!({ "index": 1, "objects": [] }));

        let mut bridge = bridge();
        assert!(bridge.handle_message("https://evil.test", &snapshot).is_empty());

        bridge.set_sandbox_url(None);
        assert!(bridge.handle_message(FRAME, &snapshot).is_empty());
        assert!(bridge.handle_message("https://evil.test", &snapshot).is_empty());

        bridge.set_sandbox_url(Some(format!("{FRAME}/board")));
        assert_eq!(bridge.handle_message(FRAME, &snapshot).len(), 1);
    }

    #[test]
    fn test_widget_error_is_surfaced() {
        let mut bridge = bridge();
        let actions = bridge.handle_message(FRAME, &envelope(
            "widget-error",
            json!({ "error": "boom", "info": { "objectId": "w1" } }),
        ));
        assert!(matches!(&actions[..], [HostAction::WidgetFailed { error, .. }] if error == "boom"));
    }

    #[test]
    fn test_reinit_requires_all_inputs() {
        let mut bridge = bridge();
        assert!(bridge.reinit_ready());
        assert!(bridge.reinit_message().is_some());

        bridge.set_sandbox_url(None);
        assert!(!bridge.reinit_ready());
        assert!(bridge.reinit_message().is_none());

        let mut bridge = self::bridge();
        bridge.set_backend(None, None);
        assert!(bridge.reinit_message().is_none());

        let mut bridge = self::bridge();
        bridge.set_session(None);
        assert!(bridge.reinit_message().is_none());
    }

    #[test]
    fn test_commands_and_jumps_target_the_frame() {
        let bridge = bridge();
        let target = TargetOrigin::Exact("https://sbx-1.example.com".to_string());

        assert_eq!(
            bridge.command(Command::SetZoom(1.5)),
            Some(HostAction::Post {
                target: target.clone(),
                message: FrameMessage::Command(CommandPayload::new(Command::SetZoom(1.5))),
            })
        );
        assert_eq!(
            bridge.jump(Some(2), vec![]),
            Some(HostAction::Post {
                target,
                message: FrameMessage::Jump(JumpPayload {
                    index: Some(2),
                    objects: vec![],
                }),
            })
        );

        let mut bridge = self::bridge();
        bridge.set_sandbox_url(None);
        assert_eq!(bridge.command(Command::Undo), None);
    }

    #[test]
    fn test_board_bound_messages_are_ignored() {
        let mut bridge = bridge();
        let actions = bridge.handle_message(FRAME, &envelope("command", json!({ "action": "undo" })));
        assert!(actions.is_empty());
    }
}
