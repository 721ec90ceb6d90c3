//! Cross-frame message protocol.
//!
//! Host page and embedded board talk over the browser's shared `postMessage`
//! channel. Every message is wrapped in an envelope:
//!
//! ```json
//! { "ns": "ai-tutor/wb", "v": 1, "type": "init", "payload": { ... } }
//! ```
//!
//! The `ns` tag discriminates this protocol from every other consumer of the
//! channel. Envelopes with a foreign (or missing) namespace are invisible.

use crate::objects::{ObjectSpec, deserialize_object_list};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

/// Namespace tag carried by every envelope.
pub const PROTOCOL_NS: &str = "ai-tutor/wb";

/// Protocol version carried by every envelope.
pub const PROTOCOL_VERSION: u64 = 1;

/// Zoom factor applied when `setZoom` arrives without an argument.
pub const DEFAULT_ZOOM: f64 = 1.0;

/// Protocol errors for envelopes that carry our namespace but are unusable.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u64),
    #[error("Envelope has no message type")]
    MissingType,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unknown command action: {0}")]
    UnknownAction(String),
}

/// Handshake reply from host to board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub session_id: String,
    /// Backend connection URL. Optional on the wire; a missing value makes
    /// the message unusable on the receiving side.
    #[serde(default)]
    pub convex_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Board state pushed to the host for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub index: u64,
    #[serde(deserialize_with = "deserialize_object_list")]
    pub objects: Vec<ObjectSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
}

/// Imperative command from host to board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<CommandArgs>,
}

/// Parsed command action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Undo,
    Redo,
    SetZoom(f64),
}

impl CommandPayload {
    pub fn new(command: Command) -> Self {
        match command {
            Command::Undo => Self {
                action: "undo".to_string(),
                args: None,
            },
            Command::Redo => Self {
                action: "redo".to_string(),
                args: None,
            },
            Command::SetZoom(zoom) => Self {
                action: "setZoom".to_string(),
                args: Some(CommandArgs { zoom: Some(zoom) }),
            },
        }
    }

    /// Resolve the action name into a [`Command`].
    pub fn command(&self) -> Result<Command, ProtocolError> {
        match self.action.as_str() {
            "undo" => Ok(Command::Undo),
            "redo" => Ok(Command::Redo),
            "setZoom" => {
                let zoom = self
                    .args
                    .as_ref()
                    .and_then(|args| args.zoom)
                    .unwrap_or(DEFAULT_ZOOM);
                Ok(Command::SetZoom(zoom))
            }
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }
}

/// Request to show a historical object set in read-only mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(deserialize_with = "deserialize_object_list")]
    pub objects: Vec<ObjectSpec>,
}

/// A widget failed to load or render inside the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetErrorPayload {
    pub error: String,
    #[serde(default)]
    pub info: Value,
}

/// Messages of the `ai-tutor/wb` protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameMessage {
    /// Board -> host: the board is listening.
    Ready,
    /// Host -> board: session context.
    Init(InitPayload),
    /// Board -> host: current object list.
    Snapshot(SnapshotPayload),
    /// Host -> board: undo/redo/zoom.
    Command(CommandPayload),
    /// Host -> board: show a historical state.
    Jump(JumpPayload),
    /// Board -> host: a widget failed.
    WidgetError(WidgetErrorPayload),
}

impl FrameMessage {
    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameMessage::Ready => "ready",
            FrameMessage::Init(_) => "init",
            FrameMessage::Snapshot(_) => "snapshot",
            FrameMessage::Command(_) => "command",
            FrameMessage::Jump(_) => "jump",
            FrameMessage::WidgetError(_) => "widget-error",
        }
    }

    /// Build the wire envelope for this message.
    pub fn to_envelope(&self) -> Value {
        let payload = match self {
            FrameMessage::Ready => Value::Null,
            FrameMessage::Init(p) => json!(p),
            FrameMessage::Snapshot(p) => json!(p),
            FrameMessage::Command(p) => json!(p),
            FrameMessage::Jump(p) => json!(p),
            FrameMessage::WidgetError(p) => json!(p),
        };

        let mut envelope = json!({
            "ns": PROTOCOL_NS,
            "v": PROTOCOL_VERSION,
            "type": self.kind(),
        });
        if !payload.is_null() {
            envelope["payload"] = payload;
        }
        envelope
    }

    /// Serialize the envelope to a JSON string.
    pub fn to_json(&self) -> String {
        self.to_envelope().to_string()
    }

    /// Parse an inbound envelope.
    ///
    /// Returns `Ok(None)` when the value is not one of ours (wrong namespace,
    /// not an object). Those must produce no side effects at all.
    pub fn parse(raw: &Value) -> Result<Option<Self>, ProtocolError> {
        if raw.get("ns").and_then(Value::as_str) != Some(PROTOCOL_NS) {
            return Ok(None);
        }

        if let Some(version) = raw.get("v").and_then(Value::as_u64) {
            if version != PROTOCOL_VERSION {
                return Err(ProtocolError::UnsupportedVersion(version));
            }
        }

        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        let payload = raw.get("payload").cloned().unwrap_or(Value::Null);

        let message = match kind {
            "ready" => FrameMessage::Ready,
            "init" => FrameMessage::Init(decode("init", payload)?),
            "snapshot" => FrameMessage::Snapshot(decode("snapshot", payload)?),
            "command" => FrameMessage::Command(decode("command", payload)?),
            "jump" => FrameMessage::Jump(decode("jump", payload)?),
            "widget-error" => FrameMessage::WidgetError(decode("widget-error", payload)?),
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(Some(message))
    }

    /// Parse an envelope from a JSON string. Non-JSON input is treated like a
    /// foreign message.
    pub fn parse_str(raw: &str) -> Result<Option<Self>, ProtocolError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::parse(&value),
            Err(_) => Ok(None),
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(kind: &'static str, payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Target origin for an outbound `postMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    /// Deliver only if the receiving window has exactly this origin.
    Exact(String),
    /// Deliver to any origin (`"*"`).
    Any,
}

impl TargetOrigin {
    /// The string handed to `postMessage`.
    pub fn as_str(&self) -> &str {
        match self {
            TargetOrigin::Exact(origin) => origin,
            TargetOrigin::Any => "*",
        }
    }
}

/// Derive the serialized origin (`scheme://host[:port]`) of a URL.
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let origin = parsed.origin();
    if origin.is_tuple() {
        Some(origin.ascii_serialization())
    } else {
        None
    }
}
