//! Tutorboard Core Library
//!
//! Platform-agnostic data model, cross-frame protocol, history and canvas
//! sync for the Tutorboard whiteboard sandbox.

pub mod backend;
pub mod board;
pub mod flush;
pub mod history;
pub mod host;
pub mod objects;
pub mod protocol;
pub mod scene;
pub mod session;
pub mod widget;

pub use backend::{Backend, BackendError, BackendOp, BackendResult, MemoryBackend, apply_op, apply_ops};
pub use board::{BoardConfig, BoardError, BoardEvent, BoardView, InitContext, LocalEdit, ViewMode};
pub use flush::{FlushPolicy, FlushScheduler};
pub use history::{HISTORY_CAPACITY, HistoryStore};
pub use host::{HostAction, HostBridge, REINIT_INTERVAL};
pub use objects::{ObjectId, ObjectShape, ObjectSpec, ObjectStyle, SerializableColor};
pub use protocol::{
    Command, FrameMessage, PROTOCOL_NS, PROTOCOL_VERSION, ProtocolError, TargetOrigin, origin_of,
};
pub use scene::{Frame, Primitive, PrimitiveKind, RecordingSurface, ReconcileReport, Surface, SyncEngine};
pub use session::{SandboxSession, SandboxStatus, SessionError, SessionRecord, StartPath};
pub use widget::{WidgetContent, WidgetError, WidgetRegistry, WidgetRenderer, WidgetView};
