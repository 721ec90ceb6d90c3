//! Embedded side of the cross-frame protocol.
//!
//! [`BoardView`] is the single owner of the board's scene, history and
//! session context inside the iframe. It consumes host messages, applies
//! live object lists from the backend and local edits from the user, and
//! queues outbound frame messages and backend mutations for the runtime to
//! deliver.

use crate::backend::BackendOp;
use crate::flush::{FlushPolicy, FlushScheduler};
use crate::history::HistoryStore;
use crate::objects::{ObjectId, ObjectSpec, SerializableColor};
use crate::protocol::{
    Command, FrameMessage, InitPayload, JumpPayload, SnapshotPayload, WidgetErrorPayload,
};
use crate::scene::{ReconcileReport, Surface, SyncEngine};
use crate::widget::WidgetRegistry;
use serde_json::{Value, json};
use std::collections::HashSet;
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Banner shown while a historical state is displayed.
pub const HISTORY_BANNER: &str = "Viewing history (read-only). Click to return to the live board.";

/// Board errors.
#[derive(Debug, Error, PartialEq)]
pub enum BoardError {
    #[error("Board has not received a session yet")]
    NotInitialized,
    #[error("Board is showing history and is read-only")]
    ReadOnly,
    #[error("Object already exists: {0}")]
    DuplicateObject(ObjectId),
    #[error("Object not found: {0}")]
    UnknownObject(ObjectId),
}

/// Board configuration.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub background: SerializableColor,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub flush: FlushPolicy,
    pub history_banner: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            background: SerializableColor::white(),
            min_zoom: 0.1,
            max_zoom: 8.0,
            flush: FlushPolicy::default(),
            history_banner: HISTORY_BANNER.to_string(),
        }
    }
}

/// Session context captured from the host's `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitContext {
    pub session_id: String,
    pub backend_url: String,
    pub token: Option<String>,
}

/// What the board is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Live backend data; editable.
    Live,
    /// A historical state pushed by the host; read-only.
    History { index: Option<u64> },
}

/// Observable outcome of handling a host message.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// Session context captured. `changed` is false for a repeated init.
    Initialized { context: InitContext, changed: bool },
    Undone,
    Redone,
    ZoomChanged(f64),
    EnteredHistory { index: Option<u64> },
}

/// A local edit made by the user.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEdit {
    Add(ObjectSpec),
    Update(ObjectSpec),
    Delete(ObjectId),
}

/// The embedded board view.
pub struct BoardView<S: Surface> {
    engine: SyncEngine<S>,
    config: BoardConfig,
    history: HistoryStore,
    flush: FlushScheduler,
    context: Option<InitContext>,
    mode: ViewMode,
    zoom: f64,
    /// Origin of the host, pinned by the first accepted `init`.
    host_origin: Option<String>,
    /// Latest live object list (backend state plus local edits).
    objects: Vec<ObjectSpec>,
    /// Widget failures already sent to the host, as (object id, error).
    reported_failures: HashSet<(ObjectId, String)>,
    next_snapshot: u64,
    outgoing: Vec<FrameMessage>,
    backend_ops: Vec<BackendOp>,
}

impl<S: Surface> BoardView<S> {
    pub fn new(surface: S, config: BoardConfig) -> Self {
        Self::with_widgets(surface, config, WidgetRegistry::new())
    }

    pub fn with_widgets(surface: S, config: BoardConfig, widgets: WidgetRegistry) -> Self {
        let engine = SyncEngine::new(surface)
            .with_background(config.background)
            .with_widgets(widgets);
        Self {
            engine,
            flush: FlushScheduler::new(config.flush, Instant::now()),
            config,
            history: HistoryStore::new(),
            context: None,
            mode: ViewMode::Live,
            zoom: 1.0,
            host_origin: None,
            objects: Vec::new(),
            reported_failures: HashSet::new(),
            next_snapshot: 0,
            outgoing: Vec::new(),
            backend_ops: Vec::new(),
        }
    }

    // --- Accessors ---

    pub fn surface(&self) -> &S {
        self.engine.surface()
    }

    pub fn context(&self) -> Option<&InitContext> {
        self.context.as_ref()
    }

    /// Origin every message after `ready` is addressed to.
    pub fn host_origin(&self) -> Option<&str> {
        self.host_origin.as_deref()
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn objects(&self) -> &[ObjectSpec] {
        &self.objects
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn widgets_mut(&mut self) -> &mut WidgetRegistry {
        self.engine.widgets_mut()
    }

    // --- Outbound queues ---

    /// Take pending outgoing frame messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<FrameMessage> {
        std::mem::take(&mut self.outgoing)
    }

    /// Take pending backend mutations (drains the queue).
    pub fn take_backend_ops(&mut self) -> Vec<BackendOp> {
        std::mem::take(&mut self.backend_ops)
    }

    /// Announce to the host that the board is listening.
    pub fn announce_ready(&mut self) {
        self.outgoing.push(FrameMessage::Ready);
    }

    // --- Inbound messages ---

    /// Handle a raw message from the host, sent from `origin`.
    ///
    /// The first valid `init` pins the host origin; from then on messages
    /// from any other origin are dropped.
    pub fn handle_message(&mut self, origin: &str, raw: &Value) -> Option<BoardEvent> {
        if let Some(host) = self.host_origin.as_deref().filter(|host| *host != origin) {
            log::debug!("Dropping message from {}: host is {}", origin, host);
            return None;
        }

        let message = match FrameMessage::parse(raw) {
            Ok(Some(message)) => message,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Dropping host message: {}", e);
                return None;
            }
        };

        match message {
            FrameMessage::Init(payload) => {
                let event = self.on_init(payload);
                if event.is_some() && self.host_origin.is_none() {
                    log::info!("Host origin pinned to {}", origin);
                    self.host_origin = Some(origin.to_string());
                }
                event
            }
            FrameMessage::Command(payload) => match payload.command() {
                Ok(command) => self.on_command(command),
                Err(e) => {
                    log::warn!("Dropping command: {}", e);
                    None
                }
            },
            FrameMessage::Jump(payload) => Some(self.on_jump(payload)),
            other => {
                log::debug!("Ignoring board-bound {} message", other.kind());
                None
            }
        }
    }

    fn on_init(&mut self, payload: InitPayload) -> Option<BoardEvent> {
        let backend_url = match payload.convex_url.filter(|url| !url.is_empty()) {
            Some(url) => url,
            None => {
                log::error!("init for session {} has no backend URL", payload.session_id);
                return None;
            }
        };

        let context = InitContext {
            session_id: payload.session_id,
            backend_url,
            token: payload.token,
        };
        let changed = self.context.as_ref() != Some(&context);
        if changed {
            log::info!("Board initialized for session {}", context.session_id);
        }
        self.context = Some(context.clone());
        Some(BoardEvent::Initialized { context, changed })
    }

    fn on_command(&mut self, command: Command) -> Option<BoardEvent> {
        match command {
            Command::Undo => self.undo().then_some(BoardEvent::Undone),
            Command::Redo => self.redo().then_some(BoardEvent::Redone),
            Command::SetZoom(zoom) => self.set_zoom(zoom).map(BoardEvent::ZoomChanged),
        }
    }

    fn on_jump(&mut self, payload: JumpPayload) -> BoardEvent {
        log::info!("Showing history state {:?}", payload.index);
        self.mode = ViewMode::History {
            index: payload.index,
        };
        let surface = self.engine.surface_mut();
        surface.set_interactive(false);
        surface.show_banner(Some(&self.config.history_banner));
        self.redraw(&payload.objects);
        BoardEvent::EnteredHistory {
            index: payload.index,
        }
    }

    // --- History view ---

    /// Leave the history view. Interaction comes back; the historical state
    /// stays on screen until the live object list next changes.
    pub fn exit_history_mode(&mut self) -> bool {
        if self.mode == ViewMode::Live {
            return false;
        }
        self.mode = ViewMode::Live;
        let surface = self.engine.surface_mut();
        surface.set_interactive(true);
        surface.show_banner(None);
        surface.render();
        true
    }

    // --- Commands ---

    /// Step back in history and reload the canvas from that entry.
    pub fn undo(&mut self) -> bool {
        if self.mode != ViewMode::Live {
            log::debug!("Ignoring undo while showing history");
            return false;
        }
        let Some(state) = self.history.undo().map(<[ObjectSpec]>::to_vec) else {
            return false;
        };
        self.redraw(&state);
        self.objects = state;
        true
    }

    /// Step forward in history and reload the canvas from that entry.
    pub fn redo(&mut self) -> bool {
        if self.mode != ViewMode::Live {
            log::debug!("Ignoring redo while showing history");
            return false;
        }
        let Some(state) = self.history.redo().map(<[ObjectSpec]>::to_vec) else {
            return false;
        };
        self.redraw(&state);
        self.objects = state;
        true
    }

    /// Set the zoom factor, clamped to the configured range.
    pub fn set_zoom(&mut self, zoom: f64) -> Option<f64> {
        if !zoom.is_finite() || zoom <= 0.0 {
            log::warn!("Ignoring invalid zoom factor {}", zoom);
            return None;
        }
        let zoom = zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        self.zoom = zoom;
        let surface = self.engine.surface_mut();
        surface.set_zoom(zoom);
        surface.render();
        Some(zoom)
    }

    // --- Data flow ---

    /// The backend pushed a new object list.
    ///
    /// While a historical state is shown the list is recorded but not drawn.
    pub fn apply_live_objects(&mut self, objects: Vec<ObjectSpec>) {
        if self.mode == ViewMode::Live {
            self.redraw(&objects);
            self.history.push(objects.clone());
        }
        self.objects = objects;
    }

    /// Apply a local edit: redraw, record history, and queue the backend
    /// mutation.
    pub fn local_edit(&mut self, edit: LocalEdit) -> Result<(), BoardError> {
        let session_id = self
            .context
            .as_ref()
            .map(|c| c.session_id.clone())
            .ok_or(BoardError::NotInitialized)?;
        if self.mode != ViewMode::Live {
            return Err(BoardError::ReadOnly);
        }

        let op = match edit {
            LocalEdit::Add(object) => {
                if self.objects.iter().any(|o| o.id == object.id) {
                    return Err(BoardError::DuplicateObject(object.id));
                }
                self.objects.push(object.clone());
                BackendOp::AddObject { session_id, object }
            }
            LocalEdit::Update(object) => {
                let existing = self
                    .objects
                    .iter_mut()
                    .find(|o| o.id == object.id)
                    .ok_or_else(|| BoardError::UnknownObject(object.id.clone()))?;
                *existing = object.clone();
                BackendOp::UpdateObject { session_id, object }
            }
            LocalEdit::Delete(object_id) => {
                let before = self.objects.len();
                self.objects.retain(|o| o.id != object_id);
                if self.objects.len() == before {
                    return Err(BoardError::UnknownObject(object_id));
                }
                BackendOp::DeleteObject {
                    session_id,
                    object_id,
                }
            }
        };

        let objects = self.objects.clone();
        self.redraw(&objects);
        self.history.push(objects);
        self.flush.record_mutation();
        self.backend_ops.push(op);
        Ok(())
    }

    /// Periodic flush check. Queues a `snapshot` for the host when due.
    pub fn flush_tick(&mut self, now: Instant) -> bool {
        if self.context.is_none() {
            return false;
        }
        if !self.flush.tick(now) {
            return false;
        }
        self.flush_now(now);
        true
    }

    /// Queue a snapshot of the live object list immediately.
    pub fn flush_now(&mut self, now: Instant) {
        let index = self.next_snapshot;
        self.next_snapshot += 1;
        log::debug!("Queueing snapshot {} ({} objects)", index, self.objects.len());
        self.outgoing.push(FrameMessage::Snapshot(SnapshotPayload {
            index,
            objects: self.objects.clone(),
        }));
        self.flush.mark_flushed(now);
    }

    /// Reconcile and report widget failures. A failure is sent once until
    /// the widget renders again or the error changes.
    fn redraw(&mut self, objects: &[ObjectSpec]) -> ReconcileReport {
        let report = self.engine.reconcile(objects);
        let mut current = HashSet::with_capacity(report.failures.len());
        for failure in &report.failures {
            let key = (failure.object_id.clone(), failure.error.to_string());
            let reported = self.reported_failures.contains(&key);
            current.insert(key);
            if reported {
                continue;
            }
            self.outgoing.push(FrameMessage::WidgetError(WidgetErrorPayload {
                error: failure.error.to_string(),
                info: json!({
                    "objectId": failure.object_id,
                    "widget": failure.widget,
                }),
            }));
        }
        self.reported_failures = current;
        report
    }
}
