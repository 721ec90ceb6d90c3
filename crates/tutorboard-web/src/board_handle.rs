//! Embedded board: the capability object returned by [`mount_board`].

use crate::canvas2d::Canvas2dSurface;
use crate::js_backend::{JsBackend, JsBackendHandle, to_js};
use crate::routing::board_target;
use js_sys::Function;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use tutorboard_core::backend::{Backend, apply_ops};
use tutorboard_core::board::{BoardConfig, BoardEvent, BoardView, LocalEdit, ViewMode};
use tutorboard_core::objects::{ObjectSpec, parse_object_list};
use tutorboard_core::widget::WidgetRenderer;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{HtmlCanvasElement, HtmlElement, MessageEvent, Window};
use web_time::Instant;

struct BoardState {
    view: BoardView<Canvas2dSurface>,
    /// Creates the backend client from `(backendUrl, token)`; used once.
    connect: Function,
    backend: Option<Rc<JsBackend>>,
    parent: Option<Window>,
}

impl BoardState {
    /// Create the backend client. Called at most once per mounted board.
    fn connect_backend(&mut self, backend_url: &str, token: Option<&str>) -> Option<Rc<JsBackend>> {
        let token = token.map(JsValue::from_str).unwrap_or(JsValue::NULL);
        let handle = match self.connect.call2(&JsValue::NULL, &JsValue::from_str(backend_url), &token) {
            Ok(handle) => handle.unchecked_into::<JsBackendHandle>(),
            Err(e) => {
                log::error!("Failed to connect to backend {}: {:?}", backend_url, e);
                return None;
            }
        };
        let backend = Rc::new(JsBackend::new(handle));
        self.backend = Some(backend.clone());
        log::info!("Connected to backend {}", backend_url);
        Some(backend)
    }

    /// Deliver queued messages to the host and mutations to the backend.
    fn dispatch(&mut self) {
        for message in self.view.take_outgoing() {
            let Some(target) = board_target(&message, self.view.host_origin()) else {
                log::warn!("Dropping {} message: host origin unknown", message.kind());
                continue;
            };
            let Some(parent) = &self.parent else {
                log::debug!("No parent window for {} message", message.kind());
                continue;
            };
            let posted = to_js(&message.to_envelope())
                .map_err(JsValue::from)
                .and_then(|data| parent.post_message(&data, target.as_str()));
            if let Err(e) = posted {
                log::warn!("Failed to post {} message: {:?}", message.kind(), e);
            }
        }

        let ops = self.view.take_backend_ops();
        if ops.is_empty() {
            return;
        }
        match &self.backend {
            Some(backend) => {
                let backend = backend.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    apply_ops(&*backend, &ops).await;
                });
            }
            None => log::warn!("Dropping {} backend mutation(s): not connected", ops.len()),
        }
    }
}

fn on_host_message(state: &Rc<RefCell<BoardState>>, event: &MessageEvent) {
    let raw: Value = match serde_wasm_bindgen::from_value(event.data()) {
        Ok(raw) => raw,
        Err(_) => return,
    };

    let connected = {
        let Ok(mut board) = state.try_borrow_mut() else {
            log::warn!("Board busy; dropping host message");
            return;
        };
        if !from_window(event, board.parent.as_ref()) {
            log::debug!("Dropping message not sent by the parent window");
            return;
        }
        let mut connected = None;
        let origin = event.origin();
        if let Some(BoardEvent::Initialized { context, .. }) = board.view.handle_message(&origin, &raw) {
            if board.backend.is_none() {
                connected = board
                    .connect_backend(&context.backend_url, context.token.as_deref())
                    .map(|backend| (backend, context.session_id));
            }
        }
        board.dispatch();
        connected
    };

    // initial load; later changes arrive through applyLiveObjects
    if let Some((backend, session_id)) = connected {
        let state = state.clone();
        wasm_bindgen_futures::spawn_local(async move {
            match backend.list_objects(&session_id).await {
                Ok(objects) => match state.try_borrow_mut() {
                    Ok(mut board) => {
                        board.view.apply_live_objects(objects);
                        board.dispatch();
                    }
                    Err(_) => log::warn!("Board busy; dropping initial object list"),
                },
                Err(e) => log::error!("Failed to load objects for session {}: {}", session_id, e),
            }
        });
    }
}

/// Whether `event` was posted by `window`.
fn from_window(event: &MessageEvent, window: Option<&Window>) -> bool {
    match (event.source(), window) {
        (Some(source), Some(window)) => js_sys::Object::is(source.as_ref(), window.as_ref()),
        _ => false,
    }
}

/// Handle to a mounted board. Dropping it (or calling `dispose`) removes
/// every listener and timer the board installed.
#[wasm_bindgen]
pub struct BoardHandle {
    window: Window,
    banner: HtmlElement,
    state: Rc<RefCell<BoardState>>,
    on_message: Option<Closure<dyn FnMut(MessageEvent)>>,
    on_banner_click: Option<Closure<dyn FnMut()>>,
    flush_timer: Option<(i32, Closure<dyn FnMut()>)>,
}

fn busy() -> JsValue {
    JsValue::from_str("Board is busy")
}

fn parse_object(value: JsValue) -> Result<ObjectSpec, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(JsValue::from)
}

/// Mount the board on `canvas`, with `overlay` for widgets and `banner` for
/// the history-view notice. `connect(backendUrl, token)` must return the
/// backend client object.
#[wasm_bindgen(js_name = mountBoard)]
pub fn mount_board(
    canvas: HtmlCanvasElement,
    overlay: HtmlElement,
    banner: HtmlElement,
    connect: Function,
) -> Result<BoardHandle, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window object"))?;
    let surface = Canvas2dSurface::new(canvas, overlay, banner)?;
    let banner = surface.banner().clone();
    let config = BoardConfig::default();
    let check_interval = config.flush.check_interval;

    let parent = window.parent().ok().flatten();
    let state = Rc::new(RefCell::new(BoardState {
        view: BoardView::new(surface, config),
        connect,
        backend: None,
        parent,
    }));

    let state_msg = state.clone();
    let on_message = Closure::wrap(Box::new(move |event: MessageEvent| {
        on_host_message(&state_msg, &event);
    }) as Box<dyn FnMut(MessageEvent)>);
    window.add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())?;

    let state_click = state.clone();
    let on_banner_click = Closure::wrap(Box::new(move || {
        if let Ok(mut state) = state_click.try_borrow_mut() {
            state.view.exit_history_mode();
            state.dispatch();
        }
    }) as Box<dyn FnMut()>);
    banner.add_event_listener_with_callback("click", on_banner_click.as_ref().unchecked_ref())?;

    let state_tick = state.clone();
    let on_tick = Closure::wrap(Box::new(move || {
        if let Ok(mut state) = state_tick.try_borrow_mut() {
            state.view.flush_tick(Instant::now());
            state.dispatch();
        }
    }) as Box<dyn FnMut()>);
    let timer = window.set_interval_with_callback_and_timeout_and_arguments_0(
        on_tick.as_ref().unchecked_ref(),
        check_interval.as_millis() as i32,
    )?;

    {
        let mut state = state.borrow_mut();
        state.view.announce_ready();
        state.dispatch();
    }
    log::info!("Board mounted");

    Ok(BoardHandle {
        window,
        banner,
        state,
        on_message: Some(on_message),
        on_banner_click: Some(on_banner_click),
        flush_timer: Some((timer, on_tick)),
    })
}

impl BoardHandle {
    fn with_state<T>(&self, f: impl FnOnce(&mut BoardState) -> T) -> Result<T, JsValue> {
        let mut state = self.state.try_borrow_mut().map_err(|_| busy())?;
        let result = f(&mut state);
        state.dispatch();
        Ok(result)
    }

    fn edit(&self, edit: LocalEdit) -> Result<(), JsValue> {
        self.with_state(|state| state.view.local_edit(edit))?
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

#[wasm_bindgen]
impl BoardHandle {
    /// The backend's live object list changed.
    #[wasm_bindgen(js_name = applyLiveObjects)]
    pub fn apply_live_objects(&self, objects: JsValue) -> Result<(), JsValue> {
        let raw: Vec<Value> = serde_wasm_bindgen::from_value(objects)?;
        let objects = parse_object_list(raw);
        self.with_state(|state| state.view.apply_live_objects(objects))
    }

    #[wasm_bindgen(js_name = addObject)]
    pub fn add_object(&self, object: JsValue) -> Result<(), JsValue> {
        self.edit(LocalEdit::Add(parse_object(object)?))
    }

    #[wasm_bindgen(js_name = updateObject)]
    pub fn update_object(&self, object: JsValue) -> Result<(), JsValue> {
        self.edit(LocalEdit::Update(parse_object(object)?))
    }

    #[wasm_bindgen(js_name = deleteObject)]
    pub fn delete_object(&self, object_id: String) -> Result<(), JsValue> {
        self.edit(LocalEdit::Delete(object_id))
    }

    pub fn undo(&self) -> Result<bool, JsValue> {
        self.with_state(|state| state.view.undo())
    }

    pub fn redo(&self) -> Result<bool, JsValue> {
        self.with_state(|state| state.view.redo())
    }

    /// Returns the zoom actually applied after clamping.
    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&self, zoom: f64) -> Result<Option<f64>, JsValue> {
        self.with_state(|state| state.view.set_zoom(zoom))
    }

    #[wasm_bindgen(js_name = exitHistoryMode)]
    pub fn exit_history_mode(&self) -> Result<bool, JsValue> {
        self.with_state(|state| state.view.exit_history_mode())
    }

    #[wasm_bindgen(getter, js_name = historyMode)]
    pub fn history_mode(&self) -> bool {
        self.state
            .try_borrow()
            .is_ok_and(|state| matches!(state.view.mode(), ViewMode::History { .. }))
    }

    /// Register a widget renderer. `render(props, bounds)` returns HTML.
    #[wasm_bindgen(js_name = registerWidget)]
    pub fn register_widget(&self, key: String, render: Function) -> Result<(), JsValue> {
        self.with_state(|state| state.view.widgets_mut().register(key, JsWidget(render)))
    }

    /// Remove listeners and timers. Safe to call more than once.
    pub fn dispose(&mut self) {
        if let Some(on_message) = self.on_message.take() {
            let _ = self
                .window
                .remove_event_listener_with_callback("message", on_message.as_ref().unchecked_ref());
        }
        if let Some(on_click) = self.on_banner_click.take() {
            let _ = self
                .banner
                .remove_event_listener_with_callback("click", on_click.as_ref().unchecked_ref());
        }
        if let Some((timer, _on_tick)) = self.flush_timer.take() {
            self.window.clear_interval_with_handle(timer);
        }
    }
}

impl Drop for BoardHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Widget renderer backed by a JavaScript function.
struct JsWidget(Function);

impl WidgetRenderer for JsWidget {
    fn render(&self, props: &Value, bounds: kurbo::Rect) -> Result<String, String> {
        let props = to_js(props).map_err(|e| e.to_string())?;
        let bounds = to_js(&serde_json::json!({
            "x": bounds.x0,
            "y": bounds.y0,
            "w": bounds.width(),
            "h": bounds.height(),
        }))
        .map_err(|e| e.to_string())?;
        let html = self
            .0
            .call2(&JsValue::NULL, &props, &bounds)
            .map_err(|e| e.as_string().unwrap_or_else(|| format!("{:?}", e)))?;
        html.as_string()
            .ok_or_else(|| "Widget did not return an HTML string".to_string())
    }
}
