//! Host page side: drives the iframe that embeds the board.

use crate::js_backend::{JsBackend, JsBackendHandle, to_js};
use js_sys::Function;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use tutorboard_core::backend::apply_op;
use tutorboard_core::host::{HostAction, HostBridge, REINIT_INTERVAL};
use tutorboard_core::objects::parse_object_list;
use tutorboard_core::protocol::Command;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{HtmlIFrameElement, MessageEvent, Window};

struct HostState {
    bridge: HostBridge,
    iframe: HtmlIFrameElement,
    backend: Option<Rc<JsBackend>>,
    on_widget_error: Option<Function>,
}

impl HostState {
    fn perform(&self, actions: Vec<HostAction>) {
        for action in actions {
            match action {
                HostAction::Post { target, message } => {
                    let Some(frame) = self.iframe.content_window() else {
                        log::debug!("Board frame has no window; dropping {}", message.kind());
                        continue;
                    };
                    let posted = to_js(&message.to_envelope())
                        .map_err(JsValue::from)
                        .and_then(|data| frame.post_message(&data, target.as_str()));
                    if let Err(e) = posted {
                        log::warn!("Failed to post {} to the board: {:?}", message.kind(), e);
                    }
                }
                HostAction::Persist(op) => match &self.backend {
                    Some(backend) => {
                        let backend = backend.clone();
                        wasm_bindgen_futures::spawn_local(async move {
                            if let Err(e) = apply_op(&*backend, &op).await {
                                log::error!("Persisting for session {} failed: {}", op.session_id(), e);
                            }
                        });
                    }
                    None => log::warn!("No backend; dropping mutation for {}", op.session_id()),
                },
                HostAction::WidgetFailed { error, info } => {
                    let Some(callback) = &self.on_widget_error else {
                        continue;
                    };
                    let info = to_js(&info).unwrap_or(JsValue::NULL);
                    if let Err(e) = callback.call2(&JsValue::NULL, &JsValue::from_str(&error), &info) {
                        log::warn!("Widget error callback failed: {:?}", e);
                    }
                }
            }
        }
    }
}

/// Host-side handle for one embedded board frame.
#[wasm_bindgen]
pub struct HostFrame {
    window: Window,
    state: Rc<RefCell<HostState>>,
    on_message: Option<Closure<dyn FnMut(MessageEvent)>>,
    reinit_timer: Option<(i32, Closure<dyn FnMut()>)>,
}

#[wasm_bindgen]
impl HostFrame {
    #[wasm_bindgen(constructor)]
    pub fn new(iframe: HtmlIFrameElement) -> Result<HostFrame, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window object"))?;
        let state = Rc::new(RefCell::new(HostState {
            bridge: HostBridge::new(),
            iframe,
            backend: None,
            on_widget_error: None,
        }));

        let state_msg = state.clone();
        let on_message = Closure::wrap(Box::new(move |event: MessageEvent| {
            let raw: Value = match serde_wasm_bindgen::from_value(event.data()) {
                Ok(raw) => raw,
                Err(_) => return,
            };
            let Ok(mut state) = state_msg.try_borrow_mut() else {
                log::warn!("Host busy; dropping board message");
                return;
            };
            let actions = state.bridge.handle_message(&event.origin(), &raw);
            state.perform(actions);
        }) as Box<dyn FnMut(MessageEvent)>);
        window.add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())?;

        Ok(HostFrame {
            window,
            state,
            on_message: Some(on_message),
            reinit_timer: None,
        })
    }

    #[wasm_bindgen(js_name = setSession)]
    pub fn set_session(&mut self, session_id: Option<String>) -> Result<(), JsValue> {
        self.update(|bridge| bridge.set_session(session_id))
    }

    /// URL the board frame is served from, once its sandbox is ready.
    #[wasm_bindgen(js_name = setSandboxUrl)]
    pub fn set_sandbox_url(&mut self, url: Option<String>) -> Result<(), JsValue> {
        self.update(|bridge| bridge.set_sandbox_url(url))
    }

    /// Backend connection handed to the board, and the client used to
    /// persist snapshots.
    #[wasm_bindgen(js_name = setBackend)]
    pub fn set_backend(
        &mut self,
        backend_url: Option<String>,
        token: Option<String>,
        client: Option<JsBackendHandle>,
    ) -> Result<(), JsValue> {
        {
            let mut state = self.state.try_borrow_mut().map_err(|_| busy())?;
            state.backend = client.map(|client| Rc::new(JsBackend::new(client)));
        }
        self.update(|bridge| bridge.set_backend(backend_url, token))
    }

    /// `callback(error, info)` runs when a board widget fails.
    #[wasm_bindgen(js_name = onWidgetError)]
    pub fn on_widget_error(&self, callback: Option<Function>) -> Result<(), JsValue> {
        let mut state = self.state.try_borrow_mut().map_err(|_| busy())?;
        state.on_widget_error = callback;
        Ok(())
    }

    pub fn undo(&self) -> Result<(), JsValue> {
        self.send(Command::Undo)
    }

    pub fn redo(&self) -> Result<(), JsValue> {
        self.send(Command::Redo)
    }

    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&self, zoom: f64) -> Result<(), JsValue> {
        self.send(Command::SetZoom(zoom))
    }

    /// Show a historical object list in the board, read-only.
    pub fn jump(&self, index: Option<u32>, objects: JsValue) -> Result<(), JsValue> {
        let raw: Vec<Value> = serde_wasm_bindgen::from_value(objects)?;
        let state = self.state.try_borrow().map_err(|_| busy())?;
        let action = state.bridge.jump(index.map(u64::from), parse_object_list(raw));
        state.perform(action.into_iter().collect());
        Ok(())
    }

    /// Remove the listener and stop the re-init timer. Safe to call more
    /// than once.
    pub fn dispose(&mut self) {
        if let Some(on_message) = self.on_message.take() {
            let _ = self
                .window
                .remove_event_listener_with_callback("message", on_message.as_ref().unchecked_ref());
        }
        self.stop_reinit();
    }
}

fn busy() -> JsValue {
    JsValue::from_str("Host frame is busy")
}

impl HostFrame {
    fn send(&self, command: Command) -> Result<(), JsValue> {
        let state = self.state.try_borrow().map_err(|_| busy())?;
        let action = state.bridge.command(command);
        state.perform(action.into_iter().collect());
        Ok(())
    }

    fn update(&mut self, f: impl FnOnce(&mut HostBridge)) -> Result<(), JsValue> {
        let ready = {
            let mut state = self.state.try_borrow_mut().map_err(|_| busy())?;
            f(&mut state.bridge);
            state.bridge.reinit_ready()
        };
        match (ready, self.reinit_timer.is_some()) {
            (true, false) => self.start_reinit()?,
            (false, true) => self.stop_reinit(),
            _ => {}
        }
        Ok(())
    }

    fn start_reinit(&mut self) -> Result<(), JsValue> {
        let state = self.state.clone();
        let on_tick = Closure::wrap(Box::new(move || {
            let Ok(state) = state.try_borrow() else {
                return;
            };
            if let Some(action) = state.bridge.reinit_message() {
                state.perform(vec![action]);
            }
        }) as Box<dyn FnMut()>);
        let timer = self.window.set_interval_with_callback_and_timeout_and_arguments_0(
            on_tick.as_ref().unchecked_ref(),
            REINIT_INTERVAL.as_millis() as i32,
        )?;
        log::debug!("Started periodic init");
        self.reinit_timer = Some((timer, on_tick));
        Ok(())
    }

    fn stop_reinit(&mut self) {
        if let Some((timer, _on_tick)) = self.reinit_timer.take() {
            self.window.clear_interval_with_handle(timer);
            log::debug!("Stopped periodic init");
        }
    }
}

impl Drop for HostFrame {
    fn drop(&mut self) {
        self.dispose();
    }
}
