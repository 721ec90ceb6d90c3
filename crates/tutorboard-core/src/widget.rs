//! Widget registry for non-canvas-native objects.
//!
//! Widget objects are drawn into an overlay layer by renderers looked up
//! through a string key. Renderers may be registered eagerly or as loaders
//! that are resolved the first time the key is used. Every failure (missing
//! key, failed or slow load, render error, panic) is contained here and
//! reported as a [`WidgetError`], so one broken widget never takes the rest
//! of the board down.

use crate::objects::ObjectId;
use kurbo::Rect;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Default time a loader may take before its result is rejected.
pub const DEFAULT_LOAD_BUDGET_MS: u64 = 10_000;

/// Widget errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WidgetError {
    #[error("No widget registered for '{0}'")]
    Unregistered(String),
    #[error("Widget '{key}' failed to load: {reason}")]
    LoadFailed { key: String, reason: String },
    #[error("Widget '{key}' took {elapsed_ms}ms to load")]
    LoadTimeout { key: String, elapsed_ms: u128 },
    #[error("Widget '{key}' failed to render: {reason}")]
    RenderFailed { key: String, reason: String },
}

/// Renders one kind of widget into markup for the overlay layer.
pub trait WidgetRenderer {
    fn render(&self, props: &Value, bounds: Rect) -> Result<String, String>;
}

impl<F> WidgetRenderer for F
where
    F: Fn(&Value, Rect) -> Result<String, String>,
{
    fn render(&self, props: &Value, bounds: Rect) -> Result<String, String> {
        self(props, bounds)
    }
}

/// Content placed in the overlay for a widget object.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetContent {
    Html(String),
    /// Visual stand-in for a widget that failed.
    Placeholder(String),
}

/// A positioned widget in the overlay layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetView {
    pub object_id: ObjectId,
    pub bounds: Rect,
    pub content: WidgetContent,
}

type Loader = Box<dyn FnOnce() -> Result<Box<dyn WidgetRenderer>, String>>;

enum Slot {
    Pending(Loader),
    Ready(Box<dyn WidgetRenderer>),
    Failed(WidgetError),
}

/// Maps widget keys to lazily resolved renderers.
pub struct WidgetRegistry {
    slots: HashMap<String, Slot>,
    load_budget: Duration,
}

impl Default for WidgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WidgetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.slots.keys().collect();
        keys.sort();
        f.debug_struct("WidgetRegistry")
            .field("keys", &keys)
            .field("load_budget", &self.load_budget)
            .finish()
    }
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            load_budget: Duration::from_millis(DEFAULT_LOAD_BUDGET_MS),
        }
    }

    pub fn with_load_budget(mut self, budget: Duration) -> Self {
        self.load_budget = budget;
        self
    }

    /// Register a ready renderer.
    pub fn register(&mut self, key: impl Into<String>, renderer: impl WidgetRenderer + 'static) {
        self.slots.insert(key.into(), Slot::Ready(Box::new(renderer)));
    }

    /// Register a loader, resolved on first use.
    pub fn register_lazy<L>(&mut self, key: impl Into<String>, loader: L)
    where
        L: FnOnce() -> Result<Box<dyn WidgetRenderer>, String> + 'static,
    {
        self.slots.insert(key.into(), Slot::Pending(Box::new(loader)));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Whether the key has a resolved, working renderer.
    pub fn is_resolved(&self, key: &str) -> bool {
        matches!(self.slots.get(key), Some(Slot::Ready(_)))
    }

    /// Render a widget object, resolving its renderer if needed.
    pub fn render(
        &mut self,
        key: &str,
        object_id: &str,
        props: &Value,
        bounds: Rect,
    ) -> Result<WidgetView, WidgetError> {
        let renderer = self.resolve(key)?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| renderer.render(props, bounds)));
        let html = match outcome {
            Ok(Ok(html)) => html,
            Ok(Err(reason)) => {
                return Err(WidgetError::RenderFailed {
                    key: key.to_string(),
                    reason,
                });
            }
            Err(payload) => {
                return Err(WidgetError::RenderFailed {
                    key: key.to_string(),
                    reason: panic_message(payload.as_ref()),
                });
            }
        };

        Ok(WidgetView {
            object_id: object_id.to_string(),
            bounds,
            content: WidgetContent::Html(html),
        })
    }

    fn resolve(&mut self, key: &str) -> Result<&dyn WidgetRenderer, WidgetError> {
        let slot = self
            .slots
            .remove(key)
            .ok_or_else(|| WidgetError::Unregistered(key.to_string()))?;

        let slot = match slot {
            Slot::Pending(loader) => {
                log::debug!("Resolving widget '{}'", key);
                let started = Instant::now();
                let loaded = panic::catch_unwind(AssertUnwindSafe(loader));
                let elapsed = started.elapsed();

                match loaded {
                    Ok(Ok(_)) if elapsed > self.load_budget => {
                        log::warn!("Widget '{}' exceeded its load budget", key);
                        Slot::Failed(WidgetError::LoadTimeout {
                            key: key.to_string(),
                            elapsed_ms: elapsed.as_millis(),
                        })
                    }
                    Ok(Ok(renderer)) => Slot::Ready(renderer),
                    Ok(Err(reason)) => Slot::Failed(WidgetError::LoadFailed {
                        key: key.to_string(),
                        reason,
                    }),
                    Err(payload) => Slot::Failed(WidgetError::LoadFailed {
                        key: key.to_string(),
                        reason: panic_message(payload.as_ref()),
                    }),
                }
            }
            other => other,
        };

        let slot = self.slots.entry(key.to_string()).or_insert(slot);
        match slot {
            Slot::Ready(renderer) => Ok(&**renderer),
            Slot::Failed(err) => Err(err.clone()),
            Slot::Pending(_) => Err(WidgetError::LoadFailed {
                key: key.to_string(),
                reason: "loader did not resolve".to_string(),
            }),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "widget panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn bounds() -> Rect {
        Rect::new(0.0, 0.0, 100.0, 50.0)
    }

    fn label(props: &Value, _bounds: Rect) -> Result<String, String> {
        props
            .get("label")
            .and_then(Value::as_str)
            .map(|l| format!("<span>{l}</span>"))
            .ok_or_else(|| "missing label".to_string())
    }

    #[test]
    fn test_render_registered_widget() {
        let mut registry = WidgetRegistry::new();
        registry.register("label", label);

        let view = registry
            .render("label", "w1", &json!({ "label": "hi" }), bounds())
            .unwrap();
        assert_eq!(view.object_id, "w1");
        assert_eq!(view.content, WidgetContent::Html("<span>hi</span>".to_string()));
    }

    #[test]
    fn test_unregistered_widget() {
        let mut registry = WidgetRegistry::new();
        let err = registry.render("chart", "w1", &Value::Null, bounds()).unwrap_err();
        assert_eq!(err, WidgetError::Unregistered("chart".to_string()));
    }

    #[test]
    fn test_render_error_is_contained() {
        let mut registry = WidgetRegistry::new();
        registry.register("label", label);
        let err = registry.render("label", "w1", &json!({}), bounds()).unwrap_err();
        assert!(matches!(err, WidgetError::RenderFailed { .. }));
        // the renderer itself stays usable
        assert!(registry.render("label", "w2", &json!({ "label": "ok" }), bounds()).is_ok());
    }

    #[test]
    fn test_render_panic_is_contained() {
        let mut registry = WidgetRegistry::new();
        registry.register("boom", |_: &Value, _: Rect| -> Result<String, String> {
            panic!("kaboom")
        });
        let err = registry.render("boom", "w1", &Value::Null, bounds()).unwrap_err();
        assert_eq!(
            err,
            WidgetError::RenderFailed {
                key: "boom".to_string(),
                reason: "kaboom".to_string()
            }
        );
    }

    #[test]
    fn test_lazy_loader_resolves_once() {
        let loads = Rc::new(Cell::new(0));
        let counter = loads.clone();

        let mut registry = WidgetRegistry::new();
        registry.register_lazy("label", move || {
            counter.set(counter.get() + 1);
            Ok(Box::new(label) as Box<dyn WidgetRenderer>)
        });
        assert!(!registry.is_resolved("label"));

        for _ in 0..3 {
            registry
                .render("label", "w1", &json!({ "label": "x" }), bounds())
                .unwrap();
        }
        assert_eq!(loads.get(), 1);
        assert!(registry.is_resolved("label"));
    }

    #[test]
    fn test_failed_loader_is_cached() {
        let mut registry = WidgetRegistry::new();
        registry.register_lazy("chart", || Err("bundle missing".to_string()));

        let first = registry.render("chart", "w1", &Value::Null, bounds()).unwrap_err();
        let second = registry.render("chart", "w2", &Value::Null, bounds()).unwrap_err();
        assert_eq!(first, second);
        assert!(matches!(first, WidgetError::LoadFailed { .. }));
    }

    #[test]
    fn test_slow_loader_times_out() {
        let mut registry = WidgetRegistry::new().with_load_budget(Duration::from_millis(1));
        registry.register_lazy("slow", || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(Box::new(label) as Box<dyn WidgetRenderer>)
        });
        let err = registry.render("slow", "w1", &Value::Null, bounds()).unwrap_err();
        assert!(matches!(err, WidgetError::LoadTimeout { .. }));
    }
}
