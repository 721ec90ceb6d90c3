//! Canvas sync engine.
//!
//! Reconciles the backend's ordered object list onto a [`Surface`] by full
//! rebuild: clear everything, restore the background, clear the widget
//! overlay, emit one primitive per object, render once. The same input list
//! always yields the same frame regardless of what was drawn before.

use crate::objects::{ObjectId, ObjectShape, ObjectSpec, ObjectStyle, SerializableColor};
use crate::widget::{WidgetContent, WidgetError, WidgetRegistry, WidgetView};
use kurbo::{BezPath, Ellipse, Point, Rect, Shape as KurboShape, Vec2};

/// Tolerance used when flattening curves into paths.
const PATH_TOLERANCE: f64 = 0.1;

/// Arrowhead length in canvas units.
const ARROW_HEAD_SIZE: f64 = 15.0;

/// Stroke/fill paint for a primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Paint {
    pub stroke: SerializableColor,
    pub stroke_width: f64,
    pub fill: Option<SerializableColor>,
}

impl From<&ObjectStyle> for Paint {
    fn from(style: &ObjectStyle) -> Self {
        Self {
            stroke: style.stroke_color(),
            stroke_width: style.stroke_width(),
            fill: style.fill_color(),
        }
    }
}

/// Geometry of a primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveKind {
    Path(BezPath),
    Text {
        origin: Point,
        text: String,
        font_size: f64,
    },
}

/// One drawable scene element, tagged with the object it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub origin: ObjectId,
    pub paint: Paint,
    pub kind: PrimitiveKind,
}

impl Primitive {
    /// Build the primitive for a canvas-native object. Widgets and unknown
    /// kinds have no primitive.
    pub fn from_spec(spec: &ObjectSpec) -> Option<Self> {
        let (kind, style) = match &spec.shape {
            ObjectShape::Ink { points, style } => (PrimitiveKind::Path(polyline(points)?), style),
            ObjectShape::Rect { x, y, w, h, style } => {
                let rect = Rect::from_origin_size((*x, *y), (*w, *h)).abs();
                (PrimitiveKind::Path(rect.to_path(PATH_TOLERANCE)), style)
            }
            ObjectShape::Ellipse { x, y, w, h, style } => {
                let rect = Rect::from_origin_size((*x, *y), (*w, *h)).abs();
                let ellipse = Ellipse::from_rect(rect);
                (PrimitiveKind::Path(ellipse.to_path(PATH_TOLERANCE)), style)
            }
            ObjectShape::Line { x1, y1, x2, y2, style } => {
                let path = polyline(&[Point::new(*x1, *y1), Point::new(*x2, *y2)])?;
                (PrimitiveKind::Path(path), style)
            }
            ObjectShape::Arrow { x1, y1, x2, y2, style } => (
                PrimitiveKind::Path(arrow_path(Point::new(*x1, *y1), Point::new(*x2, *y2))),
                style,
            ),
            ObjectShape::Text {
                x,
                y,
                text,
                font_size,
                style,
            } => (
                PrimitiveKind::Text {
                    origin: Point::new(*x, *y),
                    text: text.clone(),
                    font_size: *font_size,
                },
                style,
            ),
            ObjectShape::Widget { .. } | ObjectShape::Unknown { .. } => return None,
        };

        Some(Self {
            origin: spec.id.clone(),
            paint: Paint::from(style),
            kind,
        })
    }
}

fn polyline(points: &[Point]) -> Option<BezPath> {
    let (first, rest) = points.split_first()?;
    let mut path = BezPath::new();
    path.move_to(*first);
    for p in rest {
        path.line_to(*p);
    }
    Some(path)
}

/// Shaft plus an open arrowhead at `end`.
fn arrow_path(start: Point, end: Point) -> BezPath {
    let mut path = BezPath::new();
    path.move_to(start);
    path.line_to(end);

    let delta = end - start;
    let length = delta.hypot();
    if length > f64::EPSILON {
        let dir = delta / length;
        let perp = Vec2::new(-dir.y, dir.x);
        let size = ARROW_HEAD_SIZE.min(length * 0.5);
        let back = end - dir * size;
        path.move_to(back + perp * size * 0.5);
        path.line_to(end);
        path.line_to(back - perp * size * 0.5);
    }
    path
}

/// Drawing target for the sync engine and board chrome.
///
/// This is the seam to the actual 2D graphics backend (a browser canvas in
/// the web build, a recorder in tests).
pub trait Surface {
    /// Remove every primitive. Also wipes the background.
    fn clear(&mut self);
    fn set_background(&mut self, color: SerializableColor);
    /// Remove every widget from the overlay layer.
    fn clear_overlay(&mut self);
    fn draw(&mut self, primitive: &Primitive);
    fn place_widget(&mut self, view: &WidgetView);
    /// Request one render pass.
    fn render(&mut self);

    fn set_zoom(&mut self, zoom: f64);
    /// Enable or disable drawing and selection.
    fn set_interactive(&mut self, interactive: bool);
    /// Show (or with `None`, hide) the persistent banner.
    fn show_banner(&mut self, text: Option<&str>);
}

/// A widget that could not be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetFailure {
    pub object_id: ObjectId,
    pub widget: String,
    pub error: WidgetError,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub primitives: usize,
    pub widgets: usize,
    pub skipped: usize,
    pub failures: Vec<WidgetFailure>,
}

/// Reconciles object lists onto a surface.
pub struct SyncEngine<S: Surface> {
    surface: S,
    background: SerializableColor,
    widgets: WidgetRegistry,
}

impl<S: Surface> SyncEngine<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            background: SerializableColor::white(),
            widgets: WidgetRegistry::new(),
        }
    }

    pub fn with_background(mut self, color: SerializableColor) -> Self {
        self.background = color;
        self
    }

    pub fn with_widgets(mut self, widgets: WidgetRegistry) -> Self {
        self.widgets = widgets;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn widgets_mut(&mut self) -> &mut WidgetRegistry {
        &mut self.widgets
    }

    /// Rebuild the whole scene from `objects`.
    pub fn reconcile(&mut self, objects: &[ObjectSpec]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        self.surface.clear();
        self.surface.set_background(self.background);
        self.surface.clear_overlay();

        for spec in objects {
            match &spec.shape {
                ObjectShape::Widget {
                    x,
                    y,
                    w,
                    h,
                    widget,
                    props,
                } => {
                    let bounds = Rect::from_origin_size((*x, *y), (*w, *h)).abs();
                    match self.widgets.render(widget, &spec.id, props, bounds) {
                        Ok(view) => {
                            self.surface.place_widget(&view);
                            report.widgets += 1;
                        }
                        Err(error) => {
                            log::warn!("Widget {} ({}) failed: {}", spec.id, widget, error);
                            self.surface.place_widget(&WidgetView {
                                object_id: spec.id.clone(),
                                bounds,
                                content: WidgetContent::Placeholder(error.to_string()),
                            });
                            report.failures.push(WidgetFailure {
                                object_id: spec.id.clone(),
                                widget: widget.clone(),
                                error,
                            });
                        }
                    }
                }
                _ => match Primitive::from_spec(spec) {
                    Some(primitive) => {
                        self.surface.draw(&primitive);
                        report.primitives += 1;
                    }
                    None => {
                        log::debug!("Skipping object {} of kind {}", spec.id, spec.kind_name());
                        report.skipped += 1;
                    }
                },
            }
        }

        self.surface.render();
        report
    }
}

/// Everything drawn since the last clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub background: Option<SerializableColor>,
    pub primitives: Vec<Primitive>,
    pub widgets: Vec<WidgetView>,
}

/// Surface that records the current frame. Used headless and in tests.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    frame: Frame,
    renders: usize,
    zoom: f64,
    interactive: bool,
    banner: Option<String>,
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            frame: Frame::default(),
            renders: 0,
            zoom: 1.0,
            interactive: true,
            banner: None,
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn render_count(&self) -> usize {
        self.renders
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    /// Ids of drawn primitives, in draw order.
    pub fn drawn_ids(&self) -> Vec<&str> {
        self.frame
            .primitives
            .iter()
            .map(|p| p.origin.as_str())
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn clear(&mut self) {
        self.frame.primitives.clear();
        self.frame.background = None;
    }

    fn set_background(&mut self, color: SerializableColor) {
        self.frame.background = Some(color);
    }

    fn clear_overlay(&mut self) {
        self.frame.widgets.clear();
    }

    fn draw(&mut self, primitive: &Primitive) {
        self.frame.primitives.push(primitive.clone());
    }

    fn place_widget(&mut self, view: &WidgetView) {
        self.frame.widgets.push(view.clone());
    }

    fn render(&mut self) {
        self.renders += 1;
    }

    fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    fn show_banner(&mut self, text: Option<&str>) {
        self.banner = text.map(str::to_string);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn sample_objects() -> Vec<ObjectSpec> {
        serde_json::from_value(json!([
            { "id": "ink1", "kind": "ink", "points": [{ "x": 0, "y": 0 }, { "x": 4, "y": 4 }, { "x": 8, "y": 2 }] },
            { "id": "rect1", "kind": "rect", "x": 10, "y": 10, "w": 40, "h": 20, "style": { "fill": "#ff0000" } },
            { "id": "ell1", "kind": "ellipse", "x": 0, "y": 0, "w": 30, "h": 10 },
            { "id": "arr1", "kind": "arrow", "x1": 0, "y1": 0, "x2": 100, "y2": 0 },
            { "id": "line1", "kind": "line", "x1": 0, "y1": 0, "x2": 0, "y2": 50 },
            { "id": "txt1", "kind": "text", "x": 5, "y": 5, "text": "2x + 3 = 7" },
            { "id": "mystery", "kind": "sticker", "emoji": "*" },
            { "id": "w1", "kind": "widget", "x": 0, "y": 0, "w": 200, "h": 100, "widget": "label", "props": { "label": "hi" } }
        ]))
        .unwrap()
    }

    fn engine() -> SyncEngine<RecordingSurface> {
        let mut widgets = WidgetRegistry::new();
        widgets.register("label", |props: &Value, _: Rect| -> Result<String, String> {
            Ok(props["label"].as_str().unwrap_or_default().to_string())
        });
        SyncEngine::new(RecordingSurface::new())
            .with_background(SerializableColor::new(250, 250, 250, 255))
            .with_widgets(widgets)
    }

    #[test]
    fn test_one_primitive_per_object_in_order() {
        let mut engine = engine();
        let report = engine.reconcile(&sample_objects());

        assert_eq!(report.primitives, 6);
        assert_eq!(report.widgets, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.failures.is_empty());
        assert_eq!(
            engine.surface().drawn_ids(),
            vec!["ink1", "rect1", "ell1", "arr1", "line1", "txt1"]
        );
        assert_eq!(engine.surface().render_count(), 1);
    }

    #[test]
    fn test_background_restored_after_clear() {
        let mut engine = engine();
        engine.reconcile(&[]);
        assert_eq!(
            engine.surface().frame().background,
            Some(SerializableColor::new(250, 250, 250, 255))
        );
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut engine = engine();
        let objects = sample_objects();

        engine.reconcile(&objects);
        let first = engine.surface().frame().clone();
        engine.reconcile(&objects);
        let second = engine.surface().frame().clone();

        assert_eq!(first, second);
        assert_eq!(engine.surface().render_count(), 2);
    }

    #[test]
    fn test_reconcile_discards_prior_scene() {
        let mut engine = engine();
        engine.reconcile(&sample_objects());
        engine.reconcile(&sample_objects()[1..2]);

        assert_eq!(engine.surface().drawn_ids(), vec!["rect1"]);
        assert!(engine.surface().frame().widgets.is_empty());
    }

    #[test]
    fn test_failed_widget_gets_placeholder() {
        let mut engine = SyncEngine::new(RecordingSurface::new());
        let objects: Vec<ObjectSpec> = serde_json::from_value(json!([
            { "id": "w1", "kind": "widget", "x": 0, "y": 0, "w": 10, "h": 10, "widget": "graph" },
            { "id": "r1", "kind": "rect", "x": 0, "y": 0, "w": 10, "h": 10 }
        ]))
        .unwrap();

        let report = engine.reconcile(&objects);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].object_id, "w1");
        assert_eq!(report.primitives, 1);

        let widgets = &engine.surface().frame().widgets;
        assert_eq!(widgets.len(), 1);
        assert!(matches!(widgets[0].content, WidgetContent::Placeholder(_)));
    }

    #[test]
    fn test_paint_from_style() {
        let objects = sample_objects();
        let rect = Primitive::from_spec(&objects[1]).unwrap();
        assert_eq!(rect.paint.fill, Some(SerializableColor::new(255, 0, 0, 255)));
        assert_eq!(rect.paint.stroke, SerializableColor::black());
    }

    #[test]
    fn test_empty_ink_has_no_primitive() {
        let spec = ObjectSpec::with_id(
            "ink",
            ObjectShape::Ink {
                points: vec![],
                style: ObjectStyle::default(),
            },
        );
        assert!(Primitive::from_spec(&spec).is_none());
    }

    #[test]
    fn test_arrow_has_head() {
        let path = arrow_path(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        // shaft (move + line) and head (move + two lines)
        assert_eq!(path.elements().len(), 5);

        let degenerate = arrow_path(Point::new(1.0, 1.0), Point::new(1.0, 1.0));
        assert_eq!(degenerate.elements().len(), 2);
    }
}
