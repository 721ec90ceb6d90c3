//! Canvas 2D implementation of the scene [`Surface`].
//!
//! Primitives are retained until the next clear and painted in one pass on
//! [`Surface::render`], so a zoom change can repaint without a new
//! reconciliation. Widgets live in an absolutely positioned overlay element
//! stacked on top of the canvas.

use crate::style::{WIDGET_CLASS, WIDGET_ERROR_CLASS, font_css, overlay_style};
use kurbo::PathEl;
use tutorboard_core::objects::SerializableColor;
use tutorboard_core::scene::{Primitive, PrimitiveKind, Surface};
use tutorboard_core::widget::{WidgetContent, WidgetView};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, Document, HtmlCanvasElement, HtmlElement};

pub struct Canvas2dSurface {
    document: Document,
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    overlay: HtmlElement,
    banner: HtmlElement,
    background: SerializableColor,
    primitives: Vec<Primitive>,
    widgets: Vec<WidgetView>,
    zoom: f64,
}

impl Canvas2dSurface {
    pub fn new(
        canvas: HtmlCanvasElement,
        overlay: HtmlElement,
        banner: HtmlElement,
    ) -> Result<Self, JsValue> {
        let document = canvas
            .owner_document()
            .ok_or_else(|| JsValue::from_str("Canvas is not attached to a document"))?;
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("2D context not available"))?
            .dyn_into::<CanvasRenderingContext2d>()?;

        let surface = Self {
            document,
            canvas,
            ctx,
            overlay,
            banner,
            background: SerializableColor::white(),
            primitives: Vec::new(),
            widgets: Vec::new(),
            zoom: 1.0,
        };
        let _ = surface.banner.style().set_property("display", "none");
        Ok(surface)
    }

    pub fn banner(&self) -> &HtmlElement {
        &self.banner
    }

    fn paint(&self, primitive: &Primitive) {
        let ctx = &self.ctx;
        match &primitive.kind {
            PrimitiveKind::Path(path) => {
                ctx.begin_path();
                for el in path.elements() {
                    match *el {
                        PathEl::MoveTo(p) => ctx.move_to(p.x, p.y),
                        PathEl::LineTo(p) => ctx.line_to(p.x, p.y),
                        PathEl::QuadTo(c, p) => ctx.quadratic_curve_to(c.x, c.y, p.x, p.y),
                        PathEl::CurveTo(c1, c2, p) => ctx.bezier_curve_to(c1.x, c1.y, c2.x, c2.y, p.x, p.y),
                        PathEl::ClosePath => ctx.close_path(),
                    }
                }
                if let Some(fill) = primitive.paint.fill {
                    ctx.set_fill_style_str(&fill.to_css());
                    ctx.fill();
                }
                ctx.set_stroke_style_str(&primitive.paint.stroke.to_css());
                ctx.set_line_width(primitive.paint.stroke_width);
                ctx.stroke();
            }
            PrimitiveKind::Text {
                origin,
                text,
                font_size,
            } => {
                ctx.set_font(&font_css(*font_size));
                ctx.set_fill_style_str(&primitive.paint.stroke.to_css());
                for (i, line) in text.lines().enumerate() {
                    let y = origin.y + i as f64 * font_size * 1.2;
                    if let Err(e) = ctx.fill_text(line, origin.x, y) {
                        log::warn!("Failed to draw text for {}: {:?}", primitive.origin, e);
                    }
                }
            }
        }
    }

    fn place(&self, view: &WidgetView) -> Result<(), JsValue> {
        let element = self
            .document
            .create_element("div")?
            .dyn_into::<HtmlElement>()?;
        element.set_attribute("style", &overlay_style(view.bounds, self.zoom))?;
        element.set_attribute("data-object-id", &view.object_id)?;
        match &view.content {
            WidgetContent::Html(html) => {
                element.set_class_name(WIDGET_CLASS);
                element.set_inner_html(html);
            }
            WidgetContent::Placeholder(message) => {
                element.set_class_name(&format!("{} {}", WIDGET_CLASS, WIDGET_ERROR_CLASS));
                element.set_text_content(Some(message));
            }
        }
        self.overlay.append_child(&element)?;
        Ok(())
    }
}

impl Surface for Canvas2dSurface {
    fn clear(&mut self) {
        self.primitives.clear();
    }

    fn set_background(&mut self, color: SerializableColor) {
        self.background = color;
    }

    fn clear_overlay(&mut self) {
        self.widgets.clear();
    }

    fn draw(&mut self, primitive: &Primitive) {
        self.primitives.push(primitive.clone());
    }

    fn place_widget(&mut self, view: &WidgetView) {
        self.widgets.push(view.clone());
    }

    fn render(&mut self) {
        let width = self.canvas.width() as f64;
        let height = self.canvas.height() as f64;
        let ctx = &self.ctx;

        let _ = ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        ctx.clear_rect(0.0, 0.0, width, height);
        ctx.set_fill_style_str(&self.background.to_css());
        ctx.fill_rect(0.0, 0.0, width, height);

        let _ = ctx.set_transform(self.zoom, 0.0, 0.0, self.zoom, 0.0, 0.0);
        ctx.set_line_cap("round");
        ctx.set_line_join("round");
        ctx.set_text_baseline("top");
        for primitive in &self.primitives {
            self.paint(primitive);
        }

        self.overlay.set_inner_html("");
        for view in &self.widgets {
            if let Err(e) = self.place(view) {
                log::warn!("Failed to place widget {}: {:?}", view.object_id, e);
            }
        }
    }

    fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    fn set_interactive(&mut self, interactive: bool) {
        let value = if interactive { "auto" } else { "none" };
        let _ = self.canvas.style().set_property("pointer-events", value);
        let _ = self.overlay.style().set_property("pointer-events", value);
    }

    fn show_banner(&mut self, text: Option<&str>) {
        let style = self.banner.style();
        match text {
            Some(text) => {
                self.banner.set_text_content(Some(text));
                let _ = style.set_property("display", "block");
            }
            None => {
                self.banner.set_text_content(None);
                let _ = style.set_property("display", "none");
            }
        }
    }
}
