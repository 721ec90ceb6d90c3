//! CSS helpers for the canvas and widget overlay.

use kurbo::Rect;

/// Font used for text objects.
pub const FONT_FAMILY: &str = "sans-serif";

/// CSS class of a widget container in the overlay.
pub const WIDGET_CLASS: &str = "tutorboard-widget";

/// CSS class added to a widget container showing a failure placeholder.
pub const WIDGET_ERROR_CLASS: &str = "tutorboard-widget-error";

/// Canvas font shorthand for a text primitive.
pub fn font_css(font_size: f64) -> String {
    format!("{}px {}", font_size, FONT_FAMILY)
}

/// Absolute position of a widget container, in overlay pixels.
pub fn overlay_style(bounds: Rect, zoom: f64) -> String {
    format!(
        "position:absolute;left:{}px;top:{}px;width:{}px;height:{}px;overflow:hidden",
        bounds.x0 * zoom,
        bounds.y0 * zoom,
        bounds.width() * zoom,
        bounds.height() * zoom,
    )
}
