//! Whiteboard object specifications.
//!
//! The backend owns the authoritative, ordered list of objects for a session.
//! Each object is a tagged variant over the drawable kinds; the board never
//! patches its scene incrementally, it rebuilds from this list.

use kurbo::Point;
use serde::de::Error as _;
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Identifier of a whiteboard object, unique within a session.
pub type ObjectId = String;

/// Kinds this build can draw or place.
pub const KNOWN_KINDS: &[&str] = &["ink", "rect", "ellipse", "arrow", "line", "text", "widget"];

/// Default font size for text objects.
pub const DEFAULT_FONT_SIZE: f64 = 16.0;

/// Default stroke width when a style does not carry one.
pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Parse a CSS color: `#rgb`, `#rrggbb`, `#rrggbbaa` or `transparent`.
    pub fn parse(color: &str) -> Option<Self> {
        let color = color.trim();
        if color.eq_ignore_ascii_case("transparent") {
            return Some(Self::transparent());
        }

        let hex = color.strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        match hex.len() {
            3 => {
                // #rgb -> #rrggbb
                let r = channel(0..1)? * 17;
                let g = channel(1..2)? * 17;
                let b = channel(2..3)? * 17;
                Some(Self::new(r, g, b, 255))
            }
            6 => Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?, 255)),
            8 => Some(Self::new(
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            )),
            _ => None,
        }
    }

    /// CSS `rgba()` form, suitable for a 2D canvas context.
    pub fn to_css(&self) -> String {
        format!(
            "rgba({}, {}, {}, {})",
            self.r,
            self.g,
            self.b,
            f64::from(self.a) / 255.0
        )
    }
}

/// Stroke and fill style carried by drawable objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
}

impl ObjectStyle {
    /// Stroke color; unparseable or missing colors fall back to black.
    pub fn stroke_color(&self) -> SerializableColor {
        self.stroke
            .as_deref()
            .and_then(SerializableColor::parse)
            .unwrap_or_else(SerializableColor::black)
    }

    /// Fill color, if the style has a parseable one.
    pub fn fill_color(&self) -> Option<SerializableColor> {
        self.fill.as_deref().and_then(SerializableColor::parse)
    }

    pub fn stroke_width(&self) -> f64 {
        self.stroke_width
            .filter(|w| w.is_finite() && *w >= 0.0)
            .unwrap_or(DEFAULT_STROKE_WIDTH)
    }
}

/// Kind-specific geometry of an object.
///
/// Tagged by `kind` on the wire. Tags this build does not know are kept in
/// [`ObjectShape::Unknown`] with their fields, skipped by the sync engine and
/// written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ObjectShape {
    /// Freehand stroke.
    Ink {
        points: Vec<Point>,
        #[serde(default)]
        style: ObjectStyle,
    },
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        #[serde(default)]
        style: ObjectStyle,
    },
    /// Ellipse inscribed in the given bounding box.
    Ellipse {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        #[serde(default)]
        style: ObjectStyle,
    },
    Arrow {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        #[serde(default)]
        style: ObjectStyle,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        #[serde(default)]
        style: ObjectStyle,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        #[serde(rename = "fontSize", default = "default_font_size")]
        font_size: f64,
        #[serde(default)]
        style: ObjectStyle,
    },
    /// Non-canvas-native object rendered by a registered widget.
    Widget {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        /// Registry key of the widget renderer.
        widget: String,
        #[serde(default)]
        props: Value,
    },
    /// A kind from a newer client.
    #[serde(skip)]
    Unknown {
        kind: String,
        fields: Map<String, Value>,
    },
}

fn default_font_size() -> f64 {
    DEFAULT_FONT_SIZE
}

impl ObjectShape {
    /// Wire name of this kind.
    pub fn kind_name(&self) -> &str {
        match self {
            ObjectShape::Ink { .. } => "ink",
            ObjectShape::Rect { .. } => "rect",
            ObjectShape::Ellipse { .. } => "ellipse",
            ObjectShape::Arrow { .. } => "arrow",
            ObjectShape::Line { .. } => "line",
            ObjectShape::Text { .. } => "text",
            ObjectShape::Widget { .. } => "widget",
            ObjectShape::Unknown { kind, .. } => kind,
        }
    }
}

/// A single whiteboard object as stored by the backend.
///
/// On the wire the shape's fields sit next to `id` and `meta`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSpec {
    pub id: ObjectId,
    pub shape: ObjectShape,
    /// Free-form metadata, passed through untouched.
    pub meta: Option<Value>,
}

impl Serialize for ObjectSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        match &self.shape {
            ObjectShape::Unknown { kind, fields } => {
                map.serialize_entry("kind", kind)?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
            }
            shape => match serde_json::to_value(shape).map_err(S::Error::custom)? {
                Value::Object(fields) => {
                    for (key, value) in &fields {
                        map.serialize_entry(key, value)?;
                    }
                }
                other => return Err(S::Error::custom(format!("shape is not a map: {}", other))),
            },
        }
        if let Some(meta) = &self.meta {
            map.serialize_entry("meta", meta)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ObjectSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let id = match fields.remove("id") {
            Some(Value::String(id)) => id,
            Some(other) => return Err(D::Error::custom(format!("invalid object id: {}", other))),
            None => return Err(D::Error::missing_field("id")),
        };
        let meta = fields.remove("meta").filter(|meta| !meta.is_null());
        let kind = match fields.get("kind") {
            Some(Value::String(kind)) => kind.clone(),
            Some(other) => return Err(D::Error::custom(format!("invalid object kind: {}", other))),
            None => return Err(D::Error::missing_field("kind")),
        };

        let shape = if KNOWN_KINDS.contains(&kind.as_str()) {
            serde_json::from_value(Value::Object(fields)).map_err(D::Error::custom)?
        } else {
            fields.remove("kind");
            ObjectShape::Unknown { kind, fields }
        };
        Ok(Self { id, shape, meta })
    }
}

impl ObjectSpec {
    /// Create an object with a freshly generated identifier.
    pub fn new(shape: ObjectShape) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), shape)
    }

    pub fn with_id(id: impl Into<ObjectId>, shape: ObjectShape) -> Self {
        Self {
            id: id.into(),
            shape,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn kind_name(&self) -> &str {
        self.shape.kind_name()
    }
}

/// Parse a JSON array of objects, dropping entries that fail to parse.
///
/// One malformed object must not take down a whole snapshot.
pub fn parse_object_list(values: Vec<Value>) -> Vec<ObjectSpec> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<ObjectSpec>(value) {
            Ok(object) => Some(object),
            Err(e) => {
                log::warn!("Dropping malformed whiteboard object: {}", e);
                None
            }
        })
        .collect()
}

/// Serde adapter for [`parse_object_list`].
pub fn deserialize_object_list<'de, D>(deserializer: D) -> Result<Vec<ObjectSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Value>::deserialize(deserializer)?;
    Ok(parse_object_list(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_hex_colors() {
        assert_eq!(
            SerializableColor::parse("#fff"),
            Some(SerializableColor::white())
        );
        assert_eq!(
            SerializableColor::parse("#ff000080"),
            Some(SerializableColor::new(255, 0, 0, 128))
        );
        assert_eq!(
            SerializableColor::parse("transparent"),
            Some(SerializableColor::transparent())
        );
        assert_eq!(SerializableColor::parse("red"), None);
        assert_eq!(SerializableColor::parse("#12"), None);
    }

    #[test]
    fn test_style_fallbacks() {
        let style = ObjectStyle {
            stroke: Some("not-a-color".to_string()),
            fill: None,
            stroke_width: Some(f64::NAN),
        };
        assert_eq!(style.stroke_color(), SerializableColor::black());
        assert_eq!(style.fill_color(), None);
        assert_eq!(style.stroke_width(), DEFAULT_STROKE_WIDTH);
    }

    #[test]
    fn test_deserialize_rect_with_meta() {
        let value = json!({
            "id": "r1",
            "kind": "rect",
            "x": 10, "y": 20, "w": 30, "h": 40,
            "style": { "stroke": "#000000", "strokeWidth": 3 },
            "meta": { "author": "tutor" }
        });
        let object: ObjectSpec = serde_json::from_value(value).unwrap();
        assert_eq!(object.id, "r1");
        assert_eq!(object.meta, Some(json!({ "author": "tutor" })));
        match object.shape {
            ObjectShape::Rect { x, w, style, .. } => {
                assert_eq!(x, 10.0);
                assert_eq!(w, 30.0);
                assert_eq!(style.stroke_width(), 3.0);
            }
            other => panic!("expected rect, got {:?}", other),
        }
    }

    fn note() -> ObjectShape {
        ObjectShape::Unknown {
            kind: "note".to_string(),
            fields: Map::new(),
        }
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let value = json!({ "id": "x1", "kind": "hologram", "depth": 3 });
        let object: ObjectSpec = serde_json::from_value(value).unwrap();
        assert_eq!(object.kind_name(), "hologram");
        match &object.shape {
            ObjectShape::Unknown { fields, .. } => assert_eq!(fields.get("depth"), Some(&json!(3))),
            other => panic!("expected unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_written_back_unchanged() {
        let value = json!({
            "id": "s1",
            "kind": "sticker",
            "emoji": "*",
            "x": 4,
            "meta": { "author": "student" }
        });
        let object: ObjectSpec = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&object).unwrap(), value);
    }

    #[test]
    fn test_known_kind_keeps_wire_shape() {
        let value = json!({
            "id": "l1",
            "kind": "line",
            "x1": 0.0, "y1": 1.0, "x2": 2.0, "y2": 3.0,
            "style": { "stroke": "#ff0000" }
        });
        let object: ObjectSpec = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&object).unwrap(), value);
    }

    #[test]
    fn test_bad_id_or_kind_is_rejected() {
        assert!(serde_json::from_value::<ObjectSpec>(json!({ "id": 7, "kind": "rect" })).is_err());
        assert!(serde_json::from_value::<ObjectSpec>(json!({ "id": "a", "kind": 7 })).is_err());
        assert!(serde_json::from_value::<ObjectSpec>(json!({ "id": "a" })).is_err());
    }

    #[test]
    fn test_text_font_size_default() {
        let value = json!({ "id": "t1", "kind": "text", "x": 0, "y": 0, "text": "hi" });
        let object: ObjectSpec = serde_json::from_value(value).unwrap();
        match object.shape {
            ObjectShape::Text { font_size, .. } => assert_eq!(font_size, DEFAULT_FONT_SIZE),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_object_list_skips_malformed_entries() {
        let values = vec![
            json!({ "id": "a", "kind": "line", "x1": 0, "y1": 0, "x2": 1, "y2": 1 }),
            json!({ "kind": "rect" }),
            json!({ "id": "b", "kind": "ink", "points": [{ "x": 1, "y": 2 }] }),
        ];
        let objects = parse_object_list(values);
        let ids: Vec<_> = objects.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_new_objects_get_unique_ids() {
        let a = ObjectSpec::new(note());
        let b = ObjectSpec::new(note());
        assert_ne!(a.id, b.id);
    }
}
