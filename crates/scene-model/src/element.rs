//! Scene elements and their attribute records.

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vellum_common::error::{VellumError, VellumResult};

use crate::geometry::{Axis, PercentGeometry};

/// Stroke color used for selection overlays.
pub const OVERLAY_STROKE_COLOR: &str = "black";

/// Identifier of an element, unique within a scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Kind of a scene element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Image,
    Text,
    Rect,
    /// Selection/transform handle. Never content.
    Overlay,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Image => "image",
            ElementKind::Text => "text",
            ElementKind::Rect => "rect",
            ElementKind::Overlay => "overlay",
        }
    }

    pub fn is_content(self) -> bool {
        self != ElementKind::Overlay
    }
}

/// Decoded RGBA pixels shared between element copies.
///
/// The pixels are immutable; replacing an element's bitmap swaps the `Arc`.
#[derive(Clone)]
pub struct Bitmap(Arc<RgbaImage>);

impl Bitmap {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    pub fn from_arc(image: Arc<RgbaImage>) -> Self {
        Self(image)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn shares_pixels_with(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmap({}x{})", self.width(), self.height())
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.shares_pixels_with(other)
    }
}

/// An image placed on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageShape {
    /// Source reference as written in the scene (path or URL).
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Pixels currently shown for this element, possibly downscaled.
    #[serde(skip)]
    pub bitmap: Option<Bitmap>,
}

/// A line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextShape {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    pub fill: String,
}

/// A filled rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectShape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    pub fill: String,
}

/// A selection handle drawn around another element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayShape {
    pub target: ElementId,
    pub visible: bool,
    pub stroke: String,
}

/// Variant payload of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Image(ImageShape),
    Text(TextShape),
    Rect(RectShape),
    Overlay(OverlayShape),
}

/// An element on a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneElement {
    pub id: ElementId,

    #[serde(flatten)]
    pub shape: Shape,

    /// Percent mirror of the pixel geometry.
    #[serde(default, skip_serializing_if = "PercentGeometry::is_empty")]
    pub percent: PercentGeometry,
}

impl SceneElement {
    pub fn new(id: impl Into<ElementId>, shape: Shape) -> Self {
        Self {
            id: id.into(),
            shape,
            percent: PercentGeometry::default(),
        }
    }

    /// Selection overlay for `target`, hidden until selected.
    pub fn overlay_for(target: &ElementId) -> Self {
        Self::new(
            ElementId::new(format!("{}-overlay", target)),
            Shape::Overlay(OverlayShape {
                target: target.clone(),
                visible: false,
                stroke: OVERLAY_STROKE_COLOR.to_string(),
            }),
        )
    }

    pub fn kind(&self) -> ElementKind {
        match &self.shape {
            Shape::Image(_) => ElementKind::Image,
            Shape::Text(_) => ElementKind::Text,
            Shape::Rect(_) => ElementKind::Rect,
            Shape::Overlay(_) => ElementKind::Overlay,
        }
    }

    pub fn is_overlay(&self) -> bool {
        self.kind() == ElementKind::Overlay
    }

    /// Independent copy of this element.
    pub fn clone_element(&self) -> Self {
        self.clone()
    }

    fn pixel_slot(&self, axis: Axis) -> Option<&Option<f64>> {
        match (&self.shape, axis) {
            (Shape::Image(s), Axis::X) => Some(&s.x),
            (Shape::Image(s), Axis::Y) => Some(&s.y),
            (Shape::Image(s), Axis::Width) => Some(&s.width),
            (Shape::Image(s), Axis::Height) => Some(&s.height),
            (Shape::Text(s), Axis::X) => Some(&s.x),
            (Shape::Text(s), Axis::Y) => Some(&s.y),
            (Shape::Text(s), Axis::FontSize) => Some(&s.font_size),
            (Shape::Rect(s), Axis::X) => Some(&s.x),
            (Shape::Rect(s), Axis::Y) => Some(&s.y),
            (Shape::Rect(s), Axis::Width) => Some(&s.width),
            (Shape::Rect(s), Axis::Height) => Some(&s.height),
            _ => None,
        }
    }

    fn pixel_slot_mut(&mut self, axis: Axis) -> Option<&mut Option<f64>> {
        match (&mut self.shape, axis) {
            (Shape::Image(s), Axis::X) => Some(&mut s.x),
            (Shape::Image(s), Axis::Y) => Some(&mut s.y),
            (Shape::Image(s), Axis::Width) => Some(&mut s.width),
            (Shape::Image(s), Axis::Height) => Some(&mut s.height),
            (Shape::Text(s), Axis::X) => Some(&mut s.x),
            (Shape::Text(s), Axis::Y) => Some(&mut s.y),
            (Shape::Text(s), Axis::FontSize) => Some(&mut s.font_size),
            (Shape::Rect(s), Axis::X) => Some(&mut s.x),
            (Shape::Rect(s), Axis::Y) => Some(&mut s.y),
            (Shape::Rect(s), Axis::Width) => Some(&mut s.width),
            (Shape::Rect(s), Axis::Height) => Some(&mut s.height),
            _ => None,
        }
    }

    /// Pixel value of an axis, `None` when unset or not applicable.
    pub fn pixel(&self, axis: Axis) -> Option<f64> {
        self.pixel_slot(axis).copied().flatten()
    }

    /// Set the pixel value of an axis. Returns `false` when the axis does
    /// not apply to this kind of element.
    pub fn set_pixel(&mut self, axis: Axis, value: f64) -> bool {
        match self.pixel_slot_mut(axis) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    /// Attribute record of the element.
    ///
    /// Unset values are omitted rather than reported as zero.
    pub fn attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("id".into(), Value::from(self.id.as_str()));
        attrs.insert("kind".into(), Value::from(self.kind().as_str()));

        for &axis in self.kind().geometry_axes() {
            if let Some(v) = self.pixel(axis) {
                attrs.insert(axis.pixel_attr().into(), Value::from(v));
            }
            if let Some(v) = self.percent.get(axis) {
                attrs.insert(axis.percent_attr().into(), Value::from(v));
            }
        }

        match &self.shape {
            Shape::Image(s) => {
                attrs.insert("src".into(), Value::from(s.source.as_str()));
            }
            Shape::Text(s) => {
                attrs.insert("text".into(), Value::from(s.content.as_str()));
                attrs.insert("fill".into(), Value::from(s.fill.as_str()));
            }
            Shape::Rect(s) => {
                attrs.insert("fill".into(), Value::from(s.fill.as_str()));
            }
            Shape::Overlay(s) => {
                attrs.insert("target".into(), Value::from(s.target.as_str()));
                attrs.insert("visible".into(), Value::from(s.visible));
                attrs.insert("stroke".into(), Value::from(s.stroke.as_str()));
            }
        }
        attrs
    }

    /// Set a single attribute.
    ///
    /// Fails with `InvalidAttribute` on an empty name, a `null` value, a
    /// name that does not apply to this kind, or a value of the wrong type.
    /// `id` and `kind` are read-only: passing their current value is a
    /// no-op, anything else fails. The element is unchanged on failure.
    ///
    /// Pixel and percent values are stored as given; the other half of the
    /// pair is not recomputed. Outside an editing session, follow up with
    /// [`sync_percent_geometry`](crate::geometry::sync_percent_geometry) or
    /// [`apply_percent_geometry`](crate::geometry::apply_percent_geometry).
    pub fn set_attribute(&mut self, name: &str, value: &Value) -> VellumResult<()> {
        if name.trim().is_empty() {
            return Err(VellumError::invalid_attribute(
                "attribute name is empty or missing",
            ));
        }
        if value.is_null() {
            return Err(VellumError::invalid_attribute(format!(
                "value for `{name}` is undefined"
            )));
        }

        let kind = self.kind();
        if name == "id" || name == "kind" {
            let current = if name == "id" {
                self.id.as_str()
            } else {
                kind.as_str()
            };
            return match value.as_str() {
                Some(v) if v == current => Ok(()),
                _ => Err(VellumError::invalid_attribute(format!(
                    "`{name}` is read-only (currently `{current}`)"
                ))),
            };
        }
        if let Some(axis) = Axis::from_pixel_attr(name).filter(|a| kind.has_axis(*a)) {
            let v = expect_number(name, value)?;
            self.set_pixel(axis, v);
            return Ok(());
        }
        if let Some(axis) = Axis::from_percent_attr(name).filter(|a| kind.has_axis(*a)) {
            let v = expect_number(name, value)?;
            self.percent.set(axis, Some(v));
            return Ok(());
        }

        match (&mut self.shape, name) {
            (Shape::Image(s), "src") => {
                let src = expect_string(name, value)?;
                if src.trim().is_empty() {
                    return Err(VellumError::invalid_attribute("`src` must not be empty"));
                }
                if s.source != src {
                    s.source = src;
                    s.bitmap = None;
                }
            }
            (Shape::Text(s), "text") => s.content = expect_string(name, value)?,
            (Shape::Text(s), "fill") => s.fill = expect_color(name, value)?,
            (Shape::Rect(s), "fill") => s.fill = expect_color(name, value)?,
            (Shape::Overlay(s), "visible") => {
                s.visible = value.as_bool().ok_or_else(|| {
                    VellumError::invalid_attribute(format!("`{name}` expects a boolean"))
                })?;
            }
            (Shape::Overlay(s), "stroke") => s.stroke = expect_color(name, value)?,
            (Shape::Overlay(s), "target") => {
                s.target = ElementId::new(expect_string(name, value)?);
            }
            _ => {
                return Err(VellumError::invalid_attribute(format!(
                    "`{name}` is not an attribute of a {} element",
                    kind.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Set several attributes at once. Either all are applied or none.
    pub fn set_attributes(&mut self, attrs: &Map<String, Value>) -> VellumResult<()> {
        let mut updated = self.clone();
        for (name, value) in attrs {
            updated.set_attribute(name, value)?;
        }
        *self = updated;
        Ok(())
    }
}

fn expect_number(name: &str, value: &Value) -> VellumResult<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| VellumError::invalid_attribute(format!("`{name}` expects a number")))
}

fn expect_string(name: &str, value: &Value) -> VellumResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| VellumError::invalid_attribute(format!("`{name}` expects a string")))
}

fn expect_color(name: &str, value: &Value) -> VellumResult<String> {
    let color = expect_string(name, value)?;
    csscolorparser::parse(&color).map_err(|e| {
        VellumError::invalid_attribute(format!("`{name}` is not a valid color ({color}): {e}"))
    })?;
    Ok(color)
}
