//! Resolution-independent geometry.
//!
//! Element positions and sizes are mirrored as percentages of the surface
//! they live on. Re-deriving pixels from those percentages against another
//! surface size lets the same layout render at the 800x600 edit size and
//! at a 4000x3000 export size without per-element special cases.
//!
//! Horizontal quantities (`x`, `width`) are relative to the canvas width;
//! vertical ones (`y`, `height`, `font_size`) to the canvas height.

use serde::{Deserialize, Serialize};
use vellum_common::config::PercentPrecision;
use vellum_common::error::{VellumError, VellumResult};

use crate::element::{ElementKind, SceneElement};

/// Millimetres to CSS pixels at 96 DPI.
pub const PIXELS_PER_MM: f64 = 3.779_527_559_1;

/// Pixel dimensions of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether both dimensions are usable for percent conversion.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// The dimension an axis is measured against.
    pub fn dimension(&self, axis: Axis) -> f64 {
        match axis.reference() {
            Reference::Width => self.width as f64,
            Reference::Height => self.height as f64,
        }
    }
}

/// A geometric attribute of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Width,
    Height,
    FontSize,
}

/// Which canvas dimension an axis is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Width,
    Height,
}

impl Axis {
    pub const ALL: [Axis; 5] = [Axis::X, Axis::Y, Axis::Width, Axis::Height, Axis::FontSize];

    pub fn reference(self) -> Reference {
        match self {
            Axis::X | Axis::Width => Reference::Width,
            Axis::Y | Axis::Height | Axis::FontSize => Reference::Height,
        }
    }

    /// Attribute name of the pixel value.
    pub fn pixel_attr(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Width => "width",
            Axis::Height => "height",
            Axis::FontSize => "fontSize",
        }
    }

    /// Attribute name of the percent value.
    pub fn percent_attr(self) -> &'static str {
        match self {
            Axis::X => "px",
            Axis::Y => "py",
            Axis::Width => "pwidth",
            Axis::Height => "pheight",
            Axis::FontSize => "pfontSize",
        }
    }

    pub fn from_pixel_attr(name: &str) -> Option<Axis> {
        Axis::ALL.into_iter().find(|axis| axis.pixel_attr() == name)
    }

    pub fn from_percent_attr(name: &str) -> Option<Axis> {
        Axis::ALL.into_iter().find(|axis| axis.percent_attr() == name)
    }

    fn label(self) -> &'static str {
        match self.reference() {
            Reference::Width => "canvas width",
            Reference::Height => "canvas height",
        }
    }
}

impl ElementKind {
    /// Axes that carry geometry for this kind of element.
    pub fn geometry_axes(self) -> &'static [Axis] {
        match self {
            ElementKind::Text => &[Axis::X, Axis::Y, Axis::FontSize],
            ElementKind::Rect | ElementKind::Image => {
                &[Axis::Width, Axis::Height, Axis::X, Axis::Y]
            }
            ElementKind::Overlay => &[],
        }
    }

    pub fn has_axis(self, axis: Axis) -> bool {
        self.geometry_axes().contains(&axis)
    }
}

/// Percent mirror of an element's geometry.
///
/// Every field is optional: an absent field means the source pixel value was
/// absent, which is different from a value of `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentGeometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub px: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub py: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pwidth: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pheight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pfont_size: Option<f64>,
}

impl PercentGeometry {
    pub fn get(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::X => self.px,
            Axis::Y => self.py,
            Axis::Width => self.pwidth,
            Axis::Height => self.pheight,
            Axis::FontSize => self.pfont_size,
        }
    }

    pub fn set(&mut self, axis: Axis, value: Option<f64>) {
        let slot = match axis {
            Axis::X => &mut self.px,
            Axis::Y => &mut self.py,
            Axis::Width => &mut self.pwidth,
            Axis::Height => &mut self.pheight,
            Axis::FontSize => &mut self.pfont_size,
        };
        *slot = value;
    }

    pub fn is_empty(&self) -> bool {
        Axis::ALL.iter().all(|axis| self.get(*axis).is_none())
    }

    /// Overwrite fields that are present in `other`.
    pub fn merge(&mut self, other: &PercentGeometry) {
        for axis in Axis::ALL {
            if let Some(value) = other.get(axis) {
                self.set(axis, Some(value));
            }
        }
    }
}

fn check_dimension(axis: &'static str, dimension: f64) -> VellumResult<()> {
    if dimension > 0.0 && dimension.is_finite() {
        Ok(())
    } else {
        Err(VellumError::DivisionByZero { axis, dimension })
    }
}

/// Express a pixel value as a percentage of a canvas dimension.
pub fn pixels_to_percent(pixel: f64, dimension: f64) -> VellumResult<f64> {
    check_dimension("reference", dimension)?;
    Ok(pixel / dimension * 100.0)
}

/// Resolve a percentage of a canvas dimension to pixels.
///
/// The result is truncated toward zero, never rounded to nearest.
pub fn percent_to_pixels(percent: f64, dimension: f64) -> VellumResult<f64> {
    check_dimension("reference", dimension)?;
    Ok((percent / 100.0 * dimension).trunc())
}

/// Millimetres to whole pixels at 96 DPI.
pub fn mm_to_pixels(mm: f64) -> f64 {
    (mm * PIXELS_PER_MM).trunc()
}

fn axis_to_percent(axis: Axis, pixel: f64, canvas: CanvasSize) -> VellumResult<f64> {
    let dimension = canvas.dimension(axis);
    check_dimension(axis.label(), dimension)?;
    pixels_to_percent(pixel, dimension)
}

fn axis_to_pixels(axis: Axis, percent: f64, canvas: CanvasSize) -> VellumResult<f64> {
    let dimension = canvas.dimension(axis);
    check_dimension(axis.label(), dimension)?;
    percent_to_pixels(percent, dimension)
}

/// Compute the percent geometry of an element against a canvas.
///
/// Only the axes relevant to the element's kind are considered, and only the
/// ones whose pixel value is present end up in the result.
pub fn extract_percent_geometry(
    element: &SceneElement,
    canvas: CanvasSize,
    precision: PercentPrecision,
) -> VellumResult<PercentGeometry> {
    let mut percent = PercentGeometry::default();
    for &axis in element.kind().geometry_axes() {
        let Some(pixel) = element.pixel(axis) else {
            continue;
        };
        let value = axis_to_percent(axis, pixel, canvas)?;
        let value = match precision {
            PercentPrecision::Exact => value,
            PercentPrecision::WholePercent => value.trunc(),
        };
        percent.set(axis, Some(value));
    }
    Ok(percent)
}

/// Derive pixel geometry from percentages against a canvas and merge it into
/// the element.
///
/// Axes absent from `percent`, or irrelevant to the element's kind, are left
/// untouched. The element's percent mirror is updated with the applied
/// values. Nothing is written if any conversion fails.
pub fn apply_percent_geometry(
    element: &mut SceneElement,
    percent: &PercentGeometry,
    canvas: CanvasSize,
) -> VellumResult<()> {
    let kind = element.kind();
    let mut resolved = Vec::with_capacity(kind.geometry_axes().len());
    for &axis in kind.geometry_axes() {
        if let Some(value) = percent.get(axis) {
            resolved.push((axis, value, axis_to_pixels(axis, value, canvas)?));
        }
    }

    for (axis, value, pixels) in resolved {
        element.set_pixel(axis, pixels);
        element.percent.set(axis, Some(value));
    }
    Ok(())
}

/// Refresh an element's percent mirror from its current pixel geometry.
pub fn sync_percent_geometry(
    element: &mut SceneElement,
    canvas: CanvasSize,
    precision: PercentPrecision,
) -> VellumResult<()> {
    let percent = extract_percent_geometry(element, canvas, precision)?;
    element.percent.merge(&percent);
    Ok(())
}

/// Make pixel and percent geometry agree on a canvas.
///
/// Percentages win where present; axes that only have pixels get their
/// percentage computed.
pub fn reconcile_geometry(
    element: &mut SceneElement,
    canvas: CanvasSize,
    precision: PercentPrecision,
) -> VellumResult<()> {
    let stored = element.percent;
    apply_percent_geometry(element, &stored, canvas)?;

    let derived = extract_percent_geometry(element, canvas, precision)?;
    for &axis in element.kind().geometry_axes() {
        if stored.get(axis).is_none() {
            element.percent.set(axis, derived.get(axis));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{RectShape, Shape, TextShape};

    fn rect(x: Option<f64>, y: Option<f64>, w: Option<f64>, h: Option<f64>) -> SceneElement {
        SceneElement::new(
            "rect-1",
            Shape::Rect(RectShape {
                x,
                y,
                width: w,
                height: h,
                fill: "red".to_string(),
            }),
        )
    }

    #[test]
    fn test_pixels_to_percent() {
        assert!((pixels_to_percent(200.0, 800.0).unwrap() - 25.0).abs() < 1e-9);
        assert!((pixels_to_percent(0.0, 800.0).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_zero_dimension_is_division_by_zero() {
        assert!(matches!(
            pixels_to_percent(10.0, 0.0),
            Err(VellumError::DivisionByZero { .. })
        ));
        assert!(matches!(
            percent_to_pixels(10.0, -4.0),
            Err(VellumError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_percent_to_pixels_truncates() {
        assert_eq!(percent_to_pixels(16.9, 100.0).unwrap(), 16.0);
        assert_eq!(percent_to_pixels(12.9, 100.0).unwrap(), 12.0);
        assert_eq!(percent_to_pixels(25.0, 3000.0).unwrap(), 750.0);
        assert_eq!(percent_to_pixels(-12.9, 100.0).unwrap(), -12.0);
    }

    #[test]
    fn test_mm_to_pixels() {
        assert_eq!(mm_to_pixels(210.0), 793.0);
        assert_eq!(mm_to_pixels(0.0), 0.0);
    }

    #[test]
    fn test_extract_omits_absent_axes() {
        let el = rect(Some(10.0), Some(0.0), None, Some(60.0));
        let pct = extract_percent_geometry(
            &el,
            CanvasSize::new(800, 600),
            PercentPrecision::Exact,
        )
        .unwrap();

        assert!(pct.pwidth.is_none());
        assert_eq!(pct.py, Some(0.0));
        assert!((pct.pheight.unwrap() - 10.0).abs() < 1e-9);
        assert!(pct.pfont_size.is_none());
    }

    #[test]
    fn test_extract_text_uses_height_for_font_size() {
        let el = SceneElement::new(
            "text-1",
            Shape::Text(TextShape {
                content: "hello".to_string(),
                x: Some(80.0),
                y: Some(60.0),
                font_size: Some(30.0),
                fill: "black".to_string(),
            }),
        );
        let pct = extract_percent_geometry(
            &el,
            CanvasSize::new(800, 600),
            PercentPrecision::Exact,
        )
        .unwrap();
        assert_eq!(pct.px, Some(10.0));
        assert_eq!(pct.py, Some(10.0));
        assert_eq!(pct.pfont_size, Some(5.0));
        assert!(pct.pwidth.is_none());
    }

    #[test]
    fn test_apply_only_touches_present_axes() {
        let mut el = rect(Some(5.0), Some(6.0), Some(7.0), Some(8.0));
        let pct = PercentGeometry {
            px: Some(50.0),
            ..Default::default()
        };
        apply_percent_geometry(&mut el, &pct, CanvasSize::new(1000, 500)).unwrap();
        assert_eq!(el.pixel(Axis::X), Some(500.0));
        assert_eq!(el.pixel(Axis::Y), Some(6.0));
        assert_eq!(el.pixel(Axis::Width), Some(7.0));
        assert_eq!(el.percent.px, Some(50.0));
        assert!(el.percent.py.is_none());
    }

    #[test]
    fn test_apply_ignores_axes_irrelevant_to_kind() {
        let mut el = rect(None, None, None, None);
        let pct = PercentGeometry {
            pfont_size: Some(10.0),
            ..Default::default()
        };
        apply_percent_geometry(&mut el, &pct, CanvasSize::new(800, 600)).unwrap();
        assert!(el.percent.pfont_size.is_none());
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let mut el = rect(Some(1.0), Some(2.0), None, None);
        let pct = PercentGeometry {
            px: Some(10.0),
            py: Some(10.0),
            ..Default::default()
        };
        let err = apply_percent_geometry(&mut el, &pct, CanvasSize::new(800, 0)).unwrap_err();
        assert!(matches!(err, VellumError::DivisionByZero { .. }));
        assert_eq!(el.pixel(Axis::X), Some(1.0));
        assert!(el.percent.px.is_none());
    }

    #[test]
    fn test_resize_export_scenario() {
        let el = rect(Some(100.0), Some(150.0), Some(200.0), Some(100.0));
        let pct = extract_percent_geometry(
            &el,
            CanvasSize::new(800, 600),
            PercentPrecision::WholePercent,
        )
        .unwrap();
        assert_eq!(
            pct,
            PercentGeometry {
                px: Some(12.0),
                py: Some(25.0),
                pwidth: Some(25.0),
                pheight: Some(16.0),
                pfont_size: None,
            }
        );

        let mut clone = el.clone();
        apply_percent_geometry(&mut clone, &pct, CanvasSize::new(4000, 3000)).unwrap();
        assert_eq!(clone.pixel(Axis::X), Some(480.0));
        assert_eq!(clone.pixel(Axis::Y), Some(750.0));
        assert_eq!(clone.pixel(Axis::Width), Some(1000.0));
        assert_eq!(clone.pixel(Axis::Height), Some(480.0));
    }

    #[test]
    fn test_reconcile_prefers_stored_percentages() {
        let mut el = rect(Some(1.0), Some(40.0), None, None);
        el.percent.px = Some(50.0);
        reconcile_geometry(&mut el, CanvasSize::new(800, 600), PercentPrecision::Exact).unwrap();
        assert_eq!(el.pixel(Axis::X), Some(400.0));
        assert_eq!(el.percent.py.map(|v| (v * 1e6).round()), Some(6_666_667.0));
        assert!(el.percent.pwidth.is_none());
    }
}
