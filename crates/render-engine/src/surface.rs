//! Drawing surfaces.
//!
//! A surface owns a pixel size and an ordered element list. The export
//! pipeline only talks to surfaces through [`RenderSurface`]; the
//! [`RasterSurface`] implementation paints into an RGBA buffer and encodes
//! PNG.

use std::fmt;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, Blend};
use imageproc::rect::Rect;
use vellum_common::config::FontConfig;
use vellum_common::error::{VellumError, VellumResult};
use vellum_scene_model::element::{ElementId, SceneElement, Shape};
use vellum_scene_model::geometry::{Axis, CanvasSize};

/// Font size used when a text element has none.
pub const DEFAULT_FONT_SIZE: f64 = 12.0;

/// Average glyph advance relative to the font size, used to size
/// selection boxes around text.
const TEXT_ADVANCE_RATIO: f64 = 0.6;

/// Capabilities the export pipeline needs from a surface.
pub trait RenderSurface: Send {
    /// Create an empty surface.
    fn create(container: &str, size: CanvasSize, style: &SurfaceStyle) -> VellumResult<Self>
    where
        Self: Sized;

    /// Name of the container the surface was created in.
    fn container(&self) -> &str;

    fn size(&self) -> CanvasSize;

    fn style(&self) -> &SurfaceStyle;

    fn add_element(&mut self, element: SceneElement);

    fn elements(&self) -> &[SceneElement];

    /// Mutable access to the elements. Marks the surface as changed.
    fn elements_mut(&mut self) -> &mut Vec<SceneElement>;

    /// Draw every element.
    fn render(&mut self) -> VellumResult<()>;

    /// Encode the last render as PNG.
    fn rasterize(&self) -> VellumResult<Vec<u8>>;

    /// Release the surface's resources.
    fn destroy(&mut self);

    fn width(&self) -> u32 {
        self.size().width
    }

    fn height(&self) -> u32 {
        self.size().height
    }

    fn element(&self, id: &ElementId) -> Option<&SceneElement> {
        self.elements().iter().find(|el| &el.id == id)
    }
}

/// Visual settings shared by a surface and the surfaces exported from it.
#[derive(Clone)]
pub struct SurfaceStyle {
    /// Background color (any CSS color string).
    pub background: String,

    /// Font for text elements. Text is skipped when `None`.
    pub font: Option<FontArc>,
}

impl SurfaceStyle {
    pub fn new(background: impl Into<String>) -> Self {
        Self {
            background: background.into(),
            font: None,
        }
    }

    /// Style with the font named in the configuration, if any.
    pub fn from_config(background: impl Into<String>, fonts: &FontConfig) -> VellumResult<Self> {
        let mut style = Self::new(background);
        if let Some(path) = &fonts.text_font {
            style.font = Some(load_font(path)?);
        }
        Ok(style)
    }
}

impl Default for SurfaceStyle {
    fn default() -> Self {
        Self::new("transparent")
    }
}

impl fmt::Debug for SurfaceStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceStyle")
            .field("background", &self.background)
            .field("font", &self.font.is_some())
            .finish()
    }
}

/// Load a TTF/OTF font from disk.
pub fn load_font(path: &Path) -> VellumResult<FontArc> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            VellumError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            VellumError::Io(e)
        }
    })?;
    FontArc::try_from_vec(bytes)
        .map_err(|e| VellumError::config(format!("invalid font {}: {e}", path.display())))
}

/// Parse a CSS color string into RGBA.
pub fn parse_color(color: &str) -> VellumResult<Rgba<u8>> {
    let parsed = csscolorparser::parse(color)
        .map_err(|e| VellumError::render(format!("invalid color `{color}`: {e}")))?;
    Ok(Rgba(parsed.to_rgba8()))
}

/// Headless surface painting into an RGBA buffer.
pub struct RasterSurface {
    container: String,
    size: CanvasSize,
    style: SurfaceStyle,
    elements: Vec<SceneElement>,
    canvas: Blend<RgbaImage>,
    dirty: bool,
    destroyed: bool,
}

impl RasterSurface {
    /// Pixels of the last render.
    pub fn pixels(&self) -> &RgbaImage {
        &self.canvas.0
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn paint(&mut self) -> VellumResult<()> {
        let background = parse_color(&self.style.background)?;
        self.canvas = Blend(RgbaImage::from_pixel(
            self.size.width,
            self.size.height,
            background,
        ));

        let mut skipped_text = 0usize;
        for element in &self.elements {
            match &element.shape {
                Shape::Rect(rect) => {
                    let fill = parse_color(&rect.fill)?;
                    if let Some(area) = element_rect(element) {
                        draw_filled_rect_mut(&mut self.canvas, area, fill);
                    }
                }
                Shape::Image(img) => {
                    let bitmap = img.bitmap.as_ref().ok_or_else(|| {
                        VellumError::render(format!(
                            "image {} ({}) has no pixel data",
                            element.id, img.source
                        ))
                    })?;
                    let area = ImageBox {
                        x: element.pixel(Axis::X).unwrap_or(0.0),
                        y: element.pixel(Axis::Y).unwrap_or(0.0),
                        width: element.pixel(Axis::Width).unwrap_or(bitmap.width() as f64),
                        height: element.pixel(Axis::Height).unwrap_or(bitmap.height() as f64),
                    };
                    draw_image(&mut self.canvas.0, bitmap.image(), area);
                }
                Shape::Text(text) => {
                    let Some(font) = &self.style.font else {
                        skipped_text += 1;
                        continue;
                    };
                    let fill = parse_color(&text.fill)?;
                    let size = element.pixel(Axis::FontSize).unwrap_or(DEFAULT_FONT_SIZE);
                    if size <= 0.0 {
                        continue;
                    }
                    draw_text_mut(
                        &mut self.canvas,
                        fill,
                        element.pixel(Axis::X).unwrap_or(0.0) as i32,
                        element.pixel(Axis::Y).unwrap_or(0.0) as i32,
                        PxScale::from(size as f32),
                        font,
                        &text.content,
                    );
                }
                Shape::Overlay(overlay) => {
                    if !overlay.visible {
                        continue;
                    }
                    let stroke = parse_color(&overlay.stroke)?;
                    let target = self.elements.iter().find(|el| el.id == overlay.target);
                    if let Some(area) = target.and_then(element_rect) {
                        draw_hollow_rect_mut(&mut self.canvas, area, stroke);
                    }
                }
            }
        }

        if skipped_text > 0 {
            tracing::warn!(
                container = %self.container,
                skipped = skipped_text,
                "No font configured, text elements were not drawn"
            );
        }
        Ok(())
    }
}

/// Where an image is placed, in surface pixels. May extend past the surface.
#[derive(Debug, Clone, Copy)]
struct ImageBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Composite `image` scaled into `area`.
///
/// Only the part of the box inside the canvas is resampled, so the work and
/// memory are bounded by the canvas size however large the box is.
fn draw_image(canvas: &mut RgbaImage, image: &RgbaImage, area: ImageBox) {
    if area.width < 1.0 || area.height < 1.0 || image.width() == 0 || image.height() == 0 {
        return;
    }
    let left = area.x.max(0.0);
    let top = area.y.max(0.0);
    let right = (area.x + area.width).min(canvas.width() as f64);
    let bottom = (area.y + area.height).min(canvas.height() as f64);
    let (out_w, out_h) = ((right - left) as u32, (bottom - top) as u32);
    if right <= left || bottom <= top || out_w == 0 || out_h == 0 {
        return;
    }

    // Matching window of the source, widened to whole source pixels.
    let (src_w, src_h) = (image.width() as f64, image.height() as f64);
    let sx0 = (((left - area.x) / area.width * src_w).floor() as u32).min(image.width() - 1);
    let sy0 = (((top - area.y) / area.height * src_h).floor() as u32).min(image.height() - 1);
    let sx1 = (((right - area.x) / area.width * src_w).ceil() as u32).clamp(sx0 + 1, image.width());
    let sy1 =
        (((bottom - area.y) / area.height * src_h).ceil() as u32).clamp(sy0 + 1, image.height());

    let window = imageops::crop_imm(image, sx0, sy0, sx1 - sx0, sy1 - sy0).to_image();
    let (dx, dy) = (left as i64, top as i64);
    if window.dimensions() == (out_w, out_h) {
        imageops::overlay(canvas, &window, dx, dy);
    } else {
        let scaled = imageops::resize(&window, out_w, out_h, FilterType::Triangle);
        imageops::overlay(canvas, &scaled, dx, dy);
    }
}

/// Pixel bounds of an element, `None` when it has no visible area.
fn element_rect(element: &SceneElement) -> Option<Rect> {
    let x = element.pixel(Axis::X).unwrap_or(0.0);
    let y = element.pixel(Axis::Y).unwrap_or(0.0);
    let (mut x, mut y, mut w, mut h) = match &element.shape {
        Shape::Rect(_) => (x, y, element.pixel(Axis::Width)?, element.pixel(Axis::Height)?),
        Shape::Image(img) => {
            let native = img.bitmap.as_ref().map(|b| (b.width() as f64, b.height() as f64));
            let w = element.pixel(Axis::Width).or(native.map(|n| n.0))?;
            let h = element.pixel(Axis::Height).or(native.map(|n| n.1))?;
            (x, y, w, h)
        }
        Shape::Text(text) => {
            let size = element.pixel(Axis::FontSize).unwrap_or(DEFAULT_FONT_SIZE);
            let chars = text.content.chars().count() as f64;
            (x, y, chars * size * TEXT_ADVANCE_RATIO, size)
        }
        Shape::Overlay(_) => return None,
    };

    // Negative sizes extend to the left/top of the origin.
    if w < 0.0 {
        x += w;
        w = -w;
    }
    if h < 0.0 {
        y += h;
        h = -h;
    }
    if w < 1.0 || h < 1.0 {
        return None;
    }
    Some(Rect::at(x as i32, y as i32).of_size(w as u32, h as u32))
}

impl RenderSurface for RasterSurface {
    fn create(container: &str, size: CanvasSize, style: &SurfaceStyle) -> VellumResult<Self> {
        if !size.is_valid() {
            return Err(VellumError::InvalidExportDimensions {
                width: size.width,
                height: size.height,
            });
        }
        let background = parse_color(&style.background)?;
        tracing::debug!(
            container,
            width = size.width,
            height = size.height,
            "Created raster surface"
        );
        Ok(Self {
            container: container.to_string(),
            size,
            style: style.clone(),
            elements: vec![],
            canvas: Blend(RgbaImage::from_pixel(size.width, size.height, background)),
            dirty: false,
            destroyed: false,
        })
    }

    fn container(&self) -> &str {
        &self.container
    }

    fn size(&self) -> CanvasSize {
        self.size
    }

    fn style(&self) -> &SurfaceStyle {
        &self.style
    }

    fn add_element(&mut self, element: SceneElement) {
        self.elements.push(element);
        self.dirty = true;
    }

    fn elements(&self) -> &[SceneElement] {
        &self.elements
    }

    fn elements_mut(&mut self) -> &mut Vec<SceneElement> {
        self.dirty = true;
        &mut self.elements
    }

    fn render(&mut self) -> VellumResult<()> {
        if self.destroyed {
            return Err(VellumError::render(format!(
                "surface `{}` has been destroyed",
                self.container
            )));
        }
        let started = std::time::Instant::now();
        self.paint()?;
        self.dirty = false;
        tracing::debug!(
            container = %self.container,
            elements = self.elements.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rendered surface"
        );
        Ok(())
    }

    fn rasterize(&self) -> VellumResult<Vec<u8>> {
        if self.destroyed {
            return Err(VellumError::render(format!(
                "surface `{}` has been destroyed",
                self.container
            )));
        }
        if self.dirty {
            return Err(VellumError::render(format!(
                "surface `{}` has changes that were not rendered",
                self.container
            )));
        }

        let pixels = &self.canvas.0;
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(
                pixels.as_raw(),
                pixels.width(),
                pixels.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| VellumError::render(format!("PNG encoding failed: {e}")))?;
        Ok(bytes)
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.elements.clear();
        self.canvas = Blend(RgbaImage::new(0, 0));
        self.destroyed = true;
        tracing::debug!(container = %self.container, "Destroyed raster surface");
    }
}
