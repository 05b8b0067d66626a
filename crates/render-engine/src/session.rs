//! Editing sessions.
//!
//! A session owns the live surface of one scene, its frozen image cache,
//! and an exporter. Elements on the live surface carry downscaled pixels;
//! exports go back to the cache for full-resolution ones.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::{self, FilterType};
use serde_json::{Map, Value};
use vellum_common::config::{AppConfig, PercentPrecision};
use vellum_common::error::{VellumError, VellumResult};
use vellum_scene_model::element::{Bitmap, ElementId, SceneElement, Shape};
use vellum_scene_model::geometry::{
    apply_percent_geometry, extract_percent_geometry, reconcile_geometry, sync_percent_geometry,
    Axis, PercentGeometry,
};
use vellum_scene_model::scene::{LoadedScene, Scene};

use crate::cache::ImageCache;
use crate::compositor::snapshot_content;
use crate::export::{CancelToken, ExportOutcome, ExportRequest, Exporter, ProgressCallback};
use crate::save::FileSaver;
use crate::surface::{RasterSurface, RenderSurface, SurfaceStyle};

/// Container name given to live surfaces.
pub const EDIT_CONTAINER: &str = "edit";

/// Percent mirrors on the live surface keep full precision.
const LIVE_PRECISION: PercentPrecision = PercentPrecision::Exact;

/// An open scene being edited.
pub struct EditorSession<S: RenderSurface = RasterSurface> {
    root: PathBuf,
    scene: Scene,
    surface: S,
    cache: Arc<ImageCache>,
    exporter: Exporter,
    selected: Option<ElementId>,
}

impl<S: RenderSurface + 'static> EditorSession<S> {
    /// Load a scene directory and open it with the configured fonts.
    pub async fn open_dir(root: impl AsRef<Path>, config: &AppConfig) -> VellumResult<Self> {
        let loaded = LoadedScene::load(root)
            .map_err(|e| VellumError::scene(format!("Failed to load scene: {e}")))?;
        let style = SurfaceStyle::from_config(loaded.scene.background.clone(), &config.fonts)?;
        Self::open(loaded, style).await
    }

    /// Open a loaded scene.
    ///
    /// Every image source is decoded before the live surface is built; one
    /// failed decode fails the whole open.
    pub async fn open(loaded: LoadedScene, style: SurfaceStyle) -> VellumResult<Self> {
        let LoadedScene { root, mut scene } = loaded;
        let canvas = scene.canvas;
        if !canvas.is_valid() {
            return Err(VellumError::scene(format!(
                "canvas size {}x{} is not usable",
                canvas.width, canvas.height
            )));
        }

        let cache = ImageCache::load(&root, scene.image_sources()).await?;

        let mut surface = S::create(EDIT_CONTAINER, canvas, &style)?;
        let mut content_ids = Vec::new();
        for mut element in std::mem::take(&mut scene.elements) {
            if element.is_overlay() {
                tracing::warn!(id = %element.id, "Dropping overlay stored in scene");
                continue;
            }
            reconcile_geometry(&mut element, canvas, LIVE_PRECISION)?;
            attach_live_bitmap(&cache, &mut element)?;
            content_ids.push(element.id.clone());
            surface.add_element(element);
        }
        for id in &content_ids {
            surface.add_element(SceneElement::overlay_for(id));
        }

        tracing::info!(
            root = %root.display(),
            elements = content_ids.len(),
            images = cache.len(),
            width = canvas.width,
            height = canvas.height,
            "Opened editing session"
        );

        Ok(Self {
            root,
            scene,
            surface,
            cache: Arc::new(cache),
            exporter: Exporter::new(),
            selected: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    pub fn selected(&self) -> Option<&ElementId> {
        self.selected.as_ref()
    }

    /// A content element on the live surface.
    pub fn element(&self, id: &ElementId) -> Option<&SceneElement> {
        self.surface
            .elements()
            .iter()
            .find(|el| &el.id == id && !el.is_overlay())
    }

    fn content_index(&self, id: &ElementId) -> VellumResult<usize> {
        self.surface
            .elements()
            .iter()
            .position(|el| &el.id == id && !el.is_overlay())
            .ok_or_else(|| VellumError::scene(format!("unknown element `{id}`")))
    }

    fn commit(&mut self, index: usize, element: SceneElement) {
        self.surface.elements_mut()[index] = element;
    }

    /// Show the overlay of `id` and hide every other one. `None` clears the
    /// selection.
    pub fn select(&mut self, id: Option<&ElementId>) -> VellumResult<()> {
        if let Some(id) = id {
            self.content_index(id)?;
        }
        for element in self.surface.elements_mut().iter_mut() {
            if let Shape::Overlay(overlay) = &mut element.shape {
                overlay.visible = Some(&overlay.target) == id;
            }
        }
        self.selected = id.cloned();
        Ok(())
    }

    /// Move an element to a new pixel position on the live surface.
    pub fn move_element(&mut self, id: &ElementId, x: f64, y: f64) -> VellumResult<()> {
        let index = self.content_index(id)?;
        let mut updated = self.surface.elements()[index].clone();
        updated.set_pixel(Axis::X, x);
        updated.set_pixel(Axis::Y, y);
        sync_percent_geometry(&mut updated, self.surface.size(), LIVE_PRECISION)?;
        self.commit(index, updated);
        Ok(())
    }

    /// Give an element a new pixel size on the live surface.
    pub fn resize_element(&mut self, id: &ElementId, width: f64, height: f64) -> VellumResult<()> {
        let index = self.content_index(id)?;
        let mut updated = self.surface.elements()[index].clone();
        let kind = updated.kind();
        if !kind.has_axis(Axis::Width) || !kind.has_axis(Axis::Height) {
            return Err(VellumError::invalid_attribute(format!(
                "{} elements have no width or height",
                kind.as_str()
            )));
        }
        updated.set_pixel(Axis::Width, width);
        updated.set_pixel(Axis::Height, height);
        sync_percent_geometry(&mut updated, self.surface.size(), LIVE_PRECISION)?;
        attach_live_bitmap(&self.cache, &mut updated)?;
        self.commit(index, updated);
        Ok(())
    }

    /// Apply an attribute record to an element. Either every attribute is
    /// applied or none.
    ///
    /// Percent attributes move the element on the canvas; pixel attributes
    /// refresh the matching percentages.
    pub fn set_attributes(&mut self, id: &ElementId, attrs: &Map<String, Value>) -> VellumResult<()> {
        let index = self.content_index(id)?;
        let canvas = self.surface.size();
        let mut updated = self.surface.elements()[index].clone();
        updated.set_attributes(attrs)?;

        let axes = updated.kind().geometry_axes();
        let mut given = PercentGeometry::default();
        for &axis in axes {
            if attrs.contains_key(axis.percent_attr()) {
                given.set(axis, updated.percent.get(axis));
            }
        }
        apply_percent_geometry(&mut updated, &given, canvas)?;

        let derived = extract_percent_geometry(&updated, canvas, LIVE_PRECISION)?;
        for &axis in axes {
            if attrs.contains_key(axis.pixel_attr()) && !attrs.contains_key(axis.percent_attr()) {
                updated.percent.set(axis, derived.get(axis));
            }
        }

        attach_live_bitmap(&self.cache, &mut updated)?;
        self.commit(index, updated);
        Ok(())
    }

    /// The scene as it should be saved: content elements only, with their
    /// current geometry.
    pub fn snapshot(&self) -> Scene {
        let mut scene = self.scene.clone();
        scene.canvas = self.surface.size();
        scene.elements = snapshot_content(self.surface.elements());
        scene.touch();
        scene
    }

    /// Write the current state back to the scene directory.
    pub fn save(&self) -> VellumResult<()> {
        let loaded = LoadedScene {
            root: self.root.clone(),
            scene: self.snapshot(),
        };
        loaded
            .save()
            .map_err(|e| VellumError::scene(format!("Failed to save scene: {e}")))?;
        tracing::info!(root = %self.root.display(), "Saved scene");
        Ok(())
    }

    /// Export the live scene.
    pub async fn export(
        &self,
        request: &ExportRequest,
        saver: &dyn FileSaver,
        cancel: &CancelToken,
        progress: Option<&ProgressCallback>,
    ) -> VellumResult<ExportOutcome> {
        self.exporter
            .export(&self.surface, &self.cache, request, saver, cancel, progress)
            .await
    }

    /// Render the live surface, overlays included, as PNG.
    pub fn preview_png(&mut self) -> VellumResult<Vec<u8>> {
        self.surface.render()?;
        self.surface.rasterize()
    }
}

/// Give an image element pixels sized for the live surface.
fn attach_live_bitmap(cache: &ImageCache, element: &mut SceneElement) -> VellumResult<()> {
    let live = match &element.shape {
        Shape::Image(img) => live_bitmap(cache.lookup(&img.source)?, element),
        _ => return Ok(()),
    };
    if let Shape::Image(img) = &mut element.shape {
        img.bitmap = Some(live);
    }
    Ok(())
}

/// Downscale full-resolution pixels to the element's box. Pixels are shared
/// with the cache when the box is not smaller than the source.
fn live_bitmap(full: &Bitmap, element: &SceneElement) -> Bitmap {
    let (Some(width), Some(height)) = (element.pixel(Axis::Width), element.pixel(Axis::Height))
    else {
        return full.clone();
    };
    let width = (width.abs().max(1.0) as u32).min(full.width());
    let height = (height.abs().max(1.0) as u32).min(full.height());
    if (width, height) == (full.width(), full.height()) {
        return full.clone();
    }
    Bitmap::new(imageops::resize(
        full.image(),
        width,
        height,
        FilterType::Triangle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use serde_json::json;
    use vellum_scene_model::element::{ImageShape, RectShape, TextShape};

    use crate::save::MemorySaver;

    /// Scene on an 80x60 canvas with a photo, a rect and a text.
    fn scene_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vellum_test_session_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        let mut loaded = LoadedScene::create(&dir, "test", 80, 60).unwrap();
        RgbaImage::from_pixel(200, 150, Rgba([200, 10, 10, 255]))
            .save(dir.join("sources/photo.png"))
            .unwrap();

        let scene = &mut loaded.scene;
        scene.add_element(
            Shape::Image(ImageShape {
                source: "sources/photo.png".to_string(),
                x: None,
                y: None,
                width: None,
                height: None,
                bitmap: None,
            }),
            PercentGeometry {
                px: Some(0.0),
                py: Some(0.0),
                pwidth: Some(50.0),
                pheight: Some(50.0),
                pfont_size: None,
            },
        );
        scene.add_element(
            Shape::Rect(RectShape {
                x: Some(40.0),
                y: Some(30.0),
                width: Some(20.0),
                height: Some(15.0),
                fill: "blue".to_string(),
            }),
            PercentGeometry::default(),
        );
        scene.add_element(
            Shape::Text(TextShape {
                content: "hello".to_string(),
                x: None,
                y: None,
                font_size: None,
                fill: "black".to_string(),
            }),
            PercentGeometry {
                px: Some(10.0),
                py: Some(80.0),
                pwidth: None,
                pheight: None,
                pfont_size: Some(10.0),
            },
        );
        loaded.save().unwrap();
        dir
    }

    async fn open(dir: &Path) -> EditorSession {
        EditorSession::open(LoadedScene::load(dir).unwrap(), SurfaceStyle::new("white"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_builds_live_surface() {
        let dir = scene_dir("open");
        let session = open(&dir).await;

        assert_eq!(session.cache().len(), 1);
        assert!(session.cache().is_frozen());

        let elements = session.surface().elements();
        assert_eq!(elements.len(), 6);
        assert_eq!(elements.iter().filter(|el| el.is_overlay()).count(), 3);
        assert!(elements.iter().all(|el| match &el.shape {
            Shape::Overlay(o) => !o.visible,
            _ => true,
        }));

        let image = session.element(&"image-1".into()).unwrap();
        assert_eq!(image.pixel(Axis::Width), Some(40.0));
        assert_eq!(image.pixel(Axis::Height), Some(30.0));
        match &image.shape {
            Shape::Image(img) => {
                let live = img.bitmap.as_ref().unwrap();
                assert_eq!((live.width(), live.height()), (40, 30));
                let full = session.cache().lookup("sources/photo.png").unwrap();
                assert!(!live.shares_pixels_with(full));
            }
            _ => panic!("expected image"),
        }

        let rect = session.element(&"rect-2".into()).unwrap();
        assert_eq!(rect.percent.px, Some(50.0));
        assert_eq!(rect.percent.pheight, Some(25.0));

        let text = session.element(&"text-3".into()).unwrap();
        assert_eq!(text.pixel(Axis::X), Some(8.0));
        assert_eq!(text.pixel(Axis::Y), Some(48.0));
        assert_eq!(text.pixel(Axis::FontSize), Some(6.0));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_open_fails_when_a_source_is_missing() {
        let dir = scene_dir("missing");
        std::fs::remove_file(dir.join("sources/photo.png")).unwrap();

        let result =
            EditorSession::<RasterSurface>::open(LoadedScene::load(&dir).unwrap(), SurfaceStyle::default())
                .await;
        assert!(matches!(result, Err(VellumError::FileNotFound { .. })));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_select_shows_only_one_overlay() {
        let dir = scene_dir("select");
        let mut session = open(&dir).await;

        session.select(Some(&"rect-2".into())).unwrap();
        let visible: Vec<_> = session
            .surface()
            .elements()
            .iter()
            .filter_map(|el| match &el.shape {
                Shape::Overlay(o) if o.visible => Some(o.target.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(visible, vec![ElementId::new("rect-2")]);

        assert!(session.select(Some(&"nope".into())).is_err());
        assert_eq!(session.selected(), Some(&ElementId::new("rect-2")));

        session.select(None).unwrap();
        assert!(session.selected().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_move_and_resize_refresh_percentages() {
        let dir = scene_dir("move");
        let mut session = open(&dir).await;
        let id = ElementId::new("rect-2");

        session.move_element(&id, 20.0, 15.0).unwrap();
        session.resize_element(&id, 40.0, 30.0).unwrap();

        let rect = session.element(&id).unwrap();
        assert_eq!(rect.percent.px, Some(25.0));
        assert_eq!(rect.percent.py, Some(25.0));
        assert_eq!(rect.percent.pwidth, Some(50.0));
        assert_eq!(rect.percent.pheight, Some(50.0));

        let err = session
            .resize_element(&"text-3".into(), 10.0, 10.0)
            .unwrap_err();
        assert!(matches!(err, VellumError::InvalidAttribute { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_set_attributes_keeps_geometry_in_sync() {
        let dir = scene_dir("attrs");
        let mut session = open(&dir).await;
        let id = ElementId::new("rect-2");

        let attrs = json!({ "x": 8.0, "pwidth": 10.0, "fill": "red" });
        session
            .set_attributes(&id, attrs.as_object().unwrap())
            .unwrap();
        let rect = session.element(&id).unwrap();
        assert_eq!(rect.pixel(Axis::X), Some(8.0));
        assert_eq!(rect.percent.px, Some(10.0));
        assert_eq!(rect.pixel(Axis::Width), Some(8.0));
        assert_eq!(rect.percent.pwidth, Some(10.0));

        let bad = json!({ "y": 1.0, "fill": null });
        assert!(session
            .set_attributes(&id, bad.as_object().unwrap())
            .is_err());
        assert_eq!(session.element(&id).unwrap().pixel(Axis::Y), Some(30.0));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_switching_to_an_uncached_source_is_rejected() {
        let dir = scene_dir("src");
        let mut session = open(&dir).await;
        let id = ElementId::new("image-1");

        let attrs = json!({ "src": "sources/other.png" });
        let err = session
            .set_attributes(&id, attrs.as_object().unwrap())
            .unwrap_err();
        assert!(matches!(err, VellumError::ImageCacheMiss { .. }));
        match &session.element(&id).unwrap().shape {
            Shape::Image(img) => assert_eq!(img.source, "sources/photo.png"),
            _ => panic!("expected image"),
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_save_persists_content_only() {
        let dir = scene_dir("save");
        let mut session = open(&dir).await;
        session.select(Some(&"rect-2".into())).unwrap();
        session.move_element(&"rect-2".into(), 0.0, 0.0).unwrap();
        session.save().unwrap();

        let reloaded = LoadedScene::load(&dir).unwrap();
        assert_eq!(reloaded.scene.elements.len(), 3);
        assert!(reloaded.scene.elements.iter().all(|el| !el.is_overlay()));
        let rect = reloaded.scene.element(&"rect-2".into()).unwrap();
        assert_eq!(rect.percent.px, Some(0.0));
        assert!(reloaded.validate().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_export_uses_full_resolution_pixels() {
        let dir = scene_dir("export");
        let session = open(&dir).await;
        let saver = MemorySaver::new();

        let outcome = session
            .export(
                &ExportRequest::new(400, 300, "poster.png"),
                &saver,
                &CancelToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.element_count, 3);
        assert_eq!((outcome.width, outcome.height), (400, 300));

        let png = &saver.saved()[0].1;
        let decoded = image::load_from_memory(png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (400, 300));
        assert_eq!(decoded.get_pixel(100, 75).0, [200, 10, 10, 255]);
        assert_eq!(decoded.get_pixel(250, 180).0, [0, 0, 255, 255]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_preview_draws_selection() {
        let dir = scene_dir("preview");
        let mut session = open(&dir).await;
        session.select(Some(&"rect-2".into())).unwrap();

        let png = session.preview_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (80, 60));
        assert_eq!(decoded.get_pixel(40, 30).0, [0, 0, 0, 255]);
        assert_eq!(decoded.get_pixel(45, 35).0, [0, 0, 255, 255]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
