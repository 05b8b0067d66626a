//! Scene documents.
//!
//! A scene directory ties together the element list, the edit canvas size,
//! the export settings, and the image sources the elements refer to:
//!
//! ```text
//! my-scene/
//!   meta/scene.json
//!   sources/
//!   exports/
//! ```
//!
//! `scene.json` is a debugging dump of the editor state; it is not a stable
//! interchange format.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vellum_common::config::PercentPrecision;

use crate::element::{ElementId, SceneElement, Shape};
use crate::geometry::{CanvasSize, PercentGeometry};

/// Current scene schema version.
pub const SCENE_VERSION: &str = "1.0";

/// Top-level scene file (`meta/scene.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Schema version.
    pub version: String,

    /// Human-readable scene name.
    pub name: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Last modified timestamp (ISO 8601).
    pub modified_at: String,

    /// Edit canvas size that pixel geometry refers to.
    pub canvas: CanvasSize,

    /// Canvas background (any CSS color string).
    #[serde(default = "default_background")]
    pub background: String,

    /// Export settings.
    pub export: ExportSettings,

    /// Counter used to assign element ids.
    #[serde(default)]
    pub next_id: u64,

    /// Elements in paint order.
    #[serde(default)]
    pub elements: Vec<SceneElement>,
}

/// Where and how big a scene is exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Suggested output file name.
    pub file_name: String,

    /// Precision of the intermediate percent geometry.
    #[serde(default)]
    pub precision: PercentPrecision,
}

impl ExportSettings {
    pub fn size(&self) -> CanvasSize {
        CanvasSize::new(self.width, self.height)
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: 4000,
            height: 3000,
            file_name: "export.png".to_string(),
            precision: PercentPrecision::Exact,
        }
    }
}

fn default_background() -> String {
    "transparent".to_string()
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: SCENE_VERSION.to_string(),
            name: name.into(),
            created_at: now.clone(),
            modified_at: now,
            canvas: CanvasSize::new(width, height),
            background: default_background(),
            export: ExportSettings::default(),
            next_id: 0,
            elements: vec![],
        }
    }

    /// Append an element described by its percent geometry. Pixel geometry
    /// is derived when the scene is opened in a session.
    pub fn add_element(&mut self, shape: Shape, percent: PercentGeometry) -> ElementId {
        self.next_id += 1;
        let mut element = SceneElement::new(ElementId::new(""), shape);
        let id = ElementId::new(format!("{}-{}", element.kind().as_str(), self.next_id));
        element.id = id.clone();
        element.percent = percent;
        self.elements.push(element);
        self.touch();
        id
    }

    pub fn element(&self, id: &ElementId) -> Option<&SceneElement> {
        self.elements.iter().find(|el| &el.id == id)
    }

    pub fn element_mut(&mut self, id: &ElementId) -> Option<&mut SceneElement> {
        self.elements.iter_mut().find(|el| &el.id == id)
    }

    /// Elements that are exported (everything except overlays).
    pub fn content_elements(&self) -> impl Iterator<Item = &SceneElement> {
        self.elements.iter().filter(|el| !el.is_overlay())
    }

    /// Distinct image sources referenced by the scene, in first-use order.
    pub fn image_sources(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.elements
            .iter()
            .filter_map(|el| match &el.shape {
                Shape::Image(img) => Some(img.source.as_str()),
                _ => None,
            })
            .filter(|src| seen.insert(*src))
            .collect()
    }

    /// Update the modification timestamp.
    pub fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().to_rfc3339();
    }

    /// Structural problems that do not depend on the filesystem.
    pub fn lint(&self) -> Vec<String> {
        let mut problems = vec![];

        if !self.canvas.is_valid() {
            problems.push(format!(
                "Canvas size {}x{} is not usable",
                self.canvas.width, self.canvas.height
            ));
        }
        if !self.export.size().is_valid() {
            problems.push(format!(
                "Export size {}x{} is not usable",
                self.export.width, self.export.height
            ));
        }

        let mut ids = HashSet::new();
        for el in &self.elements {
            if !ids.insert(el.id.as_str()) {
                problems.push(format!("Duplicate element id: {}", el.id));
            }
            if el.is_overlay() {
                problems.push(format!("Overlay persisted in scene: {}", el.id));
                continue;
            }

            let axes = el.kind().geometry_axes();
            let has_geometry = axes
                .iter()
                .any(|axis| el.pixel(*axis).is_some() || el.percent.get(*axis).is_some());
            if !has_geometry {
                problems.push(format!("Element has no geometry: {}", el.id));
            }

            for axis in axes {
                if let Some(p) = el.percent.get(*axis) {
                    if !(0.0..=100.0).contains(&p) {
                        problems.push(format!(
                            "Element {} has {} outside the canvas: {p}",
                            el.id,
                            axis.percent_attr()
                        ));
                    }
                }
            }
        }

        problems
    }
}

/// A scene together with the directory it was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedScene {
    /// Filesystem path to the scene directory.
    pub root: PathBuf,

    /// Scene contents.
    pub scene: Scene,
}

impl LoadedScene {
    /// Path of the scene file inside a scene directory.
    pub fn scene_path(root: &Path) -> PathBuf {
        root.join("meta").join("scene.json")
    }

    /// Load a scene from a directory.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, SceneError> {
        let root = root.as_ref().to_path_buf();
        let scene_path = Self::scene_path(&root);

        let scene_json = std::fs::read_to_string(&scene_path).map_err(|e| SceneError::IoError {
            path: scene_path.clone(),
            source: e,
        })?;

        let scene: Scene =
            serde_json::from_str(&scene_json).map_err(|e| SceneError::ParseError {
                path: scene_path,
                source: e,
            })?;

        tracing::debug!(
            root = %root.display(),
            elements = scene.elements.len(),
            "Loaded scene"
        );

        Ok(Self { root, scene })
    }

    /// Save the scene to disk. Overlays are never persisted.
    pub fn save(&self) -> Result<(), SceneError> {
        let meta_dir = self.root.join("meta");
        std::fs::create_dir_all(&meta_dir).map_err(|e| SceneError::IoError {
            path: meta_dir.clone(),
            source: e,
        })?;

        let mut scene = self.scene.clone();
        scene.elements.retain(|el| !el.is_overlay());

        let scene_path = meta_dir.join("scene.json");
        let scene_json =
            serde_json::to_string_pretty(&scene).map_err(|e| SceneError::ParseError {
                path: scene_path.clone(),
                source: e,
            })?;
        std::fs::write(&scene_path, scene_json).map_err(|e| SceneError::IoError {
            path: scene_path,
            source: e,
        })?;

        Ok(())
    }

    /// Create a new scene on disk with the standard directory structure.
    pub fn create(
        root: impl AsRef<Path>,
        name: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Result<Self, SceneError> {
        let root = root.as_ref().to_path_buf();

        if width == 0 || height == 0 {
            return Err(SceneError::ValidationError {
                message: format!("canvas size {width}x{height} is not usable"),
            });
        }

        for subdir in &["sources", "meta", "exports"] {
            std::fs::create_dir_all(root.join(subdir)).map_err(|e| SceneError::IoError {
                path: root.join(subdir),
                source: e,
            })?;
        }

        let loaded = Self {
            root,
            scene: Scene::new(name, width, height),
        };
        loaded.save()?;
        Ok(loaded)
    }

    /// Resolve a source reference relative to the scene directory.
    /// URLs are returned unchanged.
    pub fn resolve_source(&self, source: &str) -> PathBuf {
        let source = source.trim();
        if source.contains("://") {
            return PathBuf::from(source);
        }
        let path = Path::new(source);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Validate the scene, including that every image source exists.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.scene.lint();

        for source in self.scene.image_sources() {
            if source.contains("://") {
                errors.push(format!("Remote image source not supported: {source}"));
                continue;
            }
            if !self.resolve_source(source).exists() {
                errors.push(format!("Image source missing: {source}"));
            }
        }

        errors
    }
}

/// Errors that can occur when working with scene files.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid scene: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ImageShape, RectShape};

    fn rect_shape() -> Shape {
        Shape::Rect(RectShape {
            x: None,
            y: None,
            width: None,
            height: None,
            fill: "blue".to_string(),
        })
    }

    fn full_percent() -> PercentGeometry {
        PercentGeometry {
            px: Some(0.0),
            py: Some(0.0),
            pwidth: Some(100.0),
            pheight: Some(100.0),
            pfont_size: None,
        }
    }

    #[test]
    fn test_scene_creation() {
        let scene = Scene::new("Poster", 800, 600);
        assert_eq!(scene.name, "Poster");
        assert_eq!(scene.canvas, CanvasSize::new(800, 600));
        assert_eq!(scene.export.width, 4000);
        assert!(scene.elements.is_empty());
    }

    #[test]
    fn test_add_element_assigns_unique_ids() {
        let mut scene = Scene::new("Ids", 800, 600);
        let a = scene.add_element(rect_shape(), full_percent());
        let b = scene.add_element(rect_shape(), full_percent());
        assert_eq!(a.as_str(), "rect-1");
        assert_eq!(b.as_str(), "rect-2");
        assert!(scene.lint().is_empty());
    }

    #[test]
    fn test_image_sources_are_distinct() {
        let mut scene = Scene::new("Sources", 800, 600);
        for src in ["sources/a.png", "sources/b.png", "sources/a.png"] {
            scene.add_element(
                Shape::Image(ImageShape {
                    source: src.to_string(),
                    x: None,
                    y: None,
                    width: None,
                    height: None,
                    bitmap: None,
                }),
                full_percent(),
            );
        }
        assert_eq!(scene.image_sources(), vec!["sources/a.png", "sources/b.png"]);
    }

    #[test]
    fn test_lint_reports_problems() {
        let mut scene = Scene::new("Lint", 800, 600);
        scene.add_element(rect_shape(), PercentGeometry::default());
        let id = scene.add_element(rect_shape(), full_percent());
        scene.elements[1].percent.px = Some(140.0);
        scene.elements.push(SceneElement::overlay_for(&id));

        let problems = scene.lint();
        assert!(problems.iter().any(|p| p.contains("no geometry")));
        assert!(problems.iter().any(|p| p.contains("outside the canvas")));
        assert!(problems.iter().any(|p| p.contains("Overlay persisted")));
    }

    #[test]
    fn test_scene_serialization_roundtrip_keeps_percentages() {
        let mut scene = Scene::new("Json", 800, 600);
        scene.add_element(rect_shape(), full_percent());
        let json = serde_json::to_string_pretty(&scene).unwrap();
        let parsed: Scene = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.elements[0].percent, full_percent());
        assert_eq!(parsed.next_id, 1);
    }

    #[test]
    fn test_loaded_scene_create_save_and_load() {
        let dir = std::env::temp_dir().join("vellum_test_scene");
        let _ = std::fs::remove_dir_all(&dir);

        let mut created = LoadedScene::create(&dir, "Roundtrip", 800, 600).unwrap();
        let id = created.scene.add_element(rect_shape(), full_percent());
        created
            .scene
            .elements
            .push(SceneElement::overlay_for(&id));
        created.save().unwrap();

        let loaded = LoadedScene::load(&dir).unwrap();
        assert_eq!(loaded.scene.name, "Roundtrip");
        assert_eq!(loaded.scene.elements.len(), 1);
        assert!(dir.join("exports").is_dir());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_create_rejects_empty_canvas() {
        let dir = std::env::temp_dir().join("vellum_test_scene_empty_canvas");
        let err = LoadedScene::create(&dir, "Bad", 0, 600).unwrap_err();
        assert!(matches!(err, SceneError::ValidationError { .. }));
    }

    #[test]
    fn test_validate_reports_missing_sources() {
        let dir = std::env::temp_dir().join("vellum_test_scene_validate");
        let _ = std::fs::remove_dir_all(&dir);

        let mut loaded = LoadedScene::create(&dir, "Validate", 800, 600).unwrap();
        loaded.scene.add_element(
            Shape::Image(ImageShape {
                source: "sources/missing.png".to_string(),
                x: None,
                y: None,
                width: None,
                height: None,
                bitmap: None,
            }),
            full_percent(),
        );

        let errors = loaded.validate();
        assert!(errors.iter().any(|e| e.contains("Image source missing")));

        std::fs::remove_dir_all(&dir).ok();
    }
}
