//! Add an element to a scene.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use vellum_scene_model::element::{ImageShape, RectShape, Shape, TextShape};
use vellum_scene_model::geometry::PercentGeometry;
use vellum_scene_model::scene::LoadedScene;

/// Element to add. Geometry is given in percent of the canvas.
#[derive(Subcommand)]
pub enum ElementArgs {
    /// Filled rectangle
    Rect {
        /// Left edge (% of canvas width)
        #[arg(long, default_value = "0")]
        px: f64,

        /// Top edge (% of canvas height)
        #[arg(long, default_value = "0")]
        py: f64,

        /// Width (% of canvas width)
        #[arg(long)]
        pwidth: f64,

        /// Height (% of canvas height)
        #[arg(long)]
        pheight: f64,

        /// Fill color (any CSS color)
        #[arg(long, default_value = "black")]
        fill: String,
    },

    /// Line of text
    Text {
        /// Text content
        content: String,

        /// Left edge (% of canvas width)
        #[arg(long, default_value = "0")]
        px: f64,

        /// Top edge (% of canvas height)
        #[arg(long, default_value = "0")]
        py: f64,

        /// Font size (% of canvas height)
        #[arg(long, default_value = "5")]
        pfont_size: f64,

        /// Text color (any CSS color)
        #[arg(long, default_value = "black")]
        fill: String,
    },

    /// Image from a file
    Image {
        /// Image file; copied into the scene's sources/ when outside it
        src: PathBuf,

        /// Left edge (% of canvas width)
        #[arg(long, default_value = "0")]
        px: f64,

        /// Top edge (% of canvas height)
        #[arg(long, default_value = "0")]
        py: f64,

        /// Width (% of canvas width); native width when omitted
        #[arg(long)]
        pwidth: Option<f64>,

        /// Height (% of canvas height); native height when omitted
        #[arg(long)]
        pheight: Option<f64>,
    },
}

pub fn run(path: PathBuf, element: ElementArgs) -> anyhow::Result<()> {
    let mut scene =
        LoadedScene::load(&path).map_err(|e| anyhow::anyhow!("Failed to load scene: {e}"))?;

    let (shape, percent) = match element {
        ElementArgs::Rect {
            px,
            py,
            pwidth,
            pheight,
            fill,
        } => (
            Shape::Rect(RectShape {
                x: None,
                y: None,
                width: None,
                height: None,
                fill: checked_color(fill)?,
            }),
            PercentGeometry {
                px: Some(px),
                py: Some(py),
                pwidth: Some(pwidth),
                pheight: Some(pheight),
                pfont_size: None,
            },
        ),
        ElementArgs::Text {
            content,
            px,
            py,
            pfont_size,
            fill,
        } => (
            Shape::Text(TextShape {
                content,
                x: None,
                y: None,
                font_size: None,
                fill: checked_color(fill)?,
            }),
            PercentGeometry {
                px: Some(px),
                py: Some(py),
                pfont_size: Some(pfont_size),
                ..PercentGeometry::default()
            },
        ),
        ElementArgs::Image {
            src,
            px,
            py,
            pwidth,
            pheight,
        } => (
            Shape::Image(ImageShape {
                source: import_source(&scene.root, &src)?,
                x: None,
                y: None,
                width: None,
                height: None,
                bitmap: None,
            }),
            PercentGeometry {
                px: Some(px),
                py: Some(py),
                pwidth,
                pheight,
                pfont_size: None,
            },
        ),
    };

    let id = scene.scene.add_element(shape, percent);
    scene
        .save()
        .map_err(|e| anyhow::anyhow!("Failed to save scene: {e}"))?;

    println!("Added {id} to {}", path.display());
    for problem in scene.scene.lint() {
        println!("  warning: {problem}");
    }
    Ok(())
}

fn checked_color(color: String) -> anyhow::Result<String> {
    vellum_render_engine::surface::parse_color(&color)?;
    Ok(color)
}

/// Scene-relative reference for an image, copying it into `sources/` when it
/// lives outside the scene directory.
fn import_source(root: &Path, src: &Path) -> anyhow::Result<String> {
    if !src.is_absolute() && root.join(src).exists() {
        return Ok(src.to_string_lossy().into_owned());
    }
    if !src.exists() {
        return Err(anyhow::anyhow!("Image not found: {}", src.display()));
    }

    let file_name = src
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Not an image file: {}", src.display()))?;
    let source = PathBuf::from("sources").join(file_name);
    let target = root.join(&source);
    if target.exists() {
        tracing::warn!(target = %target.display(), "Source already exists, keeping it");
    } else {
        std::fs::copy(src, &target)?;
        tracing::debug!(from = %src.display(), to = %target.display(), "Copied image source");
    }
    Ok(source.to_string_lossy().into_owned())
}
