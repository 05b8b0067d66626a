//! Initialize a new Vellum scene.

use std::path::PathBuf;

use vellum_common::config::AppConfig;
use vellum_scene_model::element::{ImageShape, Shape};
use vellum_scene_model::geometry::PercentGeometry;
use vellum_scene_model::scene::LoadedScene;

pub fn run(
    config: &AppConfig,
    path: PathBuf,
    name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    image: Option<PathBuf>,
) -> anyhow::Result<()> {
    let name = name
        .or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "scene".to_string());
    let width = width.unwrap_or(config.canvas.width);
    let height = height.unwrap_or(config.canvas.height);
    println!("Creating scene '{}' at {}", name, path.display());

    let mut scene = LoadedScene::create(&path, &name, width, height)
        .map_err(|e| anyhow::anyhow!("Failed to create scene: {e}"))?;

    scene.scene.background = config.export.background.clone();
    scene.scene.export.width = config.export.width;
    scene.scene.export.height = config.export.height;
    scene.scene.export.file_name = config.export.file_name.clone();
    scene.scene.export.precision = config.export.precision;

    if let Some(image) = &image {
        let file_name = image
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Not an image file: {}", image.display()))?;
        let source = PathBuf::from("sources").join(file_name);
        std::fs::copy(image, path.join(&source)).map_err(|e| {
            anyhow::anyhow!("Failed to copy {} into the scene: {e}", image.display())
        })?;

        let id = scene.scene.add_element(
            Shape::Image(ImageShape {
                source: source.to_string_lossy().into_owned(),
                x: None,
                y: None,
                width: None,
                height: None,
                bitmap: None,
            }),
            PercentGeometry {
                px: Some(0.0),
                py: Some(0.0),
                pwidth: Some(100.0),
                pheight: Some(100.0),
                pfont_size: None,
            },
        );
        tracing::debug!(id = %id, source = %source.display(), "Added background image");
    }

    scene
        .save()
        .map_err(|e| anyhow::anyhow!("Failed to save scene: {e}"))?;

    println!("Scene created successfully:");
    println!("  Directory: {}", scene.root.display());
    println!("  Canvas: {}x{}", width, height);
    println!(
        "  Export: {}x{} -> {}",
        scene.scene.export.width, scene.scene.export.height, scene.scene.export.file_name
    );
    if let Some(image) = &image {
        println!("  Background image: {}", image.display());
    }
    println!();
    println!("Directory structure:");
    println!("  {}/", name);
    println!("  ├── sources/     (image files)");
    println!("  ├── meta/        (scene.json)");
    println!("  └── exports/     (rendered PNGs)");

    Ok(())
}
