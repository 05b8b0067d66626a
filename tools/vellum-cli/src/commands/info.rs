//! Show scene information.

use std::path::PathBuf;

use vellum_scene_model::element::ElementKind;
use vellum_scene_model::geometry::Axis;
use vellum_scene_model::scene::LoadedScene;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let scene =
        LoadedScene::load(&path).map_err(|e| anyhow::anyhow!("Failed to load scene: {e}"))?;

    let s = &scene.scene;

    println!("Scene: {}", s.name);
    println!("  Version: {}", s.version);
    println!("  Created: {}", s.created_at);
    println!("  Modified: {}", s.modified_at);
    println!();

    println!("Canvas:");
    println!("  Size: {}x{}", s.canvas.width, s.canvas.height);
    println!("  Background: {}", s.background);
    println!();

    println!("Export:");
    println!("  Size: {}x{}", s.export.width, s.export.height);
    println!("  File: {}", s.export.file_name);
    println!("  Precision: {:?}", s.export.precision);
    println!();

    println!("Elements ({}):", s.elements.len());
    for el in &s.elements {
        let geometry = el
            .kind()
            .geometry_axes()
            .iter()
            .filter_map(|axis| {
                el.percent
                    .get(*axis)
                    .map(|p| format!("{}={p:.2}", axis.percent_attr()))
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!("  {} [{}] {}", el.id, el.kind().as_str(), geometry);
        if el.kind() == ElementKind::Image && el.percent.get(Axis::Width).is_none() {
            println!("      (native width)");
        }
    }

    let sources = s.image_sources();
    if !sources.is_empty() {
        println!();
        println!("Image sources:");
        for source in sources {
            println!("  {source}");
        }
    }

    Ok(())
}
