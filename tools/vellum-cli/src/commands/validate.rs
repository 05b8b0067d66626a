//! Validate a Vellum scene directory.

use std::path::PathBuf;

use vellum_scene_model::scene::LoadedScene;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating scene at: {}", path.display());

    let scene =
        LoadedScene::load(&path).map_err(|e| anyhow::anyhow!("Failed to load scene: {e}"))?;

    println!("  Name: {}", scene.scene.name);
    println!("  Version: {}", scene.scene.version);
    println!(
        "  Canvas: {}x{}",
        scene.scene.canvas.width, scene.scene.canvas.height
    );
    println!("  Elements: {}", scene.scene.elements.len());
    println!("  Image sources: {}", scene.scene.image_sources().len());

    let errors = scene.validate();
    if errors.is_empty() {
        println!("  Sources: All present");
        println!("\nScene is valid.");
    } else {
        println!("\nValidation issues:");
        for error in &errors {
            println!("  - {error}");
        }
        println!(
            "\n{} issue(s) found. Scene may not export correctly.",
            errors.len()
        );
    }

    Ok(())
}
