//! Export a scene to PNG.

use std::path::{Path, PathBuf};

use vellum_common::config::{AppConfig, PercentPrecision};
use vellum_common::error::VellumError;
use vellum_render_engine::export::{export_scene, ExportJob, ExportStage, ProgressCallback};
use vellum_scene_model::geometry::{mm_to_pixels, CanvasSize};
use vellum_scene_model::scene::LoadedScene;

/// Output size overrides from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeArgs {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub width_mm: Option<f64>,
    pub height_mm: Option<f64>,
}

impl SizeArgs {
    /// Final output size, starting from the scene's own export size.
    pub fn resolve(&self, scene_size: CanvasSize) -> CanvasSize {
        if let (Some(w), Some(h)) = (self.width_mm, self.height_mm) {
            return CanvasSize::new(mm_px(w), mm_px(h));
        }
        CanvasSize::new(
            self.width.unwrap_or(scene_size.width),
            self.height.unwrap_or(scene_size.height),
        )
    }
}

fn mm_px(mm: f64) -> u32 {
    mm_to_pixels(mm).max(0.0) as u32
}

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: Option<PathBuf>,
    size: SizeArgs,
    precision: Option<PercentPrecision>,
) -> anyhow::Result<()> {
    println!("Exporting scene at: {}", path.display());

    let scene =
        LoadedScene::load(&path).map_err(|e| anyhow::anyhow!("Failed to load scene: {e}"))?;

    let mut job = ExportJob::from_scene(&scene, config.fonts.clone());
    job.request.size = size.resolve(job.request.size);
    if let Some(precision) = precision {
        job.request.precision = precision;
    }
    if let Some(output) = &output {
        let file_name = output
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid output path: {}", output.display()))?;
        job.request.file_name = file_name.to_string_lossy().into_owned();
        job.output_dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
    }
    let output_path = job.output_dir.join(&job.request.file_name);

    println!("  Output: {}", output_path.display());
    println!(
        "  Resolution: {}x{}",
        job.request.size.width, job.request.size.height
    );
    println!("  Precision: {:?}", job.request.precision);
    if config.fonts.text_font.is_none() {
        tracing::debug!("No text font configured");
    }

    let progress_cb: ProgressCallback = Box::new(|p| {
        if p.stage == ExportStage::Failed {
            return;
        }
        print!(
            "\r  Progress: {:.0}% ({:?}, {}/{} elements)  ",
            p.progress * 100.0,
            p.stage,
            p.elements_done,
            p.elements_total,
        );
    });

    match export_scene(job, Some(progress_cb)).await {
        Ok(outcome) => {
            println!("\nExport complete: {}", output_path.display());
            println!(
                "  {} element(s), {} bytes",
                outcome.element_count, outcome.byte_len
            );
            let summary = serde_json::to_string(&outcome)?;
            tracing::debug!(outcome = %summary, "Export outcome");
            Ok(())
        }
        Err(e) => {
            println!("\n{}", failure_line(&e));
            Err(e.into())
        }
    }
}

/// Status line for an export that produced no file.
fn failure_line(err: &VellumError) -> String {
    if err.is_export_rejection() {
        format!("Export rejected: {err}")
    } else {
        format!("Export failed: {err}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_defaults_to_scene_settings() {
        let size = SizeArgs {
            width: Some(1200),
            ..SizeArgs::default()
        };
        assert_eq!(
            size.resolve(CanvasSize::new(4000, 3000)),
            CanvasSize::new(1200, 3000)
        );
    }

    #[test]
    fn test_failure_line_separates_rejections() {
        let rejected = failure_line(&VellumError::InvalidExportDimensions {
            width: 0,
            height: 300,
        });
        assert!(rejected.starts_with("Export rejected:"));

        let failed = failure_line(&VellumError::cache_miss("/scene/sources/a.png"));
        assert!(failed.starts_with("Export failed:"));
        assert!(failed.contains("/scene/sources/a.png"));
    }

    #[test]
    fn test_size_from_millimetres() {
        let size = SizeArgs {
            width_mm: Some(210.0),
            height_mm: Some(297.0),
            ..SizeArgs::default()
        };
        assert_eq!(
            size.resolve(CanvasSize::new(4000, 3000)),
            CanvasSize::new(793, 1122)
        );
    }
}
