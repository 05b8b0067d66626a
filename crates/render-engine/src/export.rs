//! Export configuration and job management.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use vellum_common::config::{FontConfig, PercentPrecision};
use vellum_common::error::{VellumError, VellumResult};
use vellum_scene_model::element::SceneElement;
use vellum_scene_model::geometry::CanvasSize;
use vellum_scene_model::scene::{ExportSettings, LoadedScene};

use crate::cache::ImageCache;
use crate::compositor::{normalize_for_target, resolve_images, snapshot_content};
use crate::save::{DirectorySaver, FileSaver};
use crate::session::EditorSession;
use crate::surface::{RasterSurface, RenderSurface, SurfaceStyle};

/// Container name given to export surfaces.
pub const EXPORT_CONTAINER: &str = "export";

/// What to export: target size, file name, and percent precision.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    /// Output size in pixels.
    pub size: CanvasSize,

    /// Name suggested to the file saver.
    pub file_name: String,

    /// Precision of the intermediate percent geometry.
    pub precision: PercentPrecision,
}

impl ExportRequest {
    pub fn new(width: u32, height: u32, file_name: impl Into<String>) -> Self {
        Self {
            size: CanvasSize::new(width, height),
            file_name: file_name.into(),
            precision: PercentPrecision::Exact,
        }
    }

    pub fn with_precision(mut self, precision: PercentPrecision) -> Self {
        self.precision = precision;
        self
    }
}

impl From<&ExportSettings> for ExportRequest {
    fn from(settings: &ExportSettings) -> Self {
        Self {
            size: settings.size(),
            file_name: settings.file_name.clone(),
            precision: settings.precision,
        }
    }
}

/// Shared flag asking a running export to stop at the next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Elements that went through the current stage.
    pub elements_done: usize,

    /// Elements being exported.
    pub elements_total: usize,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Preparing,
    Cloning,
    Normalizing,
    ResolvingImages,
    Rendering,
    Saving,
    Complete,
    Failed,
}

impl ExportStage {
    fn progress(self) -> f64 {
        match self {
            ExportStage::Preparing => 0.0,
            ExportStage::Cloning => 0.1,
            ExportStage::Normalizing => 0.25,
            ExportStage::ResolvingImages => 0.4,
            ExportStage::Rendering => 0.55,
            ExportStage::Saving => 0.9,
            ExportStage::Complete | ExportStage::Failed => 1.0,
        }
    }
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportOutcome {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    /// Content elements drawn into the export.
    pub element_count: usize,
    /// Size of the encoded PNG.
    pub byte_len: usize,
}

/// Runs exports one at a time.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    in_flight: Arc<AtomicBool>,
}

/// Marks an export as running until dropped.
#[derive(Debug)]
pub struct ExportGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

struct Reporter<'a> {
    callback: Option<&'a ProgressCallback>,
    total: usize,
}

impl Reporter<'_> {
    fn report(&self, stage: ExportStage, done: usize) {
        if let Some(cb) = self.callback {
            cb(ExportProgress {
                progress: stage.progress(),
                elements_done: done,
                elements_total: self.total,
                stage,
            });
        }
    }
}

fn check_cancelled(cancel: &CancelToken, next: ExportStage) -> VellumResult<()> {
    if cancel.is_cancelled() {
        tracing::info!(stage = ?next, "Export cancelled");
        return Err(VellumError::Cancelled);
    }
    Ok(())
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the exporter. Fails with `ExportInProgress` while another
    /// export holds it.
    pub fn try_begin(&self) -> VellumResult<ExportGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| VellumError::ExportInProgress)?;
        Ok(ExportGuard {
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Export the content of `live` at the requested size.
    ///
    /// The live surface is only read. Every stage finishes for all elements
    /// before the next one starts, and the saver is called only after the
    /// image has been fully encoded.
    pub async fn export<S>(
        &self,
        live: &S,
        cache: &ImageCache,
        request: &ExportRequest,
        saver: &dyn FileSaver,
        cancel: &CancelToken,
        progress: Option<&ProgressCallback>,
    ) -> VellumResult<ExportOutcome>
    where
        S: RenderSurface + 'static,
    {
        let _guard = self.try_begin()?;
        let started = std::time::Instant::now();

        tracing::info!(
            container = live.container(),
            width = request.size.width,
            height = request.size.height,
            file_name = %request.file_name,
            "Starting export"
        );

        let mut reporter = Reporter {
            callback: progress,
            total: 0,
        };
        let result = run_stages(live, cache, request, saver, cancel, &mut reporter).await;

        match &result {
            Ok(outcome) => {
                reporter.report(ExportStage::Complete, outcome.element_count);
                tracing::info!(
                    elements = outcome.element_count,
                    bytes = outcome.byte_len,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Export finished"
                );
            }
            Err(err) => {
                reporter.report(ExportStage::Failed, 0);
                tracing::warn!(error = %err, "Export failed");
            }
        }
        result
    }
}

async fn run_stages<S>(
    live: &S,
    cache: &ImageCache,
    request: &ExportRequest,
    saver: &dyn FileSaver,
    cancel: &CancelToken,
    reporter: &mut Reporter<'_>,
) -> VellumResult<ExportOutcome>
where
    S: RenderSurface + 'static,
{
    let target = request.size;
    if !target.is_valid() {
        return Err(VellumError::InvalidExportDimensions {
            width: target.width,
            height: target.height,
        });
    }
    reporter.report(ExportStage::Preparing, 0);

    check_cancelled(cancel, ExportStage::Cloning)?;
    let mut clones = snapshot_content(live.elements());
    reporter.total = clones.len();
    reporter.report(ExportStage::Cloning, clones.len());

    check_cancelled(cancel, ExportStage::Normalizing)?;
    normalize_for_target(&mut clones, live.size(), target, request.precision)?;
    reporter.report(ExportStage::Normalizing, clones.len());

    check_cancelled(cancel, ExportStage::ResolvingImages)?;
    let resolved = resolve_images(clones, cache)?;
    reporter.report(ExportStage::ResolvingImages, resolved.len());

    check_cancelled(cancel, ExportStage::Rendering)?;
    let element_count = resolved.len();
    let style = live.style().clone();
    let bytes = tokio::task::spawn_blocking(move || render_export::<S>(target, &style, resolved))
        .await
        .map_err(|e| VellumError::Other(anyhow::anyhow!("export render task failed: {e}")))??;
    reporter.report(ExportStage::Rendering, element_count);

    check_cancelled(cancel, ExportStage::Saving)?;
    saver.save(&bytes, &request.file_name)?;
    reporter.report(ExportStage::Saving, element_count);

    Ok(ExportOutcome {
        file_name: request.file_name.clone(),
        width: target.width,
        height: target.height,
        element_count,
        byte_len: bytes.len(),
    })
}

/// Draw the prepared elements on a fresh surface and encode it.
///
/// The surface is destroyed whether or not drawing succeeds.
fn render_export<S: RenderSurface>(
    size: CanvasSize,
    style: &SurfaceStyle,
    elements: Vec<SceneElement>,
) -> VellumResult<Vec<u8>> {
    let mut surface = S::create(EXPORT_CONTAINER, size, style)?;
    for element in elements {
        surface.add_element(element);
    }
    let result = surface.render().and_then(|()| surface.rasterize());
    surface.destroy();
    result
}

/// A scene export to run from disk.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Scene root directory.
    pub scene_dir: PathBuf,

    /// Directory the PNG is written into.
    pub output_dir: PathBuf,

    /// Target size and file name.
    pub request: ExportRequest,

    /// Fonts for text elements.
    pub fonts: FontConfig,
}

impl ExportJob {
    /// Job using the scene's own export settings, writing to `exports/`.
    pub fn from_scene(loaded: &LoadedScene, fonts: FontConfig) -> Self {
        Self {
            scene_dir: loaded.root.clone(),
            output_dir: loaded.root.join("exports"),
            request: ExportRequest::from(&loaded.scene.export),
            fonts,
        }
    }
}

/// Open a scene from disk and export it.
///
/// This is the main entry point for headless exports.
pub async fn export_scene(
    job: ExportJob,
    progress: Option<ProgressCallback>,
) -> VellumResult<ExportOutcome> {
    if !job.scene_dir.exists() {
        return Err(VellumError::FileNotFound {
            path: job.scene_dir.clone(),
        });
    }

    let loaded = LoadedScene::load(&job.scene_dir)
        .map_err(|e| VellumError::scene(format!("Failed to load scene: {e}")))?;
    let style = SurfaceStyle::from_config(loaded.scene.background.clone(), &job.fonts)?;
    let session = EditorSession::<RasterSurface>::open(loaded, style).await?;

    let saver = DirectorySaver::new(&job.output_dir);
    session
        .export(&job.request, &saver, &CancelToken::new(), progress.as_ref())
        .await
}
