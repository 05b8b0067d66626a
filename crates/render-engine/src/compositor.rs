//! Scene compositor: rebuilds live elements for another surface size.
//!
//! Each function is one batch stage of the export; every element goes
//! through a stage before any element enters the next one.

use vellum_common::config::PercentPrecision;
use vellum_common::error::VellumResult;
use vellum_scene_model::element::{ImageShape, SceneElement, Shape};
use vellum_scene_model::geometry::{
    apply_percent_geometry, extract_percent_geometry, Axis, CanvasSize,
};

use crate::cache::ImageCache;

/// Independent copies of the content elements, overlays dropped.
pub fn snapshot_content(live: &[SceneElement]) -> Vec<SceneElement> {
    live.iter()
        .filter(|el| el.kind().is_content())
        .map(SceneElement::clone_element)
        .collect()
}

/// Re-derive each clone's pixel geometry for the target size.
///
/// Percentages are taken against the live surface, then resolved against
/// the target.
pub fn normalize_for_target(
    clones: &mut [SceneElement],
    live: CanvasSize,
    target: CanvasSize,
    precision: PercentPrecision,
) -> VellumResult<()> {
    for clone in clones.iter_mut() {
        let percent = extract_percent_geometry(clone, live, precision)?;
        apply_percent_geometry(clone, &percent, target)?;
    }
    Ok(())
}

/// Swap every image's pixels for the full-resolution cached ones.
///
/// Fails on the first source missing from the cache; nothing is returned in
/// that case, so a partial element list can never be rendered.
pub fn resolve_images(
    clones: Vec<SceneElement>,
    cache: &ImageCache,
) -> VellumResult<Vec<SceneElement>> {
    clones
        .into_iter()
        .map(|clone| match &clone.shape {
            Shape::Image(img) => {
                let full = cache.lookup(&img.source)?;
                let mut fresh = SceneElement::new(
                    clone.id.clone(),
                    Shape::Image(ImageShape {
                        source: img.source.clone(),
                        x: clone.pixel(Axis::X),
                        y: clone.pixel(Axis::Y),
                        width: clone.pixel(Axis::Width),
                        height: clone.pixel(Axis::Height),
                        bitmap: Some(full.clone()),
                    }),
                );
                fresh.percent = clone.percent;
                Ok(fresh)
            }
            _ => Ok(clone),
        })
        .collect()
}
