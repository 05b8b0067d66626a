use proptest::prelude::*;

use vellum_common::config::PercentPrecision;
use vellum_scene_model::element::{ImageShape, SceneElement, Shape};
use vellum_scene_model::geometry::{
    apply_percent_geometry, extract_percent_geometry, percent_to_pixels, pixels_to_percent, Axis,
    CanvasSize,
};

fn image_at(x: Option<f64>, y: Option<f64>, w: Option<f64>, h: Option<f64>) -> SceneElement {
    SceneElement::new(
        "image-1",
        Shape::Image(ImageShape {
            source: "sources/photo.jpg".to_string(),
            x,
            y,
            width: w,
            height: h,
            bitmap: None,
        }),
    )
}

proptest! {
    #[test]
    fn pixel_percent_roundtrip_is_within_one_pixel(v in 0u32..100_000, d in 1u32..20_000) {
        let v = v as f64;
        let d = d as f64;
        let back = percent_to_pixels(pixels_to_percent(v, d).unwrap(), d).unwrap();
        prop_assert!((back - v).abs() <= 1.0, "v={v} d={d} back={back}");
    }

    #[test]
    fn same_canvas_roundtrip_preserves_element_geometry(
        x in 0u32..800, y in 0u32..600, w in 1u32..800, h in 1u32..600,
    ) {
        let canvas = CanvasSize::new(800, 600);
        let original = image_at(Some(x as f64), Some(y as f64), Some(w as f64), Some(h as f64));
        let pct = extract_percent_geometry(&original, canvas, PercentPrecision::Exact).unwrap();

        let mut copy = original.clone();
        apply_percent_geometry(&mut copy, &pct, canvas).unwrap();
        for axis in [Axis::X, Axis::Y, Axis::Width, Axis::Height] {
            let a = original.pixel(axis).unwrap();
            let b = copy.pixel(axis).unwrap();
            prop_assert!((a - b).abs() <= 1.0, "{axis:?}: {a} vs {b}");
        }
    }

    #[test]
    fn scaling_up_preserves_relative_position(
        x in 0u32..800, y in 0u32..600, factor in 1u32..8,
    ) {
        let edit = CanvasSize::new(800, 600);
        let export = CanvasSize::new(800 * factor, 600 * factor);
        let mut el = image_at(Some(x as f64), Some(y as f64), None, None);
        let pct = extract_percent_geometry(&el, edit, PercentPrecision::Exact).unwrap();
        apply_percent_geometry(&mut el, &pct, export).unwrap();

        let expected_x = (x * factor) as f64;
        let expected_y = (y * factor) as f64;
        prop_assert!((el.pixel(Axis::X).unwrap() - expected_x).abs() <= 1.0);
        prop_assert!((el.pixel(Axis::Y).unwrap() - expected_y).abs() <= 1.0);
    }
}

#[test]
fn unset_width_never_becomes_zero_percent() {
    let el = image_at(Some(0.0), Some(0.0), None, Some(300.0));
    let pct =
        extract_percent_geometry(&el, CanvasSize::new(800, 600), PercentPrecision::Exact).unwrap();
    assert_eq!(pct.px, Some(0.0));
    assert_eq!(pct.pwidth, None);
    assert_eq!(pct.pheight, Some(50.0));
}
