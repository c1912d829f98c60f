use super::*;
use crate::document::element::InkStyle;
use crate::foundation::core::{Affine, Rgba8Premul};
use crate::render::backend::{RasterSurface, SurfaceOptions};
use serde_json::json;

fn surface(w: u32, h: u32) -> CpuSurface {
    CpuSurface::new(w, h, SurfaceOptions::default()).expect("surface")
}

#[test]
fn blur_radius_0_is_identity() {
    let (w, h) = (4u32, 3u32);
    let mut src = vec![0u8; (w * h * 4) as usize];
    for (i, b) in src.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(31);
    }
    let mut dst = vec![0u8; src.len()];
    let mut tmp = vec![0u8; src.len()];
    let k = gaussian_kernel_q16(0, 1.0).unwrap();
    blur_rgba8_premul_q16(&src, &mut dst, &mut tmp, w, h, &k);
    assert_eq!(src, dst);
}

#[test]
fn blur_constant_image_is_identity() {
    let (w, h) = (5u32, 5u32);
    let src: Vec<u8> = [10u8, 20, 30, 40].repeat((w * h) as usize);
    let mut dst = vec![0u8; src.len()];
    let mut tmp = vec![0u8; src.len()];
    let k = gaussian_kernel_q16(2, 1.0).unwrap();
    assert_eq!(k.iter().map(|&v| u64::from(v)).sum::<u64>(), 65536);
    blur_rgba8_premul_q16(&src, &mut dst, &mut tmp, w, h, &k);
    assert_eq!(src, dst);
}

#[test]
fn gaussian_kernel_rejects_bad_sigma() {
    assert!(gaussian_kernel_q16(3, 0.0).is_err());
    assert!(gaussian_kernel_q16(3, f32::NAN).is_err());
}

#[test]
fn color_matrix_identity_is_identity() {
    let src = vec![10u8, 20, 30, 40, 50, 60, 70, 80];
    let mut dst = vec![0u8; src.len()];
    let id = [
        1.0, 0.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, 0.0, //
    ];
    color_matrix_rgba8_premul(&src, &mut dst, id);
    assert_eq!(src, dst);
}

#[test]
fn grayscale_equalizes_channels() {
    let src = vec![255u8, 0, 0, 255];
    let mut dst = vec![0u8; 4];
    color_matrix_rgba8_premul(&src, &mut dst, grayscale_matrix(1.0));
    assert_eq!(dst[0], dst[1]);
    assert_eq!(dst[1], dst[2]);
    assert_eq!(dst[3], 255);
}

#[tokio::test]
async fn invert_keeps_alpha_and_writes_output() {
    let mut filters = CpuFilters::new();
    let input = Bitmap::new(1, 1, vec![100, 50, 0, 200]).unwrap();
    let mut out = surface(1, 1);
    filters
        .apply_raster_filter("invert", &input, &mut out, &json!({}), Viewport::new(1, 1))
        .await
        .unwrap();
    assert_eq!(out.pixel(0, 0), Some([100, 150, 200, 200]));
}

#[tokio::test]
async fn blur_scales_radius_with_zoom() {
    let mut filters = CpuFilters::new();
    let mut data = vec![0u8; 9 * 4];
    data[4 * 4..4 * 4 + 4].copy_from_slice(&[255, 255, 255, 255]);
    let input = Bitmap::new(3, 3, data).unwrap();

    let mut flat = surface(3, 3);
    filters
        .apply_raster_filter(
            "blur",
            &input,
            &mut flat,
            &json!({ "radius": 0.4 }),
            Viewport::new(3, 3),
        )
        .await
        .unwrap();
    assert_eq!(flat.data(), input.data.as_slice());

    let mut zoomed = surface(3, 3);
    let vp = Viewport::new(3, 3).with_transform(Affine::scale(4.0));
    filters
        .apply_raster_filter("blur", &input, &mut zoomed, &json!({ "radius": 0.4 }), vp)
        .await
        .unwrap();
    assert!(zoomed.pixel(0, 0).is_some_and(|p| p[3] > 0));
}

#[tokio::test]
async fn unknown_filter_is_a_missing_plugin() {
    let mut filters = CpuFilters::new();
    let input = Bitmap::transparent(1, 1);
    let mut out = surface(1, 1);
    let err = filters
        .apply_raster_filter("sepia", &input, &mut out, &json!(null), Viewport::new(1, 1))
        .await
        .expect_err("unknown id");
    assert!(err.is_missing_plugin());
}

#[tokio::test]
async fn color_matrix_requires_twenty_coefficients() {
    let mut filters = CpuFilters::new();
    let input = Bitmap::transparent(1, 1);
    let mut out = surface(1, 1);
    let err = filters
        .apply_raster_filter(
            "color-matrix",
            &input,
            &mut out,
            &json!({ "matrix": [1.0, 0.0] }),
            Viewport::new(1, 1),
        )
        .await
        .expect_err("short matrix");
    assert!(matches!(err, EaselError::Validation(_)));
}

#[test]
fn round_brush_paints_along_the_path() {
    let mut brush = RoundBrush::new();
    let mut target = surface(10, 10);
    let path = BezPath::from_svg("M1 5 L9 5").unwrap();
    let stroke = StrokeStyle {
        brush_id: RoundBrush::ID.to_string(),
        ink: InkStyle {
            color: Rgba8Premul::from_straight_rgba(255, 0, 0, 255),
        },
        width: 4.0,
    };
    brush
        .stroke_path(&mut target, &path, &stroke, DrawParams::default())
        .unwrap();
    assert_eq!(target.pixel(5, 5), Some([255, 0, 0, 255]));
    assert_eq!(target.pixel(5, 0), Some([0, 0, 0, 0]));
    assert_eq!(target.width(), 10);
}

#[test]
fn unknown_brush_is_a_missing_plugin() {
    let mut brush = RoundBrush::new();
    let mut target = surface(2, 2);
    let stroke = StrokeStyle {
        brush_id: "charcoal".to_string(),
        ink: InkStyle {
            color: Rgba8Premul::transparent(),
        },
        width: 1.0,
    };
    let err = brush
        .stroke_path(
            &mut target,
            &BezPath::new(),
            &stroke,
            DrawParams::default(),
        )
        .expect_err("unknown brush");
    assert!(err.is_missing_plugin());
}

#[tokio::test]
async fn huge_blur_radius_is_bounded_and_negative_is_rejected() {
    let mut filters = CpuFilters::new();
    let input = Bitmap::solid(4, 4, Rgba8Premul::from_straight_rgba(0, 0, 255, 255));
    let mut out = surface(4, 4);
    filters
        .apply_raster_filter(
            "blur",
            &input,
            &mut out,
            &json!({ "radius": 1.0e12 }),
            Viewport::new(4, 4),
        )
        .await
        .unwrap();
    assert_eq!(out.data(), input.data.as_slice());

    let err = filters
        .apply_raster_filter(
            "blur",
            &input,
            &mut out,
            &json!({ "radius": -1.0 }),
            Viewport::new(4, 4),
        )
        .await
        .expect_err("negative radius");
    assert!(matches!(err, EaselError::Validation(_)));
}
