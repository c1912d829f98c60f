use super::*;

#[test]
fn root_uid_is_reserved() {
    assert!(Uid::root().is_root());
    assert!(!Uid::from("layer-1").is_root());
    assert_eq!(Uid::root().as_str(), "__root__");
}

#[test]
fn transform_to_affine_identity_and_translation() {
    let t = LayerTransform::default();
    assert!(t.is_identity());
    assert_eq!(t.to_affine(), Affine::IDENTITY);

    let t = LayerTransform {
        translate: Vec2::new(10.0, -2.5),
        ..LayerTransform::default()
    };
    assert_eq!(t.to_affine(), Affine::translate(Vec2::new(10.0, -2.5)));
}

#[test]
fn transform_scales_before_translating() {
    let t = LayerTransform {
        translate: Vec2::new(5.0, 0.0),
        scale: Vec2::new(2.0, 2.0),
        rotate: 0.0,
    };
    let p = t.to_affine() * Point::new(1.0, 1.0);
    assert_eq!(p, Point::new(7.0, 2.0));
}

#[test]
fn premul_rounds_to_nearest() {
    let c = Rgba8Premul::from_straight_rgba(255, 128, 0, 128);
    assert_eq!(c.to_array(), [128, 64, 0, 128]);
    assert_eq!(Rgba8Premul::transparent().a, 0);
}

#[test]
fn viewport_rect_matches_size() {
    let v = Viewport::new(32, 16);
    assert_eq!(v.size(), (32, 16));
    assert_eq!(v.rect(), Rect::new(0.0, 0.0, 32.0, 16.0));
    assert_eq!(v.transform, Affine::IDENTITY);
}

#[test]
fn bitmap_validates_len_and_reads_pixels() {
    assert!(Bitmap::new(2, 2, vec![0; 15]).is_err());
    let bm = Bitmap::solid(2, 1, Rgba8Premul::from_straight_rgba(255, 0, 0, 255));
    assert_eq!(bm.pixel(1, 0), Some([255, 0, 0, 255]));
    assert_eq!(bm.pixel(2, 0), None);
    assert_eq!(Bitmap::transparent(3, 3).pixel(2, 2), Some([0, 0, 0, 0]));
}
