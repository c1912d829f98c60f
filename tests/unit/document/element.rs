use super::*;

fn red() -> Rgba8Premul {
    Rgba8Premul::from_straight_rgba(255, 0, 0, 255)
}

#[test]
fn opacity_is_clamped_and_nan_is_transparent() {
    let e = VisualElement::group("g").with_opacity(1.7);
    assert_eq!(e.effective_opacity(), 1.0);
    let e = VisualElement::group("g").with_opacity(f32::NAN);
    assert_eq!(e.effective_opacity(), 0.0);
    assert!(!e.contributes());
    assert!(!VisualElement::group("g").hidden().contributes());
}

#[test]
fn direct_output_requires_normal_blend_no_postprocess_no_clip() {
    let base = VisualElement::vector("v", BezPath::new());
    assert!(base.can_direct_output());

    assert!(!base.clone().with_blend(BlendMode::Multiply).can_direct_output());
    assert!(!base.clone().clipped().can_direct_output());

    let pp = LayerFilter::postprocess("f", "blur", serde_json::Value::Null, 1.0);
    assert!(!base.clone().with_filter(pp.clone()).can_direct_output());

    // Disabled or fully transparent postprocess filters do not count.
    assert!(base.clone().with_filter(pp.clone().disabled()).can_direct_output());
    let invisible = LayerFilter::postprocess("f", "blur", serde_json::Value::Null, 0.0);
    assert!(base.with_filter(invisible).can_direct_output());
}

#[test]
fn composite_op_follows_clip_flag() {
    let e = VisualElement::group("g").with_blend(BlendMode::Screen);
    assert_eq!(e.composite_op(), CompositeOp::Blend(BlendMode::Screen));
    assert_eq!(e.clipped().composite_op(), CompositeOp::SourceAtop);
}

#[test]
fn internal_filters_are_fill_and_stroke() {
    assert!(LayerFilter::fill("a", red()).is_internal());
    assert!(LayerFilter::stroke("b", "round", red(), 2.0).is_internal());
    assert!(!LayerFilter::postprocess("c", "blur", serde_json::Value::Null, 1.0).is_internal());
}

#[test]
fn filter_json_shape() {
    let json = serde_json::json!({
        "uid": "f1",
        "kind": "postprocess",
        "filter_id": "blur",
        "settings": {"radius": 2}
    });
    let f: LayerFilter = serde_json::from_value(json).expect("parse filter");
    assert!(f.enabled);
    let p = f.as_active_postprocess().expect("active");
    assert_eq!(p.filter_id, "blur");
    assert_eq!(p.opacity, 1.0);

    let json = serde_json::json!({
        "uid": "f2",
        "kind": "fill",
        "fill": {"type": "solid", "color": {"r": 1, "g": 2, "b": 3, "a": 255}}
    });
    let f: LayerFilter = serde_json::from_value(json).expect("parse fill");
    assert!(f.is_internal());
}

#[test]
fn kind_helpers() {
    assert_eq!(VisualKind::Group.name(), "group");
    assert!(VisualKind::Group.is_container());
    assert!(VisualElement::reference("r", "g").kind.is_container());
    assert!(VisualElement::vector("v", BezPath::new()).kind.path().is_some());
    assert!(VisualElement::filter_layer("f").kind.path().is_none());
    assert_eq!(BlendMode::ColorDodge.as_str(), "color-dodge");
    assert_eq!(CompositeOp::SourceAtop.as_str(), "source-atop");
}
