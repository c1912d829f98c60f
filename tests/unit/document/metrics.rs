use super::*;
use crate::document::element::VisualElement;
use crate::document::tree::Document;
use crate::foundation::core::BezPath;

fn doc() -> Document {
    let mut doc = Document::new();
    doc.add_node(&Uid::root(), None, VisualElement::group("g"))
        .expect("g");
    doc.add_node(&Uid::from("g"), None, VisualElement::vector("low", BezPath::new()))
        .expect("low");
    doc.add_node(&Uid::from("g"), None, VisualElement::vector("high", BezPath::new()))
        .expect("high");
    doc.add_node(&Uid::root(), None, VisualElement::vector("ghost", BezPath::new()).hidden())
        .expect("ghost");
    doc
}

#[test]
fn group_box_is_union_of_children() {
    let d = doc();
    let root = d.resolve_root().expect("resolve");
    let mut boxes = HashMap::new();
    boxes.insert(Uid::from("low"), Rect::new(0.0, 0.0, 10.0, 10.0));
    boxes.insert(Uid::from("high"), Rect::new(5.0, 5.0, 20.0, 12.0));
    union_container_boxes(&root, &mut boxes);
    assert_eq!(boxes.get(&Uid::from("g")), Some(&Rect::new(0.0, 0.0, 20.0, 12.0)));
    assert_eq!(boxes.get(&Uid::root()), Some(&Rect::new(0.0, 0.0, 20.0, 12.0)));
}

#[test]
fn z_order_skips_hidden_and_hit_test_prefers_topmost_leaf() {
    let d = doc();
    let root = d.resolve_root().expect("resolve");
    let mut boxes = HashMap::new();
    boxes.insert(Uid::from("low"), Rect::new(0.0, 0.0, 10.0, 10.0));
    boxes.insert(Uid::from("high"), Rect::new(5.0, 5.0, 20.0, 12.0));
    union_container_boxes(&root, &mut boxes);

    let mut m = LayerMetrics::new();
    m.rebuild(&root, boxes);
    let order: Vec<&str> = m.z_order().map(|u| u.as_str()).collect();
    assert_eq!(order, vec!["g", "low", "high"]);
    assert_eq!(m.z_index(&Uid::from("high")), Some(2));

    assert_eq!(m.hit_test(Point::new(6.0, 6.0)), Some(&Uid::from("high")));
    assert_eq!(m.hit_test(Point::new(1.0, 1.0)), Some(&Uid::from("low")));
    assert_eq!(m.hit_test(Point::new(50.0, 50.0)), None);

    m.forget(&Uid::from("high"));
    assert_eq!(m.hit_test(Point::new(6.0, 6.0)), Some(&Uid::from("low")));
    m.clear();
    assert!(m.bounding_box(&Uid::from("low")).is_none());
}
