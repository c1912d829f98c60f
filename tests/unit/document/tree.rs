use super::*;
use crate::foundation::core::BezPath;

fn uid(s: &str) -> Uid {
    Uid::from(s)
}

fn sample() -> Document {
    // root
    // ├─ a (group)
    // │  ├─ a1 (vector)
    // │  └─ a2 (vector)
    // └─ b (group)
    let mut doc = Document::new();
    doc.add_node(&Uid::root(), None, VisualElement::group("a"))
        .expect("add a");
    doc.add_node(&uid("a"), None, VisualElement::vector("a1", BezPath::new()))
        .expect("add a1");
    doc.add_node(&uid("a"), None, VisualElement::vector("a2", BezPath::new()))
        .expect("add a2");
    doc.add_node(&Uid::root(), None, VisualElement::group("b"))
        .expect("add b");
    doc.take_invalidations();
    doc
}

#[test]
fn add_rejects_duplicates_root_and_unknown_parent() {
    let mut doc = sample();
    assert!(doc.add_node(&Uid::root(), None, VisualElement::group("a")).is_err());
    assert!(
        doc.add_node(&Uid::root(), None, VisualElement::group(Uid::root()))
            .is_err()
    );
    assert!(doc.add_node(&uid("nope"), None, VisualElement::group("c")).is_err());
    assert_eq!(doc.len(), 4);
}

#[test]
fn add_inserts_at_index() {
    let mut doc = sample();
    doc.add_node(&uid("a"), Some(0), VisualElement::group("a0"))
        .expect("add");
    let a = doc.node(&uid("a")).expect("a");
    let order: Vec<&str> = a.children.iter().map(|c| c.uid.as_str()).collect();
    assert_eq!(order, vec!["a0", "a1", "a2"]);
}

#[test]
fn find_path_runs_from_root() {
    let doc = sample();
    let p = doc.find_path(&uid("a2")).expect("path");
    assert_eq!(p, vec![Uid::root(), uid("a"), uid("a2")]);
    assert!(doc.find_path(&uid("zzz")).is_none());
}

#[test]
fn remove_drops_subtree_elements() {
    let mut doc = sample();
    let removed = doc.remove_node(&uid("a")).expect("remove");
    let removed: Vec<&str> = removed.iter().map(|e| e.uid.as_str()).collect();
    assert_eq!(removed, vec!["a", "a1", "a2"]);
    assert!(doc.element(&uid("a1")).is_none());
    assert_eq!(doc.len(), 1);
    assert!(doc.remove_node(&Uid::root()).is_err());
}

#[test]
fn move_rejects_cycles() {
    let mut doc = sample();
    doc.add_node(&uid("a1"), None, VisualElement::group("deep"))
        .expect("add deep");
    assert!(doc.move_node(&uid("a"), &uid("deep"), None).is_err());
    assert!(doc.move_node(&uid("a"), &uid("a"), None).is_err());
    assert!(doc.move_node(&uid("a"), &uid("a2"), None).is_err());
    assert!(doc.move_node(&Uid::root(), &uid("b"), None).is_err());

    doc.move_node(&uid("a2"), &uid("b"), None).expect("move");
    assert_eq!(
        doc.find_path(&uid("a2")).expect("path"),
        vec![Uid::root(), uid("b"), uid("a2")]
    );
}

#[test]
fn update_marks_node_ancestors_and_descendants() {
    let mut doc = sample();
    doc.update_element(&uid("a"), |e| e.opacity = 0.5)
        .expect("update");
    let stale = doc.take_invalidations();
    assert!(stale.contains(&Uid::root()));
    assert!(stale.contains(&uid("a")));
    assert!(stale.contains(&uid("a1")));
    assert!(stale.contains(&uid("a2")));
    assert!(!stale.contains(&uid("b")));
    assert_eq!(doc.pending_invalidations(), 0);
}

#[test]
fn update_cannot_change_uid() {
    let mut doc = sample();
    doc.update_element(&uid("b"), |e| e.uid = uid("hijack"))
        .expect("update");
    assert_eq!(doc.element(&uid("b")).expect("b").uid, uid("b"));
    assert!(doc.update_element(&uid("nope"), |_| {}).is_err());
}

#[test]
fn move_marks_old_and_new_ancestry() {
    let mut doc = sample();
    doc.move_node(&uid("a1"), &uid("b"), None).expect("move");
    let stale = doc.take_invalidations();
    assert!(stale.contains(&uid("a")));
    assert!(stale.contains(&uid("b")));
    assert!(stale.contains(&uid("a1")));
}

#[test]
fn editing_a_referenced_node_invalidates_the_reference() {
    let mut doc = sample();
    doc.add_node(&uid("b"), None, VisualElement::reference("ref", "a"))
        .expect("add ref");
    doc.take_invalidations();

    doc.update_element(&uid("a1"), |e| e.visible = false)
        .expect("update");
    let stale = doc.take_invalidations();
    assert!(stale.contains(&uid("ref")));
    assert!(stale.contains(&uid("b")));
}

#[test]
fn resolve_expands_references() {
    let mut doc = sample();
    doc.add_node(&uid("b"), None, VisualElement::reference("ref", "a"))
        .expect("add ref");
    let root = doc.resolve_root().expect("resolve");
    let r = root.find(&uid("ref")).expect("ref");
    assert_eq!(r.children.len(), 1);
    assert_eq!(r.children[0].uid, uid("a"));
    assert_eq!(r.children[0].children.len(), 2);
    assert_eq!(
        r.children[0].path,
        vec![Uid::root(), uid("b"), uid("ref"), uid("a")]
    );
}

#[test]
fn resolve_rejects_reference_cycles() {
    let mut doc = sample();
    doc.add_node(&uid("a"), None, VisualElement::reference("loop", "a"))
        .expect("add");
    let err = doc.resolve_root().expect_err("cycle");
    assert!(err.to_string().contains("cycle"));

    let mut doc = sample();
    doc.add_node(&uid("b"), None, VisualElement::reference("dangling", "zzz"))
        .expect("add");
    assert!(doc.resolve_root().is_err());
}

#[test]
fn resolve_subtree_keeps_full_path() {
    let doc = sample();
    let a = doc.resolve(&uid("a")).expect("resolve a");
    assert_eq!(a.path, vec![Uid::root(), uid("a")]);
    assert_eq!(a.children[1].path, vec![Uid::root(), uid("a"), uid("a2")]);
    assert_eq!(a.descendant_uids(), vec![uid("a1"), uid("a2")]);
}
