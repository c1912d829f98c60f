use std::collections::HashMap;

use crate::document::tree::ResolvedNode;
use crate::foundation::core::{Point, Rect, Uid};

#[derive(Clone, Debug, PartialEq)]
struct ZEntry {
    uid: Uid,
    container: bool,
}

/// Per-node bounding boxes (viewport space) and the flattened paint order of the last pass.
#[derive(Clone, Debug, Default)]
pub struct LayerMetrics {
    boxes: HashMap<Uid, Rect>,
    z_order: Vec<ZEntry>,
}

impl LayerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace boxes and rebuild paint order from `root` (pre-order, bottom to top).
    pub fn rebuild(&mut self, root: &ResolvedNode<'_>, boxes: HashMap<Uid, Rect>) {
        self.boxes = boxes;
        self.z_order.clear();
        for c in &root.children {
            self.push_painted(c);
        }
    }

    fn push_painted(&mut self, node: &ResolvedNode<'_>) {
        if !node.element.contributes() {
            return;
        }
        if !self.z_order.iter().any(|z| z.uid == node.uid) {
            self.z_order.push(ZEntry {
                uid: node.uid.clone(),
                container: node.element.kind.is_container(),
            });
        }
        for c in &node.children {
            self.push_painted(c);
        }
    }

    pub fn bounding_box(&self, uid: &Uid) -> Option<Rect> {
        self.boxes.get(uid).copied()
    }

    pub fn boxes(&self) -> &HashMap<Uid, Rect> {
        &self.boxes
    }

    pub fn z_order(&self) -> impl Iterator<Item = &Uid> {
        self.z_order.iter().map(|z| &z.uid)
    }

    pub fn z_index(&self, uid: &Uid) -> Option<usize> {
        self.z_order.iter().position(|z| &z.uid == uid)
    }

    /// Topmost non-container node whose box contains `p`.
    pub fn hit_test(&self, p: Point) -> Option<&Uid> {
        self.z_order
            .iter()
            .rev()
            .filter(|z| !z.container)
            .find(|z| self.boxes.get(&z.uid).is_some_and(|r| r.contains(p)))
            .map(|z| &z.uid)
    }

    pub fn forget(&mut self, uid: &Uid) {
        self.boxes.remove(uid);
        self.z_order.retain(|z| &z.uid != uid);
    }

    pub fn clear(&mut self) {
        self.boxes.clear();
        self.z_order.clear();
    }
}

/// Fill in container boxes as the union of their children's boxes, bottom-up.
pub(crate) fn union_container_boxes(
    node: &ResolvedNode<'_>,
    boxes: &mut HashMap<Uid, Rect>,
) -> Option<Rect> {
    let mut acc: Option<Rect> = None;
    for c in &node.children {
        if let Some(r) = union_container_boxes(c, boxes) {
            acc = Some(acc.map_or(r, |a| a.union(r)));
        }
    }
    if node.element.kind.is_container()
        && let Some(r) = acc
    {
        boxes.insert(node.uid.clone(), r);
    }
    boxes.get(&node.uid).copied()
}

#[cfg(test)]
#[path = "../../tests/unit/document/metrics.rs"]
mod tests;
