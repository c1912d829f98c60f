use std::collections::{BTreeSet, HashMap};

use crate::document::element::{VisualElement, VisualKind};
use crate::foundation::core::Uid;
use crate::foundation::error::{EaselError, EaselResult};

/// Structural node. Payload lives in the document's element table under the same uid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerNode {
    pub uid: Uid,
    pub children: Vec<LayerNode>,
}

impl LayerNode {
    pub fn new(uid: impl Into<Uid>) -> Self {
        Self {
            uid: uid.into(),
            children: Vec::new(),
        }
    }

    fn find(&self, uid: &Uid) -> Option<&LayerNode> {
        if &self.uid == uid {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(uid))
    }

    fn find_mut(&mut self, uid: &Uid) -> Option<&mut LayerNode> {
        if &self.uid == uid {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(uid))
    }

    fn path_to(&self, uid: &Uid, out: &mut Vec<Uid>) -> bool {
        out.push(self.uid.clone());
        if &self.uid == uid {
            return true;
        }
        for c in &self.children {
            if c.path_to(uid, out) {
                return true;
            }
        }
        out.pop();
        false
    }

    fn detach(&mut self, uid: &Uid) -> Option<LayerNode> {
        if let Some(i) = self.children.iter().position(|c| &c.uid == uid) {
            return Some(self.children.remove(i));
        }
        self.children.iter_mut().find_map(|c| c.detach(uid))
    }

    /// This node's uid followed by every descendant uid, pre-order.
    pub fn collect_uids(&self, out: &mut Vec<Uid>) {
        out.push(self.uid.clone());
        for c in &self.children {
            c.collect_uids(out);
        }
    }
}

/// Borrowed, per-pass projection of a subtree with elements attached and references expanded.
#[derive(Clone, Debug)]
pub struct ResolvedNode<'a> {
    pub uid: Uid,
    pub element: &'a VisualElement,
    /// Uids from the document root down to this node (inclusive).
    pub path: Vec<Uid>,
    pub children: Vec<ResolvedNode<'a>>,
}

impl<'a> ResolvedNode<'a> {
    /// Pre-order walk.
    pub fn walk(&self, f: &mut impl FnMut(&ResolvedNode<'a>)) {
        f(self);
        for c in &self.children {
            c.walk(f);
        }
    }

    pub fn find(&self, uid: &Uid) -> Option<&ResolvedNode<'a>> {
        if &self.uid == uid {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(uid))
    }

    pub fn descendant_uids(&self) -> Vec<Uid> {
        let mut out = Vec::new();
        for c in &self.children {
            c.walk(&mut |n| out.push(n.uid.clone()));
        }
        out
    }
}

/// Layer tree plus its `uid -> element` table.
///
/// All structural edits go through this type so tree and table never disagree. Every edit records
/// which uids lost their cached rendering; callers drain the set with
/// [`Document::take_invalidations`].
#[derive(Clone, Debug)]
pub struct Document {
    root: LayerNode,
    root_element: VisualElement,
    elements: HashMap<Uid, VisualElement>,
    stale: BTreeSet<Uid>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            root: LayerNode::new(Uid::root()),
            root_element: VisualElement::group(Uid::root()).with_name("root"),
            elements: HashMap::new(),
            stale: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &LayerNode {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, uid: &Uid) -> bool {
        uid.is_root() || self.elements.contains_key(uid)
    }

    pub fn element(&self, uid: &Uid) -> Option<&VisualElement> {
        if uid.is_root() {
            return Some(&self.root_element);
        }
        self.elements.get(uid)
    }

    pub fn node(&self, uid: &Uid) -> Option<&LayerNode> {
        self.root.find(uid)
    }

    /// Uids from the root down to `uid` (inclusive), or `None` if the node is not in the tree.
    pub fn find_path(&self, uid: &Uid) -> Option<Vec<Uid>> {
        let mut out = Vec::new();
        self.root.path_to(uid, &mut out).then_some(out)
    }

    /// Insert `element` as a child of `parent` at `index` (appended when `None` or past the end).
    #[tracing::instrument(skip(self, element), fields(uid = %element.uid))]
    pub fn add_node(
        &mut self,
        parent: &Uid,
        index: Option<usize>,
        element: VisualElement,
    ) -> EaselResult<()> {
        let uid = element.uid.clone();
        if uid.is_root() {
            return Err(EaselError::validation("the root uid is reserved"));
        }
        if self.contains(&uid) {
            return Err(EaselError::validation(format!("duplicate uid '{uid}'")));
        }
        let parent_node = self
            .root
            .find_mut(parent)
            .ok_or_else(|| EaselError::validation(format!("unknown parent '{parent}'")))?;
        let at = index
            .unwrap_or(parent_node.children.len())
            .min(parent_node.children.len());
        parent_node.children.insert(at, LayerNode::new(uid.clone()));
        self.elements.insert(uid.clone(), element);

        self.mark_stale(&uid);
        Ok(())
    }

    /// Remove a node and its whole subtree. Returns the removed elements in pre-order.
    #[tracing::instrument(skip(self))]
    pub fn remove_node(&mut self, uid: &Uid) -> EaselResult<Vec<VisualElement>> {
        if uid.is_root() {
            return Err(EaselError::validation("cannot remove the root node"));
        }
        if self.find_path(uid).is_none() {
            return Err(EaselError::validation(format!("unknown node '{uid}'")));
        }
        // Ancestors and the subtree lose their caches before the subtree is gone.
        self.mark_stale(uid);

        let detached = self
            .root
            .detach(uid)
            .ok_or_else(|| EaselError::invariant(format!("node '{uid}' vanished during removal")))?;
        let mut uids = Vec::new();
        detached.collect_uids(&mut uids);
        Ok(uids
            .iter()
            .filter_map(|u| self.elements.remove(u))
            .collect())
    }

    /// Reparent `uid` under `new_parent`. Moving a node into its own subtree is rejected.
    #[tracing::instrument(skip(self))]
    pub fn move_node(
        &mut self,
        uid: &Uid,
        new_parent: &Uid,
        index: Option<usize>,
    ) -> EaselResult<()> {
        if uid.is_root() {
            return Err(EaselError::validation("cannot move the root node"));
        }
        let target_path = self
            .find_path(new_parent)
            .ok_or_else(|| EaselError::validation(format!("unknown parent '{new_parent}'")))?;
        if target_path.contains(uid) {
            return Err(EaselError::validation(format!(
                "cannot move '{uid}' into its own subtree"
            )));
        }
        if self.find_path(uid).is_none() {
            return Err(EaselError::validation(format!("unknown node '{uid}'")));
        }

        // Old ancestry.
        self.mark_stale(uid);
        let node = self
            .root
            .detach(uid)
            .ok_or_else(|| EaselError::invariant(format!("node '{uid}' vanished during move")))?;
        let parent_node = self
            .root
            .find_mut(new_parent)
            .ok_or_else(|| EaselError::invariant(format!("parent '{new_parent}' vanished")))?;
        let at = index
            .unwrap_or(parent_node.children.len())
            .min(parent_node.children.len());
        parent_node.children.insert(at, node);
        // New ancestry.
        self.mark_stale(uid);
        Ok(())
    }

    /// Edit an element in place. The uid cannot be changed through this call.
    pub fn update_element(
        &mut self,
        uid: &Uid,
        edit: impl FnOnce(&mut VisualElement),
    ) -> EaselResult<()> {
        let element = if uid.is_root() {
            &mut self.root_element
        } else {
            self.elements
                .get_mut(uid)
                .ok_or_else(|| EaselError::validation(format!("unknown element '{uid}'")))?
        };
        edit(element);
        element.uid = uid.clone();
        self.mark_stale(uid);
        Ok(())
    }

    /// Drain the set of uids whose cached rendering became stale since the last call.
    pub fn take_invalidations(&mut self) -> Vec<Uid> {
        std::mem::take(&mut self.stale).into_iter().collect()
    }

    pub fn pending_invalidations(&self) -> usize {
        self.stale.len()
    }

    /// Mark `uid`, its ancestors, its descendants and every reference pointing into that set.
    fn mark_stale(&mut self, uid: &Uid) {
        let mut frontier = vec![uid.clone()];
        while let Some(u) = frontier.pop() {
            let mut touched = Vec::new();
            if let Some(path) = self.find_path(&u) {
                touched.extend(path);
            }
            if let Some(node) = self.root.find(&u) {
                node.collect_uids(&mut touched);
            }
            touched.push(u);

            let mut fresh = Vec::new();
            for t in touched {
                if self.stale.insert(t.clone()) {
                    fresh.push(t);
                }
            }
            if fresh.is_empty() {
                continue;
            }
            for (ref_uid, e) in &self.elements {
                if let VisualKind::Reference { target } = &e.kind
                    && fresh.contains(target)
                    && !self.stale.contains(ref_uid)
                {
                    frontier.push(ref_uid.clone());
                }
            }
        }
    }

    /// Resolve the whole document.
    pub fn resolve_root(&self) -> EaselResult<ResolvedNode<'_>> {
        self.resolve(&Uid::root())
    }

    /// Resolve the subtree rooted at `uid`, expanding references in place.
    pub fn resolve(&self, uid: &Uid) -> EaselResult<ResolvedNode<'_>> {
        let path = self
            .find_path(uid)
            .ok_or_else(|| EaselError::validation(format!("unknown node '{uid}'")))?;
        let node = self
            .root
            .find(uid)
            .ok_or_else(|| EaselError::invariant(format!("node '{uid}' has a path but no node")))?;
        let mut active = path.clone();
        active.pop();
        let parent_path = active.clone();
        self.resolve_node(node, parent_path, &mut active)
    }

    fn resolve_node<'a>(
        &'a self,
        node: &'a LayerNode,
        mut path: Vec<Uid>,
        active: &mut Vec<Uid>,
    ) -> EaselResult<ResolvedNode<'a>> {
        let element = self.element(&node.uid).ok_or_else(|| {
            EaselError::invariant(format!("node '{}' has no visual element", node.uid))
        })?;
        path.push(node.uid.clone());
        active.push(node.uid.clone());

        let mut children = Vec::with_capacity(node.children.len());
        if let VisualKind::Reference { target } = &element.kind {
            if active.contains(target) {
                return Err(EaselError::validation(format!(
                    "reference '{}' forms a cycle through '{target}'",
                    node.uid
                )));
            }
            let target_node = self.root.find(target).ok_or_else(|| {
                EaselError::validation(format!(
                    "reference '{}' points at unknown node '{target}'",
                    node.uid
                ))
            })?;
            children.push(self.resolve_node(target_node, path.clone(), active)?);
        }
        for c in &node.children {
            children.push(self.resolve_node(c, path.clone(), active)?);
        }

        active.pop();
        Ok(ResolvedNode {
            uid: node.uid.clone(),
            element,
            path,
            children,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/document/tree.rs"]
mod tests;
