use std::collections::HashMap;

use crate::compile::task::{RenderTarget, RenderTask};
use crate::document::element::{CompositeOp, FilterKind, VisualKind};
use crate::document::tree::ResolvedNode;
use crate::foundation::core::{Affine, Bitmap, LayerTransform, Uid, Viewport};

/// Read-only view of the bitmap cache used to decide whether a group can be short-circuited.
///
/// Must agree with the pipeline's own validity test: same uid and same requested size.
pub trait CacheProbe {
    fn is_valid(&self, uid: &Uid, width: u32, height: u32) -> bool;
}

/// Probe that never hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl CacheProbe for NoCache {
    fn is_valid(&self, _uid: &Uid, _width: u32, _height: u32) -> bool {
        false
    }
}

impl<F> CacheProbe for F
where
    F: Fn(&Uid, u32, u32) -> bool,
{
    fn is_valid(&self, uid: &Uid, width: u32, height: u32) -> bool {
        self(uid, width, height)
    }
}

/// Per-pass substitutions, typically from an interactive preview.
#[derive(Debug, Clone, Default)]
pub struct RenderOverrides {
    /// Replacement pixels for group/canvas nodes.
    pub bitmaps: HashMap<Uid, Bitmap>,
    /// Replacement local transforms (e.g. while dragging a layer).
    pub transforms: HashMap<Uid, LayerTransform>,
}

impl RenderOverrides {
    pub fn none() -> Self {
        Self::default()
    }

    /// A pass is authoritative when nothing is being previewed at a different position, so
    /// rasterizations it produces may be written into caches.
    pub fn is_authoritative(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Any override on the node's ancestry or inside its subtree.
    fn touches(&self, node: &ResolvedNode<'_>) -> bool {
        self.transforms
            .keys()
            .chain(self.bitmaps.keys())
            .any(|k| node.path.contains(k) || node.find(k).is_some())
    }
}

/// Compile a resolved tree into an ordered task list. The first task always clears `PreDest`.
#[tracing::instrument(skip(root, overrides, cache), fields(root = %root.uid))]
pub fn schedule(
    root: &ResolvedNode<'_>,
    viewport: Viewport,
    overrides: &RenderOverrides,
    cache: &impl CacheProbe,
) -> Vec<RenderTask> {
    let mut s = Scheduler {
        viewport,
        overrides,
        cache,
        tasks: Vec::new(),
        next_dynamic: 0,
    };
    s.tasks.push(RenderTask::ClearTarget {
        target: RenderTarget::PreDest,
    });
    s.visit(
        RenderTarget::PreDest,
        root,
        viewport.transform,
        Inherited {
            visible: true,
            alpha: 1.0,
            in_reference: false,
        },
    );
    tracing::debug!(tasks = s.tasks.len(), dynamic = s.next_dynamic, "scheduled");
    s.tasks
}

#[derive(Debug, Clone, Copy)]
struct Inherited {
    visible: bool,
    /// Opacity of direct-output ancestors, folded into every draw of this subtree.
    alpha: f32,
    in_reference: bool,
}

struct Scheduler<'a, C> {
    viewport: Viewport,
    overrides: &'a RenderOverrides,
    cache: &'a C,
    tasks: Vec<RenderTask>,
    next_dynamic: u32,
}

impl<C: CacheProbe> Scheduler<'_, C> {
    fn mint(&mut self) -> RenderTarget {
        let t = RenderTarget::Dynamic(self.next_dynamic);
        self.next_dynamic += 1;
        t
    }

    fn visit(
        &mut self,
        target: RenderTarget,
        node: &ResolvedNode<'_>,
        parent_transform: Affine,
        inherited: Inherited,
    ) {
        let el = node.element;
        if !inherited.visible || !el.contributes() {
            return;
        }

        let local = self
            .overrides
            .transforms
            .get(&node.uid)
            .map_or_else(|| el.local_affine(), |t| t.to_affine());
        let transform = parent_transform * local;
        let node_alpha = inherited.alpha * el.effective_opacity();

        let override_bitmap = matches!(el.kind, VisualKind::Group | VisualKind::Canvas(_))
            && self.overrides.bitmaps.contains_key(&node.uid);

        if el.kind.is_container()
            && !override_bitmap
            && !node.children.iter().any(|c| c.element.contributes())
        {
            return;
        }

        let cacheable = matches!(el.kind, VisualKind::Group)
            && !inherited.in_reference
            && !self.overrides.touches(node);
        if cacheable
            && !override_bitmap
            && self
                .cache
                .is_valid(&node.uid, self.viewport.width, self.viewport.height)
        {
            self.tasks.push(RenderTask::DrawCachedBitmap {
                uid: node.uid.clone(),
                target,
                composite: el.composite_op(),
                opacity: node_alpha,
            });
            return;
        }

        if matches!(el.kind, VisualKind::Filter) {
            self.emit_layer_filters(target, node, node_alpha);
            return;
        }

        let direct = el.can_direct_output() && !hosts_adjustment_layer(node);
        let out = if direct {
            target
        } else {
            let t = self.mint();
            self.tasks.push(RenderTask::ClearTarget { target: t });
            t
        };
        // Draws into a private buffer are plain; the node's own op/alpha is applied on composite.
        let (draw_op, draw_alpha) = if direct {
            (el.composite_op(), node_alpha)
        } else {
            (CompositeOp::NORMAL, 1.0)
        };

        if override_bitmap {
            self.tasks.push(RenderTask::DrawOverrideBitmap {
                uid: node.uid.clone(),
                target: out,
                transform,
                composite: draw_op,
                opacity: draw_alpha,
            });
        } else {
            match &el.kind {
                VisualKind::Group | VisualKind::Reference { .. } => {
                    let child = Inherited {
                        visible: true,
                        alpha: draw_alpha,
                        in_reference: inherited.in_reference
                            || matches!(el.kind, VisualKind::Reference { .. }),
                    };
                    for c in &node.children {
                        self.visit(out, c, transform, child);
                    }
                }
                VisualKind::Canvas(_) | VisualKind::Text(_) => {
                    self.tasks.push(RenderTask::DrawVisuToDest {
                        uid: node.uid.clone(),
                        target: out,
                        transform,
                        composite: draw_op,
                        opacity: draw_alpha,
                    });
                }
                VisualKind::VectorObject { .. } | VisualKind::Filter => {}
            }
        }

        self.emit_filters(out, node, transform, draw_op, draw_alpha);

        if !direct {
            let cache_as = (cacheable && !override_bitmap).then(|| node.uid.clone());
            self.tasks.push(RenderTask::DrawSourceToDest {
                source: out,
                target,
                composite: el.composite_op(),
                opacity: node_alpha,
                cache_as,
            });
            self.tasks.push(RenderTask::FreeTarget { target: out });
        }
    }

    fn emit_filters(
        &mut self,
        out: RenderTarget,
        node: &ResolvedNode<'_>,
        transform: Affine,
        composite: CompositeOp,
        opacity: f32,
    ) {
        let el = node.element;
        if el.has_postprocess() {
            self.tasks.push(RenderTask::ClearTarget {
                target: RenderTarget::SharedFilterBuf,
            });
        }
        let paints_path = el.kind.path().is_some();

        for f in el.filters.iter().filter(|f| f.enabled) {
            match &f.kind {
                FilterKind::Fill { .. } | FilterKind::Stroke(_) => {
                    if paints_path {
                        self.tasks.push(RenderTask::ApplyInternalObjectFilter {
                            uid: node.uid.clone(),
                            filter_uid: f.uid.clone(),
                            target: out,
                            transform,
                            composite,
                            opacity,
                        });
                    }
                }
                FilterKind::Postprocess(_) => {
                    let Some(p) = f.as_active_postprocess() else {
                        continue;
                    };
                    self.tasks.push(RenderTask::ApplyPostprocessFilter {
                        uid: node.uid.clone(),
                        filter_uid: f.uid.clone(),
                        source: out,
                        target: RenderTarget::SharedFilterBuf,
                    });
                    self.tasks.push(RenderTask::ClearTarget { target: out });
                    self.tasks.push(RenderTask::DrawSourceToDest {
                        source: RenderTarget::SharedFilterBuf,
                        target: out,
                        composite: CompositeOp::NORMAL,
                        opacity: p.opacity.clamp(0.0, 1.0),
                        cache_as: None,
                    });
                    self.tasks.push(RenderTask::ClearTarget {
                        target: RenderTarget::SharedFilterBuf,
                    });
                }
            }
        }
    }

    /// Adjustment layer: filter everything the parent holds so far, then draw it back.
    fn emit_layer_filters(&mut self, parent: RenderTarget, node: &ResolvedNode<'_>, alpha: f32) {
        let active: Vec<_> = node
            .element
            .filters
            .iter()
            .filter_map(|f| f.as_active_postprocess().map(|p| (f, p)))
            .collect();
        if active.is_empty() {
            return;
        }
        self.tasks.push(RenderTask::ClearTarget {
            target: RenderTarget::LayerPreFilter,
        });
        for (f, p) in active {
            let opacity = alpha * p.opacity.clamp(0.0, 1.0);
            self.tasks.push(RenderTask::ApplyLayerFilter {
                uid: node.uid.clone(),
                filter_uid: f.uid.clone(),
                source: parent,
                target: RenderTarget::LayerPreFilter,
            });
            if opacity >= 1.0 {
                self.tasks.push(RenderTask::ClearTarget { target: parent });
            }
            self.tasks.push(RenderTask::DrawSourceToDest {
                source: RenderTarget::LayerPreFilter,
                target: parent,
                composite: CompositeOp::NORMAL,
                opacity,
                cache_as: None,
            });
            self.tasks.push(RenderTask::ClearTarget {
                target: RenderTarget::LayerPreFilter,
            });
        }
    }
}

/// Adjustment layers filter their parent's buffer, so a non-root container holding one needs a
/// buffer of its own.
fn hosts_adjustment_layer(node: &ResolvedNode<'_>) -> bool {
    !node.uid.is_root()
        && node
            .children
            .iter()
            .any(|c| matches!(c.element.kind, VisualKind::Filter) && c.element.contributes())
}

#[cfg(test)]
#[path = "../../tests/unit/compile/scheduler.rs"]
mod tests;
