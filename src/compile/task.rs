use std::fmt::Write as _;

use crate::document::element::CompositeOp;
use crate::foundation::core::{Affine, Uid};

/// Opaque handle to "some surface", resolved by the pipeline on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderTarget {
    /// Final composite; copied into the caller's destination at the end of a run.
    PreDest,
    /// Output of adjustment-layer filters before it is drawn back into the parent.
    LayerPreFilter,
    /// Scratch buffer shared by every postprocess filter sandwich.
    SharedFilterBuf,
    /// Scratch used by the pipeline to rasterize text/vector sources in local space.
    VectorPreFilter,
    /// Private aggregation buffer of one non-direct node.
    Dynamic(u32),
}

impl RenderTarget {
    pub fn label(self) -> String {
        match self {
            Self::PreDest => "PRE_DEST".to_owned(),
            Self::LayerPreFilter => "LAYER_PRE_FILTER".to_owned(),
            Self::SharedFilterBuf => "SHARED_FILTER_BUF".to_owned(),
            Self::VectorPreFilter => "VECTOR_PRE_FILTER".to_owned(),
            Self::Dynamic(n) => format!("DYN{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderTask {
    ClearTarget {
        target: RenderTarget,
    },
    /// Composite one token into another. `cache_as` snapshots `source` into that group's cache
    /// before compositing.
    DrawSourceToDest {
        source: RenderTarget,
        target: RenderTarget,
        composite: CompositeOp,
        opacity: f32,
        cache_as: Option<Uid>,
    },
    /// Draw a canvas/text node's source under `transform`.
    DrawVisuToDest {
        uid: Uid,
        target: RenderTarget,
        transform: Affine,
        composite: CompositeOp,
        opacity: f32,
    },
    DrawCachedBitmap {
        uid: Uid,
        target: RenderTarget,
        composite: CompositeOp,
        opacity: f32,
    },
    DrawOverrideBitmap {
        uid: Uid,
        target: RenderTarget,
        transform: Affine,
        composite: CompositeOp,
        opacity: f32,
    },
    /// Fill or stroke of a vector/text node, painted straight into `target`.
    ApplyInternalObjectFilter {
        uid: Uid,
        filter_uid: Uid,
        target: RenderTarget,
        transform: Affine,
        composite: CompositeOp,
        opacity: f32,
    },
    ApplyPostprocessFilter {
        uid: Uid,
        filter_uid: Uid,
        source: RenderTarget,
        target: RenderTarget,
    },
    /// Adjustment layer filter over everything already in `source`.
    ApplyLayerFilter {
        uid: Uid,
        filter_uid: Uid,
        source: RenderTarget,
        target: RenderTarget,
    },
    FreeTarget {
        target: RenderTarget,
    },
}

impl RenderTask {
    /// Token written by this task.
    pub fn target(&self) -> RenderTarget {
        match self {
            Self::ClearTarget { target }
            | Self::DrawSourceToDest { target, .. }
            | Self::DrawVisuToDest { target, .. }
            | Self::DrawCachedBitmap { target, .. }
            | Self::DrawOverrideBitmap { target, .. }
            | Self::ApplyInternalObjectFilter { target, .. }
            | Self::ApplyPostprocessFilter { target, .. }
            | Self::ApplyLayerFilter { target, .. }
            | Self::FreeTarget { target } => *target,
        }
    }

    /// Tokens read by this task.
    pub fn sources(&self) -> Option<RenderTarget> {
        match self {
            Self::DrawSourceToDest { source, .. }
            | Self::ApplyPostprocessFilter { source, .. }
            | Self::ApplyLayerFilter { source, .. } => Some(*source),
            _ => None,
        }
    }

    /// Node this task draws on behalf of, if any.
    pub fn uid(&self) -> Option<&Uid> {
        match self {
            Self::DrawVisuToDest { uid, .. }
            | Self::DrawCachedBitmap { uid, .. }
            | Self::DrawOverrideBitmap { uid, .. }
            | Self::ApplyInternalObjectFilter { uid, .. }
            | Self::ApplyPostprocessFilter { uid, .. }
            | Self::ApplyLayerFilter { uid, .. } => Some(uid),
            Self::DrawSourceToDest { cache_as, .. } => cache_as.as_ref(),
            Self::ClearTarget { .. } | Self::FreeTarget { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ClearTarget { .. } => "CLEAR_TARGET",
            Self::DrawSourceToDest { .. } => "DRAW_SOURCE_TO_DEST",
            Self::DrawVisuToDest { .. } => "DRAW_VISU_TO_DEST",
            Self::DrawCachedBitmap { .. } => "DRAW_CACHED_BITMAP",
            Self::DrawOverrideBitmap { .. } => "DRAW_OVERRIDE_BITMAP",
            Self::ApplyInternalObjectFilter { .. } => "APPLY_INTERNAL_OBJECT_FILTER",
            Self::ApplyPostprocessFilter { .. } => "APPLY_POSTPROCESS_FILTER",
            Self::ApplyLayerFilter { .. } => "APPLY_LAYER_FILTER",
            Self::FreeTarget { .. } => "FREE_TARGET",
        }
    }
}

/// Deterministic one-line-per-task listing used by tests and the CLI.
pub fn dump(tasks: &[RenderTask]) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "tasks: {}", tasks.len());
    for (i, t) in tasks.iter().enumerate() {
        let _ = write!(s, "  T{i}: {}", t.name());
        if let Some(src) = t.sources() {
            let _ = write!(s, " {} ->", src.label());
        }
        let _ = write!(s, " {}", t.target().label());
        if let Some(uid) = t.uid() {
            let _ = write!(s, " uid={uid}");
        }
        match t {
            RenderTask::ApplyInternalObjectFilter { filter_uid, .. }
            | RenderTask::ApplyPostprocessFilter { filter_uid, .. }
            | RenderTask::ApplyLayerFilter { filter_uid, .. } => {
                let _ = write!(s, " filter={filter_uid}");
            }
            _ => {}
        }
        match t {
            RenderTask::DrawSourceToDest {
                composite, opacity, ..
            }
            | RenderTask::DrawVisuToDest {
                composite, opacity, ..
            }
            | RenderTask::DrawCachedBitmap {
                composite, opacity, ..
            }
            | RenderTask::DrawOverrideBitmap {
                composite, opacity, ..
            }
            | RenderTask::ApplyInternalObjectFilter {
                composite, opacity, ..
            } => {
                let _ = write!(s, " op={} alpha={opacity:.3}", composite.as_str());
            }
            _ => {}
        }
        s.push('\n');
    }
    s
}

#[cfg(test)]
#[path = "../../tests/unit/compile/task.rs"]
mod tests;
