//! Easel is a layered 2D painting engine.
//!
//! A [`Document`] is a tree of visual nodes: raster canvases, vector paths, groups, text,
//! adjustment layers and references. Rendering is split in two stages:
//!
//! - [`schedule`] compiles a resolved tree into a flat list of [`RenderTask`]s
//! - [`execute`] runs that list against pooled off-screen surfaces and writes one frame
//!
//! A [`Renderer`] bundles both behind an [`AtomicResource`] so concurrent passes on shared
//! backends are serialized.
#![forbid(unsafe_code)]

mod assets;
mod foundation;

/// Render task model and the scheduler producing it.
pub mod compile;
/// Layer tree, visual elements, metrics and JSON scene fixtures.
pub mod document;
/// Task execution over pooled surfaces and the reference CPU backend.
pub mod render;
/// Renderer sessions serializing passes over shared backends.
pub mod session;
/// Async coordination primitives.
pub mod sync;

pub use crate::foundation::core::{
    Affine, BezPath, Bitmap, ColorSpace, LayerTransform, Point, Rect, Rgba8Premul, Uid, Vec2,
    Viewport,
};
pub use crate::foundation::error::{EaselError, EaselResult};

pub use crate::assets::decode::{decode_image, to_rgba_image};
pub use crate::compile::scheduler::{CacheProbe, NoCache, RenderOverrides, schedule};
pub use crate::compile::task::{RenderTarget, RenderTask};
pub use crate::document::def::SceneDef;
pub use crate::document::element::{BlendMode, CompositeOp, LayerFilter, VisualElement, VisualKind};
pub use crate::document::metrics::LayerMetrics;
pub use crate::document::tree::{Document, ResolvedNode};
pub use crate::render::cpu::{CpuBackend, CpuSurface};
pub use crate::render::cpu_filters::{CpuFilters, RoundBrush};
pub use crate::render::pipeline::{
    DocumentContext, ExecuteOptions, ExecuteOutput, PipelineStats, RenderState, execute,
};
pub use crate::render::surface_pool::{SurfaceAllocator, SurfaceAllocatorOpts};
pub use crate::session::renderer::{Renderer, RendererOpts};
pub use crate::sync::atomic_resource::{AtomicLease, AtomicResource};
pub use crate::sync::cancel::CancelToken;
