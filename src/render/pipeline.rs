use std::collections::{HashMap, HashSet};

use kurbo::Shape;

use crate::assets::decode::decode_image;
use crate::compile::scheduler::{RenderOverrides, schedule};
use crate::compile::task::{RenderTarget, RenderTask};
use crate::document::element::{
    CanvasSource, CompositeOp, FillStyle, FilterKind, LayerFilter, VisualElement, VisualKind,
};
use crate::document::metrics::{LayerMetrics, union_container_boxes};
use crate::document::tree::{Document, ResolvedNode};
use crate::foundation::core::{Affine, Bitmap, Point, Rect, Rgba8Premul, Uid, Viewport};
use crate::foundation::error::{EaselError, EaselResult};
use crate::render::backend::{
    BrushBackend, DrawParams, DrawingBackend, FilterBackend, RasterSurface, SurfaceOptions,
};
use crate::render::cache::BitmapCache;
use crate::render::surface_pool::{SurfaceAllocator, SurfaceLease};
use crate::sync::cancel::CancelToken;

/// Everything a pass draws through. A renderer locks it as one unit.
pub struct RenderState<B: DrawingBackend, R, F> {
    pub drawing: B,
    pub brush: R,
    pub filters: F,
    pub allocator: SurfaceAllocator<B::Surface>,
}

impl<B: DrawingBackend, R, F> std::fmt::Debug for RenderState<B, R, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderState")
            .field("allocator", &self.allocator.stats())
            .finish_non_exhaustive()
    }
}

/// Per-pass inputs.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub viewport: Viewport,
    pub overrides: RenderOverrides,
    pub cancel: CancelToken,
    /// Painted under the final composite when set.
    pub background: Option<Rgba8Premul>,
}

impl ExecuteOptions {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            overrides: RenderOverrides::none(),
            cancel: CancelToken::new(),
            background: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub tasks_executed: u64,
    pub draws: u64,
    pub surfaces_borrowed: u64,
    pub cache_hits: u64,
    pub cache_writes: u64,
    /// Tasks skipped because their brush/filter plugin is not registered.
    pub skipped_plugins: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteOutput {
    /// Viewport-space bounds of every node drawn (or reused from cache) this pass.
    pub bounding_boxes: HashMap<Uid, Rect>,
    pub stats: PipelineStats,
}

/// Render state that belongs to one document and survives across passes.
#[derive(Debug)]
pub struct DocumentContext<S> {
    pub cache: BitmapCache<S>,
    pub metrics: LayerMetrics,
    decoded: HashMap<Uid, Bitmap>,
    view_transform: Option<Affine>,
}

impl<S: RasterSurface> Default for DocumentContext<S> {
    fn default() -> Self {
        Self {
            cache: BitmapCache::new(),
            metrics: LayerMetrics::new(),
            decoded: HashMap::new(),
            view_transform: None,
        }
    }
}

impl<S: RasterSurface> DocumentContext<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the document's pending invalidations into the caches. Returns how many uids went
    /// stale.
    pub fn sync(&mut self, doc: &mut Document) -> usize {
        let stale = doc.take_invalidations();
        for uid in &stale {
            self.invalidate(uid);
        }
        stale.len()
    }

    pub fn invalidate(&mut self, uid: &Uid) {
        self.cache.invalidate(uid);
        self.decoded.remove(uid);
    }

    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
        self.decoded.clear();
    }

    pub fn dispose(&mut self) {
        self.cache.dispose();
        self.decoded.clear();
        self.metrics.clear();
        self.view_transform = None;
    }

    /// Group caches are rendered in viewport space; a new view transform makes them all stale.
    fn begin_pass(&mut self, viewport: Viewport) {
        if self.view_transform == Some(viewport.transform) {
            return;
        }
        if !self.cache.is_empty() {
            tracing::debug!(entries = self.cache.len(), "view transform changed, cache dropped");
        }
        self.cache.invalidate_all();
        self.view_transform = Some(viewport.transform);
    }
}

/// Schedule `root` against the context's cache and run the result.
#[tracing::instrument(
    skip_all,
    fields(root = %root.uid, w = opts.viewport.width, h = opts.viewport.height)
)]
pub async fn execute<B, R, F>(
    state: &mut RenderState<B, R, F>,
    dest: &mut B::Surface,
    ctx: &mut DocumentContext<B::Surface>,
    root: &ResolvedNode<'_>,
    opts: &ExecuteOptions,
) -> EaselResult<ExecuteOutput>
where
    B: DrawingBackend,
    R: BrushBackend<B::Surface>,
    F: FilterBackend<B::Surface>,
{
    ctx.begin_pass(opts.viewport);
    let tasks = schedule(root, opts.viewport, &opts.overrides, &ctx.cache);
    execute_tasks(state, dest, ctx, root, &tasks, opts).await
}

/// Run an already scheduled task list. Every borrowed surface goes back to the allocator on
/// every exit path.
pub async fn execute_tasks<B, R, F>(
    state: &mut RenderState<B, R, F>,
    dest: &mut B::Surface,
    ctx: &mut DocumentContext<B::Surface>,
    root: &ResolvedNode<'_>,
    tasks: &[RenderTask],
    opts: &ExecuteOptions,
) -> EaselResult<ExecuteOutput>
where
    B: DrawingBackend,
    R: BrushBackend<B::Surface>,
    F: FilterBackend<B::Surface>,
{
    let RenderState {
        drawing,
        brush,
        filters,
        allocator,
    } = state;

    let mut elements = HashMap::new();
    root.walk(&mut |n| {
        elements.insert(n.uid.clone(), n.element);
    });

    let mut run = Run {
        drawing,
        brush,
        filters,
        arena: TargetArena::new(allocator, opts.viewport),
        ctx,
        opts,
        root,
        elements,
        sources: HashMap::new(),
        boxes: HashMap::new(),
        stats: PipelineStats::default(),
    };

    for task in tasks {
        opts.cancel.check()?;
        run.step(task).await?;
        run.stats.tasks_executed += 1;
    }
    opts.cancel.check()?;
    run.present(dest)?;
    Ok(run.finish())
}

/// Lazily resolved surfaces behind render target tokens. Dropping the arena returns every
/// outstanding lease.
struct TargetArena<'p, S: RasterSurface> {
    allocator: &'p mut SurfaceAllocator<S>,
    leases: HashMap<RenderTarget, SurfaceLease<S>>,
    freed: HashSet<RenderTarget>,
    width: u32,
    height: u32,
    options: SurfaceOptions,
    borrowed: u64,
}

impl<'p, S: RasterSurface> TargetArena<'p, S> {
    fn new(allocator: &'p mut SurfaceAllocator<S>, viewport: Viewport) -> Self {
        Self {
            allocator,
            leases: HashMap::new(),
            freed: HashSet::new(),
            width: viewport.width,
            height: viewport.height,
            options: SurfaceOptions::default(),
            borrowed: 0,
        }
    }

    fn check_live(&self, t: RenderTarget) -> EaselResult<()> {
        if self.freed.contains(&t) {
            return Err(EaselError::invariant(format!(
                "{} used after FREE_TARGET",
                t.label()
            )));
        }
        Ok(())
    }

    /// Surface for `t`, borrowed at viewport size on first use.
    fn resolve<B>(&mut self, backend: &mut B, t: RenderTarget) -> EaselResult<&mut S>
    where
        B: DrawingBackend<Surface = S>,
    {
        let (w, h) = (self.width, self.height);
        self.resolve_sized(backend, t, w, h)
    }

    fn resolve_sized<B>(
        &mut self,
        backend: &mut B,
        t: RenderTarget,
        width: u32,
        height: u32,
    ) -> EaselResult<&mut S>
    where
        B: DrawingBackend<Surface = S>,
    {
        self.check_live(t)?;
        let wrong_size = self.leases.get(&t).is_some_and(|l| {
            l.surface().width() != width || l.surface().height() != height
        });
        if wrong_size && let Some(old) = self.leases.remove(&t) {
            self.allocator.release(old);
        }
        if !self.leases.contains_key(&t) {
            let lease = self
                .allocator
                .borrow(width, height, &self.options, |w, h, o| {
                    backend.create_surface(w, h, o)
                })?;
            tracing::trace!(target = %t.label(), entry = lease.entry_id(), "target resolved");
            self.borrowed += 1;
            self.leases.insert(t, lease);
        }
        self.leases
            .get_mut(&t)
            .map(SurfaceLease::surface_mut)
            .ok_or_else(|| EaselError::invariant(format!("{} failed to resolve", t.label())))
    }

    /// Surface for a token that must already hold content.
    fn get(&self, t: RenderTarget) -> EaselResult<&S> {
        self.check_live(t)?;
        self.leases
            .get(&t)
            .map(SurfaceLease::surface)
            .ok_or_else(|| EaselError::invariant(format!("{} read before it was written", t.label())))
    }

    /// Move a target's lease out so a second token can be read alongside it. Hand it back with
    /// [`TargetArena::put`].
    fn take<B>(&mut self, backend: &mut B, t: RenderTarget) -> EaselResult<SurfaceLease<S>>
    where
        B: DrawingBackend<Surface = S>,
    {
        self.resolve(backend, t)?;
        self.leases
            .remove(&t)
            .ok_or_else(|| EaselError::invariant(format!("{} vanished", t.label())))
    }

    fn put(&mut self, t: RenderTarget, lease: SurfaceLease<S>) {
        self.leases.insert(t, lease);
    }

    fn free(&mut self, t: RenderTarget) {
        if let Some(lease) = self.leases.remove(&t) {
            self.allocator.release(lease);
        }
        self.freed.insert(t);
    }
}

impl<S: RasterSurface> Drop for TargetArena<'_, S> {
    fn drop(&mut self) {
        for (_, lease) in self.leases.drain() {
            self.allocator.release(lease);
        }
    }
}

/// Resolved pixels for a canvas/text node, memoized per pass.
enum VisuSource {
    Bitmap { bitmap: Bitmap, placement: Affine },
    /// Lives in the bitmap cache under the node's uid.
    Cached { placement: Affine },
    Empty,
}

struct Run<'r, 'a, B: DrawingBackend, R, F> {
    drawing: &'r mut B,
    brush: &'r mut R,
    filters: &'r mut F,
    arena: TargetArena<'r, B::Surface>,
    ctx: &'r mut DocumentContext<B::Surface>,
    opts: &'r ExecuteOptions,
    root: &'r ResolvedNode<'a>,
    elements: HashMap<Uid, &'a VisualElement>,
    sources: HashMap<Uid, VisuSource>,
    boxes: HashMap<Uid, Rect>,
    stats: PipelineStats,
}

impl<'a, B, R, F> Run<'_, 'a, B, R, F>
where
    B: DrawingBackend,
    R: BrushBackend<B::Surface>,
    F: FilterBackend<B::Surface>,
{
    fn element(&self, uid: &Uid) -> EaselResult<&'a VisualElement> {
        self.elements
            .get(uid)
            .copied()
            .ok_or_else(|| EaselError::invariant(format!("task references unknown node '{uid}'")))
    }

    fn record_box(&mut self, uid: &Uid, rect: Rect) {
        self.boxes
            .entry(uid.clone())
            .and_modify(|r| *r = r.union(rect))
            .or_insert(rect);
    }

    async fn step(&mut self, task: &RenderTask) -> EaselResult<()> {
        match task {
            RenderTask::ClearTarget { target } => {
                self.arena.resolve(&mut *self.drawing, *target)?.clear();
            }
            RenderTask::DrawSourceToDest {
                source,
                target,
                composite,
                opacity,
                cache_as,
            } => {
                if let Some(uid) = cache_as
                    && self.opts.overrides.is_authoritative()
                {
                    self.write_group_cache(uid, *source)?;
                }
                let params = DrawParams::new(*composite, *opacity, Affine::IDENTITY);
                let mut dst = self.arena.take(&mut *self.drawing, *target)?;
                let res = self
                    .arena
                    .get(*source)
                    .and_then(|src| self.drawing.draw_surface(dst.surface_mut(), src, params));
                self.arena.put(*target, dst);
                res?;
                self.stats.draws += 1;
            }
            RenderTask::DrawVisuToDest {
                uid,
                target,
                transform,
                composite,
                opacity,
            } => {
                self.draw_visu(uid, *target, *transform, *composite, *opacity)?;
            }
            RenderTask::DrawCachedBitmap {
                uid,
                target,
                composite,
                opacity,
            } => {
                let dst = self.arena.resolve(&mut *self.drawing, *target)?;
                let entry = self.ctx.cache.get(uid).ok_or_else(|| {
                    EaselError::invariant(format!("cached bitmap for '{uid}' is gone"))
                })?;
                let params = DrawParams::new(
                    *composite,
                    *opacity,
                    Affine::translate(entry.origin.to_vec2()),
                );
                self.drawing.draw_surface(dst, &entry.surface, params)?;
                self.stats.draws += 1;
                self.stats.cache_hits += 1;
                self.reuse_boxes(uid);
            }
            RenderTask::DrawOverrideBitmap {
                uid,
                target,
                transform,
                composite,
                opacity,
            } => {
                let bitmap = self.opts.overrides.bitmaps.get(uid).ok_or_else(|| {
                    EaselError::invariant(format!("no override bitmap for '{uid}'"))
                })?;
                let dst = self.arena.resolve(&mut *self.drawing, *target)?;
                self.drawing.draw_bitmap(
                    dst,
                    bitmap,
                    DrawParams::new(*composite, *opacity, *transform),
                )?;
                self.stats.draws += 1;
                let rect = transform.transform_rect_bbox(bitmap.rect());
                self.record_box(uid, rect);
            }
            RenderTask::ApplyInternalObjectFilter {
                uid,
                filter_uid,
                target,
                transform,
                composite,
                opacity,
            } => {
                let params = DrawParams::new(*composite, *opacity, *transform);
                self.apply_internal(uid, filter_uid, *target, params)?;
            }
            RenderTask::ApplyPostprocessFilter {
                uid,
                filter_uid,
                source,
                target,
            } => {
                self.apply_raster(uid, filter_uid, *source, *target, false)
                    .await?;
            }
            RenderTask::ApplyLayerFilter {
                uid,
                filter_uid,
                source,
                target,
            } => {
                self.apply_raster(uid, filter_uid, *source, *target, true)
                    .await?;
            }
            RenderTask::FreeTarget { target } => self.arena.free(*target),
        }
        Ok(())
    }

    fn write_group_cache(&mut self, uid: &Uid, source: RenderTarget) -> EaselResult<()> {
        let src = self.arena.get(source)?;
        let options = SurfaceOptions {
            will_read_frequently: true,
            ..SurfaceOptions::default()
        };
        let mut copy = self
            .drawing
            .create_surface(src.width(), src.height(), &options)?;
        self.drawing
            .draw_surface(&mut copy, src, DrawParams::default())?;
        self.ctx.cache.store(uid.clone(), Point::ORIGIN, copy);
        self.stats.cache_writes += 1;
        Ok(())
    }

    /// Keep last pass's boxes for a subtree drawn from cache.
    fn reuse_boxes(&mut self, uid: &Uid) {
        let Some(node) = self.root.find(uid) else {
            return;
        };
        let mut uids = node.descendant_uids();
        uids.push(uid.clone());
        for u in uids {
            if let Some(r) = self.ctx.metrics.bounding_box(&u) {
                self.record_box(&u, r);
            }
        }
    }

    fn draw_visu(
        &mut self,
        uid: &Uid,
        target: RenderTarget,
        transform: Affine,
        composite: CompositeOp,
        opacity: f32,
    ) -> EaselResult<()> {
        if !self.sources.contains_key(uid) {
            let source = self.resolve_source(uid)?;
            self.sources.insert(uid.clone(), source);
        }
        let (local_rect, placement) = match self.sources.get(uid) {
            Some(VisuSource::Bitmap { bitmap, placement }) => (bitmap.rect(), *placement),
            Some(VisuSource::Cached { placement }) => {
                let entry = self.ctx.cache.get(uid).ok_or_else(|| {
                    EaselError::invariant(format!("source cache for '{uid}' is gone"))
                })?;
                (
                    Rect::new(0.0, 0.0, f64::from(entry.width), f64::from(entry.height)),
                    *placement,
                )
            }
            Some(VisuSource::Empty) | None => return Ok(()),
        };
        let full = transform * placement;
        let params = DrawParams::new(composite, opacity, full);

        let dst = self.arena.resolve(&mut *self.drawing, target)?;
        match self.sources.get(uid) {
            Some(VisuSource::Bitmap { bitmap, .. }) => {
                self.drawing.draw_bitmap(dst, bitmap, params)?;
            }
            Some(VisuSource::Cached { .. }) => {
                if let Some(entry) = self.ctx.cache.get(uid) {
                    self.drawing.draw_surface(dst, &entry.surface, params)?;
                }
            }
            Some(VisuSource::Empty) | None => {}
        }
        self.stats.draws += 1;
        self.record_box(uid, full.transform_rect_bbox(local_rect));
        Ok(())
    }

    fn resolve_source(&mut self, uid: &Uid) -> EaselResult<VisuSource> {
        let el = self.element(uid)?;
        match &el.kind {
            VisualKind::Canvas(canvas) => {
                let bitmap = match &canvas.source {
                    CanvasSource::Pixels(b) => b.clone(),
                    CanvasSource::Encoded(bytes) => match self.ctx.decoded.get(uid) {
                        Some(b) => b.clone(),
                        None => {
                            let b = decode_image(bytes)?;
                            tracing::debug!(%uid, w = b.width, h = b.height, "canvas decoded");
                            self.ctx.decoded.insert(uid.clone(), b.clone());
                            self.opts.cancel.check()?;
                            b
                        }
                    },
                };
                if bitmap.width == 0 || bitmap.height == 0 {
                    return Ok(VisuSource::Empty);
                }
                // Stretch to the canvas' declared size.
                let placement = Affine::scale_non_uniform(
                    f64::from(canvas.width) / f64::from(bitmap.width),
                    f64::from(canvas.height) / f64::from(bitmap.height),
                );
                Ok(VisuSource::Bitmap { bitmap, placement })
            }
            VisualKind::Text(text) => {
                let bbox = text.outline.bounding_box();
                if !(bbox.area() > 0.0) {
                    return Ok(VisuSource::Empty);
                }
                let origin = Point::new(bbox.x0.floor(), bbox.y0.floor());
                let w = (bbox.x1.ceil() - origin.x).max(1.0) as u32;
                let h = (bbox.y1.ceil() - origin.y).max(1.0) as u32;
                let placement = Affine::translate(origin.to_vec2());
                if self.ctx.cache.lookup(uid, w, h).is_some() {
                    self.stats.cache_hits += 1;
                    return Ok(VisuSource::Cached { placement });
                }
                self.opts.cancel.check()?;

                let fill = FillStyle::Solid { color: text.color };
                let local = DrawParams::new(
                    CompositeOp::NORMAL,
                    1.0,
                    Affine::translate(-origin.to_vec2()),
                );
                if self.opts.overrides.is_authoritative() {
                    let mut surface =
                        self.drawing
                            .create_surface(w, h, &SurfaceOptions::default())?;
                    self.drawing
                        .fill_path(&mut surface, &text.outline, &fill, local)?;
                    self.ctx.cache.store(uid.clone(), origin, surface);
                    self.stats.cache_writes += 1;
                    Ok(VisuSource::Cached { placement })
                } else {
                    let scratch = self.arena.resolve_sized(
                        &mut *self.drawing,
                        RenderTarget::VectorPreFilter,
                        w,
                        h,
                    )?;
                    scratch.clear();
                    self.drawing.fill_path(scratch, &text.outline, &fill, local)?;
                    let bitmap = self.drawing.snapshot(scratch)?;
                    Ok(VisuSource::Bitmap { bitmap, placement })
                }
            }
            other => Err(EaselError::invariant(format!(
                "DRAW_VISU_TO_DEST scheduled for a {} node '{uid}'",
                other.name()
            ))),
        }
    }

    fn filter<'e>(el: &'e VisualElement, filter_uid: &Uid) -> EaselResult<&'e LayerFilter> {
        el.filters
            .iter()
            .find(|f| &f.uid == filter_uid)
            .ok_or_else(|| {
                EaselError::invariant(format!("node '{}' has no filter '{filter_uid}'", el.uid))
            })
    }

    fn apply_internal(
        &mut self,
        uid: &Uid,
        filter_uid: &Uid,
        target: RenderTarget,
        params: DrawParams,
    ) -> EaselResult<()> {
        let el = self.element(uid)?;
        let filter = Self::filter(el, filter_uid)?;
        let path = el.kind.path().ok_or_else(|| {
            EaselError::invariant(format!("internal filter on pathless node '{uid}'"))
        })?;
        let bounds = path.bounding_box();

        let dst = self.arena.resolve(&mut *self.drawing, target)?;
        let local = match &filter.kind {
            FilterKind::Fill { fill } => {
                self.drawing.fill_path(dst, path, fill, params)?;
                bounds
            }
            FilterKind::Stroke(stroke) => match self.brush.stroke_path(dst, path, stroke, params) {
                Ok(()) => bounds.inflate(stroke.width / 2.0, stroke.width / 2.0),
                Err(e) if e.is_missing_plugin() => {
                    tracing::warn!(%uid, filter = %filter_uid, error = %e, "stroke skipped");
                    self.stats.skipped_plugins += 1;
                    return Ok(());
                }
                Err(e) => return Err(e),
            },
            FilterKind::Postprocess(_) => {
                return Err(EaselError::invariant(format!(
                    "postprocess filter '{filter_uid}' scheduled as internal"
                )));
            }
        };
        self.stats.draws += 1;
        self.record_box(uid, params.transform.transform_rect_bbox(local));
        Ok(())
    }

    /// Snapshot `source`, run the filter plugin into `target`. A missing plugin leaves `target`
    /// as it was, except for adjustment layers, which pass their input through.
    async fn apply_raster(
        &mut self,
        uid: &Uid,
        filter_uid: &Uid,
        source: RenderTarget,
        target: RenderTarget,
        pass_through: bool,
    ) -> EaselResult<()> {
        let el = self.element(uid)?;
        let filter = Self::filter(el, filter_uid)?;
        let FilterKind::Postprocess(pp) = &filter.kind else {
            return Err(EaselError::invariant(format!(
                "filter '{filter_uid}' on '{uid}' is not a raster filter"
            )));
        };

        let input = self.drawing.snapshot(self.arena.get(source)?)?;
        let viewport = self.opts.viewport;
        let dst = self.arena.resolve(&mut *self.drawing, target)?;
        match self
            .filters
            .apply_raster_filter(&pp.filter_id, &input, dst, &pp.settings, viewport)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_missing_plugin() => {
                tracing::warn!(%uid, filter = %pp.filter_id, error = %e, "raster filter skipped");
                self.stats.skipped_plugins += 1;
                if pass_through {
                    self.drawing.draw_bitmap(dst, &input, DrawParams::default())?;
                }
            }
            Err(e) => return Err(e),
        }
        self.opts.cancel.check()
    }

    /// Copy `PreDest` (over the optional background) into the caller's destination.
    fn present(&mut self, dest: &mut B::Surface) -> EaselResult<()> {
        dest.clear();
        if let Some(bg) = self.opts.background {
            let fill = Bitmap::solid(dest.width(), dest.height(), bg);
            self.drawing
                .draw_bitmap(dest, &fill, DrawParams::default())?;
        }
        let pre = self.arena.get(RenderTarget::PreDest)?;
        self.drawing
            .draw_surface(dest, pre, DrawParams::default())?;
        Ok(())
    }

    fn finish(mut self) -> ExecuteOutput {
        union_container_boxes(self.root, &mut self.boxes);
        self.boxes.remove(&Uid::root());
        self.ctx.metrics.rebuild(self.root, self.boxes.clone());
        self.stats.surfaces_borrowed = self.arena.borrowed;
        ExecuteOutput {
            bounding_boxes: std::mem::take(&mut self.boxes),
            stats: self.stats,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/pipeline.rs"]
mod tests;
