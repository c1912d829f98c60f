use crate::document::tree::{Document, ResolvedNode};
use crate::foundation::core::{Bitmap, Rgba8Premul};
use crate::foundation::error::EaselResult;
use crate::render::backend::{BrushBackend, DrawingBackend, FilterBackend, SurfaceOptions};
use crate::render::cpu::CpuBackend;
use crate::render::cpu_filters::{CpuFilters, RoundBrush};
use crate::render::pipeline::{
    DocumentContext, ExecuteOptions, ExecuteOutput, RenderState, execute,
};
use crate::render::surface_pool::{SurfaceAllocator, SurfaceAllocatorOpts, SurfaceAllocatorStats};
use crate::sync::atomic_resource::{AtomicLease, AtomicResource};

/// Options controlling a [`Renderer`].
#[derive(Clone, Debug, Default)]
pub struct RendererOpts {
    pub allocator: SurfaceAllocatorOpts,
    /// Used for passes whose [`ExecuteOptions::background`] is unset.
    pub background: Option<Rgba8Premul>,
}

/// Backends plus their surface allocator behind one [`AtomicResource`].
///
/// A renderer holds nothing document-specific; per-document caches and metrics live in a
/// [`DocumentContext`] supplied with each pass. Concurrent passes on one renderer run one at a
/// time, in call order.
pub struct Renderer<B: DrawingBackend, R, F> {
    state: AtomicResource<RenderState<B, R, F>>,
    opts: RendererOpts,
}

impl<B: DrawingBackend, R, F> std::fmt::Debug for Renderer<B, R, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("state", &self.state)
            .field("opts", &self.opts)
            .finish()
    }
}

impl Renderer<CpuBackend, RoundBrush, CpuFilters> {
    /// Renderer over the built-in CPU backends.
    pub fn cpu(opts: RendererOpts) -> Self {
        Self::new(CpuBackend::new(), RoundBrush::new(), CpuFilters::new(), opts)
    }
}

impl<B, R, F> Renderer<B, R, F>
where
    B: DrawingBackend,
    R: BrushBackend<B::Surface>,
    F: FilterBackend<B::Surface>,
{
    pub fn new(drawing: B, brush: R, filters: F, opts: RendererOpts) -> Self {
        let allocator = SurfaceAllocator::new(opts.allocator);
        Self {
            state: AtomicResource::new(RenderState {
                drawing,
                brush,
                filters,
                allocator,
            }),
            opts,
        }
    }

    pub fn opts(&self) -> &RendererOpts {
        &self.opts
    }

    /// `true` while a pass (or other holder) has the render state.
    pub fn is_busy(&self) -> bool {
        self.state.is_held()
    }

    /// Schedule and execute one pass of `doc` into `dest`.
    ///
    /// Pending document edits are applied to `ctx` first. Idle pooled surfaces past their expiry
    /// are collected after the pass, whether it succeeded or not.
    #[tracing::instrument(
        skip_all,
        fields(w = opts.viewport.width, h = opts.viewport.height)
    )]
    pub async fn render(
        &self,
        doc: &mut Document,
        ctx: &mut DocumentContext<B::Surface>,
        dest: &mut B::Surface,
        opts: ExecuteOptions,
    ) -> EaselResult<ExecuteOutput> {
        let opts = self.with_defaults(opts);
        let invalidated = ctx.sync(doc);
        if invalidated > 0 {
            tracing::debug!(invalidated, "document edits applied");
        }
        let root = doc.resolve_root()?;

        let mut lease = self.state.acquire().await?;
        let out = execute(&mut *lease, dest, ctx, &root, &opts).await;
        self.finish(lease)?;
        out
    }

    /// Like [`Renderer::render`], into a fresh destination that is snapshotted afterwards.
    #[tracing::instrument(
        skip_all,
        fields(w = opts.viewport.width, h = opts.viewport.height)
    )]
    pub async fn render_bitmap(
        &self,
        doc: &mut Document,
        ctx: &mut DocumentContext<B::Surface>,
        opts: ExecuteOptions,
    ) -> EaselResult<(Bitmap, ExecuteOutput)> {
        let opts = self.with_defaults(opts);
        ctx.sync(doc);
        let root = doc.resolve_root()?;

        let mut lease = self.state.acquire().await?;
        let result = render_snapshot(&mut *lease, ctx, &root, &opts).await;
        self.finish(lease)?;
        result
    }

    /// Collect idle pooled surfaces; `force` drops every idle one regardless of age.
    pub async fn gc(&self, force: bool) -> EaselResult<usize> {
        let mut lease = self.state.acquire().await?;
        let reclaimed = lease.allocator.gc(force);
        self.state.release(lease)?;
        Ok(reclaimed)
    }

    pub async fn allocator_stats(&self) -> EaselResult<SurfaceAllocatorStats> {
        let lease = self.state.acquire().await?;
        let stats = lease.allocator.stats();
        self.state.release(lease)?;
        Ok(stats)
    }

    fn with_defaults(&self, mut opts: ExecuteOptions) -> ExecuteOptions {
        if opts.background.is_none() {
            opts.background = self.opts.background;
        }
        opts
    }

    fn finish(&self, mut lease: AtomicLease<RenderState<B, R, F>>) -> EaselResult<()> {
        let reclaimed = lease.allocator.gc(false);
        if reclaimed > 0 {
            tracing::debug!(reclaimed, "idle surfaces collected");
        }
        self.state.release(lease)
    }
}

async fn render_snapshot<B, R, F>(
    state: &mut RenderState<B, R, F>,
    ctx: &mut DocumentContext<B::Surface>,
    root: &ResolvedNode<'_>,
    opts: &ExecuteOptions,
) -> EaselResult<(Bitmap, ExecuteOutput)>
where
    B: DrawingBackend,
    R: BrushBackend<B::Surface>,
    F: FilterBackend<B::Surface>,
{
    let (w, h) = opts.viewport.size();
    let mut dest = state
        .drawing
        .create_surface(w, h, &SurfaceOptions::default())?;
    let out = execute(state, &mut dest, ctx, root, opts).await?;
    let bitmap = state.drawing.snapshot(&dest)?;
    Ok((bitmap, out))
}

#[cfg(test)]
#[path = "../../tests/unit/session/renderer.rs"]
mod tests;
