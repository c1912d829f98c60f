use crate::document::element::{CompositeOp, FillStyle, StrokeStyle};
use crate::foundation::core::{Affine, BezPath, Bitmap, ColorSpace, Viewport};
use crate::foundation::error::EaselResult;

/// Options a surface was created with. Pool entries are only reused for identical options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SurfaceOptions {
    /// Hint that the surface will be snapshotted often (CPU-friendly storage).
    pub will_read_frequently: bool,
    pub color_space: ColorSpace,
}

/// Per-draw state: how to combine, how much, and where.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    pub composite: CompositeOp,
    /// Global alpha in `[0, 1]`.
    pub alpha: f32,
    pub transform: Affine,
}

impl Default for DrawParams {
    fn default() -> Self {
        Self {
            composite: CompositeOp::NORMAL,
            alpha: 1.0,
            transform: Affine::IDENTITY,
        }
    }
}

impl DrawParams {
    pub fn new(composite: CompositeOp, alpha: f32, transform: Affine) -> Self {
        Self {
            composite,
            alpha,
            transform,
        }
    }
}

/// Off-screen raster target owned by a drawing backend.
///
/// `save`/`restore` manage the surface's drawing-state stack. The allocator relies on
/// `save_depth` to unwind whatever a borrower left pushed.
pub trait RasterSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Clear to transparent.
    fn clear(&mut self);
    /// Resize in place; contents are cleared.
    fn resize(&mut self, width: u32, height: u32) -> EaselResult<()>;
    fn save(&mut self);
    fn restore(&mut self);
    fn save_depth(&self) -> usize;
}

/// Immediate-mode 2D raster API the pipeline draws through.
pub trait DrawingBackend {
    type Surface: RasterSurface;

    fn create_surface(
        &mut self,
        width: u32,
        height: u32,
        options: &SurfaceOptions,
    ) -> EaselResult<Self::Surface>;

    fn draw_surface(
        &mut self,
        target: &mut Self::Surface,
        source: &Self::Surface,
        params: DrawParams,
    ) -> EaselResult<()>;

    fn draw_bitmap(
        &mut self,
        target: &mut Self::Surface,
        source: &Bitmap,
        params: DrawParams,
    ) -> EaselResult<()>;

    fn fill_path(
        &mut self,
        target: &mut Self::Surface,
        path: &BezPath,
        fill: &FillStyle,
        params: DrawParams,
    ) -> EaselResult<()>;

    /// Copy the surface's pixels out as a premultiplied bitmap.
    fn snapshot(&mut self, source: &Self::Surface) -> EaselResult<Bitmap>;
}

/// Image-to-image filter plugins, looked up by id.
///
/// An unknown id must be reported as [`crate::EaselError::MissingPlugin`].
#[allow(async_fn_in_trait)]
pub trait FilterBackend<S> {
    async fn apply_raster_filter(
        &mut self,
        filter_id: &str,
        input: &Bitmap,
        output: &mut S,
        settings: &serde_json::Value,
        viewport: Viewport,
    ) -> EaselResult<()>;
}

/// Brush/ink plugins painting a stroke along a path.
///
/// An unknown brush id must be reported as [`crate::EaselError::MissingPlugin`].
pub trait BrushBackend<S> {
    fn stroke_path(
        &mut self,
        target: &mut S,
        path: &BezPath,
        stroke: &StrokeStyle,
        params: DrawParams,
    ) -> EaselResult<()>;
}
