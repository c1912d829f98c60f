use crate::document::element::{BlendMode, CompositeOp, FillStyle, GradientStop};
use crate::foundation::core::{Affine, BezPath, Bitmap, Point};
use crate::foundation::error::{EaselError, EaselResult};
use crate::foundation::math::{add_sat_u8, mul_div255_u8, opacity_to_u8};
use crate::render::backend::{DrawParams, DrawingBackend, RasterSurface, SurfaceOptions};

/// Premultiplied RGBA8 surface backed by a `vello_cpu` pixmap.
pub struct CpuSurface {
    pixmap: vello_cpu::Pixmap,
    options: SurfaceOptions,
    transform: Affine,
    states: Vec<Affine>,
}

impl std::fmt::Debug for CpuSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuSurface")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("save_depth", &self.states.len())
            .finish()
    }
}

impl CpuSurface {
    pub fn new(width: u32, height: u32, options: SurfaceOptions) -> EaselResult<Self> {
        let (w, h) = pixmap_dims(width, height)?;
        Ok(Self {
            pixmap: vello_cpu::Pixmap::new(w, h),
            options,
            transform: Affine::IDENTITY,
            states: Vec::new(),
        })
    }

    pub fn options(&self) -> SurfaceOptions {
        self.options
    }

    /// Surface-level transform, applied before every draw's own transform.
    pub fn transform(&self) -> Affine {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
    }

    pub fn data(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        self.pixmap.data_as_u8_slice_mut()
    }

    /// Overwrite the top-left region shared with `bytes` (a `width x height` premultiplied buffer).
    pub(crate) fn write_premul(&mut self, bytes: &[u8], width: u32, height: u32) {
        let (dw, dh) = (self.width(), self.height());
        let cols = width.min(dw) as usize * 4;
        let dst = self.pixmap.data_as_u8_slice_mut();
        dst.fill(0);
        for y in 0..height.min(dh) as usize {
            let s = y * width as usize * 4;
            let d = y * dw as usize * 4;
            dst[d..d + cols].copy_from_slice(&bytes[s..s + cols]);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some(sample_px(
            self.data(),
            self.width(),
            self.height(),
            x as i32,
            y as i32,
        ))
    }

    pub fn to_bitmap(&self) -> EaselResult<Bitmap> {
        Bitmap::new(self.width(), self.height(), self.data().to_vec())
    }
}

impl RasterSurface for CpuSurface {
    fn width(&self) -> u32 {
        u32::from(self.pixmap.width())
    }

    fn height(&self) -> u32 {
        u32::from(self.pixmap.height())
    }

    fn clear(&mut self) {
        self.pixmap.data_as_u8_slice_mut().fill(0);
    }

    fn resize(&mut self, width: u32, height: u32) -> EaselResult<()> {
        let (w, h) = pixmap_dims(width, height)?;
        if self.pixmap.width() == w && self.pixmap.height() == h {
            self.clear();
        } else {
            self.pixmap = vello_cpu::Pixmap::new(w, h);
        }
        Ok(())
    }

    fn save(&mut self) {
        self.states.push(self.transform);
    }

    fn restore(&mut self) {
        if let Some(t) = self.states.pop() {
            self.transform = t;
        }
    }

    fn save_depth(&self) -> usize {
        self.states.len()
    }
}

/// Reference software backend: `vello_cpu` for path coverage, hand-written kernels for
/// sampling and compositing.
#[derive(Default)]
pub struct CpuBackend {
    ctx: Option<vello_cpu::RenderContext>,
    coverage: Option<vello_cpu::Pixmap>,
}

impl std::fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuBackend").finish_non_exhaustive()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anti-aliased coverage of `path` under `transform`, in the alpha channel of a
    /// `width x height` white pixmap.
    fn rasterize_coverage(
        &mut self,
        width: u32,
        height: u32,
        path: &BezPath,
        transform: Affine,
    ) -> EaselResult<&vello_cpu::Pixmap> {
        let (w, h) = pixmap_dims(width, height)?;
        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == w && ctx.height() == h => ctx,
            _ => vello_cpu::RenderContext::new(w, h),
        };
        ctx.reset();
        ctx.set_transform(affine_to_cpu(transform));
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
        ctx.fill_path(&bezpath_to_cpu(path));
        ctx.flush();

        let coverage = match self.coverage.take() {
            Some(mut pm) if pm.width() == w && pm.height() == h => {
                pm.data_as_u8_slice_mut().fill(0);
                pm
            }
            _ => vello_cpu::Pixmap::new(w, h),
        };
        let coverage = self.coverage.insert(coverage);
        ctx.render_to_pixmap(coverage);
        self.ctx = Some(ctx);
        Ok(coverage)
    }
}

impl DrawingBackend for CpuBackend {
    type Surface = CpuSurface;

    fn create_surface(
        &mut self,
        width: u32,
        height: u32,
        options: &SurfaceOptions,
    ) -> EaselResult<CpuSurface> {
        CpuSurface::new(width, height, *options)
    }

    fn draw_surface(
        &mut self,
        target: &mut CpuSurface,
        source: &CpuSurface,
        params: DrawParams,
    ) -> EaselResult<()> {
        let transform = target.transform * params.transform;
        draw_pixels(
            target,
            source.data(),
            source.width(),
            source.height(),
            transform,
            params,
        )
    }

    fn draw_bitmap(
        &mut self,
        target: &mut CpuSurface,
        source: &Bitmap,
        params: DrawParams,
    ) -> EaselResult<()> {
        let transform = target.transform * params.transform;
        draw_pixels(
            target,
            &source.data,
            source.width,
            source.height,
            transform,
            params,
        )
    }

    fn fill_path(
        &mut self,
        target: &mut CpuSurface,
        path: &BezPath,
        fill: &FillStyle,
        params: DrawParams,
    ) -> EaselResult<()> {
        if opacity_to_u8(params.alpha) == 0 {
            return Ok(());
        }
        let transform = target.transform * params.transform;
        let (w, h) = (target.width(), target.height());
        let coverage = self.rasterize_coverage(w, h, path, transform)?;
        let layer = shade_coverage(coverage.data_as_u8_slice(), w, fill, transform);
        composite_rgba8_premul(target.data_mut(), &layer, params.composite, params.alpha)
    }

    fn snapshot(&mut self, source: &CpuSurface) -> EaselResult<Bitmap> {
        source.to_bitmap()
    }
}

fn pixmap_dims(width: u32, height: u32) -> EaselResult<(u16, u16)> {
    let w: u16 = width
        .try_into()
        .map_err(|_| EaselError::validation(format!("surface width {width} exceeds u16")))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| EaselError::validation(format!("surface height {height} exceeds u16")))?;
    Ok((w, h))
}

fn draw_pixels(
    target: &mut CpuSurface,
    src: &[u8],
    src_w: u32,
    src_h: u32,
    transform: Affine,
    params: DrawParams,
) -> EaselResult<()> {
    if opacity_to_u8(params.alpha) == 0 || src_w == 0 || src_h == 0 {
        return Ok(());
    }
    let (w, h) = (target.width(), target.height());
    if transform == Affine::IDENTITY && src_w == w && src_h == h {
        return composite_rgba8_premul(target.data_mut(), src, params.composite, params.alpha);
    }
    if transform.determinant().abs() < 1e-12 {
        return Ok(());
    }
    let layer = resample_nearest(src, src_w, src_h, w, h, transform.inverse());
    composite_rgba8_premul(target.data_mut(), &layer, params.composite, params.alpha)
}

/// Map every destination pixel centre back into the source; out-of-bounds samples are clear.
fn resample_nearest(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
    inverse: Affine,
) -> Vec<u8> {
    let mut out = vec![0u8; dst_w as usize * dst_h as usize * 4];
    for y in 0..dst_h {
        for x in 0..dst_w {
            let p = inverse * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
            let px = sample_px(src, src_w, src_h, p.x.floor() as i32, p.y.floor() as i32);
            let idx = (y as usize * dst_w as usize + x as usize) * 4;
            out[idx..idx + 4].copy_from_slice(&px);
        }
    }
    out
}

fn shade_coverage(coverage: &[u8], width: u32, fill: &FillStyle, transform: Affine) -> Vec<u8> {
    let mut out = vec![0u8; coverage.len()];
    match fill {
        FillStyle::Solid { color } => {
            let c = color.to_array();
            for (o, cov) in out.chunks_exact_mut(4).zip(coverage.chunks_exact(4)) {
                let a = u16::from(cov[3]);
                if a == 0 {
                    continue;
                }
                for ch in 0..4 {
                    o[ch] = mul_div255_u8(u16::from(c[ch]), a);
                }
            }
        }
        FillStyle::LinearGradient { start, end, stops } => {
            if stops.is_empty() || transform.determinant().abs() < 1e-12 {
                return out;
            }
            let inverse = transform.inverse();
            let d = *end - *start;
            let len2 = d.hypot2();
            for (i, (o, cov)) in out
                .chunks_exact_mut(4)
                .zip(coverage.chunks_exact(4))
                .enumerate()
            {
                let a = u16::from(cov[3]);
                if a == 0 {
                    continue;
                }
                let x = (i as u32 % width) as f64 + 0.5;
                let y = (i as u32 / width) as f64 + 0.5;
                let local = inverse * Point::new(x, y);
                let t = if len2 > 0.0 {
                    ((local - *start).dot(d) / len2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let c = gradient_at(stops, t);
                for ch in 0..4 {
                    o[ch] = mul_div255_u8(u16::from(c[ch]), a);
                }
            }
        }
    }
    out
}

/// Premultiplied color at `t`; stops are expected in ascending offset order.
fn gradient_at(stops: &[GradientStop], t: f64) -> [u8; 4] {
    let Some(first) = stops.first() else {
        return [0; 4];
    };
    if t <= first.offset {
        return first.color.to_array();
    }
    for pair in stops.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if t <= b.offset {
            let span = b.offset - a.offset;
            let k = if span > 0.0 { (t - a.offset) / span } else { 1.0 };
            let (ca, cb) = (a.color.to_array(), b.color.to_array());
            let mut out = [0u8; 4];
            for ch in 0..4 {
                let v = f64::from(ca[ch]) + (f64::from(cb[ch]) - f64::from(ca[ch])) * k;
                out[ch] = v.round().clamp(0.0, 255.0) as u8;
            }
            return out;
        }
    }
    stops
        .last()
        .map(|s| s.color.to_array())
        .unwrap_or([0; 4])
}

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

pub(crate) fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::LineTo(p) => out.line_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::QuadTo(p1, p2) => out.quad_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
            ),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
                vello_cpu::kurbo::Point::new(p3.x, p3.y),
            ),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

/// Combine `src` into `dst` (equal-length premultiplied RGBA8) with `op` at `opacity`.
pub fn composite_rgba8_premul(
    dst: &mut [u8],
    src: &[u8],
    op: CompositeOp,
    opacity: f32,
) -> EaselResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(EaselError::invariant(
            "composite expects equal-length rgba8 buffers",
        ));
    }

    // Dispatch once per draw; each arm monomorphizes its own kernel.
    match op {
        CompositeOp::SourceAtop => {
            source_atop_in_place_opacity(dst, src, opacity);
            Ok(())
        }
        CompositeOp::Blend(BlendMode::Normal) => {
            premul_over_in_place_opacity(dst, src, opacity);
            Ok(())
        }
        CompositeOp::Blend(BlendMode::Multiply) => blend_over(dst, src, opacity, |s, d| s * d),
        CompositeOp::Blend(BlendMode::Screen) => {
            blend_over(dst, src, opacity, |s, d| s + d - s * d)
        }
        CompositeOp::Blend(BlendMode::Overlay) => blend_over(dst, src, opacity, |s, d| {
            if d <= 0.5 {
                2.0 * s * d
            } else {
                1.0 - 2.0 * (1.0 - s) * (1.0 - d)
            }
        }),
        CompositeOp::Blend(BlendMode::Darken) => blend_over(dst, src, opacity, |s, d| s.min(d)),
        CompositeOp::Blend(BlendMode::Lighten) => blend_over(dst, src, opacity, |s, d| s.max(d)),
        CompositeOp::Blend(BlendMode::ColorDodge) => blend_over(dst, src, opacity, |s, d| {
            if d <= 0.0 {
                0.0
            } else if s >= 1.0 {
                1.0
            } else {
                (d / (1.0 - s)).min(1.0)
            }
        }),
        CompositeOp::Blend(BlendMode::ColorBurn) => blend_over(dst, src, opacity, |s, d| {
            if d >= 1.0 {
                1.0
            } else if s <= 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - d) / s).min(1.0)
            }
        }),
        CompositeOp::Blend(BlendMode::SoftLight) => blend_over(dst, src, opacity, |s, d| {
            if s <= 0.5 {
                d - (1.0 - 2.0 * s) * d * (1.0 - d)
            } else {
                let g = if d <= 0.25 {
                    ((16.0 * d - 12.0) * d + 4.0) * d
                } else {
                    d.sqrt()
                };
                d + (2.0 * s - 1.0) * (g - d)
            }
        }),
        CompositeOp::Blend(BlendMode::HardLight) => blend_over(dst, src, opacity, |s, d| {
            if s <= 0.5 {
                2.0 * s * d
            } else {
                1.0 - 2.0 * (1.0 - s) * (1.0 - d)
            }
        }),
        CompositeOp::Blend(BlendMode::Difference) => {
            blend_over(dst, src, opacity, |s, d| (d - s).abs())
        }
        CompositeOp::Blend(BlendMode::Exclusion) => {
            blend_over(dst, src, opacity, |s, d| d + s - 2.0 * d * s)
        }
    }
}

fn premul_over_in_place_opacity(dst: &mut [u8], src: &[u8], opacity: f32) {
    let op = opacity_to_u8(opacity);
    if op == 0 {
        return;
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let sa = mul_div255_u8(u16::from(s[3]), op);
        if sa == 0 {
            continue;
        }
        let inv = 255u16 - u16::from(sa);
        d[3] = add_sat_u8(sa, mul_div255_u8(u16::from(d[3]), inv));
        for c in 0..3 {
            let sc = mul_div255_u8(u16::from(s[c]), op);
            let dc = mul_div255_u8(u16::from(d[c]), inv);
            d[c] = add_sat_u8(sc, dc);
        }
    }
}

/// `out = src * da + dst * (1 - sa)`, destination alpha unchanged.
fn source_atop_in_place_opacity(dst: &mut [u8], src: &[u8], opacity: f32) {
    let op = opacity_to_u8(opacity);
    if op == 0 {
        return;
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let da = u16::from(d[3]);
        if da == 0 {
            continue;
        }
        let sa = mul_div255_u8(u16::from(s[3]), op);
        let inv = 255u16 - u16::from(sa);
        for c in 0..3 {
            let sc = mul_div255_u8(u16::from(s[c]), op);
            let v = mul_div255_u8(u16::from(sc), da);
            d[c] = add_sat_u8(v, mul_div255_u8(u16::from(d[c]), inv)).min(d[3]);
        }
    }
}

#[inline(always)]
fn blend_over<F>(dst: &mut [u8], src: &[u8], opacity: f32, blend_fn: F) -> EaselResult<()>
where
    F: Fn(f32, f32) -> f32,
{
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return Ok(());
    }

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        // Source-over with the blend applied to unpremultiplied channels:
        // out_a = sa + da * (1 - sa)
        // out_p = sp * (1 - da) + dp * (1 - sa) + B(sc, dc) * sa * da
        let sa = (f32::from(s[3]) / 255.0) * opacity;
        if sa <= 0.0 {
            continue;
        }
        let da = f32::from(d[3]) / 255.0;
        let out_a = (sa + da * (1.0 - sa)).clamp(0.0, 1.0);

        for c in 0..3 {
            let sp = (f32::from(s[c]) / 255.0) * opacity;
            let dp = f32::from(d[c]) / 255.0;
            let sc = (sp / sa).clamp(0.0, 1.0);
            let dc = if da > 0.0 {
                (dp / da).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let b = blend_fn(sc, dc).clamp(0.0, 1.0);
            let out_p = (sp * (1.0 - da) + dp * (1.0 - sa) + b * sa * da).clamp(0.0, 1.0);
            d[c] = (out_p * 255.0).round() as u8;
        }
        d[3] = (out_a * 255.0).round() as u8;
    }

    Ok(())
}

pub(crate) fn sample_px(src: &[u8], width: u32, height: u32, x: i32, y: i32) -> [u8; 4] {
    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
        return [0, 0, 0, 0];
    }
    let idx = ((y as usize) * (width as usize) + (x as usize)) * 4;
    [src[idx], src[idx + 1], src[idx + 2], src[idx + 3]]
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
