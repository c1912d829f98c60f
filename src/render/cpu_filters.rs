use serde::Deserialize;

use crate::document::element::{FillStyle, StrokeStyle};
use crate::foundation::core::{BezPath, Bitmap, Viewport};
use crate::foundation::error::{EaselError, EaselResult};
use crate::render::backend::{BrushBackend, DrawParams, DrawingBackend, FilterBackend};
use crate::render::cpu::{CpuBackend, CpuSurface};

/// Built-in raster filters: `blur`, `color-matrix`, `grayscale` and `invert`.
#[derive(Debug, Default)]
pub struct CpuFilters {
    tmp: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BlurSettings {
    /// Kernel radius in document pixels; scaled by the view zoom.
    radius: f64,
    sigma: Option<f32>,
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            radius: 4.0,
            sigma: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ColorMatrixSettings {
    matrix: Vec<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AmountSettings {
    amount: f32,
}

impl Default for AmountSettings {
    fn default() -> Self {
        Self { amount: 1.0 }
    }
}

fn parse_settings<T: for<'de> Deserialize<'de>>(
    filter_id: &str,
    settings: &serde_json::Value,
) -> EaselResult<T> {
    let value = if settings.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        settings.clone()
    };
    serde_json::from_value(value)
        .map_err(|e| EaselError::validation(format!("invalid '{filter_id}' settings: {e}")))
}

impl CpuFilters {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(
        &mut self,
        filter_id: &str,
        input: &Bitmap,
        settings: &serde_json::Value,
        viewport: Viewport,
    ) -> EaselResult<Vec<u8>> {
        let src = input.data.as_slice();
        let mut dst = vec![0u8; src.len()];
        match filter_id {
            "blur" => {
                let s: BlurSettings = parse_settings(filter_id, settings)?;
                if !s.radius.is_finite() || s.radius < 0.0 {
                    return Err(EaselError::validation(format!(
                        "blur radius must be finite and >= 0, got {}",
                        s.radius
                    )));
                }
                // Anything wider than the image blurs to the same result.
                let max_radius = f64::from(input.width.max(input.height));
                let zoom = viewport.transform.determinant().abs().sqrt();
                let radius = (s.radius * zoom).round().min(max_radius) as u32;
                let sigma = s.sigma.unwrap_or((radius as f32 / 2.0).max(0.5));
                let kernel = gaussian_kernel_q16(radius, sigma)?;
                self.tmp.clear();
                self.tmp.resize(src.len(), 0);
                blur_rgba8_premul_q16(
                    src,
                    &mut dst,
                    &mut self.tmp,
                    input.width,
                    input.height,
                    &kernel,
                );
            }
            "color-matrix" => {
                let s: ColorMatrixSettings = parse_settings(filter_id, settings)?;
                let m: [f32; 20] = s.matrix.as_slice().try_into().map_err(|_| {
                    EaselError::validation(format!(
                        "color-matrix expects 20 coefficients, got {}",
                        s.matrix.len()
                    ))
                })?;
                color_matrix_rgba8_premul(src, &mut dst, m);
            }
            "grayscale" => {
                let s: AmountSettings = parse_settings(filter_id, settings)?;
                color_matrix_rgba8_premul(src, &mut dst, grayscale_matrix(s.amount));
            }
            "invert" => {
                for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                    // Premultiplied inverse keeps alpha: c' = a - c.
                    d[0] = s[3].saturating_sub(s[0]);
                    d[1] = s[3].saturating_sub(s[1]);
                    d[2] = s[3].saturating_sub(s[2]);
                    d[3] = s[3];
                }
            }
            other => return Err(EaselError::missing_plugin("filter", other)),
        }
        Ok(dst)
    }
}

impl FilterBackend<CpuSurface> for CpuFilters {
    async fn apply_raster_filter(
        &mut self,
        filter_id: &str,
        input: &Bitmap,
        output: &mut CpuSurface,
        settings: &serde_json::Value,
        viewport: Viewport,
    ) -> EaselResult<()> {
        let pixels = self.run(filter_id, input, settings, viewport)?;
        output.write_premul(&pixels, input.width, input.height);
        Ok(())
    }
}

/// Round-capped, round-joined solid stroke: the only built-in brush (`"round"`).
#[derive(Debug, Default)]
pub struct RoundBrush {
    fill: CpuBackend,
}

impl RoundBrush {
    pub const ID: &'static str = "round";

    pub fn new() -> Self {
        Self::default()
    }
}

impl BrushBackend<CpuSurface> for RoundBrush {
    fn stroke_path(
        &mut self,
        target: &mut CpuSurface,
        path: &BezPath,
        stroke: &StrokeStyle,
        params: DrawParams,
    ) -> EaselResult<()> {
        if stroke.brush_id != Self::ID {
            return Err(EaselError::missing_plugin("brush", stroke.brush_id.as_str()));
        }
        if !stroke.width.is_finite() || stroke.width <= 0.0 {
            return Ok(());
        }
        let style = kurbo::Stroke::new(stroke.width)
            .with_caps(kurbo::Cap::Round)
            .with_join(kurbo::Join::Round);
        let outline = kurbo::stroke(path.iter(), &style, &kurbo::StrokeOpts::default(), 0.1);
        self.fill.fill_path(
            target,
            &outline,
            &FillStyle::Solid {
                color: stroke.ink.color,
            },
            params,
        )
    }
}

fn grayscale_matrix(amount: f32) -> [f32; 20] {
    let a = amount.clamp(0.0, 1.0);
    let (lr, lg, lb) = (0.2126, 0.7152, 0.0722);
    let row = |ch: usize| {
        let mut r = [lr * a, lg * a, lb * a];
        r[ch] += 1.0 - a;
        r
    };
    let (r, g, b) = (row(0), row(1), row(2));
    [
        r[0], r[1], r[2], 0.0, 0.0, //
        g[0], g[1], g[2], 0.0, 0.0, //
        b[0], b[1], b[2], 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, 0.0, //
    ]
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> EaselResult<Vec<u32>> {
    if radius == 0 {
        return Ok(vec![1 << 16]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(EaselError::validation("blur sigma must be finite and > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();
    if sum <= 0.0 {
        return Err(EaselError::invariant("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Rounding drift goes to the centre tap so the kernel sums to exactly 1.0.
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }

    Ok(weights)
}

fn blur_rgba8_premul_q16(
    src: &[u8],
    dst: &mut [u8],
    tmp: &mut [u8],
    width: u32,
    height: u32,
    kernel_q16: &[u32],
) {
    if kernel_q16.len() == 1 || width == 0 || height == 0 {
        dst.copy_from_slice(src);
        return;
    }
    blur_pass_q16(src, tmp, width, height, kernel_q16, true);
    blur_pass_q16(tmp, dst, width, height, kernel_q16, false);
}

fn blur_pass_q16(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32], horizontal: bool) {
    let radius = (k.len() / 2) as i32;
    let (w, h) = (width as i32, height as i32);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let d = ki as i32 - radius;
                let (sx, sy) = if horizontal {
                    ((x + d).clamp(0, w - 1), y)
                } else {
                    (x, (y + d).clamp(0, h - 1))
                };
                let idx = ((sy * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}

fn color_matrix_rgba8_premul(src: &[u8], dst: &mut [u8], m: [f32; 20]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let pa = f32::from(s[3]) / 255.0;
        // Matrix runs on straight color.
        let inv_a = if pa > 0.0 { 1.0 / pa } else { 0.0 };
        let r = f32::from(s[0]) / 255.0 * inv_a;
        let g = f32::from(s[1]) / 255.0 * inv_a;
        let b = f32::from(s[2]) / 255.0 * inv_a;
        let a = pa;

        let out_r = (m[0] * r + m[1] * g + m[2] * b + m[3] * a + m[4]).clamp(0.0, 1.0);
        let out_g = (m[5] * r + m[6] * g + m[7] * b + m[8] * a + m[9]).clamp(0.0, 1.0);
        let out_b = (m[10] * r + m[11] * g + m[12] * b + m[13] * a + m[14]).clamp(0.0, 1.0);
        let out_a = (m[15] * r + m[16] * g + m[17] * b + m[18] * a + m[19]).clamp(0.0, 1.0);

        d[0] = (out_r * out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        d[1] = (out_g * out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        d[2] = (out_b * out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        d[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu_filters.rs"]
mod tests;
