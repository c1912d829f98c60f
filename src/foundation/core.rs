use std::fmt;
use std::sync::Arc;

use crate::foundation::error::{EaselError, EaselResult};

pub use kurbo::{Affine, BezPath, Point, Rect, Vec2};

/// Stable identifier of a layer node and of its visual element.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

impl Uid {
    /// Reserved uid of the document root node.
    pub const ROOT: &'static str = "__root__";

    /// Uid of the document root node.
    pub fn root() -> Self {
        Self(Self::ROOT.to_owned())
    }

    /// `true` when this is the reserved root uid.
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Borrow the raw string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Uid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Output area of one render pass.
///
/// `transform` maps document space to viewport pixels (pan/zoom). Every render target token is
/// sized to `width x height`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub transform: Affine,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            transform: Affine::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.transform = transform;
        self
    }

    pub fn size(self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn rect(self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

/// Color space tag carried by raster canvases. Pixels are never converted by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    #[default]
    Srgb,
    DisplayP3,
}

/// Premultiplied RGBA8 (r,g,b already multiplied by a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8Premul {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8Premul {
    pub fn transparent() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }
    }

    pub fn from_straight_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        fn premul(c: u8, a: u8) -> u8 {
            let c = u16::from(c);
            let a = u16::from(a);
            (((c * a) + 127) / 255) as u8
        }

        Self {
            r: premul(r, a),
            g: premul(g, a),
            b: premul(b, a),
            a,
        }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Immutable premultiplied RGBA8 image shared by reference.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub data: Arc<Vec<u8>>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> EaselResult<Self> {
        let expected = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4);
        if data.len() != expected {
            return Err(EaselError::validation(format!(
                "bitmap byte len mismatch: expected {expected}, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data: Arc::new(data),
        })
    }

    pub fn transparent(width: u32, height: u32) -> Self {
        Self::solid(width, height, Rgba8Premul::transparent())
    }

    pub fn solid(width: u32, height: u32, color: Rgba8Premul) -> Self {
        let px = (width as usize).saturating_mul(height as usize);
        let mut data = Vec::with_capacity(px.saturating_mul(4));
        for _ in 0..px {
            data.extend_from_slice(&color.to_array());
        }
        Self {
            width,
            height,
            data: Arc::new(data),
        }
    }

    /// Pixel at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        let px = self.data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Per-element transform: translate, rotate (radians), scale.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LayerTransform {
    pub translate: Vec2,
    pub scale: Vec2, // default (1,1)
    pub rotate: f64,
}

impl Default for LayerTransform {
    fn default() -> Self {
        Self {
            translate: Vec2::ZERO,
            scale: Vec2::new(1.0, 1.0),
            rotate: 0.0,
        }
    }
}

impl LayerTransform {
    pub fn to_affine(self) -> Affine {
        // Canonical order: T(translate) * R(rotate) * S(scale)
        Affine::translate(self.translate)
            * Affine::rotate(self.rotate)
            * Affine::scale_non_uniform(self.scale.x, self.scale.y)
    }

    pub fn is_identity(self) -> bool {
        self == Self::default()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
