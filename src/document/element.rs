use std::sync::Arc;

use crate::foundation::core::{
    Affine, BezPath, Bitmap, ColorSpace, LayerTransform, Point, Rect, Rgba8Premul, Uid,
};

/// Separable blend modes supported by the compositor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    SoftLight,
    HardLight,
    Difference,
    Exclusion,
}

impl BlendMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::Darken => "darken",
            Self::Lighten => "lighten",
            Self::ColorDodge => "color-dodge",
            Self::ColorBurn => "color-burn",
            Self::SoftLight => "soft-light",
            Self::HardLight => "hard-light",
            Self::Difference => "difference",
            Self::Exclusion => "exclusion",
        }
    }
}

/// How a source is combined with its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeOp {
    Blend(BlendMode),
    /// Source drawn only where the destination already has coverage; destination alpha kept.
    SourceAtop,
}

impl CompositeOp {
    pub const NORMAL: Self = Self::Blend(BlendMode::Normal);

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blend(mode) => mode.as_str(),
            Self::SourceAtop => "source-atop",
        }
    }
}

/// Pixel source of a raster canvas.
#[derive(Clone, Debug)]
pub enum CanvasSource {
    /// Already-decoded premultiplied pixels.
    Pixels(Bitmap),
    /// Encoded image bytes (PNG/JPEG/...), decoded once per document context.
    Encoded(Arc<[u8]>),
}

#[derive(Clone, Debug)]
pub struct CanvasContent {
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    pub source: CanvasSource,
}

impl CanvasContent {
    pub fn from_bitmap(bitmap: Bitmap) -> Self {
        Self {
            width: bitmap.width,
            height: bitmap.height,
            color_space: ColorSpace::Srgb,
            source: CanvasSource::Pixels(bitmap),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

/// Text payload. `outline` is the shaped glyph geometry in local space.
#[derive(Clone, Debug)]
pub struct TextContent {
    pub content: String,
    pub font_size: f64,
    pub color: Rgba8Premul,
    pub outline: BezPath,
}

#[derive(Clone, Debug)]
pub enum VisualKind {
    Group,
    Canvas(CanvasContent),
    VectorObject { path: BezPath },
    Text(TextContent),
    /// Adjustment layer: applies its postprocess filters to what its parent already holds.
    Filter,
    Reference { target: Uid },
}

impl VisualKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Canvas(_) => "canvas",
            Self::VectorObject { .. } => "vectorObject",
            Self::Text(_) => "text",
            Self::Filter => "filter",
            Self::Reference { .. } => "reference",
        }
    }

    /// Geometry that internal fill/stroke filters paint, if the kind has any.
    pub fn path(&self) -> Option<&BezPath> {
        match self {
            Self::VectorObject { path } => Some(path),
            Self::Text(t) => Some(&t.outline),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::Group | Self::Reference { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GradientStop {
    pub offset: f64,
    pub color: Rgba8Premul,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FillStyle {
    Solid {
        color: Rgba8Premul,
    },
    LinearGradient {
        start: Point,
        end: Point,
        stops: Vec<GradientStop>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InkStyle {
    pub color: Rgba8Premul,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StrokeStyle {
    pub brush_id: String,
    pub ink: InkStyle,
    pub width: f64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PostprocessFilter {
    pub filter_id: String,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

fn default_opacity() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FilterKind {
    Fill { fill: FillStyle },
    Stroke(StrokeStyle),
    Postprocess(PostprocessFilter),
}

/// One entry of an element's ordered filter list.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerFilter {
    pub uid: Uid,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: FilterKind,
}

fn default_enabled() -> bool {
    true
}

impl LayerFilter {
    pub fn fill(uid: impl Into<Uid>, color: Rgba8Premul) -> Self {
        Self {
            uid: uid.into(),
            enabled: true,
            kind: FilterKind::Fill {
                fill: FillStyle::Solid { color },
            },
        }
    }

    pub fn stroke(uid: impl Into<Uid>, brush_id: &str, color: Rgba8Premul, width: f64) -> Self {
        Self {
            uid: uid.into(),
            enabled: true,
            kind: FilterKind::Stroke(StrokeStyle {
                brush_id: brush_id.to_owned(),
                ink: InkStyle { color },
                width,
            }),
        }
    }

    pub fn postprocess(
        uid: impl Into<Uid>,
        filter_id: &str,
        settings: serde_json::Value,
        opacity: f32,
    ) -> Self {
        Self {
            uid: uid.into(),
            enabled: true,
            kind: FilterKind::Postprocess(PostprocessFilter {
                filter_id: filter_id.to_owned(),
                settings,
                opacity,
            }),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, FilterKind::Fill { .. } | FilterKind::Stroke(_))
    }

    /// Enabled postprocess filter that would visibly change its input.
    pub fn as_active_postprocess(&self) -> Option<&PostprocessFilter> {
        match &self.kind {
            FilterKind::Postprocess(p) if self.enabled && clamp_unit(p.opacity) > 0.0 => Some(p),
            _ => None,
        }
    }
}

/// A node's payload plus the compositing attributes every kind shares.
#[derive(Clone, Debug)]
pub struct VisualElement {
    pub uid: Uid,
    pub name: String,
    pub visible: bool,
    pub lock: bool,
    pub blend_mode: BlendMode,
    pub opacity: f32,
    pub transform: LayerTransform,
    pub filters: Vec<LayerFilter>,
    pub clip_by_lower_layer: bool,
    pub kind: VisualKind,
}

impl VisualElement {
    pub fn new(uid: impl Into<Uid>, kind: VisualKind) -> Self {
        let uid = uid.into();
        Self {
            name: uid.0.clone(),
            uid,
            visible: true,
            lock: false,
            blend_mode: BlendMode::Normal,
            opacity: 1.0,
            transform: LayerTransform::default(),
            filters: Vec::new(),
            clip_by_lower_layer: false,
            kind,
        }
    }

    pub fn group(uid: impl Into<Uid>) -> Self {
        Self::new(uid, VisualKind::Group)
    }

    pub fn canvas(uid: impl Into<Uid>, bitmap: Bitmap) -> Self {
        Self::new(uid, VisualKind::Canvas(CanvasContent::from_bitmap(bitmap)))
    }

    pub fn vector(uid: impl Into<Uid>, path: BezPath) -> Self {
        Self::new(uid, VisualKind::VectorObject { path })
    }

    pub fn filter_layer(uid: impl Into<Uid>) -> Self {
        Self::new(uid, VisualKind::Filter)
    }

    pub fn reference(uid: impl Into<Uid>, target: impl Into<Uid>) -> Self {
        Self::new(
            uid,
            VisualKind::Reference {
                target: target.into(),
            },
        )
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    pub fn with_blend(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_transform(mut self, transform: LayerTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_filter(mut self, filter: LayerFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn clipped(mut self) -> Self {
        self.clip_by_lower_layer = true;
        self
    }

    /// Opacity clamped to `[0, 1]`; NaN counts as fully transparent.
    pub fn effective_opacity(&self) -> f32 {
        clamp_unit(self.opacity)
    }

    pub fn contributes(&self) -> bool {
        self.visible && self.effective_opacity() > 0.0
    }

    pub fn has_postprocess(&self) -> bool {
        self.filters
            .iter()
            .any(|f| f.as_active_postprocess().is_some())
    }

    pub fn composite_op(&self) -> CompositeOp {
        if self.clip_by_lower_layer {
            CompositeOp::SourceAtop
        } else {
            CompositeOp::Blend(self.blend_mode)
        }
    }

    /// `true` when the node can draw straight into its parent's target.
    pub fn can_direct_output(&self) -> bool {
        self.blend_mode == BlendMode::Normal && !self.has_postprocess() && !self.clip_by_lower_layer
    }

    pub fn local_affine(&self) -> Affine {
        self.transform.to_affine()
    }
}

pub(crate) fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

#[cfg(test)]
#[path = "../../tests/unit/document/element.rs"]
mod tests;
