//! JSON scene fixtures.
//!
//! A fixture is a human-edited description of a document plus the viewport to render it at. It is
//! converted into a [`Document`] with [`SceneDef::into_document`]. This is a debugging and test
//! convenience, not a persistence format.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::element::{
    BlendMode, CanvasContent, CanvasSource, FillStyle, FilterKind, GradientStop, InkStyle,
    LayerFilter, PostprocessFilter, StrokeStyle, TextContent, VisualElement, VisualKind,
};
use crate::document::tree::Document;
use crate::foundation::core::{
    Affine, BezPath, Bitmap, ColorSpace, LayerTransform, Point, Rgba8Premul, Uid, Vec2, Viewport,
};
use crate::foundation::error::{EaselError, EaselResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDef {
    pub viewport: ViewportDef,
    #[serde(default)]
    pub background: Option<ColorDef>,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ViewportDef {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub pan: Vec2Def,
    #[serde(default = "one_f64")]
    pub zoom: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vec2Def {
    pub x: f64,
    pub y: f64,
}

impl<'de> Deserialize<'de> for Vec2Def {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Arr([f64; 2]),
            Obj { x: f64, y: f64 },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Arr([x, y]) => Ok(Self { x, y }),
            Repr::Obj { x, y } => Ok(Self { x, y }),
        }
    }
}

/// Straight (non-premultiplied) 8-bit color: `"#RRGGBB"`, `"#RRGGBBAA"` or `[r, g, b, a]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorDef {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorDef {
    pub fn to_rgba8_premul(self) -> Rgba8Premul {
        Rgba8Premul::from_straight_rgba(self.r, self.g, self.b, self.a)
    }
}

impl<'de> Deserialize<'de> for ColorDef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Hex(String),
            Arr(Vec<u8>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Hex(s) => parse_hex(&s).map_err(serde::de::Error::custom),
            Repr::Arr(v) => match v.as_slice() {
                [r, g, b] => Ok(Self {
                    r: *r,
                    g: *g,
                    b: *b,
                    a: 255,
                }),
                [r, g, b, a] => Ok(Self {
                    r: *r,
                    g: *g,
                    b: *b,
                    a: *a,
                }),
                _ => Err(serde::de::Error::custom(
                    "rgba array must have len 3 ([r,g,b]) or 4 ([r,g,b,a])",
                )),
            },
        }
    }
}

fn parse_hex(s: &str) -> Result<ColorDef, String> {
    let s = s.trim();
    let s = s.strip_prefix('#').unwrap_or(s);

    fn hex_byte(pair: &str) -> Result<u8, String> {
        u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte \"{pair}\""))
    }

    if !s.is_ascii() {
        return Err("hex color must be ASCII".to_owned());
    }
    let a = match s.len() {
        6 => 255,
        8 => hex_byte(&s[6..8])?,
        _ => return Err("hex color must be #RRGGBB or #RRGGBBAA".to_owned()),
    };
    Ok(ColorDef {
        r: hex_byte(&s[0..2])?,
        g: hex_byte(&s[2..4])?,
        b: hex_byte(&s[4..6])?,
        a,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformDef {
    #[serde(default)]
    pub translate: Vec2Def,
    #[serde(default = "unit_scale")]
    pub scale: Vec2Def,
    #[serde(default)]
    pub rotation_deg: f64,
}

impl Default for TransformDef {
    fn default() -> Self {
        Self {
            translate: Vec2Def::default(),
            scale: unit_scale(),
            rotation_deg: 0.0,
        }
    }
}

impl TransformDef {
    fn to_transform(&self) -> LayerTransform {
        LayerTransform {
            translate: Vec2::new(self.translate.x, self.translate.y),
            scale: Vec2::new(self.scale.x, self.scale.y),
            rotate: self.rotation_deg.to_radians(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKindDef,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub lock: bool,
    #[serde(default)]
    pub blend: BlendMode,
    #[serde(default = "one_f32")]
    pub opacity: f32,
    #[serde(default)]
    pub transform: TransformDef,
    #[serde(default)]
    pub clip_by_lower_layer: bool,
    #[serde(default)]
    pub filters: Vec<FilterDef>,
    #[serde(default)]
    pub children: Vec<NodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKindDef {
    Group,
    Canvas {
        width: u32,
        height: u32,
        #[serde(default)]
        color_space: ColorSpace,
        /// Solid fill for a synthetic canvas.
        #[serde(default)]
        fill: Option<ColorDef>,
        /// Encoded image, relative to the fixture file.
        #[serde(default)]
        image: Option<String>,
    },
    Vector {
        /// SVG path data.
        path: String,
    },
    Text {
        content: String,
        #[serde(default = "default_font_size")]
        font_size: f64,
        color: ColorDef,
        /// Pre-shaped glyph outline as SVG path data.
        outline: String,
    },
    Filter,
    Reference {
        target: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDef {
    pub id: String,
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: FilterKindDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKindDef {
    Fill {
        color: ColorDef,
    },
    LinearGradient {
        start: Vec2Def,
        end: Vec2Def,
        stops: Vec<(f64, ColorDef)>,
    },
    Stroke {
        #[serde(default = "default_brush")]
        brush: String,
        color: ColorDef,
        width: f64,
    },
    Postprocess {
        filter: String,
        #[serde(default)]
        settings: serde_json::Value,
        #[serde(default = "one_f32")]
        opacity: f32,
    },
}

impl FilterDef {
    fn to_filter(&self) -> LayerFilter {
        let kind = match &self.kind {
            FilterKindDef::Fill { color } => FilterKind::Fill {
                fill: FillStyle::Solid {
                    color: color.to_rgba8_premul(),
                },
            },
            FilterKindDef::LinearGradient { start, end, stops } => FilterKind::Fill {
                fill: FillStyle::LinearGradient {
                    start: Point::new(start.x, start.y),
                    end: Point::new(end.x, end.y),
                    stops: stops
                        .iter()
                        .map(|(offset, c)| GradientStop {
                            offset: *offset,
                            color: c.to_rgba8_premul(),
                        })
                        .collect(),
                },
            },
            FilterKindDef::Stroke {
                brush,
                color,
                width,
            } => FilterKind::Stroke(StrokeStyle {
                brush_id: brush.clone(),
                ink: InkStyle {
                    color: color.to_rgba8_premul(),
                },
                width: *width,
            }),
            FilterKindDef::Postprocess {
                filter,
                settings,
                opacity,
            } => FilterKind::Postprocess(PostprocessFilter {
                filter_id: filter.clone(),
                settings: settings.clone(),
                opacity: *opacity,
            }),
        };
        LayerFilter {
            uid: Uid::from(self.id.as_str()),
            enabled: self.enabled,
            kind,
        }
    }
}

fn yes() -> bool {
    true
}

fn one_f32() -> f32 {
    1.0
}

fn one_f64() -> f64 {
    1.0
}

fn unit_scale() -> Vec2Def {
    Vec2Def { x: 1.0, y: 1.0 }
}

fn default_font_size() -> f64 {
    16.0
}

fn default_brush() -> String {
    "round".to_owned()
}

impl SceneDef {
    /// Parse a fixture from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> EaselResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| EaselError::serde(format!("parse scene JSON: {e}")))
    }

    /// Parse a fixture from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> EaselResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            EaselError::validation(format!("open scene JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    pub fn viewport(&self) -> Viewport {
        let v = self.viewport;
        Viewport::new(v.width, v.height).with_transform(
            Affine::translate(Vec2::new(v.pan.x, v.pan.y)) * Affine::scale(v.zoom),
        )
    }

    /// Build the document. Relative image paths resolve against `assets_root`.
    pub fn into_document(&self, assets_root: impl AsRef<Path>) -> EaselResult<Document> {
        let root = assets_root.as_ref();
        let mut doc = Document::new();
        for n in &self.nodes {
            add_def(&mut doc, &Uid::root(), n, root)?;
        }
        doc.take_invalidations();
        Ok(doc)
    }
}

fn add_def(doc: &mut Document, parent: &Uid, def: &NodeDef, root: &Path) -> EaselResult<()> {
    let uid = Uid::from(def.id.as_str());
    let kind = match &def.kind {
        NodeKindDef::Group => VisualKind::Group,
        NodeKindDef::Canvas {
            width,
            height,
            color_space,
            fill,
            image,
        } => {
            let source = match (fill, image) {
                (_, Some(rel)) => CanvasSource::Encoded(read_asset(root, rel)?),
                (Some(c), None) => {
                    CanvasSource::Pixels(Bitmap::solid(*width, *height, c.to_rgba8_premul()))
                }
                (None, None) => CanvasSource::Pixels(Bitmap::transparent(*width, *height)),
            };
            VisualKind::Canvas(CanvasContent {
                width: *width,
                height: *height,
                color_space: *color_space,
                source,
            })
        }
        NodeKindDef::Vector { path } => VisualKind::VectorObject {
            path: parse_path(&def.id, path)?,
        },
        NodeKindDef::Text {
            content,
            font_size,
            color,
            outline,
        } => VisualKind::Text(TextContent {
            content: content.clone(),
            font_size: *font_size,
            color: color.to_rgba8_premul(),
            outline: parse_path(&def.id, outline)?,
        }),
        NodeKindDef::Filter => VisualKind::Filter,
        NodeKindDef::Reference { target } => VisualKind::Reference {
            target: Uid::from(target.as_str()),
        },
    };

    let mut element = VisualElement::new(uid.clone(), kind);
    if let Some(name) = &def.name {
        element.name = name.clone();
    }
    element.visible = def.visible;
    element.lock = def.lock;
    element.blend_mode = def.blend;
    element.opacity = def.opacity;
    element.transform = def.transform.to_transform();
    element.clip_by_lower_layer = def.clip_by_lower_layer;
    element.filters = def.filters.iter().map(FilterDef::to_filter).collect();

    doc.add_node(parent, None, element)?;
    for c in &def.children {
        add_def(doc, &uid, c, root)?;
    }
    Ok(())
}

fn parse_path(id: &str, d: &str) -> EaselResult<BezPath> {
    BezPath::from_svg(d.trim())
        .map_err(|e| EaselError::validation(format!("node '{id}': invalid svg path: {e}")))
}

fn read_asset(root: &Path, rel: &str) -> EaselResult<Arc<[u8]>> {
    let p: PathBuf = root.join(rel);
    let bytes = std::fs::read(&p).map_err(|e| {
        EaselError::validation(format!("failed to read asset '{}': {e}", p.display()))
    })?;
    Ok(Arc::from(bytes))
}

#[cfg(test)]
#[path = "../../tests/unit/document/def.rs"]
mod tests;
