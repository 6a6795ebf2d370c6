//! Overlay elements stamped onto pages after removals.

use std::collections::BTreeMap;
use std::io::Cursor;

use base64::Engine as _;
use serde::Deserialize;

use super::geometry::{Point, Rect};
use crate::error::{UnmarkError, UnmarkResult};

/// An RGB color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Parses `#rrggbb` or `#rgb`. Empty input is black.
    pub fn from_hex(hex: &str) -> Option<Color> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.is_empty() {
            return Some(Color::BLACK);
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .ok()
                .map(|v| f64::from(v) / 255.0)
        };
        Some(Color {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

/// A text stamp anchored at its visual centre.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub content: String,
    pub point: Point,
    pub fontsize: f64,
    pub fontname: String,
    pub color: Color,
    pub rotation_degrees: f64,
    pub opacity: f64,
}

/// An image stamp placed into `rect`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOverlay {
    pub bytes: Vec<u8>,
    pub rect: Rect,
    pub rotation_degrees: f64,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayElement {
    Text(TextOverlay),
    Image(ImageOverlay),
}

impl OverlayElement {
    pub fn label(&self) -> String {
        match self {
            Self::Text(t) => format!("text overlay '{}'", t.content),
            Self::Image(i) => format!(
                "image overlay at [{:.1}, {:.1}, {:.1}, {:.1}]",
                i.rect.x0, i.rect.y0, i.rect.x1, i.rect.y1
            ),
        }
    }
}

/// One element as received from the caller, before resolution.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverlaySpec {
    Text {
        #[serde(default)]
        text: String,
        x: f64,
        y: f64,
        #[serde(default = "default_fontsize")]
        fontsize: f64,
        #[serde(default)]
        angle: f64,
        #[serde(default = "default_opacity")]
        opacity: f64,
        #[serde(default = "default_fontname")]
        fontname: String,
        #[serde(default)]
        color: Option<String>,
    },
    Image {
        #[serde(default)]
        base64: Option<String>,
        x: f64,
        y: f64,
        #[serde(default = "default_scale")]
        scale: f64,
        #[serde(default)]
        angle: f64,
        #[serde(default = "default_opacity")]
        opacity: f64,
    },
}

fn default_fontsize() -> f64 {
    12.0
}

fn default_opacity() -> f64 {
    1.0
}

fn default_fontname() -> String {
    "helv".to_string()
}

fn default_scale() -> f64 {
    1.0
}

impl OverlaySpec {
    /// Resolves the spec into a concrete element. Image specs without inline
    /// data fall back to `shared_image`.
    pub fn resolve(&self, shared_image: Option<&[u8]>) -> UnmarkResult<OverlayElement> {
        match self {
            Self::Text {
                text,
                x,
                y,
                fontsize,
                angle,
                opacity,
                fontname,
                color,
            } => {
                let color = match color.as_deref() {
                    None => Color::BLACK,
                    Some(hex) => Color::from_hex(hex).ok_or_else(|| {
                        UnmarkError::element("text overlay", format!("invalid color '{}'", hex))
                    })?,
                };
                Ok(OverlayElement::Text(TextOverlay {
                    content: text.clone(),
                    point: Point::new(*x, *y),
                    fontsize: *fontsize,
                    fontname: fontname.clone(),
                    color,
                    rotation_degrees: *angle,
                    opacity: *opacity,
                }))
            }
            Self::Image {
                base64,
                x,
                y,
                scale,
                angle,
                opacity,
            } => {
                let bytes = match base64 {
                    Some(data) => decode_base64_payload(data)?,
                    None => shared_image
                        .map(<[u8]>::to_vec)
                        .ok_or_else(|| UnmarkError::element("image overlay", "no image data"))?,
                };
                let (width, height) = image_dimensions(&bytes)?;
                let rect = Rect::centered(
                    Point::new(*x, *y),
                    f64::from(width) * scale,
                    f64::from(height) * scale,
                );
                Ok(OverlayElement::Image(ImageOverlay {
                    bytes,
                    rect,
                    rotation_degrees: *angle,
                    opacity: *opacity,
                }))
            }
        }
    }
}

/// Decodes base64 image data, stripping a `data:...;base64,` prefix.
pub fn decode_base64_payload(data: &str) -> UnmarkResult<Vec<u8>> {
    let payload = match data.split_once(',') {
        Some((_, rest)) => rest,
        None => data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| UnmarkError::element("image overlay", format!("malformed base64: {}", e)))
}

/// Natural pixel size of an encoded image.
pub fn image_dimensions(bytes: &[u8]) -> UnmarkResult<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| UnmarkError::element("image overlay", e.to_string()))?
        .into_dimensions()
        .map_err(|e| UnmarkError::element("image overlay", format!("unreadable image: {}", e)))
}

/// Overlay specs keyed by page index.
#[derive(Debug, Clone, Default)]
pub struct OverlayPlan {
    pages: BTreeMap<usize, Vec<OverlaySpec>>,
}

impl OverlayPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `{"<page>": [spec, ...], ...}`. Unknown element types or
    /// malformed specs reject the whole payload, as do non-numeric page keys.
    pub fn from_json(json: &str) -> UnmarkResult<Self> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let raw: BTreeMap<String, Vec<OverlaySpec>> =
            serde_json::from_str(trimmed).map_err(|e| {
                UnmarkError::invalid_input("page_modifiers", format!("malformed overlays: {}", e))
            })?;
        let mut pages = BTreeMap::new();
        for (key, specs) in raw {
            let page = key.trim().parse::<usize>().map_err(|_| {
                UnmarkError::invalid_input("page_modifiers", format!("'{}' is not a page index", key))
            })?;
            pages.insert(page, specs);
        }
        Ok(Self { pages })
    }

    pub fn add(&mut self, page: usize, spec: OverlaySpec) {
        self.pages.entry(page).or_default().push(spec);
    }

    pub fn for_page(&self, page: usize) -> &[OverlaySpec] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.pages.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.values().all(Vec::is_empty)
    }
}
