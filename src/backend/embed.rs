//! Objects and content written for overlays: fonts, image XObjects,
//! transparency states and the drawing operators that use them.

use std::collections::BTreeMap;

use log::debug;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use ttf_parser::{name_id, Face};

use super::fonts::{win_ansi_code, write_to_unicode, Base14};
use super::subset::{subset_truetype, GlyphSet};
use crate::domain::{Matrix, Point, Rect};
use crate::editing::toolkit::{ImagePlacement, TextPlacement};
use crate::error::{UnmarkError, UnmarkResult};

/// A font added to the document for overlay text.
#[derive(Debug, Clone)]
pub enum LoadedFont {
    Standard {
        family: Base14,
        object: ObjectId,
    },
    TrueType {
        data: Vec<u8>,
        units_per_em: f64,
        object: ObjectId,
        descendant: ObjectId,
        descriptor: ObjectId,
        file: ObjectId,
        to_unicode: ObjectId,
        /// Glyphs drawn so far, with the character each stands for.
        used: BTreeMap<u16, char>,
    },
}

impl LoadedFont {
    pub fn object(&self) -> ObjectId {
        match self {
            Self::Standard { object, .. } | Self::TrueType { object, .. } => *object,
        }
    }

    /// Rendered width of `text` at `fontsize`.
    pub fn text_width(&self, text: &str, fontsize: f64) -> UnmarkResult<f64> {
        match self {
            Self::Standard { family, .. } => Ok(text
                .chars()
                .map(|c| family.width(u32::from(win_ansi_code(c).unwrap_or(b'?'))))
                .sum::<f64>()
                / 1000.0
                * fontsize),
            Self::TrueType {
                data, units_per_em, ..
            } => {
                let face = parse_face(data)?;
                let units: f64 = text
                    .chars()
                    .map(|c| {
                        let gid = face.glyph_index(c).unwrap_or_default();
                        f64::from(face.glyph_hor_advance(gid).unwrap_or(0))
                    })
                    .sum();
                Ok(units / units_per_em * fontsize)
            }
        }
    }

    /// Hex string operand for `text`. TrueType fonts remember the glyphs
    /// used; returns whether new glyphs were added.
    pub fn encode(&mut self, text: &str) -> UnmarkResult<(String, bool)> {
        match self {
            Self::Standard { .. } => Ok((
                text.chars()
                    .map(|c| format!("{:02X}", win_ansi_code(c).unwrap_or(b'?')))
                    .collect(),
                false,
            )),
            Self::TrueType { data, used, .. } => {
                let face = parse_face(data)?;
                let mut hex = String::with_capacity(text.len() * 4);
                let mut added = false;
                for c in text.chars() {
                    let gid = face.glyph_index(c).map_or(0, |g| g.0);
                    hex.push_str(&format!("{:04X}", gid));
                    if gid != 0 && used.insert(gid, c).is_none() {
                        added = true;
                    }
                }
                Ok((hex, added))
            }
        }
    }

    /// Rewrites the width array and Unicode map of a TrueType font from the
    /// glyphs used so far.
    pub fn write_tables(&self, doc: &mut Document) -> UnmarkResult<()> {
        let Self::TrueType {
            data,
            units_per_em,
            descendant,
            to_unicode,
            used,
            ..
        } = self
        else {
            return Ok(());
        };
        let face = parse_face(data)?;
        let mut widths = Vec::with_capacity(used.len() * 2);
        for &gid in used.keys() {
            let advance = face.glyph_hor_advance(ttf_parser::GlyphId(gid)).unwrap_or(0);
            widths.push(Object::Integer(i64::from(gid)));
            widths.push(Object::Array(vec![Object::Integer(
                (f64::from(advance) * 1000.0 / units_per_em).round() as i64,
            )]));
        }
        doc.get_dictionary_mut(*descendant)?
            .set("W", Object::Array(widths));

        let entries: Vec<(u16, char)> = used.iter().map(|(&g, &c)| (g, c)).collect();
        let cmap = Stream::new(dictionary! {}, write_to_unicode(&entries));
        doc.objects.insert(*to_unicode, Object::Stream(cmap));
        Ok(())
    }
}

impl LoadedFont {
    /// Replaces the embedded font file with a subset of the glyphs used so
    /// far and renames the font after it. Returns false for fonts with
    /// nothing to subset.
    pub fn subset(&self, doc: &mut Document) -> UnmarkResult<bool> {
        let Self::TrueType {
            data,
            object,
            descendant,
            descriptor,
            file,
            used,
            ..
        } = self
        else {
            return Ok(false);
        };
        if used.is_empty() {
            return Ok(false);
        }
        let mut keep = GlyphSet::new();
        used.keys().for_each(|&gid| keep.insert(gid));
        let subset = subset_truetype(data, &keep)?;
        debug!(
            "Subset font keeps {} glyph(s), {} -> {} bytes",
            keep.len(),
            data.len(),
            subset.len()
        );

        let base = doc
            .get_dictionary(*object)?
            .get(b"BaseFont")
            .and_then(Object::as_name_str)
            .map(str::to_string)
            .unwrap_or_else(|_| "UnmarkEmbedded".to_string());
        let name = Object::Name(keep.subset_name(&base).into_bytes());
        doc.get_dictionary_mut(*object)?.set("BaseFont", name.clone());
        doc.get_dictionary_mut(*descendant)?.set("BaseFont", name.clone());
        doc.get_dictionary_mut(*descriptor)?.set("FontName", name);

        let stream = Stream::new(
            dictionary! { "Length1" => Object::Integer(subset.len() as i64) },
            subset,
        );
        doc.objects.insert(*file, Object::Stream(stream));
        Ok(true)
    }
}

fn parse_face(data: &[u8]) -> UnmarkResult<Face<'_>> {
    Face::parse(data, 0).map_err(|e| UnmarkError::toolkit("load_font", format!("unreadable font: {}", e)))
}

/// Adds one of the standard fonts by its short name.
pub fn load_standard(doc: &mut Document, name: &str) -> UnmarkResult<LoadedFont> {
    let family = match name.to_ascii_lowercase().as_str() {
        "helv" | "helvetica" => Base14::Helvetica,
        "tiro" | "times" | "times-roman" => Base14::Times,
        "cour" | "courier" => Base14::Courier,
        other => {
            return Err(UnmarkError::toolkit(
                "load_font",
                format!("unknown built-in font '{}'", other),
            ))
        }
    };
    let object = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => family.base_font(),
        "Encoding" => "WinAnsiEncoding",
    });
    Ok(LoadedFont::Standard { family, object })
}

/// Embeds a TrueType font file as a composite font with identity encoding.
pub fn load_truetype(doc: &mut Document, path: &str) -> UnmarkResult<LoadedFont> {
    let data = std::fs::read(path).map_err(|source| UnmarkError::Io {
        path: path.into(),
        source,
    })?;
    if ttf_parser::fonts_in_collection(&data).is_some() {
        return Err(UnmarkError::toolkit(
            "load_font",
            format!("{}: font collections cannot be embedded", path),
        ));
    }
    let face = parse_face(&data)?;
    if face.tables().cff.is_some() {
        return Err(UnmarkError::toolkit(
            "load_font",
            format!("{}: CFF outlines cannot be embedded", path),
        ));
    }

    let units_per_em = f64::from(face.units_per_em().max(1));
    let scale = |v: i16| (f64::from(v) * 1000.0 / units_per_em).round() as i64;
    let bbox = face.global_bounding_box();
    let base_name = postscript_name(&face).unwrap_or_else(|| "UnmarkEmbedded".to_string());
    debug!("Embedding TrueType font {} from {}", base_name, path);

    let file = doc.add_object(Stream::new(
        dictionary! { "Length1" => Object::Integer(data.len() as i64) },
        data.clone(),
    ));
    let descriptor = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(base_name.clone().into_bytes()),
        "Flags" => Object::Integer(4),
        "FontBBox" => Object::Array(vec![
            Object::Integer(scale(bbox.x_min)),
            Object::Integer(scale(bbox.y_min)),
            Object::Integer(scale(bbox.x_max)),
            Object::Integer(scale(bbox.y_max)),
        ]),
        "ItalicAngle" => Object::Integer(0),
        "Ascent" => Object::Integer(scale(face.ascender())),
        "Descent" => Object::Integer(scale(face.descender())),
        "CapHeight" => Object::Integer(scale(face.ascender())),
        "StemV" => Object::Integer(80),
        "FontFile2" => file,
    });
    let descendant = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => Object::Name(base_name.clone().into_bytes()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => Object::Integer(0),
        },
        "FontDescriptor" => descriptor,
        "DW" => Object::Integer(1000),
        "W" => Object::Array(Vec::new()),
        "CIDToGIDMap" => "Identity",
    });
    let to_unicode = doc.add_object(Stream::new(dictionary! {}, write_to_unicode(&[])));
    let object = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => Object::Name(base_name.into_bytes()),
        "Encoding" => "Identity-H",
        "DescendantFonts" => Object::Array(vec![Object::Reference(descendant)]),
        "ToUnicode" => to_unicode,
    });

    Ok(LoadedFont::TrueType {
        data,
        units_per_em,
        object,
        descendant,
        descriptor,
        file,
        to_unicode,
        used: BTreeMap::new(),
    })
}

fn postscript_name(face: &Face<'_>) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|n| n.name_id == name_id::POST_SCRIPT_NAME)
        .find_map(|n| n.to_string())
        .map(|s| s.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect::<String>())
        .filter(|s| !s.is_empty())
}

/// Adds an image XObject for encoded image bytes, with a soft mask when the
/// image carries alpha.
pub fn add_image(doc: &mut Document, bytes: &[u8]) -> UnmarkResult<ObjectId> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| UnmarkError::element("image overlay", format!("unreadable image: {}", e)))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = (i64::from(rgb.width()), i64::from(rgb.height()));

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => Object::Integer(width),
        "Height" => Object::Integer(height),
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => Object::Integer(8),
    };
    if decoded.color().has_alpha() {
        let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p.0[3]).collect();
        let mask = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(width),
                "Height" => Object::Integer(height),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => Object::Integer(8),
            },
            alpha,
        ));
        dict.set("SMask", mask);
    }
    Ok(doc.add_object(Stream::new(dict, rgb.into_raw())))
}

/// A 1x1 image that draws nothing.
pub fn blank_image(doc: &mut Document) -> Stream {
    let gray_pixel = || {
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(1),
            "Height" => Object::Integer(1),
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => Object::Integer(8),
        }
    };
    let mask = doc.add_object(Stream::new(gray_pixel(), vec![0]));
    let mut dict = gray_pixel();
    dict.set("SMask", mask);
    Stream::new(dict, vec![0])
}

/// Adds a transparency state for fill and stroke `opacity`.
pub fn add_opacity_state(doc: &mut Document, opacity: f64) -> ObjectId {
    let alpha = opacity.clamp(0.0, 1.0);
    doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(alpha as _),
        "CA" => Object::Real(alpha as _),
    })
}

/// Shortest decimal form of `v` with at most four fraction digits.
pub fn num(v: f64) -> String {
    let text = format!("{:.4}", v);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Converts a top-left page point to PDF user space.
fn to_user(page_box: Rect, p: Point) -> Point {
    Point::new(page_box.x0 + p.x, page_box.y1 - p.y)
}

fn rotation_about(pivot: Point, degrees: f64) -> Matrix {
    Matrix::translate(-pivot.x, -pivot.y)
        .then(&Matrix::rotate(degrees))
        .then(&Matrix::translate(pivot.x, pivot.y))
}

fn matrix_operator(m: &Matrix) -> String {
    let v = m.to_array();
    format!(
        "{} {} {} {} {} {} cm\n",
        num(v[0]),
        num(v[1]),
        num(v[2]),
        num(v[3]),
        num(v[4]),
        num(v[5])
    )
}

/// Operators drawing `hex` (already encoded for `font_resource`).
pub fn text_content(
    placement: &TextPlacement,
    font_resource: &str,
    hex: &str,
    state_resource: Option<&str>,
    page_box: Rect,
) -> Vec<u8> {
    let origin = to_user(page_box, placement.origin);
    let mut out = String::from("q\n");
    if let Some(gs) = state_resource {
        out.push_str(&format!("/{} gs\n", gs));
    }
    let c = placement.color;
    out.push_str(&format!("{} {} {} rg\n", num(c.r), num(c.g), num(c.b)));
    if placement.rotation_degrees != 0.0 {
        let pivot = to_user(page_box, placement.pivot);
        out.push_str(&matrix_operator(&rotation_about(pivot, placement.rotation_degrees)));
    }
    out.push_str(&format!(
        "BT\n/{} {} Tf\n{} {} Td\n<{}> Tj\nET\nQ\n",
        font_resource,
        num(placement.fontsize),
        num(origin.x),
        num(origin.y),
        hex
    ));
    out.into_bytes()
}

/// Operators painting image `image_resource` into the placement rectangle.
pub fn image_content(
    placement: &ImagePlacement,
    image_resource: &str,
    state_resource: Option<&str>,
    page_box: Rect,
) -> Vec<u8> {
    let rect = placement.rect;
    let bottom_left = to_user(page_box, Point::new(rect.x0, rect.y1));
    let mut m = Matrix::scale(rect.width(), rect.height())
        .then(&Matrix::translate(bottom_left.x, bottom_left.y));
    if placement.rotation_degrees != 0.0 {
        let center = to_user(page_box, rect.center());
        m = m.then(&rotation_about(center, placement.rotation_degrees));
    }
    let mut out = String::from("q\n");
    if let Some(gs) = state_resource {
        out.push_str(&format!("/{} gs\n", gs));
    }
    out.push_str(&matrix_operator(&m));
    out.push_str(&format!("/{} Do\nQ\n", image_resource));
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Color;
    use crate::editing::toolkit::FontHandle;

    #[test]
    fn test_num_formatting() {
        assert_eq!(num(12.0), "12");
        assert_eq!(num(0.5), "0.5");
        assert_eq!(num(-0.00001), "0");
        assert_eq!(num(1.23456), "1.2346");
    }

    #[test]
    fn test_text_content_flips_y() {
        let placement = TextPlacement {
            text: "DRAFT".to_string(),
            origin: Point::new(100.0, 200.0),
            fontsize: 12.0,
            font: FontHandle {
                id: 0,
                name: "F0".to_string(),
            },
            color: Color::BLACK,
            rotation_degrees: 0.0,
            pivot: Point::new(100.0, 200.0),
            opacity: 1.0,
            overlay: true,
        };
        let content = text_content(&placement, "UnmarkF0", "4142", None, Rect::new(0.0, 0.0, 612.0, 792.0));
        let text = String::from_utf8(content).unwrap();
        assert!(text.contains("/UnmarkF0 12 Tf\n100 592 Td\n<4142> Tj"));
        assert!(!text.contains(" cm"));
    }

    #[test]
    fn test_image_content_places_rect() {
        let placement = ImagePlacement {
            rect: Rect::new(10.0, 20.0, 110.0, 70.0),
            bytes: Vec::new(),
            rotation_degrees: 0.0,
            opacity: 0.5,
            overlay: true,
        };
        let content = image_content(&placement, "UnmarkIm1", Some("UnmarkGs1"), Rect::new(0.0, 0.0, 200.0, 100.0));
        let text = String::from_utf8(content).unwrap();
        assert_eq!(text, "q\n/UnmarkGs1 gs\n100 0 0 50 10 30 cm\n/UnmarkIm1 Do\nQ\n");
    }

    #[test]
    fn test_standard_font_encoding_and_width() {
        let mut doc = Document::with_version("1.5");
        let mut font = load_standard(&mut doc, "helv").unwrap();
        assert_eq!(font.encode("A€").unwrap(), ("4180".to_string(), false));
        assert!((font.text_width("AA", 10.0).unwrap() - 13.34).abs() < 1e-9);
        assert!(load_standard(&mut doc, "song").is_err());
    }
}
