//! Walks a page's content and records what it draws.
//!
//! Positions come out in top-left page space. Only the operators that place
//! text, images and vector paths are interpreted; everything else passes
//! through untouched.

use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use log::debug;
use lopdf::{Dictionary, Document, ObjectId};

use super::fonts::FontInfo;
use super::lexer::{tokenize, Operand, Operation};
use super::{name_entry, resolve, stream_bytes};
use crate::content::{Encoding, Glyph, TextTrace};
use crate::domain::{Color, Matrix, Point, Rect};

/// Form XObjects nested deeper than this are not entered.
const MAX_FORM_DEPTH: usize = 8;

/// Content a record was drawn by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Page,
    /// The `run`-th execution (from 0) of a form XObject on the page.
    Form { id: Option<ObjectId>, run: usize },
}

/// One show instruction.
#[derive(Debug, Clone)]
pub struct ShowRecord {
    pub glyphs: Vec<Glyph>,
    pub bbox: Rect,
    pub code_width: usize,
    /// Encoding of the first string operand.
    pub encoding: Encoding,
    pub source: Source,
    /// Text object the instruction belongs to, counted across the page.
    pub block: usize,
    pub baseline: f64,
    pub start_x: f64,
    pub end_x: f64,
    pub font: String,
    pub size: f64,
    pub color: Color,
    /// Byte span in the page content; `None` inside form XObjects.
    pub span: Option<Range<usize>>,
}

impl ShowRecord {
    pub fn trace(&self) -> TextTrace {
        TextTrace::new(self.glyphs.clone(), self.bbox)
            .with_code_width(self.code_width)
            .with_encoding(self.encoding)
    }

    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.unicode).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ImageRecord {
    /// Object number of the image XObject; 0 for inline images.
    pub xref: u32,
    pub bbox: Rect,
    pub width: u32,
    pub height: u32,
    pub span: Option<Range<usize>>,
}

#[derive(Debug, Clone)]
pub struct PathRecord {
    pub bbox: Rect,
    /// Construction operators in the path.
    pub items: usize,
    pub fill: bool,
    pub stroke: bool,
    pub span: Option<Range<usize>>,
}

/// Everything drawn by one page.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub shows: Vec<ShowRecord>,
    pub images: Vec<ImageRecord>,
    pub paths: Vec<PathRecord>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: Color,
    font: Option<Rc<FontInfo>>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
}

impl GraphicsState {
    fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            fill: Color::BLACK,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Default)]
struct PathBuilder {
    points: Vec<Point>,
    items: usize,
    start: Option<usize>,
}

/// Interprets page content against a document's resources.
pub struct Interpreter<'a> {
    doc: &'a Document,
    fonts: HashMap<ObjectId, Rc<FontInfo>>,
    form_runs: HashMap<Option<ObjectId>, usize>,
    blocks: usize,
    out: PageContent,
}

impl<'a> Interpreter<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            fonts: HashMap::new(),
            form_runs: HashMap::new(),
            blocks: 0,
            out: PageContent::default(),
        }
    }

    /// Interprets `content` with `resources`. `page_box` is the media box in
    /// PDF user space; output is relative to its top-left corner.
    pub fn run(mut self, content: &[u8], resources: &Dictionary, page_box: Rect) -> PageContent {
        let flip = Matrix::new(1.0, 0.0, 0.0, -1.0, -page_box.x0, page_box.y1);
        self.execute(content, resources, GraphicsState::new(flip), Source::Page, 0);
        self.out
    }

    fn execute(
        &mut self,
        content: &[u8],
        resources: &Dictionary,
        initial: GraphicsState,
        source: Source,
        depth: usize,
    ) {
        let top_level = depth == 0;
        let span_of = |op: &Operation| top_level.then(|| op.span.clone());

        let mut state = initial;
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut text_matrix = Matrix::IDENTITY;
        let mut line_matrix = Matrix::IDENTITY;
        let mut path = PathBuilder::default();

        for op in tokenize(content) {
            match op.operator.as_str() {
                "q" => stack.push(state.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_operands(&op) {
                        state.ctm = m.then(&state.ctm);
                    }
                }
                "rg" | "g" | "k" | "sc" | "scn" => {
                    if let Some(color) = fill_color(&op) {
                        state.fill = color;
                    }
                }
                "BT" => {
                    text_matrix = Matrix::IDENTITY;
                    line_matrix = Matrix::IDENTITY;
                    self.blocks += 1;
                }
                "Tf" => {
                    if let Some(name) = op.operands.first().and_then(Operand::as_name) {
                        state.font = Some(self.font(resources, name));
                    }
                    state.font_size = op.number(1).unwrap_or(state.font_size);
                }
                "Tc" => state.char_spacing = op.number(0).unwrap_or(0.0),
                "Tw" => state.word_spacing = op.number(0).unwrap_or(0.0),
                "Tz" => state.horizontal_scale = op.number(0).unwrap_or(100.0) / 100.0,
                "TL" => state.leading = op.number(0).unwrap_or(0.0),
                "Ts" => state.rise = op.number(0).unwrap_or(0.0),
                "Td" | "TD" => {
                    let (tx, ty) = (op.number(0).unwrap_or(0.0), op.number(1).unwrap_or(0.0));
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    line_matrix = Matrix::translate(tx, ty).then(&line_matrix);
                    text_matrix = line_matrix;
                }
                "Tm" => {
                    if let Some(m) = matrix_operands(&op) {
                        line_matrix = m;
                        text_matrix = m;
                    }
                }
                "T*" => {
                    line_matrix = Matrix::translate(0.0, -state.leading).then(&line_matrix);
                    text_matrix = line_matrix;
                }
                "Tj" | "'" | "\"" | "TJ" => {
                    if op.operator == "\"" {
                        state.word_spacing = op.number(0).unwrap_or(state.word_spacing);
                        state.char_spacing = op.number(1).unwrap_or(state.char_spacing);
                    }
                    if op.operator == "'" || op.operator == "\"" {
                        line_matrix = Matrix::translate(0.0, -state.leading).then(&line_matrix);
                        text_matrix = line_matrix;
                    }
                    let Some(operand) = op.operands.last() else {
                        continue;
                    };
                    self.show(operand, &state, &mut text_matrix, source, span_of(&op));
                }
                "m" | "l" | "c" | "v" | "y" | "re" => {
                    let Some(values) = op.numbers() else { continue };
                    path.start.get_or_insert(op.span.start);
                    path.items += 1;
                    let points: Vec<Point> = if op.operator == "re" && values.len() == 4 {
                        let (x, y, w, h) = (values[0], values[1], values[2], values[3]);
                        vec![
                            Point::new(x, y),
                            Point::new(x + w, y),
                            Point::new(x, y + h),
                            Point::new(x + w, y + h),
                        ]
                    } else {
                        values.chunks(2).filter(|c| c.len() == 2).map(|c| Point::new(c[0], c[1])).collect()
                    };
                    path.points.extend(points.into_iter().map(|p| state.ctm.apply(p)));
                }
                "h" => {}
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" | "n" => {
                    let finished = std::mem::take(&mut path);
                    if op.operator == "n" {
                        continue;
                    }
                    let Some(bbox) = Rect::bounding(finished.points) else {
                        continue;
                    };
                    let start = finished.start.unwrap_or(op.span.start);
                    self.out.paths.push(PathRecord {
                        bbox,
                        items: finished.items,
                        fill: !matches!(op.operator.as_str(), "S" | "s"),
                        stroke: !matches!(op.operator.as_str(), "f" | "F" | "f*"),
                        span: top_level.then(|| start..op.span.end),
                    });
                }
                "Do" => {
                    if let Some(name) = op.operands.first().and_then(Operand::as_name) {
                        self.invoke(resources, name, &state, depth, span_of(&op));
                    }
                }
                "BI" => {
                    let (width, height) = match op.operands.first() {
                        Some(Operand::Dict(entries)) => (
                            inline_dimension(entries, "W", "Width"),
                            inline_dimension(entries, "H", "Height"),
                        ),
                        _ => (0, 0),
                    };
                    self.out.images.push(ImageRecord {
                        xref: 0,
                        bbox: state.ctm.apply_rect(&Rect::new(0.0, 0.0, 1.0, 1.0)),
                        width,
                        height,
                        span: span_of(&op),
                    });
                }
                _ => {}
            }
        }
    }

    /// Records one string or show array and advances the text matrix.
    fn show(
        &mut self,
        operand: &Operand,
        state: &GraphicsState,
        text_matrix: &mut Matrix,
        source: Source,
        span: Option<Range<usize>>,
    ) {
        let font = state
            .font
            .clone()
            .unwrap_or_else(|| Rc::new(FontInfo::fallback("unknown")));
        let size = state.font_size;
        let scale = state.horizontal_scale;
        let origin = text_matrix.then(&state.ctm).apply(Point::new(0.0, state.rise));

        let mut glyphs = Vec::new();
        let mut bbox: Option<Rect> = None;
        let mut place = |bytes: &[u8], tm: &mut Matrix| {
            for glyph in font.decode(bytes) {
                let w0 = font.width(glyph.code) / 1000.0;
                let glyph_box = Rect::new(
                    0.0,
                    state.rise + font.descent / 1000.0 * size,
                    w0 * size * scale,
                    state.rise + font.ascent / 1000.0 * size,
                );
                let placed = tm.then(&state.ctm).apply_rect(&glyph_box);
                bbox = Some(bbox.map_or(placed, |b| b.union(&placed)));
                let spacing = if font.code_width == 1 && glyph.code == 32 {
                    state.word_spacing
                } else {
                    0.0
                };
                let advance = (w0 * size + state.char_spacing + spacing) * scale;
                *tm = Matrix::translate(advance, 0.0).then(tm);
                glyphs.push(glyph);
            }
        };

        let encoding_of = |operand: &Operand| match operand {
            Operand::HexStr(_) => Some(Encoding::Hex),
            Operand::Str(_) => Some(Encoding::Literal),
            _ => None,
        };
        let encoding = match operand {
            Operand::Array(items) => items.iter().find_map(encoding_of),
            other => encoding_of(other),
        };
        let Some(encoding) = encoding else { return };

        match operand {
            Operand::Str(bytes) | Operand::HexStr(bytes) => place(bytes, text_matrix),
            Operand::Array(items) => {
                for item in items {
                    match item {
                        Operand::Str(bytes) | Operand::HexStr(bytes) => place(bytes, text_matrix),
                        Operand::Number(adjust) => {
                            let advance = -adjust / 1000.0 * size * scale;
                            *text_matrix = Matrix::translate(advance, 0.0).then(text_matrix);
                        }
                        _ => {}
                    }
                }
            }
            _ => return,
        }

        let end = text_matrix.then(&state.ctm).apply(Point::new(0.0, state.rise));
        let Some(bbox) = bbox else { return };
        self.out.shows.push(ShowRecord {
            glyphs,
            bbox,
            code_width: font.code_width,
            encoding,
            source,
            block: self.blocks,
            baseline: origin.y,
            start_x: origin.x,
            end_x: end.x,
            font: font.base_font.clone(),
            size: size * state.ctm.vertical_scale(),
            color: state.fill,
            span,
        });
    }

    fn font(&mut self, resources: &Dictionary, name: &str) -> Rc<FontInfo> {
        let Some((id, dict)) = name_entry(self.doc, resources, b"Font", name)
            .and_then(|(id, obj)| Some((id?, obj.as_dict().ok()?)))
        else {
            debug!("Font resource /{} not found, using fallback metrics", name);
            return Rc::new(FontInfo::fallback(name));
        };
        self.fonts
            .entry(id)
            .or_insert_with(|| Rc::new(FontInfo::load(self.doc, dict)))
            .clone()
    }

    fn invoke(
        &mut self,
        resources: &Dictionary,
        name: &str,
        state: &GraphicsState,
        depth: usize,
        span: Option<Range<usize>>,
    ) {
        let Some((id, object)) = name_entry(self.doc, resources, b"XObject", name) else {
            return;
        };
        let Ok(stream) = object.as_stream() else { return };
        let subtype = stream.dict.get(b"Subtype").ok().and_then(|o| o.as_name_str().ok());
        match subtype {
            Some("Image") => {
                let dimension = |key: &[u8]| {
                    stream
                        .dict
                        .get(key)
                        .ok()
                        .and_then(|o| o.as_i64().ok())
                        .and_then(|v| u32::try_from(v).ok())
                        .unwrap_or(0)
                };
                self.out.images.push(ImageRecord {
                    xref: id.map_or(0, |id| id.0),
                    bbox: state.ctm.apply_rect(&Rect::new(0.0, 0.0, 1.0, 1.0)),
                    width: dimension(b"Width"),
                    height: dimension(b"Height"),
                    span,
                });
            }
            Some("Form") if depth < MAX_FORM_DEPTH => {
                let Ok(content) = stream_bytes(stream) else {
                    debug!("Form XObject /{} could not be decoded", name);
                    return;
                };
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .map(|o| resolve(self.doc, o))
                    .and_then(|o| o.as_dict().ok())
                    .unwrap_or(resources);
                let mut inner = state.clone();
                if let Some(m) = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|o| o.as_array().ok())
                    .and_then(|a| a.iter().map(super::number).collect::<Option<Vec<f64>>>())
                    .filter(|v| v.len() == 6)
                {
                    inner.ctm = Matrix::new(m[0], m[1], m[2], m[3], m[4], m[5]).then(&state.ctm);
                }
                let runs = self.form_runs.entry(id).or_insert(0);
                let run = *runs;
                *runs += 1;
                self.execute(&content, form_resources, inner, Source::Form { id, run }, depth + 1);
            }
            _ => {}
        }
    }
}

fn matrix_operands(op: &Operation) -> Option<Matrix> {
    let v = op.numbers().filter(|v| v.len() == 6)?;
    Some(Matrix::new(v[0], v[1], v[2], v[3], v[4], v[5]))
}

fn fill_color(op: &Operation) -> Option<Color> {
    let v = op.numbers()?;
    match v.as_slice() {
        [gray] => Some(Color {
            r: *gray,
            g: *gray,
            b: *gray,
        }),
        [r, g, b] => Some(Color { r: *r, g: *g, b: *b }),
        [c, m, y, k] => Some(Color {
            r: (1.0 - c) * (1.0 - k),
            g: (1.0 - m) * (1.0 - k),
            b: (1.0 - y) * (1.0 - k),
        }),
        _ => None,
    }
}

fn inline_dimension(entries: &[(String, Operand)], short: &str, long: &str) -> u32 {
    entries
        .iter()
        .find(|(k, _)| k == short || k == long)
        .and_then(|(_, v)| v.as_number())
        .map_or(0, |v| v.max(0.0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(content: &[u8]) -> PageContent {
        let doc = Document::with_version("1.5");
        Interpreter::new(&doc).run(content, &Dictionary::new(), Rect::new(0.0, 0.0, 200.0, 100.0))
    }

    #[test]
    fn test_text_position_is_top_left() {
        let page = run(b"BT /F1 10 Tf 20 80 Td (Hi) Tj ET");
        assert_eq!(page.shows.len(), 1);
        let show = &page.shows[0];
        assert_eq!(show.text(), "Hi");
        assert!((show.baseline - 20.0).abs() < 1e-9);
        assert!((show.start_x - 20.0).abs() < 1e-9);
        // fallback metrics: H = 722, i = 222
        assert!((show.end_x - (20.0 + 9.44)).abs() < 1e-9);
        assert!(show.bbox.y0 < 20.0 && show.bbox.y1 > 20.0);
        assert_eq!(show.span, Some(22..29));
    }

    #[test]
    fn test_show_array_counts_as_one_record() {
        let page = run(b"BT /F1 10 Tf [(A) -500 (B)] TJ (C) ' ET");
        assert_eq!(page.shows.len(), 2);
        assert_eq!(page.shows[0].text(), "AB");
        assert_eq!(page.shows[1].text(), "C");
        assert_eq!(page.shows[0].block, page.shows[1].block);
    }

    #[test]
    fn test_show_records_operand_encoding() {
        let page = run(b"BT /F1 10 Tf <4869> Tj [-20 (A) <42>] TJ ET");
        assert_eq!(page.shows[0].text(), "Hi");
        assert_eq!(page.shows[0].encoding, Encoding::Hex);
        assert_eq!(page.shows[1].encoding, Encoding::Literal);
        assert_eq!(page.shows[1].source, Source::Page);
        assert_eq!(page.shows[0].trace().encoding, Encoding::Hex);
    }

    #[test]
    fn test_paths_and_clips() {
        let page = run(b"0 0 1 rg 10 10 50 20 re f 0 0 m 5 5 l W n 1 1 m 2 2 l S");
        assert_eq!(page.paths.len(), 2);
        let rect = &page.paths[0];
        assert_eq!(rect.bbox, Rect::new(10.0, 70.0, 60.0, 90.0));
        assert!(rect.fill && !rect.stroke);
        assert_eq!(rect.span, Some(9..25));
        assert!(page.paths[1].stroke && !page.paths[1].fill);
    }

    #[test]
    fn test_inline_image_under_ctm() {
        let page = run(b"q 40 0 0 20 10 30 cm BI /W 4 /H 2 /CS /G /BPC 8 ID 12345678 EI Q");
        assert_eq!(page.images.len(), 1);
        let image = &page.images[0];
        assert_eq!(image.xref, 0);
        assert_eq!((image.width, image.height), (4, 2));
        assert_eq!(image.bbox, Rect::new(10.0, 50.0, 50.0, 70.0));
    }
}
