//! The document toolkit the editor drives.
//!
//! Parsing, enumeration, font metrics, redaction flattening, persistence and
//! rasterisation all live behind these traits. The editor only sequences
//! calls and rewrites raw stream bytes.
//!
//! Coordinates are page space with the origin at the top-left corner of the
//! page box and y growing downward.

use std::collections::BTreeMap;

use crate::content::TextTrace;
use crate::domain::{Color, FontSource, Point, Rect, SaveOptions};
use crate::error::UnmarkResult;

/// Opens documents from bytes.
pub trait PdfToolkit {
    fn open(&self, bytes: &[u8]) -> UnmarkResult<Box<dyn EditableDocument>>;
}

/// Reference to an indirect stream object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamRef {
    pub number: u32,
    pub generation: u16,
}

impl StreamRef {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl From<(u32, u16)> for StreamRef {
    fn from((number, generation): (u32, u16)) -> Self {
        Self::new(number, generation)
    }
}

impl From<StreamRef> for (u32, u16) {
    fn from(r: StreamRef) -> Self {
        (r.number, r.generation)
    }
}

/// The show instructions whose bytes live in one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTraces {
    pub stream: StreamRef,
    /// In content order.
    pub traces: Vec<TextTrace>,
}

impl StreamTraces {
    pub fn new(stream: StreamRef, traces: Vec<TextTrace>) -> Self {
        Self { stream, traces }
    }
}

/// Page box size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
}

impl PageGeometry {
    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

/// One span of uniformly styled text, positioned in the block/line/span
/// structure of the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub block: usize,
    pub line: usize,
    pub span: usize,
    pub text: String,
    pub bbox: Rect,
    pub font: String,
    pub size: f64,
    pub color: Color,
}

/// An image drawn on the page. `xref` is 0 for inline images.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub xref: u32,
    pub bbox: Rect,
    pub width: u32,
    pub height: u32,
}

/// One path painting sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawingInfo {
    pub bbox: Rect,
    /// Path construction operations in the sequence.
    pub items: usize,
    pub fill: bool,
    pub stroke: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetInfo {
    pub xref: u32,
    pub field_name: Option<String>,
    pub field_type: Option<String>,
    pub bbox: Rect,
}

impl WidgetInfo {
    pub fn is_signature(&self) -> bool {
        self.field_type.as_deref() == Some("Sig")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub bbox: Rect,
    pub uri: Option<String>,
}

/// Any annotation, widgets and links included.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationInfo {
    pub xref: u32,
    pub subtype: String,
    pub bbox: Rect,
}

impl AnnotationInfo {
    pub fn is_widget_or_link(&self) -> bool {
        self.subtype == "Widget" || self.subtype == "Link"
    }
}

/// Which content a redaction pass may remove inside marked regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedactionScope {
    pub text: bool,
    pub images: bool,
    pub graphics: bool,
}

impl RedactionScope {
    /// Vector graphics only.
    pub const GRAPHICS: RedactionScope = RedactionScope {
        text: false,
        images: false,
        graphics: true,
    };
}

/// Permission flags of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub print: bool,
    pub modify: bool,
    pub copy: bool,
    pub annotate: bool,
    pub form: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            print: true,
            modify: true,
            copy: true,
            annotate: true,
            form: true,
        }
    }
}

/// Document level facts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    /// Info dictionary entries, keyed by lowercase name.
    pub info: BTreeMap<String, String>,
    pub version: String,
    pub encrypted: bool,
    pub permissions: Permissions,
    pub layers: Vec<u32>,
    pub has_forms: bool,
    /// Distinct font names used by the pages.
    pub fonts: Vec<String>,
}

/// A font loaded into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontHandle {
    pub id: usize,
    pub name: String,
}

/// A text run to draw. `origin` is the baseline start before rotation;
/// the rotation pivots on `pivot`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPlacement {
    pub text: String,
    pub origin: Point,
    pub fontsize: f64,
    pub font: FontHandle,
    pub color: Color,
    pub rotation_degrees: f64,
    pub pivot: Point,
    pub opacity: f64,
    pub overlay: bool,
}

/// An encoded image to draw into `rect`, rotated about the rect centre.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    pub rect: Rect,
    pub bytes: Vec<u8>,
    pub rotation_degrees: f64,
    pub opacity: f64,
    pub overlay: bool,
}

/// One open document.
///
/// Pages are addressed by zero-based index. Enumeration order is stable
/// for the lifetime of the document until the page is mutated.
pub trait EditableDocument {
    fn page_count(&self) -> usize;

    fn page_geometry(&self, page: usize) -> UnmarkResult<PageGeometry>;

    fn metadata(&self) -> UnmarkResult<DocumentMetadata>;

    /// Show instructions of the page grouped by the stream holding them.
    ///
    /// A form XObject drawn more than once contributes the instructions of
    /// its first execution only.
    fn text_traces(&self, page: usize) -> UnmarkResult<Vec<StreamTraces>>;

    fn text_spans(&self, page: usize) -> UnmarkResult<Vec<TextSpan>>;

    fn images(&self, page: usize) -> UnmarkResult<Vec<ImageInfo>>;

    fn drawings(&self, page: usize) -> UnmarkResult<Vec<DrawingInfo>>;

    fn widgets(&self, page: usize) -> UnmarkResult<Vec<WidgetInfo>>;

    fn links(&self, page: usize) -> UnmarkResult<Vec<LinkInfo>>;

    fn annotations(&self, page: usize) -> UnmarkResult<Vec<AnnotationInfo>>;

    /// The page's own content streams.
    fn content_streams(&self, page: usize) -> UnmarkResult<Vec<StreamRef>>;

    /// Form XObjects referenced directly by the page's resources.
    fn xobject_streams(&self, page: usize) -> UnmarkResult<Vec<StreamRef>>;

    fn delete_widget(&mut self, page: usize, xref: u32) -> UnmarkResult<()>;

    /// Deletes the link at `index` of [`EditableDocument::links`].
    fn delete_link(&mut self, page: usize, index: usize) -> UnmarkResult<()>;

    fn delete_annotation(&mut self, page: usize, xref: u32) -> UnmarkResult<()>;

    /// Makes the image object `xref` draw nothing on the page.
    fn delete_image(&mut self, page: usize, xref: u32) -> UnmarkResult<()>;

    /// Marks `rect` for removal by the next [`EditableDocument::apply_redactions`].
    fn add_redaction_mark(&mut self, page: usize, rect: Rect) -> UnmarkResult<()>;

    /// Removes content of `scope` inside the marked regions and clears the
    /// marks; returns how many content elements were removed.
    fn apply_redactions(&mut self, page: usize, scope: RedactionScope) -> UnmarkResult<usize>;

    /// Merges the page's content streams into one.
    fn normalize_contents(&mut self, page: usize) -> UnmarkResult<()>;

    /// Decoded bytes of a stream.
    fn read_stream(&self, stream: StreamRef) -> UnmarkResult<Vec<u8>>;

    /// Replaces the decoded bytes of a stream.
    fn write_stream(&mut self, stream: StreamRef, data: Vec<u8>) -> UnmarkResult<()>;

    fn load_font(&mut self, source: &FontSource) -> UnmarkResult<FontHandle>;

    fn text_width(&self, font: &FontHandle, text: &str, fontsize: f64) -> UnmarkResult<f64>;

    fn insert_text(&mut self, page: usize, placement: &TextPlacement) -> UnmarkResult<()>;

    fn insert_image(&mut self, page: usize, placement: &ImagePlacement) -> UnmarkResult<()>;

    fn set_layer_visibility(&mut self, xref: u32, visible: bool) -> UnmarkResult<()>;

    /// Reduces fonts embedded for overlays to the glyphs drawn so far.
    fn subset_fonts(&mut self) -> UnmarkResult<()>;

    fn save(&mut self, options: &SaveOptions) -> UnmarkResult<Vec<u8>>;

    /// PNG raster of the page, without alpha.
    fn render_png(&self, page: usize, scale: f32) -> UnmarkResult<Vec<u8>>;
}
