//! In-memory document that records every mutation.
//!
//! Used to verify stage ordering and failure policies without a real PDF.

use std::collections::BTreeMap;

use unmark::content::{Encoding, Glyph, TextTrace};
use unmark::domain::{FontSource, Rect, SaveOptions};
use unmark::editing::toolkit::{
    AnnotationInfo, DocumentMetadata, DrawingInfo, EditableDocument, FontHandle, ImageInfo,
    ImagePlacement, LinkInfo, PageGeometry, RedactionScope, StreamRef, StreamTraces,
    TextPlacement, TextSpan, WidgetInfo,
};
use unmark::{UnmarkError, UnmarkResult};

/// Everything the fake reports for one page.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub traces: Vec<StreamTraces>,
    pub spans: Vec<TextSpan>,
    pub images: Vec<ImageInfo>,
    pub drawings: Vec<DrawingInfo>,
    pub widgets: Vec<WidgetInfo>,
    pub links: Vec<LinkInfo>,
    pub annotations: Vec<AnnotationInfo>,
    pub streams: Vec<StreamRef>,
    pub xobjects: Vec<StreamRef>,
}

#[derive(Debug, Default)]
pub struct FakeDocument {
    pub pages: Vec<FakePage>,
    pub streams: BTreeMap<StreamRef, Vec<u8>>,
    /// Mutating calls, in order, as `name:page` (or `name:arg`).
    pub calls: Vec<String>,
    pub marks: Vec<(usize, Rect)>,
    pub hidden_layers: Vec<u32>,
    pub texts: Vec<(usize, TextPlacement)>,
    pub images: Vec<(usize, ImagePlacement)>,
    /// Font sources whose loading fails.
    pub broken_fonts: Vec<FontSource>,
    /// Widget xrefs whose deletion fails.
    pub broken_widgets: Vec<u32>,
    fonts: Vec<FontSource>,
}

impl FakeDocument {
    pub fn new(pages: usize) -> Self {
        Self {
            pages: vec![FakePage::default(); pages],
            ..Default::default()
        }
    }

    /// Adds a content stream with `content` to `page`; following texts are
    /// traced in it.
    pub fn with_stream(mut self, page: usize, number: u32, content: &str) -> Self {
        let stream = StreamRef::new(number, 0);
        self.pages[page].streams.push(stream);
        self.pages[page].traces.push(StreamTraces::new(stream, Vec::new()));
        self.streams.insert(stream, content.as_bytes().to_vec());
        self
    }

    /// Adds a form XObject stream drawn by `page`; following texts are
    /// traced in it.
    pub fn with_form(mut self, page: usize, number: u32, content: &str) -> Self {
        let stream = StreamRef::new(number, 0);
        self.pages[page].xobjects.push(stream);
        self.pages[page].traces.push(StreamTraces::new(stream, Vec::new()));
        self.streams.insert(stream, content.as_bytes().to_vec());
        self
    }

    /// Adds a literal, one-byte-per-character trace for `text` at `bbox` to
    /// the last added stream, and a matching span.
    pub fn with_text(mut self, page: usize, text: &str, bbox: Rect) -> Self {
        let glyphs = text.chars().map(|c| Glyph::new(u32::from(c), c)).collect();
        let trace = TextTrace::new(glyphs, bbox)
            .with_code_width(1)
            .with_encoding(Encoding::Literal);
        match self.pages[page].traces.last_mut() {
            Some(group) => group.traces.push(trace),
            None => self.pages[page]
                .traces
                .push(StreamTraces::new(StreamRef::new(0, 0), vec![trace])),
        }
        let line = self.pages[page].spans.len();
        self.pages[page].spans.push(TextSpan {
            block: 0,
            line,
            span: 0,
            text: text.to_string(),
            bbox,
            font: "Helvetica".to_string(),
            size: 12.0,
            color: Default::default(),
        });
        self
    }

    pub fn page_mut(&mut self, page: usize) -> &mut FakePage {
        &mut self.pages[page]
    }

    pub fn stream_text(&self, number: u32) -> String {
        self.streams
            .get(&StreamRef::new(number, 0))
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .unwrap_or_default()
    }

    /// Position of the first call starting with `prefix`.
    pub fn call_index(&self, prefix: &str) -> Option<usize> {
        self.calls.iter().position(|c| c.starts_with(prefix))
    }

    fn page(&self, page: usize) -> UnmarkResult<&FakePage> {
        self.pages
            .get(page)
            .ok_or_else(|| UnmarkError::invalid_input("page_index", format!("invalid page {}", page)))
    }

    fn record(&mut self, call: String) {
        self.calls.push(call);
    }
}

impl EditableDocument for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_geometry(&self, page: usize) -> UnmarkResult<PageGeometry> {
        self.page(page)?;
        Ok(PageGeometry {
            width: 612.0,
            height: 792.0,
        })
    }

    fn metadata(&self) -> UnmarkResult<DocumentMetadata> {
        Ok(DocumentMetadata {
            version: "1.7".to_string(),
            ..Default::default()
        })
    }

    fn text_traces(&self, page: usize) -> UnmarkResult<Vec<StreamTraces>> {
        Ok(self.page(page)?.traces.clone())
    }

    fn text_spans(&self, page: usize) -> UnmarkResult<Vec<TextSpan>> {
        Ok(self.page(page)?.spans.clone())
    }

    fn images(&self, page: usize) -> UnmarkResult<Vec<ImageInfo>> {
        Ok(self.page(page)?.images.clone())
    }

    fn drawings(&self, page: usize) -> UnmarkResult<Vec<DrawingInfo>> {
        Ok(self.page(page)?.drawings.clone())
    }

    fn widgets(&self, page: usize) -> UnmarkResult<Vec<WidgetInfo>> {
        Ok(self.page(page)?.widgets.clone())
    }

    fn links(&self, page: usize) -> UnmarkResult<Vec<LinkInfo>> {
        Ok(self.page(page)?.links.clone())
    }

    fn annotations(&self, page: usize) -> UnmarkResult<Vec<AnnotationInfo>> {
        Ok(self.page(page)?.annotations.clone())
    }

    fn content_streams(&self, page: usize) -> UnmarkResult<Vec<StreamRef>> {
        Ok(self.page(page)?.streams.clone())
    }

    fn xobject_streams(&self, page: usize) -> UnmarkResult<Vec<StreamRef>> {
        Ok(self.page(page)?.xobjects.clone())
    }

    fn delete_widget(&mut self, page: usize, xref: u32) -> UnmarkResult<()> {
        self.record(format!("delete_widget:{}", xref));
        if self.broken_widgets.contains(&xref) {
            return Err(UnmarkError::element(format!("widget {}", xref), "locked"));
        }
        self.pages[page].widgets.retain(|w| w.xref != xref);
        Ok(())
    }

    fn delete_link(&mut self, page: usize, index: usize) -> UnmarkResult<()> {
        self.record(format!("delete_link:{}", index));
        self.pages[page].links.remove(index);
        Ok(())
    }

    fn delete_annotation(&mut self, page: usize, xref: u32) -> UnmarkResult<()> {
        self.record(format!("delete_annotation:{}", xref));
        self.pages[page].annotations.retain(|a| a.xref != xref);
        Ok(())
    }

    fn delete_image(&mut self, _page: usize, xref: u32) -> UnmarkResult<()> {
        self.record(format!("delete_image:{}", xref));
        Ok(())
    }

    fn add_redaction_mark(&mut self, page: usize, rect: Rect) -> UnmarkResult<()> {
        self.record(format!("add_redaction_mark:{}", page));
        self.marks.push((page, rect));
        Ok(())
    }

    fn apply_redactions(&mut self, page: usize, scope: RedactionScope) -> UnmarkResult<usize> {
        assert_eq!(scope, RedactionScope::GRAPHICS);
        self.record(format!("apply_redactions:{}", page));
        Ok(self.marks.iter().filter(|(p, _)| *p == page).count())
    }

    fn normalize_contents(&mut self, page: usize) -> UnmarkResult<()> {
        self.record(format!("normalize_contents:{}", page));
        Ok(())
    }

    fn read_stream(&self, stream: StreamRef) -> UnmarkResult<Vec<u8>> {
        self.streams
            .get(&stream)
            .cloned()
            .ok_or_else(|| UnmarkError::toolkit("read_stream", "no such stream"))
    }

    fn write_stream(&mut self, stream: StreamRef, data: Vec<u8>) -> UnmarkResult<()> {
        self.record(format!("write_stream:{}", stream.number));
        self.streams.insert(stream, data);
        Ok(())
    }

    fn load_font(&mut self, source: &FontSource) -> UnmarkResult<FontHandle> {
        if self.broken_fonts.contains(source) {
            return Err(UnmarkError::toolkit("load_font", "unreadable font"));
        }
        self.record(format!("load_font:{:?}", source));
        self.fonts.push(source.clone());
        let name = match source {
            FontSource::File(name) | FontSource::Builtin(name) => name.clone(),
        };
        Ok(FontHandle {
            id: self.fonts.len() - 1,
            name,
        })
    }

    fn text_width(&self, _font: &FontHandle, text: &str, fontsize: f64) -> UnmarkResult<f64> {
        Ok(text.chars().count() as f64 * fontsize * 0.5)
    }

    fn insert_text(&mut self, page: usize, placement: &TextPlacement) -> UnmarkResult<()> {
        self.record(format!("insert_text:{}", page));
        self.texts.push((page, placement.clone()));
        Ok(())
    }

    fn insert_image(&mut self, page: usize, placement: &ImagePlacement) -> UnmarkResult<()> {
        self.record(format!("insert_image:{}", page));
        self.images.push((page, placement.clone()));
        Ok(())
    }

    fn set_layer_visibility(&mut self, xref: u32, visible: bool) -> UnmarkResult<()> {
        self.record(format!("set_layer_visibility:{}", xref));
        if !visible {
            self.hidden_layers.push(xref);
        }
        Ok(())
    }

    fn subset_fonts(&mut self) -> UnmarkResult<()> {
        self.record("subset_fonts".to_string());
        Ok(())
    }

    fn save(&mut self, _options: &SaveOptions) -> UnmarkResult<Vec<u8>> {
        self.record("save".to_string());
        Ok(b"%PDF-fake".to_vec())
    }

    fn render_png(&self, page: usize, _scale: f32) -> UnmarkResult<Vec<u8>> {
        self.page(page)?;
        Ok(b"\x89PNG".to_vec())
    }
}
