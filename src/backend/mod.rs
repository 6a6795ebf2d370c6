//! Document toolkit backed by lopdf, with MuPDF for rasterization.
//!
//! Content streams are interpreted by a small span-aware tokenizer so that
//! redaction flattening can splice operations out of the raw bytes, the same
//! way text removal does.

pub mod embed;
pub mod fonts;
pub mod interpreter;
pub mod lexer;
pub mod render;
pub mod subset;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

use log::{debug, warn};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use self::embed::LoadedFont;
use self::interpreter::{Interpreter, PageContent, ShowRecord, Source};
use crate::domain::{FontSource, Rect, SaveOptions};
use crate::domain::config::Compaction;
use crate::editing::toolkit::{
    AnnotationInfo, DocumentMetadata, DrawingInfo, EditableDocument, FontHandle, ImageInfo,
    ImagePlacement, LinkInfo, PageGeometry, PdfToolkit, Permissions, RedactionScope, StreamRef,
    StreamTraces, TextPlacement, TextSpan, WidgetInfo,
};
use crate::error::{UnmarkError, UnmarkResult};

/// US Letter, used when a page has no usable media box.
const DEFAULT_PAGE_BOX: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// Page tree levels searched for inherited attributes.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Opens documents with lopdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfToolkit;

impl LopdfToolkit {
    pub fn new() -> Self {
        Self
    }
}

impl PdfToolkit for LopdfToolkit {
    fn open(&self, bytes: &[u8]) -> UnmarkResult<Box<dyn EditableDocument>> {
        Ok(Box::new(LopdfDocument::load(bytes)?))
    }
}

/// An open document.
pub struct LopdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
    marks: HashMap<usize, Vec<Rect>>,
    fonts: Vec<LoadedFont>,
    /// Resource names of fonts already registered on a page.
    font_resources: HashMap<(usize, usize), String>,
    /// Pages whose original content is isolated in a `q`/`Q` pair.
    wrapped: HashSet<usize>,
    next_resource: usize,
}

impl LopdfDocument {
    pub fn load(bytes: &[u8]) -> UnmarkResult<Self> {
        let doc = Document::load_mem(bytes).map_err(|e| UnmarkError::PdfProcessing {
            message: "Failed to open PDF".to_string(),
            page: None,
            source: Some(Box::new(e)),
        })?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: Document) -> Self {
        let pages = doc.get_pages().into_values().collect();
        Self {
            doc,
            pages,
            marks: HashMap::new(),
            fonts: Vec::new(),
            font_resources: HashMap::new(),
            wrapped: HashSet::new(),
            next_resource: 0,
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    fn page_id(&self, page: usize) -> UnmarkResult<ObjectId> {
        self.pages.get(page).copied().ok_or_else(|| {
            UnmarkError::invalid_input("page_index", format!("invalid page index {}", page))
        })
    }

    /// Looks `key` up on the page and then up its parents.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut dict = self.doc.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            if let Ok(value) = dict.get(key) {
                return Some(resolve(&self.doc, value));
            }
            let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
            dict = self.doc.get_dictionary(parent).ok()?;
        }
        None
    }

    /// Media box in PDF user space.
    fn page_box(&self, page_id: ObjectId) -> Rect {
        self.inherited(page_id, b"MediaBox")
            .and_then(|o| o.as_array().ok())
            .and_then(|a| a.iter().map(|o| number(resolve(&self.doc, o))).collect::<Option<Vec<f64>>>())
            .filter(|v| v.len() == 4)
            .map(|v| Rect::new(v[0].min(v[2]), v[1].min(v[3]), v[0].max(v[2]), v[1].max(v[3])))
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_PAGE_BOX)
    }

    fn resources(&self, page_id: ObjectId) -> Dictionary {
        self.inherited(page_id, b"Resources")
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default()
    }

    fn content_refs(&self, page_id: ObjectId) -> Vec<ObjectId> {
        let Some(contents) = self
            .doc
            .get_dictionary(page_id)
            .ok()
            .and_then(|d| d.get(b"Contents").ok())
        else {
            return Vec::new();
        };
        match contents {
            Object::Reference(id) => match self.doc.get_object(*id) {
                Ok(Object::Array(items)) => items.iter().filter_map(|o| o.as_reference().ok()).collect(),
                _ => vec![*id],
            },
            Object::Array(items) => items.iter().filter_map(|o| o.as_reference().ok()).collect(),
            _ => Vec::new(),
        }
    }

    /// The page's content streams, decoded and joined by newlines, with the
    /// offset each stream starts at.
    fn page_content(&self, page_id: ObjectId) -> UnmarkResult<(Vec<u8>, Vec<(usize, ObjectId)>)> {
        let mut content = Vec::new();
        let mut starts = Vec::new();
        for (i, id) in self.content_refs(page_id).into_iter().enumerate() {
            if i > 0 {
                content.push(b'\n');
            }
            starts.push((content.len(), id));
            content.extend(self.read_stream(id.into())?);
        }
        Ok((content, starts))
    }

    fn interpret_with_starts(&self, page: usize) -> UnmarkResult<(PageContent, Vec<(usize, ObjectId)>)> {
        let page_id = self.page_id(page)?;
        let (content, starts) = self.page_content(page_id)?;
        let resources = self.resources(page_id);
        let drawn = Interpreter::new(&self.doc).run(&content, &resources, self.page_box(page_id));
        Ok((drawn, starts))
    }

    fn interpret(&self, page: usize) -> UnmarkResult<PageContent> {
        Ok(self.interpret_with_starts(page)?.0)
    }

    /// Converts a `/Rect` entry to top-left page space.
    fn annotation_rect(&self, dict: &Dictionary, page_box: Rect) -> Rect {
        dict.get(b"Rect")
            .ok()
            .map(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_array().ok())
            .and_then(|a| a.iter().map(|o| number(resolve(&self.doc, o))).collect::<Option<Vec<f64>>>())
            .filter(|v| v.len() == 4)
            .map(|v| {
                Rect::new(
                    v[0].min(v[2]) - page_box.x0,
                    page_box.y1 - v[1].max(v[3]),
                    v[0].max(v[2]) - page_box.x0,
                    page_box.y1 - v[1].min(v[3]),
                )
            })
            .unwrap_or_default()
    }

    /// `/Annots` entries of a page: reference (if indirect) and dictionary.
    fn annotation_entries(&self, page_id: ObjectId) -> Vec<(Option<ObjectId>, &Dictionary)> {
        let Some(items) = self
            .doc
            .get_dictionary(page_id)
            .ok()
            .and_then(|d| d.get(b"Annots").ok())
            .map(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_array().ok())
        else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match item {
                Object::Reference(id) => self
                    .doc
                    .get_dictionary(*id)
                    .ok()
                    .map(|d| (Some(*id), d)),
                Object::Dictionary(d) => Some((None, d)),
                _ => None,
            })
            .collect()
    }

    /// Removes the `/Annots` entries at `positions` (indices into
    /// [`LopdfDocument::annotation_entries`]).
    fn remove_annotations(&mut self, page_id: ObjectId, positions: &BTreeSet<usize>) -> UnmarkResult<()> {
        let items: Vec<Object> = self
            .doc
            .get_dictionary(page_id)?
            .get(b"Annots")
            .ok()
            .map(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_array().ok())
            .cloned()
            .unwrap_or_default();
        let kept: Vec<Object> = items
            .into_iter()
            .filter(|o| matches!(o, Object::Reference(_) | Object::Dictionary(_)))
            .enumerate()
            .filter(|(i, _)| !positions.contains(i))
            .map(|(_, o)| o)
            .collect();
        self.doc
            .get_dictionary_mut(page_id)?
            .set("Annots", Object::Array(kept));
        Ok(())
    }

    fn subtype<'d>(dict: &'d Dictionary) -> &'d str {
        dict.get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name_str().ok())
            .unwrap_or("")
    }

    /// Field attribute `key`, inherited from parent fields.
    fn field_attribute(&self, dict: &Dictionary, key: &[u8]) -> Option<String> {
        let mut current = dict;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            if let Ok(value) = current.get(key) {
                return match resolve(&self.doc, value) {
                    Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
                    Object::String(s, _) => Some(decode_text(s)),
                    _ => None,
                };
            }
            current = current
                .get(b"Parent")
                .ok()
                .and_then(|o| o.as_reference().ok())
                .and_then(|id| self.doc.get_dictionary(id).ok())?;
        }
        None
    }

    fn catalog_id(&self) -> UnmarkResult<ObjectId> {
        Ok(self.doc.trailer.get(b"Root")?.as_reference()?)
    }

    fn catalog_entry(&self, key: &[u8]) -> Option<&Object> {
        let catalog = self.doc.get_dictionary(self.catalog_id().ok()?).ok()?;
        catalog.get(key).ok().map(|o| resolve(&self.doc, o))
    }

    /// Registers `object` under a fresh name in the page's `category`
    /// resources. The page gets its own copy of inherited resources.
    fn add_resource(
        &mut self,
        page_id: ObjectId,
        category: &str,
        prefix: &str,
        object: ObjectId,
    ) -> UnmarkResult<String> {
        let name = format!("{}{}", prefix, self.next_resource);
        self.next_resource += 1;
        let mut resources = self.resources(page_id);
        let mut group = resources
            .get(category.as_bytes())
            .ok()
            .map(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default();
        group.set(name.clone(), Object::Reference(object));
        resources.set(category, Object::Dictionary(group));
        self.doc
            .get_dictionary_mut(page_id)?
            .set("Resources", Object::Dictionary(resources));
        Ok(name)
    }

    fn font_resource(&mut self, page: usize, page_id: ObjectId, font: usize) -> UnmarkResult<String> {
        if let Some(name) = self.font_resources.get(&(page, font)) {
            return Ok(name.clone());
        }
        let object = self
            .fonts
            .get(font)
            .map(LoadedFont::object)
            .ok_or_else(|| UnmarkError::element("font", format!("unknown font handle {}", font)))?;
        let name = self.add_resource(page_id, "Font", "UnmarkF", object)?;
        self.font_resources.insert((page, font), name.clone());
        Ok(name)
    }

    fn opacity_resource(&mut self, page_id: ObjectId, opacity: f64) -> UnmarkResult<Option<String>> {
        if opacity >= 1.0 {
            return Ok(None);
        }
        let state = embed::add_opacity_state(&mut self.doc, opacity);
        self.add_resource(page_id, "ExtGState", "UnmarkGs", state).map(Some)
    }

    /// Adds a content stream above (`overlay`) or below the page's content.
    fn append_content(&mut self, page: usize, content: Vec<u8>, overlay: bool) -> UnmarkResult<()> {
        let page_id = self.page_id(page)?;
        let mut refs = self.content_refs(page_id);
        if overlay && !refs.is_empty() && self.wrapped.insert(page) {
            refs.insert(0, self.doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec())));
            refs.push(self.doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec())));
        }
        let id = self.doc.add_object(Stream::new(Dictionary::new(), content));
        if overlay {
            refs.push(id);
        } else {
            refs.insert(0, id);
        }
        self.doc.get_dictionary_mut(page_id)?.set(
            "Contents",
            Object::Array(refs.into_iter().map(Object::Reference).collect()),
        );
        Ok(())
    }

    fn object_id(&self, number: u32) -> Option<ObjectId> {
        self.doc.objects.keys().copied().find(|id| id.0 == number)
    }
}

impl EditableDocument for LopdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_geometry(&self, page: usize) -> UnmarkResult<PageGeometry> {
        let rect = self.page_box(self.page_id(page)?);
        Ok(PageGeometry {
            width: rect.width(),
            height: rect.height(),
        })
    }

    fn metadata(&self) -> UnmarkResult<DocumentMetadata> {
        let mut metadata = DocumentMetadata {
            version: self.doc.version.clone(),
            ..Default::default()
        };

        if let Some(info) = self
            .doc
            .trailer
            .get(b"Info")
            .ok()
            .map(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_dict().ok())
        {
            for (key, value) in info.iter() {
                if let Object::String(bytes, _) = resolve(&self.doc, value) {
                    metadata.info.insert(
                        String::from_utf8_lossy(key).to_ascii_lowercase(),
                        decode_text(bytes),
                    );
                }
            }
        }

        if let Some(encrypt) = self.doc.trailer.get(b"Encrypt").ok() {
            metadata.encrypted = true;
            if let Some(p) = resolve(&self.doc, encrypt)
                .as_dict()
                .ok()
                .and_then(|d| d.get(b"P").ok())
                .and_then(|o| o.as_i64().ok())
            {
                let bit = |n: u32| (p >> (n - 1)) & 1 == 1;
                metadata.permissions = Permissions {
                    print: bit(3),
                    modify: bit(4),
                    copy: bit(5),
                    annotate: bit(6),
                    form: bit(9),
                };
            }
        }

        if let Some(props) = self.catalog_entry(b"OCProperties").and_then(|o| o.as_dict().ok()) {
            metadata.layers = props
                .get(b"OCGs")
                .ok()
                .map(|o| resolve(&self.doc, o))
                .and_then(|o| o.as_array().ok())
                .map(|a| a.iter().filter_map(|o| o.as_reference().ok()).map(|id| id.0).collect())
                .unwrap_or_default();
        }

        metadata.has_forms = self
            .catalog_entry(b"AcroForm")
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"Fields").ok())
            .map(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_array().ok())
            .map_or(false, |fields| !fields.is_empty());

        let mut fonts = BTreeSet::new();
        for &page_id in &self.pages {
            let resources = self.resources(page_id);
            let Some(group) = resources
                .get(b"Font")
                .ok()
                .map(|o| resolve(&self.doc, o))
                .and_then(|o| o.as_dict().ok())
            else {
                continue;
            };
            for (_, font) in group.iter() {
                if let Some(name) = resolve(&self.doc, font)
                    .as_dict()
                    .ok()
                    .and_then(|d| d.get(b"BaseFont").ok())
                    .and_then(|o| o.as_name_str().ok())
                {
                    fonts.insert(name.to_string());
                }
            }
        }
        metadata.fonts = fonts.into_iter().collect();
        Ok(metadata)
    }

    fn text_traces(&self, page: usize) -> UnmarkResult<Vec<StreamTraces>> {
        let (content, starts) = self.interpret_with_starts(page)?;
        Ok(traces_by_stream(&content.shows, &starts))
    }

    fn text_spans(&self, page: usize) -> UnmarkResult<Vec<TextSpan>> {
        Ok(group_spans(&self.interpret(page)?.shows))
    }

    fn images(&self, page: usize) -> UnmarkResult<Vec<ImageInfo>> {
        Ok(self
            .interpret(page)?
            .images
            .into_iter()
            .map(|image| ImageInfo {
                xref: image.xref,
                bbox: image.bbox,
                width: image.width,
                height: image.height,
            })
            .collect())
    }

    fn drawings(&self, page: usize) -> UnmarkResult<Vec<DrawingInfo>> {
        Ok(self
            .interpret(page)?
            .paths
            .into_iter()
            .map(|path| DrawingInfo {
                bbox: path.bbox,
                items: path.items,
                fill: path.fill,
                stroke: path.stroke,
            })
            .collect())
    }

    fn widgets(&self, page: usize) -> UnmarkResult<Vec<WidgetInfo>> {
        let page_id = self.page_id(page)?;
        let page_box = self.page_box(page_id);
        Ok(self
            .annotation_entries(page_id)
            .into_iter()
            .filter(|(_, dict)| Self::subtype(dict) == "Widget")
            .map(|(id, dict)| WidgetInfo {
                xref: id.map_or(0, |id| id.0),
                field_name: self.field_attribute(dict, b"T"),
                field_type: self.field_attribute(dict, b"FT"),
                bbox: self.annotation_rect(dict, page_box),
            })
            .collect())
    }

    fn links(&self, page: usize) -> UnmarkResult<Vec<LinkInfo>> {
        let page_id = self.page_id(page)?;
        let page_box = self.page_box(page_id);
        Ok(self
            .annotation_entries(page_id)
            .into_iter()
            .filter(|(_, dict)| Self::subtype(dict) == "Link")
            .map(|(_, dict)| LinkInfo {
                bbox: self.annotation_rect(dict, page_box),
                uri: dict
                    .get(b"A")
                    .ok()
                    .map(|o| resolve(&self.doc, o))
                    .and_then(|o| o.as_dict().ok())
                    .and_then(|a| a.get(b"URI").ok())
                    .and_then(|o| o.as_str().ok())
                    .map(|s| String::from_utf8_lossy(s).into_owned()),
            })
            .collect())
    }

    fn annotations(&self, page: usize) -> UnmarkResult<Vec<AnnotationInfo>> {
        let page_id = self.page_id(page)?;
        let page_box = self.page_box(page_id);
        Ok(self
            .annotation_entries(page_id)
            .into_iter()
            .map(|(id, dict)| AnnotationInfo {
                xref: id.map_or(0, |id| id.0),
                subtype: Self::subtype(dict).to_string(),
                bbox: self.annotation_rect(dict, page_box),
            })
            .collect())
    }

    fn content_streams(&self, page: usize) -> UnmarkResult<Vec<StreamRef>> {
        Ok(self
            .content_refs(self.page_id(page)?)
            .into_iter()
            .map(StreamRef::from)
            .collect())
    }

    fn xobject_streams(&self, page: usize) -> UnmarkResult<Vec<StreamRef>> {
        let resources = self.resources(self.page_id(page)?);
        let Some(group) = resources
            .get(b"XObject")
            .ok()
            .map(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_dict().ok())
        else {
            return Ok(Vec::new());
        };
        Ok(group
            .iter()
            .filter_map(|(_, entry)| entry.as_reference().ok())
            .filter(|id| {
                self.doc
                    .get_object(*id)
                    .and_then(Object::as_stream)
                    .map_or(false, |s| {
                        s.dict.get(b"Subtype").and_then(Object::as_name_str).ok() == Some("Form")
                    })
            })
            .map(StreamRef::from)
            .collect())
    }

    fn delete_widget(&mut self, page: usize, xref: u32) -> UnmarkResult<()> {
        let page_id = self.page_id(page)?;
        let positions: BTreeSet<usize> = self
            .annotation_entries(page_id)
            .iter()
            .enumerate()
            .filter(|(_, (id, dict))| id.map(|id| id.0) == Some(xref) && Self::subtype(dict) == "Widget")
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return Err(UnmarkError::element(format!("widget {}", xref), "not found on page"));
        }
        self.remove_annotations(page_id, &positions)?;

        let Ok(catalog_id) = self.catalog_id() else {
            return Ok(());
        };
        let form_id = match self.doc.get_dictionary(catalog_id)?.get(b"AcroForm") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };
        let form = match form_id {
            Some(id) => self.doc.get_dictionary_mut(id).ok(),
            None => self
                .doc
                .get_dictionary_mut(catalog_id)?
                .get_mut(b"AcroForm")
                .ok()
                .and_then(|o| o.as_dict_mut().ok()),
        };
        if let Some(fields) = form
            .and_then(|f| f.get_mut(b"Fields").ok())
            .and_then(|o| o.as_array_mut().ok())
        {
            fields.retain(|o| o.as_reference().map_or(true, |id| id.0 != xref));
        }
        Ok(())
    }

    fn delete_link(&mut self, page: usize, index: usize) -> UnmarkResult<()> {
        let page_id = self.page_id(page)?;
        let position = self
            .annotation_entries(page_id)
            .iter()
            .enumerate()
            .filter(|(_, (_, dict))| Self::subtype(dict) == "Link")
            .nth(index)
            .map(|(i, _)| i)
            .ok_or_else(|| UnmarkError::element(format!("link {}", index), "not found on page"))?;
        self.remove_annotations(page_id, &BTreeSet::from([position]))
    }

    fn delete_annotation(&mut self, page: usize, xref: u32) -> UnmarkResult<()> {
        let page_id = self.page_id(page)?;
        let positions: BTreeSet<usize> = self
            .annotation_entries(page_id)
            .iter()
            .enumerate()
            .filter(|(_, (id, _))| id.map(|id| id.0) == Some(xref))
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return Err(UnmarkError::element(format!("annotation {}", xref), "not found on page"));
        }
        self.remove_annotations(page_id, &positions)
    }

    fn delete_image(&mut self, page: usize, xref: u32) -> UnmarkResult<()> {
        self.page_id(page)?;
        let id = self
            .object_id(xref)
            .ok_or_else(|| UnmarkError::element(format!("image {}", xref), "no such object"))?;
        let is_image = self
            .doc
            .get_object(id)
            .and_then(Object::as_stream)
            .map_or(false, |s| {
                s.dict.get(b"Subtype").and_then(Object::as_name_str).ok() == Some("Image")
            });
        if !is_image {
            return Err(UnmarkError::element(format!("image {}", xref), "object is not an image"));
        }
        let blank = embed::blank_image(&mut self.doc);
        self.doc.objects.insert(id, Object::Stream(blank));
        debug!("Replaced image object {} with a blank image", xref);
        Ok(())
    }

    fn add_redaction_mark(&mut self, page: usize, rect: Rect) -> UnmarkResult<()> {
        self.page_id(page)?;
        self.marks.entry(page).or_default().push(rect);
        Ok(())
    }

    fn apply_redactions(&mut self, page: usize, scope: RedactionScope) -> UnmarkResult<usize> {
        let Some(marks) = self.marks.remove(&page).filter(|m| !m.is_empty()) else {
            return Ok(0);
        };
        self.normalize_contents(page)?;
        let page_id = self.page_id(page)?;
        let Some(&stream_id) = self.content_refs(page_id).first() else {
            return Ok(0);
        };

        let content = self.interpret(page)?;
        let covered = |bbox: &Rect| marks.iter().any(|m| m.contains_rect(bbox));
        let mut ranges: Vec<Range<usize>> = Vec::new();
        if scope.graphics {
            ranges.extend(content.paths.iter().filter(|p| covered(&p.bbox)).filter_map(|p| p.span.clone()));
        }
        if scope.images {
            ranges.extend(content.images.iter().filter(|i| covered(&i.bbox)).filter_map(|i| i.span.clone()));
        }
        if scope.text {
            ranges.extend(content.shows.iter().filter(|s| covered(&s.bbox)).filter_map(|s| s.span.clone()));
        }
        if ranges.is_empty() {
            return Ok(0);
        }
        ranges.sort_by_key(|r| r.start);

        let mut data = self.read_stream(stream_id.into())?;
        let mut removed = 0;
        let mut limit = data.len();
        for range in ranges.iter().rev() {
            if range.end > limit {
                continue;
            }
            data.splice(range.clone(), b"\n".iter().copied());
            limit = range.start;
            removed += 1;
        }
        self.write_stream(stream_id.into(), data)?;
        debug!("Redaction removed {} element(s) on page {}", removed, page);
        Ok(removed)
    }

    fn normalize_contents(&mut self, page: usize) -> UnmarkResult<()> {
        let page_id = self.page_id(page)?;
        if self.content_refs(page_id).len() <= 1 {
            return Ok(());
        }
        let (content, _) = self.page_content(page_id)?;
        let id = self.doc.add_object(Stream::new(Dictionary::new(), content));
        self.doc
            .get_dictionary_mut(page_id)?
            .set("Contents", Object::Reference(id));
        Ok(())
    }

    fn read_stream(&self, stream: StreamRef) -> UnmarkResult<Vec<u8>> {
        let object = self.doc.get_object(stream.into())?;
        stream_bytes(object.as_stream()?)
    }

    fn write_stream(&mut self, stream: StreamRef, data: Vec<u8>) -> UnmarkResult<()> {
        let target = self.doc.get_object_mut(stream.into())?.as_stream_mut()?;
        target.dict.remove(b"Filter");
        target.dict.remove(b"DecodeParms");
        target.set_content(data);
        Ok(())
    }

    fn load_font(&mut self, source: &FontSource) -> UnmarkResult<FontHandle> {
        let font = match source {
            FontSource::Builtin(name) => embed::load_standard(&mut self.doc, name)?,
            FontSource::File(path) => embed::load_truetype(&mut self.doc, path)?,
        };
        let name = match source {
            FontSource::Builtin(name) | FontSource::File(name) => name.clone(),
        };
        self.fonts.push(font);
        Ok(FontHandle {
            id: self.fonts.len() - 1,
            name,
        })
    }

    fn text_width(&self, font: &FontHandle, text: &str, fontsize: f64) -> UnmarkResult<f64> {
        self.fonts
            .get(font.id)
            .ok_or_else(|| UnmarkError::element("font", format!("unknown font handle {}", font.id)))?
            .text_width(text, fontsize)
    }

    fn insert_text(&mut self, page: usize, placement: &TextPlacement) -> UnmarkResult<()> {
        let page_id = self.page_id(page)?;
        let font_id = placement.font.id;
        let (hex, added) = self
            .fonts
            .get_mut(font_id)
            .ok_or_else(|| UnmarkError::element("font", format!("unknown font handle {}", font_id)))?
            .encode(&placement.text)?;
        if added {
            self.fonts[font_id].write_tables(&mut self.doc)?;
        }
        let font_resource = self.font_resource(page, page_id, font_id)?;
        let state = self.opacity_resource(page_id, placement.opacity)?;
        let content = embed::text_content(
            placement,
            &font_resource,
            &hex,
            state.as_deref(),
            self.page_box(page_id),
        );
        self.append_content(page, content, placement.overlay)
    }

    fn insert_image(&mut self, page: usize, placement: &ImagePlacement) -> UnmarkResult<()> {
        let page_id = self.page_id(page)?;
        let image = embed::add_image(&mut self.doc, &placement.bytes)?;
        let image_resource = self.add_resource(page_id, "XObject", "UnmarkIm", image)?;
        let state = self.opacity_resource(page_id, placement.opacity)?;
        let content = embed::image_content(
            placement,
            &image_resource,
            state.as_deref(),
            self.page_box(page_id),
        );
        self.append_content(page, content, placement.overlay)
    }

    fn set_layer_visibility(&mut self, xref: u32, visible: bool) -> UnmarkResult<()> {
        let catalog_id = self.catalog_id()?;
        let mut props = self
            .catalog_entry(b"OCProperties")
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .ok_or_else(|| UnmarkError::element(format!("layer {}", xref), "document has no layers"))?;
        let layer = props
            .get(b"OCGs")
            .ok()
            .map(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_array().ok())
            .and_then(|a| a.iter().filter_map(|o| o.as_reference().ok()).find(|id| id.0 == xref))
            .ok_or_else(|| UnmarkError::element(format!("layer {}", xref), "no such layer"))?;

        let mut config = props
            .get(b"D")
            .ok()
            .map(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default();
        let (add_to, remove_from): (&[u8], &[u8]) = if visible { (b"ON", b"OFF") } else { (b"OFF", b"ON") };
        let list = |config: &Dictionary, key: &[u8]| -> Vec<Object> {
            config
                .get(key)
                .ok()
                .map(|o| resolve(&self.doc, o))
                .and_then(|o| o.as_array().ok())
                .cloned()
                .unwrap_or_default()
        };
        let mut removed = list(&config, remove_from);
        removed.retain(|o| o.as_reference().ok() != Some(layer));
        let mut added = list(&config, add_to);
        if !added.iter().any(|o| o.as_reference().ok() == Some(layer)) {
            added.push(Object::Reference(layer));
        }
        config.set(remove_from, Object::Array(removed));
        config.set(add_to, Object::Array(added));
        props.set("D", Object::Dictionary(config));
        self.doc
            .get_dictionary_mut(catalog_id)?
            .set("OCProperties", Object::Dictionary(props));
        Ok(())
    }

    fn subset_fonts(&mut self) -> UnmarkResult<()> {
        let mut subset = 0;
        for font in &self.fonts {
            match font.subset(&mut self.doc) {
                Ok(true) => subset += 1,
                Ok(false) => {}
                Err(e) => warn!("Keeping full font file: {}", e),
            }
        }
        debug!("Subset {} embedded font(s)", subset);
        Ok(())
    }

    fn save(&mut self, options: &SaveOptions) -> UnmarkResult<Vec<u8>> {
        match options.compaction {
            Compaction::None => {}
            Compaction::Prune => {
                let pruned = self.doc.prune_objects();
                debug!("Pruned {} unreachable object(s)", pruned.len());
            }
            Compaction::Full => {
                let pruned = self.doc.prune_objects();
                let empty = self.doc.delete_zero_length_streams();
                self.doc.renumber_objects();
                debug!(
                    "Pruned {} unreachable object(s) and {} empty stream(s)",
                    pruned.len(),
                    empty.len()
                );
                self.pages = self.doc.get_pages().into_values().collect();
            }
        }
        if options.compress {
            self.doc.compress();
        }
        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| UnmarkError::toolkit("save", e.to_string()))?;
        Ok(out)
    }

    fn render_png(&self, page: usize, scale: f32) -> UnmarkResult<Vec<u8>> {
        self.page_id(page)?;
        let mut snapshot = self.doc.clone();
        let mut bytes = Vec::new();
        snapshot
            .save_to(&mut bytes)
            .map_err(|e| UnmarkError::toolkit("save", e.to_string()))?;
        render::render_png(&bytes, page, scale)
    }
}

/// Groups traces by the stream holding their bytes, in first-seen order.
///
/// Page content shows are located by the offset of their span among the
/// joined streams; form shows belong to the form's own stream.
fn traces_by_stream(shows: &[ShowRecord], starts: &[(usize, ObjectId)]) -> Vec<StreamTraces> {
    let mut groups: Vec<StreamTraces> = Vec::new();
    for show in shows {
        let id = match show.source {
            Source::Page => {
                let Some(offset) = show.span.as_ref().map(|s| s.start) else {
                    continue;
                };
                let idx = starts.partition_point(|(start, _)| *start <= offset);
                match idx.checked_sub(1) {
                    Some(i) => starts[i].1,
                    None => continue,
                }
            }
            Source::Form { id: Some(id), run: 0 } => id,
            Source::Form { .. } => continue,
        };
        let stream = StreamRef::from(id);
        match groups.iter_mut().find(|g| g.stream == stream) {
            Some(group) => group.traces.push(show.trace()),
            None => groups.push(StreamTraces::new(stream, vec![show.trace()])),
        }
    }
    groups
}

/// Groups show records into block, line and span runs.
///
/// A text object starts a block; a baseline shift of more than half the
/// font size starts a line; a font, size or color change starts a span.
fn group_spans(shows: &[ShowRecord]) -> Vec<TextSpan> {
    let mut spans: Vec<TextSpan> = Vec::new();
    let mut previous: Option<&ShowRecord> = None;
    let (mut block, mut line, mut span) = (0usize, 0usize, 0usize);

    for record in shows {
        let text = record.text();
        if let Some(prev) = previous {
            let line_height = 0.5 * prev.size.max(record.size).max(1.0);
            if prev.block != record.block {
                block += 1;
                line = 0;
                span = 0;
            } else if (prev.baseline - record.baseline).abs() > line_height {
                line += 1;
                span = 0;
            } else if prev.font != record.font
                || (prev.size - record.size).abs() > 0.01
                || prev.color != record.color
            {
                span += 1;
            } else if let Some(current) = spans.last_mut() {
                if record.start_x - prev.end_x > 0.25 * record.size {
                    current.text.push(' ');
                }
                current.text.push_str(&text);
                current.bbox = current.bbox.union(&record.bbox);
                previous = Some(record);
                continue;
            }
        }
        spans.push(TextSpan {
            block,
            line,
            span,
            text,
            bbox: record.bbox,
            font: record.font.clone(),
            size: record.size,
            color: record.color,
        });
        previous = Some(record);
    }
    spans
}

/// Numeric value of an integer or real object.
pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Follows one level of indirection.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Decoded bytes of a stream.
pub(crate) fn stream_bytes(stream: &Stream) -> UnmarkResult<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        Ok(stream.decompressed_content()?)
    } else {
        Ok(stream.content.clone())
    }
}

/// Entry `name` of resource `category`, with its object id if indirect.
pub(crate) fn name_entry<'a>(
    doc: &'a Document,
    resources: &'a Dictionary,
    category: &[u8],
    name: &str,
) -> Option<(Option<ObjectId>, &'a Object)> {
    let group = resolve(doc, resources.get(category).ok()?).as_dict().ok()?;
    match group.get(name.as_bytes()).ok()? {
        Object::Reference(id) => Some((Some(*id), doc.get_object(*id).ok()?)),
        other => Some((None, other)),
    }
}

/// Text string: UTF-16BE with a byte order mark, otherwise single bytes.
fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks(2)
                .map(|p| (u16::from(p[0]) << 8) | u16::from(p.get(1).copied().unwrap_or(0)))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| fonts::win_ansi_char(b)).collect(),
    }
}
