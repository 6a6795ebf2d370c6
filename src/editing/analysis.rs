//! Read-only document and page summaries.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::inventory::{scan_page, ElementKind, InventoryElement};
use super::toolkit::{EditableDocument, Permissions, TextSpan};
use crate::error::{UnmarkError, UnmarkResult};

const MAX_TEXTS: usize = 300;
const MAX_SUGGESTIONS: usize = 100;
const MAX_IDS: usize = 100;
const MAX_ELEMENTS: usize = 1000;
/// Pages searched for repeated text.
const WATERMARK_SCAN_PAGES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSize {
    pub index: usize,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionSummary {
    pub print: bool,
    pub modify: bool,
    pub copy: bool,
    pub annotate: bool,
    pub form: bool,
}

impl From<Permissions> for PermissionSummary {
    fn from(p: Permissions) -> Self {
        Self {
            print: p.print,
            modify: p.modify,
            copy: p.copy,
            annotate: p.annotate,
            form: p.form,
        }
    }
}

/// Document overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub metadata: BTreeMap<String, String>,
    pub file_size: usize,
    pub version: String,
    pub is_encrypted: bool,
    pub permissions: PermissionSummary,
    pub total_images: usize,
    pub total_fonts: usize,
    pub total_annots: usize,
    pub total_links: usize,
    pub has_ocg: bool,
    pub has_forms: bool,
    pub has_signatures: bool,
    /// Images but no text anywhere.
    pub is_scanned: bool,
    pub pages: Vec<PageSize>,
}

const METADATA_KEYS: [&str; 8] = [
    "title",
    "author",
    "subject",
    "keywords",
    "creator",
    "producer",
    "creationdate",
    "moddate",
];

/// Summarizes `doc`; `file_size` is the size of the bytes it was opened from.
pub fn document_info(doc: &dyn EditableDocument, file_size: usize) -> UnmarkResult<DocumentInfo> {
    let meta = doc.metadata()?;
    let page_count = doc.page_count();
    let mut info = DocumentInfo {
        page_count,
        metadata: METADATA_KEYS
            .iter()
            .map(|k| (k.to_string(), meta.info.get(*k).cloned().unwrap_or_default()))
            .collect(),
        file_size,
        version: meta.version.clone(),
        is_encrypted: meta.encrypted,
        permissions: meta.permissions.into(),
        total_images: 0,
        total_fonts: meta.fonts.len(),
        total_annots: 0,
        total_links: 0,
        has_ocg: !meta.layers.is_empty(),
        has_forms: meta.has_forms,
        has_signatures: false,
        is_scanned: false,
        pages: Vec::with_capacity(page_count),
    };

    let mut has_text = false;
    for page in 0..page_count {
        let geometry = doc.page_geometry(page)?;
        info.pages.push(PageSize {
            index: page,
            width: geometry.width,
            height: geometry.height,
        });
        info.total_images += doc.images(page)?.iter().filter(|i| i.xref > 0).count();
        info.total_annots += doc.annotations(page)?.len();
        info.total_links += doc.links(page)?.len();
        if !has_text {
            has_text = doc
                .text_spans(page)?
                .iter()
                .any(|s| !s.text.trim().is_empty());
        }
        if !info.has_signatures {
            info.has_signatures = doc.widgets(page)?.iter().any(|w| w.is_signature());
        }
    }
    info.is_scanned = !has_text && info.total_images > 0;
    Ok(info)
}

/// Elements and text of one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageAnalysis {
    pub texts: Vec<String>,
    pub suggested_watermarks: Vec<String>,
    pub image_ids: Vec<String>,
    pub drawing_ids: Vec<String>,
    pub interactive_elements: Vec<InventoryElement>,
    pub page_width: f64,
    pub page_height: f64,
    pub page_rect: [f64; 4],
}

/// Analyzes `page`. With `analyze_all`, text blocks repeated across the
/// first pages are suggested as watermarks.
pub fn analyze_page(
    doc: &dyn EditableDocument,
    page: usize,
    analyze_all: bool,
) -> UnmarkResult<PageAnalysis> {
    if page >= doc.page_count() {
        return Err(UnmarkError::invalid_input(
            "page_index",
            format!("invalid page index {}", page),
        ));
    }

    let suggested_watermarks = if analyze_all {
        suggest_watermarks(doc)?
    } else {
        Vec::new()
    };

    let elements = scan_page(doc, page)?;
    let texts: BTreeSet<&str> = elements
        .iter()
        .filter(|e| e.kind == ElementKind::Text)
        .map(|e| e.content.as_str())
        .collect();
    let mut image_ids: Vec<String> = elements
        .iter()
        .filter(|e| e.kind == ElementKind::Image)
        .map(|e| e.id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    image_ids.truncate(MAX_IDS);
    let mut drawing_ids: Vec<String> = elements
        .iter()
        .filter(|e| e.kind == ElementKind::Drawing)
        .map(|e| e.id.clone())
        .collect();
    drawing_ids.truncate(MAX_IDS);

    let geometry = doc.page_geometry(page)?;
    Ok(PageAnalysis {
        texts: by_length(texts.into_iter().map(str::to_string), MAX_TEXTS),
        suggested_watermarks,
        image_ids,
        drawing_ids,
        interactive_elements: elements.into_iter().take(MAX_ELEMENTS).collect(),
        page_width: geometry.width,
        page_height: geometry.height,
        page_rect: geometry.rect().to_array(),
    })
}

/// Block texts longer than one character found on more than one of the
/// first pages.
fn suggest_watermarks(doc: &dyn EditableDocument) -> UnmarkResult<Vec<String>> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for page in 0..doc.page_count().min(WATERMARK_SCAN_PAGES) {
        let blocks: BTreeSet<String> = block_texts(&doc.text_spans(page)?)
            .into_iter()
            .filter(|t| t.chars().count() > 1)
            .collect();
        for text in blocks {
            *counts.entry(text).or_insert(0) += 1;
        }
    }
    let repeated = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(text, _)| text);
    Ok(by_length(repeated, MAX_SUGGESTIONS))
}

/// Trimmed text of each block, lines joined by newlines.
fn block_texts(spans: &[TextSpan]) -> Vec<String> {
    let mut blocks: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();
    for span in spans {
        blocks
            .entry(span.block)
            .or_default()
            .entry(span.line)
            .or_default()
            .push_str(&span.text);
    }
    blocks
        .into_values()
        .map(|lines| lines.into_values().collect::<Vec<_>>().join("\n").trim().to_string())
        .collect()
}

fn by_length(texts: impl Iterator<Item = String>, limit: usize) -> Vec<String> {
    let mut texts: Vec<String> = texts.collect();
    texts.sort_by(|a, b| a.chars().count().cmp(&b.chars().count()).then_with(|| a.cmp(b)));
    texts.truncate(limit);
    texts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Color, Rect};

    fn span(block: usize, line: usize, text: &str) -> TextSpan {
        TextSpan {
            block,
            line,
            span: 0,
            text: text.to_string(),
            bbox: Rect::new(0.0, 0.0, 1.0, 1.0),
            font: "Helvetica".to_string(),
            size: 12.0,
            color: Color::BLACK,
        }
    }

    #[test]
    fn test_block_texts_join_lines() {
        let spans = vec![span(0, 0, "Hello "), span(0, 0, "there"), span(0, 1, "again"), span(1, 0, " x ")];
        assert_eq!(block_texts(&spans), vec!["Hello there\nagain".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_sorted_by_length_then_text() {
        let sorted = by_length(
            vec!["ccc", "a", "bb", "ab"].into_iter().map(String::from),
            3,
        );
        assert_eq!(sorted, vec!["a", "ab", "bb"]);
    }
}
