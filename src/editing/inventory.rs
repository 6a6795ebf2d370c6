//! Enumeration of the addressable elements of a page.
//!
//! Every element gets the synthetic id callers use to name removal
//! targets. The same scan feeds page analysis and target enrichment.

use serde::Serialize;

use super::toolkit::EditableDocument;
use crate::domain::{ElementId, Rect};
use crate::error::UnmarkResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Text,
    Image,
    Drawing,
    Widget,
    Link,
}

/// Shape facts reported for drawings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrawingMetadata {
    pub items_count: usize,
    pub fill: bool,
    pub stroke: bool,
}

/// One addressable element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub id: String,
    pub content: String,
    pub bbox: Rect,
    pub page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DrawingMetadata>,
}

impl InventoryElement {
    fn new(kind: ElementKind, id: ElementId, content: String, bbox: Rect) -> Self {
        Self {
            kind,
            page: id.page(),
            id: id.to_string(),
            content,
            bbox,
            font: None,
            size: None,
            metadata: None,
        }
    }
}

/// Drawings at or below this area are not offered as elements.
const MIN_DRAWING_AREA: f64 = 1.0;

/// Lists the text spans, images, drawings, widgets and links of `page`, in
/// that order.
pub fn scan_page(doc: &dyn EditableDocument, page: usize) -> UnmarkResult<Vec<InventoryElement>> {
    let mut elements = Vec::new();

    for span in doc.text_spans(page)? {
        let id = ElementId::TextSpan {
            page,
            block: span.block,
            line: span.line,
            span: span.span,
        };
        let mut element = InventoryElement::new(ElementKind::Text, id, span.text, span.bbox);
        element.font = Some(span.font);
        element.size = Some(span.size);
        elements.push(element);
    }

    for image in doc.images(page)? {
        let id = ElementId::Image { page, xref: image.xref };
        let content = format!("Image {}", image.xref);
        elements.push(InventoryElement::new(ElementKind::Image, id, content, image.bbox));
    }

    for (index, drawing) in doc.drawings(page)?.into_iter().enumerate() {
        if drawing.bbox.width() * drawing.bbox.height() <= MIN_DRAWING_AREA {
            continue;
        }
        let id = ElementId::Drawing { page, index };
        let mut element = InventoryElement::new(
            ElementKind::Drawing,
            id,
            format!("Drawing {}", index),
            drawing.bbox,
        );
        element.metadata = Some(DrawingMetadata {
            items_count: drawing.items,
            fill: drawing.fill,
            stroke: drawing.stroke,
        });
        elements.push(element);
    }

    for widget in doc.widgets(page)? {
        let id = ElementId::Widget { page, xref: widget.xref };
        let content = format!(
            "Field: {}",
            widget.field_name.as_deref().unwrap_or("unnamed")
        );
        elements.push(InventoryElement::new(ElementKind::Widget, id, content, widget.bbox));
    }

    for (index, link) in doc.links(page)?.into_iter().enumerate() {
        let id = ElementId::Link { page, index };
        let content = format!("Link: {}", link.uri.as_deref().unwrap_or("internal"));
        elements.push(InventoryElement::new(ElementKind::Link, id, content, link.bbox));
    }

    Ok(elements)
}
