//! Target enrichment from a full document scan.
//!
//! Callers often name a target by id alone. One scan of every page builds
//! lookup maps from id (and for text, also from literal content) to the
//! element's full descriptor; missing target fields are filled from there.
//! Fields the caller did give always win.

use std::collections::HashMap;

use log::{debug, warn};

use super::inventory::{scan_page, ElementKind, InventoryElement};
use super::toolkit::EditableDocument;
use crate::domain::{ObjectTarget, TargetSet, TextTarget};

/// Descriptors of every element of a document, per category.
#[derive(Debug, Clone, Default)]
pub struct LookupMap {
    text_by_id: HashMap<String, InventoryElement>,
    /// First span carrying each literal content.
    text_by_content: HashMap<String, InventoryElement>,
    images: HashMap<String, InventoryElement>,
    drawings: HashMap<String, InventoryElement>,
    widgets: HashMap<String, InventoryElement>,
    links: HashMap<String, InventoryElement>,
}

impl LookupMap {
    /// Scans every page once. Pages that fail to enumerate are logged and
    /// left out.
    pub fn build(doc: &dyn EditableDocument) -> Self {
        let mut map = Self::default();
        for page in 0..doc.page_count() {
            match scan_page(doc, page) {
                Ok(elements) => elements.into_iter().for_each(|e| map.insert(e)),
                Err(e) => warn!("Skipping page {} during target enrichment: {}", page, e),
            }
        }
        map
    }

    pub fn insert(&mut self, element: InventoryElement) {
        let id = element.id.clone();
        match element.kind {
            ElementKind::Text => {
                self.text_by_content
                    .entry(element.content.clone())
                    .or_insert_with(|| element.clone());
                self.text_by_id.insert(id, element);
            }
            ElementKind::Image => {
                self.images.insert(id, element);
            }
            ElementKind::Drawing => {
                self.drawings.insert(id, element);
            }
            ElementKind::Widget => {
                self.widgets.insert(id, element);
            }
            ElementKind::Link => {
                self.links.insert(id, element);
            }
        }
    }

    pub fn text(&self, id: &str) -> Option<&InventoryElement> {
        self.text_by_id.get(id)
    }

    pub fn text_with_content(&self, content: &str) -> Option<&InventoryElement> {
        self.text_by_content.get(content)
    }

    pub fn len(&self) -> usize {
        self.text_by_id.len()
            + self.images.len()
            + self.drawings.len()
            + self.widgets.len()
            + self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `targets` with missing fields filled in.
    pub fn enrich(&self, targets: &TargetSet) -> TargetSet {
        TargetSet {
            text: targets.text.iter().map(|t| self.enrich_text(t)).collect(),
            images: enrich_objects(&targets.images, &self.images),
            drawings: enrich_objects(&targets.drawings, &self.drawings),
            widgets: enrich_objects(&targets.widgets, &self.widgets),
            links: enrich_objects(&targets.links, &self.links),
            layers: targets.layers.clone(),
        }
    }

    /// Completes a text target from the span it names by id. A bare content
    /// target takes the position of the first span carrying exactly that
    /// content; content found in no single span is left to match anywhere.
    fn enrich_text(&self, target: &TextTarget) -> TextTarget {
        let found = match target.id.as_deref() {
            Some(id) => self.text(id),
            None if target.bbox.is_none() && target.page.is_none() => target
                .trimmed_content()
                .and_then(|content| self.text_with_content(content)),
            None => None,
        };
        let Some(found) = found else {
            return target.clone();
        };
        debug!("Enriched text target {}", found.id);
        TextTarget {
            id: target.id.clone(),
            content: target
                .content
                .clone()
                .or_else(|| Some(found.content.clone()).filter(|c| !c.trim().is_empty())),
            bbox: target.bbox.or(Some(found.bbox)),
            page: target.page.or(Some(found.page)),
        }
    }
}

fn enrich_objects(
    targets: &[ObjectTarget],
    lookup: &HashMap<String, InventoryElement>,
) -> Vec<ObjectTarget> {
    targets
        .iter()
        .map(|target| match lookup.get(&target.id) {
            Some(found) => ObjectTarget {
                id: target.id.clone(),
                bbox: target.bbox.or(Some(found.bbox)),
                page: target.page.or(Some(found.page)),
                content: target.content.clone().or_else(|| Some(found.content.clone())),
            },
            None => target.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Rect;

    fn element(kind: ElementKind, id: &str, content: &str, bbox: Rect, page: usize) -> InventoryElement {
        InventoryElement {
            kind,
            id: id.to_string(),
            content: content.to_string(),
            bbox,
            page,
            font: None,
            size: None,
            metadata: None,
        }
    }

    fn lookup() -> LookupMap {
        let mut map = LookupMap::default();
        map.insert(element(ElementKind::Image, "p0_img_7", "Image 7", Rect::new(10.0, 10.0, 60.0, 40.0), 0));
        map.insert(element(ElementKind::Text, "p1_b0_l0_s0", "DRAFT", Rect::new(0.0, 0.0, 30.0, 10.0), 1));
        map.insert(element(ElementKind::Text, "p2_b0_l0_s0", "DRAFT", Rect::new(5.0, 5.0, 35.0, 15.0), 2));
        map
    }

    #[test]
    fn test_object_target_gains_bbox() {
        let targets = TargetSet::new().with(crate::domain::RemovalTarget::XObjectImage(ObjectTarget::new("p0_img_7")));
        let enriched = lookup().enrich(&targets);
        assert_eq!(enriched.images[0].bbox, Some(Rect::new(10.0, 10.0, 60.0, 40.0)));
        assert_eq!(enriched.images[0].page, Some(0));
    }

    #[test]
    fn test_explicit_fields_win() {
        let mut target = ObjectTarget::new("p0_img_7");
        target.bbox = Some(Rect::new(0.0, 0.0, 1.0, 1.0));
        let targets = TargetSet::new().with(crate::domain::RemovalTarget::XObjectImage(target));
        let enriched = lookup().enrich(&targets);
        assert_eq!(enriched.images[0].bbox, Some(Rect::new(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(enriched.images[0].content.as_deref(), Some("Image 7"));
    }

    #[test]
    fn test_text_by_id_and_content_lookup() {
        let map = lookup();
        let by_id = TextTarget {
            id: Some("p2_b0_l0_s0".to_string()),
            ..Default::default()
        };
        let enriched = map.enrich_text(&by_id);
        assert_eq!(enriched.page, Some(2));
        assert_eq!(enriched.content.as_deref(), Some("DRAFT"));

        // the first occurrence is kept for content lookups
        assert_eq!(map.text_with_content("DRAFT").unwrap().page, 1);
    }

    #[test]
    fn test_bare_content_takes_first_span_position() {
        let map = lookup();
        let enriched = map.enrich_text(&TextTarget::content(" DRAFT "));
        assert_eq!(enriched.page, Some(1));
        assert_eq!(enriched.bbox, Some(Rect::new(0.0, 0.0, 30.0, 10.0)));
        assert_eq!(enriched.content.as_deref(), Some(" DRAFT "));
        assert!(enriched.id.is_none());

        // content spread over several spans keeps matching everywhere
        let spread = TextTarget::content("DRAFT v2");
        assert_eq!(map.enrich_text(&spread), spread);

        // a caller-given page is never overridden by the content lookup
        let paged = TextTarget {
            page: Some(2),
            ..TextTarget::content("DRAFT")
        };
        assert_eq!(map.enrich_text(&paged), paged);
    }

    #[test]
    fn test_unknown_ids_are_left_alone() {
        let targets = TargetSet::new().with(crate::domain::RemovalTarget::Link(ObjectTarget::new("p9_link_0")));
        assert_eq!(lookup().enrich(&targets), targets);
    }
}
