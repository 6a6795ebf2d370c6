//! Removal targets.
//!
//! Callers describe what to remove with loosely-typed JSON; it is validated
//! here, once, into a closed set of typed targets before entering the core.

use serde::Deserialize;

use super::geometry::Rect;
use super::ids::ElementId;
use crate::error::{UnmarkError, UnmarkResult};

/// A text removal target. Any of the fields may be missing; enrichment fills
/// what it can from a full document scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextTarget {
    pub id: Option<String>,
    pub content: Option<String>,
    pub bbox: Option<Rect>,
    pub page: Option<usize>,
}

impl TextTarget {
    /// A target matching the literal `content` on every page.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: normalize_content(Some(content.into())),
            ..Default::default()
        }
    }

    /// A target covering `bbox` on `page`.
    pub fn region(page: usize, bbox: Rect) -> Self {
        Self {
            bbox: Some(bbox),
            page: Some(page),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = normalize_content(Some(content.into()));
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    /// Trimmed literal content, if any.
    pub fn trimmed_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Whether the target names anything to match; targets without box and
    /// content are ignored.
    pub fn is_actionable(&self) -> bool {
        self.bbox.is_some() || self.trimmed_content().is_some()
    }

    /// Whether this target applies to `page`. Content-only targets without a
    /// page apply to all pages; a box without a page applies to none.
    pub fn applies_to(&self, page: usize) -> bool {
        self.page.map_or(self.bbox.is_none(), |p| p == page)
    }

    /// A box with no page to place it on.
    pub fn is_unplaced_region(&self) -> bool {
        self.bbox.is_some() && self.page.is_none()
    }

    /// Label used in reports and logs.
    pub fn label(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.content.as_ref().map(|c| format!("text '{}'", c)))
            .unwrap_or_else(|| "text region".to_string())
    }
}

/// A target naming one enumerated object (image, drawing, widget, link).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTarget {
    pub id: String,
    pub bbox: Option<Rect>,
    pub page: Option<usize>,
    pub content: Option<String>,
}

impl ObjectTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bbox: None,
            page: None,
            content: None,
        }
    }

    /// Parsed form of the id, if it is well formed.
    pub fn element_id(&self) -> Option<ElementId> {
        self.id.parse().ok()
    }
}

/// The closed set of removal target kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum RemovalTarget {
    Text(TextTarget),
    XObjectImage(ObjectTarget),
    Drawing(ObjectTarget),
    Widget(ObjectTarget),
    Link(ObjectTarget),
    /// Optional-content group, by object number.
    Layer(u32),
}

impl RemovalTarget {
    /// Human readable label used in reports and logs.
    pub fn label(&self) -> String {
        match self {
            Self::Text(t) => t.label(),
            Self::XObjectImage(t) | Self::Drawing(t) | Self::Widget(t) | Self::Link(t) => {
                t.id.clone()
            }
            Self::Layer(xref) => format!("layer {}", xref),
        }
    }
}

/// All removal targets of one operation, grouped by category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetSet {
    pub text: Vec<TextTarget>,
    pub images: Vec<ObjectTarget>,
    pub drawings: Vec<ObjectTarget>,
    pub widgets: Vec<ObjectTarget>,
    pub links: Vec<ObjectTarget>,
    pub layers: Vec<u32>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates the caller's JSON description.
    pub fn from_json(json: &str) -> UnmarkResult<Self> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let raw: RawTargets = serde_json::from_str(trimmed).map_err(|e| {
            UnmarkError::invalid_input("remove_targets", format!("malformed targets: {}", e))
        })?;
        raw.validate()
    }

    pub fn push(&mut self, target: RemovalTarget) {
        match target {
            RemovalTarget::Text(t) => self.text.push(t),
            RemovalTarget::XObjectImage(t) => self.images.push(t),
            RemovalTarget::Drawing(t) => self.drawings.push(t),
            RemovalTarget::Widget(t) => self.widgets.push(t),
            RemovalTarget::Link(t) => self.links.push(t),
            RemovalTarget::Layer(x) => self.layers.push(x),
        }
    }

    pub fn with(mut self, target: RemovalTarget) -> Self {
        self.push(target);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
            && self.images.is_empty()
            && self.drawings.is_empty()
            && self.widgets.is_empty()
            && self.links.is_empty()
            && self.layers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
            + self.images.len()
            + self.drawings.len()
            + self.widgets.len()
            + self.links.len()
            + self.layers.len()
    }

    /// Whether any image target names `id`.
    pub fn has_image(&self, id: &str) -> bool {
        self.images.iter().any(|t| t.id == id)
    }

    pub fn has_drawing(&self, id: &str) -> bool {
        self.drawings.iter().any(|t| t.id == id)
    }

    pub fn has_widget(&self, id: &str) -> bool {
        self.widgets.iter().any(|t| t.id == id)
    }

    pub fn has_link(&self, id: &str) -> bool {
        self.links.iter().any(|t| t.id == id)
    }

    /// Flattened view as tagged targets.
    pub fn targets(&self) -> Vec<RemovalTarget> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.text.iter().cloned().map(RemovalTarget::Text));
        out.extend(self.images.iter().cloned().map(RemovalTarget::XObjectImage));
        out.extend(self.drawings.iter().cloned().map(RemovalTarget::Drawing));
        out.extend(self.widgets.iter().cloned().map(RemovalTarget::Widget));
        out.extend(self.links.iter().cloned().map(RemovalTarget::Link));
        out.extend(self.layers.iter().copied().map(RemovalTarget::Layer));
        out
    }
}

fn normalize_content(content: Option<String>) -> Option<String> {
    content.filter(|c| !c.trim().is_empty())
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawTargets {
    text: Vec<RawEntry>,
    xobjects: Vec<RawEntry>,
    drawings: Vec<RawEntry>,
    widgets: Vec<RawEntry>,
    links: Vec<RawEntry>,
    layers: Vec<RawLayer>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Bare(String),
    Spec(RawSpec),
}

#[derive(Debug, Deserialize)]
struct RawSpec {
    id: Option<String>,
    content: Option<String>,
    bbox: Option<Rect>,
    page: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLayer {
    Number(u32),
    Text(String),
}

impl RawTargets {
    fn validate(self) -> UnmarkResult<TargetSet> {
        let text = self
            .text
            .into_iter()
            .map(|entry| match entry {
                RawEntry::Bare(content) => TextTarget::content(content),
                RawEntry::Spec(spec) => TextTarget {
                    id: spec.id,
                    content: normalize_content(spec.content),
                    bbox: spec.bbox,
                    page: spec.page,
                },
            })
            .collect();

        let layers = self
            .layers
            .into_iter()
            .map(|layer| match layer {
                RawLayer::Number(n) => Ok(n),
                RawLayer::Text(s) => s.trim().parse::<u32>().map_err(|_| {
                    UnmarkError::invalid_input("layers", format!("'{}' is not an object number", s))
                }),
            })
            .collect::<UnmarkResult<Vec<_>>>()?;

        Ok(TargetSet {
            text,
            images: objects("xobjects", self.xobjects)?,
            drawings: objects("drawings", self.drawings)?,
            widgets: objects("widgets", self.widgets)?,
            links: objects("links", self.links)?,
            layers,
        })
    }
}

fn objects(category: &str, entries: Vec<RawEntry>) -> UnmarkResult<Vec<ObjectTarget>> {
    entries
        .into_iter()
        .map(|entry| match entry {
            RawEntry::Bare(id) => Ok(ObjectTarget::new(id)),
            RawEntry::Spec(spec) => {
                let id = spec.id.ok_or_else(|| {
                    UnmarkError::invalid_input(category, "target object without an 'id'")
                })?;
                Ok(ObjectTarget {
                    id,
                    bbox: spec.bbox,
                    page: spec.page,
                    content: normalize_content(spec.content),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_entries() {
        let json = r#"{
            "text": ["CONFIDENTIAL", {"content": "Draft", "bbox": [0, 0, 10, 10], "page": 1}],
            "xobjects": ["p0_img_7", {"id": "p0_img_0"}],
            "drawings": [{"id": "p2_draw_5", "bbox": [1, 2, 3, 4]}],
            "widgets": ["p1_widget_17"],
            "links": [{"id": "p0_link_3"}],
            "layers": [12, "14"]
        }"#;
        let set = TargetSet::from_json(json).unwrap();
        assert_eq!(set.text.len(), 2);
        assert_eq!(set.text[0], TextTarget::content("CONFIDENTIAL"));
        assert_eq!(set.text[1].page, Some(1));
        assert!(set.has_image("p0_img_0"));
        assert_eq!(set.drawings[0].bbox, Some(Rect::new(1.0, 2.0, 3.0, 4.0)));
        assert_eq!(set.layers, vec![12, 14]);
        assert_eq!(set.len(), 9);
    }

    #[test]
    fn test_empty_json_is_empty_set() {
        assert!(TargetSet::from_json("{}").unwrap().is_empty());
        assert!(TargetSet::from_json("  ").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        assert!(matches!(
            TargetSet::from_json(r#"{"text": [{"bbox": "wide"}]}"#),
            Err(UnmarkError::InvalidInput { .. })
        ));
        assert!(TargetSet::from_json(r#"{"widgets": [{"page": 0}]}"#).is_err());
        assert!(TargetSet::from_json(r#"{"layers": ["ocg"]}"#).is_err());
        assert!(TargetSet::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_blank_content_is_not_actionable() {
        let t = TextTarget::content("   ");
        assert!(t.content.is_none());
        assert!(!t.is_actionable());
        assert!(TextTarget::region(0, Rect::new(0.0, 0.0, 1.0, 1.0)).is_actionable());
    }

    #[test]
    fn test_region_without_page_applies_nowhere() {
        let set = TargetSet::from_json(r#"{"text": [{"bbox": [0, 0, 100, 100]}, "Draft"]}"#).unwrap();
        let region = &set.text[0];
        assert!(region.is_unplaced_region());
        assert!(!region.applies_to(0));
        assert!(!region.applies_to(3));
        assert!(set.text[1].applies_to(3));
        assert!(TextTarget::region(2, Rect::new(0.0, 0.0, 1.0, 1.0)).applies_to(2));
    }
}
