//! Removal of objects that are not content-stream text.
//!
//! Widgets, links and image objects are deleted directly by synthetic id.
//! Drawings are only marked here: their expanded boxes become redaction
//! marks that the graphics-only finalization pass flattens later.

use std::collections::BTreeSet;

use log::{debug, info};

use super::report::EditReport;
use super::toolkit::EditableDocument;
use crate::domain::{EditConfig, ElementId, TargetSet};
use crate::error::UnmarkResult;

/// What the pruning step left for later stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Redaction marks placed for drawings.
    pub marks: usize,
    /// Inline image targets with no annotation to delete instead; these are
    /// removed from the content streams.
    pub inline_images: Vec<String>,
}

/// Deletes widget, link, image and drawing targets of one page.
#[derive(Debug, Clone, Copy)]
pub struct ObjectPruner<'a> {
    config: &'a EditConfig,
}

impl<'a> ObjectPruner<'a> {
    pub fn new(config: &'a EditConfig) -> Self {
        Self { config }
    }

    /// Processes every object target of `page`. Failures of single
    /// elements are recorded in `report`; enumeration failures propagate.
    pub fn prune(
        &self,
        doc: &mut dyn EditableDocument,
        page: usize,
        targets: &TargetSet,
        report: &mut EditReport,
    ) -> UnmarkResult<PruneOutcome> {
        let mut outcome = PruneOutcome::default();
        if !targets.widgets.is_empty() {
            self.prune_widgets(doc, page, targets, report)?;
        }
        if !targets.links.is_empty() {
            self.prune_links(doc, page, targets, report)?;
        }
        if !targets.images.is_empty() {
            outcome.inline_images = self.prune_images(doc, page, targets, report)?;
        }
        if !targets.drawings.is_empty() {
            outcome.marks = self.mark_drawings(doc, page, targets, report)?;
        }
        Ok(outcome)
    }

    fn prune_widgets(
        &self,
        doc: &mut dyn EditableDocument,
        page: usize,
        targets: &TargetSet,
        report: &mut EditReport,
    ) -> UnmarkResult<()> {
        let mut found = BTreeSet::new();
        for widget in doc.widgets(page)? {
            let id = ElementId::Widget { page, xref: widget.xref }.to_string();
            if !targets.has_widget(&id) || !found.insert(id.clone()) {
                continue;
            }
            match doc.delete_widget(page, widget.xref) {
                Ok(()) => {
                    info!("Deleted widget {}", id);
                    report.applied(id, Some(page));
                }
                Err(e) => report.failed(id, Some(page), e.to_string()),
            }
        }
        report_missing(targets.widgets.iter().map(|t| t.id.as_str()), page, &found, report);
        Ok(())
    }

    fn prune_links(
        &self,
        doc: &mut dyn EditableDocument,
        page: usize,
        targets: &TargetSet,
        report: &mut EditReport,
    ) -> UnmarkResult<()> {
        let matched: Vec<(usize, String)> = doc
            .links(page)?
            .iter()
            .enumerate()
            .map(|(index, _)| (index, ElementId::Link { page, index }.to_string()))
            .filter(|(_, id)| targets.has_link(id))
            .collect();

        // later indices first so earlier ones stay valid
        for (index, id) in matched.iter().rev() {
            match doc.delete_link(page, *index) {
                Ok(()) => report.applied(id.clone(), Some(page)),
                Err(e) => report.failed(id.clone(), Some(page), e.to_string()),
            }
        }
        let found: BTreeSet<String> = matched.into_iter().map(|(_, id)| id).collect();
        report_missing(targets.links.iter().map(|t| t.id.as_str()), page, &found, report);
        Ok(())
    }

    /// Returns the inline image ids left for stream-level removal.
    fn prune_images(
        &self,
        doc: &mut dyn EditableDocument,
        page: usize,
        targets: &TargetSet,
        report: &mut EditReport,
    ) -> UnmarkResult<Vec<String>> {
        let images = doc.images(page)?;
        let mut found = BTreeSet::new();
        let mut inline = Vec::new();

        for image in &images {
            let id = ElementId::Image { page, xref: image.xref }.to_string();
            if !targets.has_image(&id) {
                continue;
            }
            let first = found.insert(id.clone());

            if image.xref > 0 {
                if !first {
                    continue;
                }
                match doc.delete_image(page, image.xref) {
                    Ok(()) => {
                        info!("Deleted image object {}", image.xref);
                        report.applied(id, Some(page));
                    }
                    Err(e) => report.failed(id, Some(page), e.to_string()),
                }
                continue;
            }

            // an xref-less image may be a stamp annotation's appearance
            let image_area = image.bbox.area();
            let stamp = doc.annotations(page)?.into_iter().find(|annot| {
                !annot.is_widget_or_link()
                    && annot
                        .bbox
                        .intersection(&image.bbox)
                        .map_or(false, |i| i.area() > image_area * self.config.annotation_overlap_ratio)
            });
            match stamp {
                Some(annot) => match doc.delete_annotation(page, annot.xref) {
                    Ok(()) => {
                        info!("Deleted {} annotation {} covering {}", annot.subtype, annot.xref, id);
                        report.applied(id, Some(page));
                    }
                    Err(e) => report.failed(id, Some(page), e.to_string()),
                },
                None => {
                    debug!("{} left for stream-level inline image removal", id);
                    if !inline.contains(&id) {
                        inline.push(id);
                    }
                }
            }
        }

        report_missing(targets.images.iter().map(|t| t.id.as_str()), page, &found, report);
        Ok(inline)
    }

    fn mark_drawings(
        &self,
        doc: &mut dyn EditableDocument,
        page: usize,
        targets: &TargetSet,
        report: &mut EditReport,
    ) -> UnmarkResult<usize> {
        let mut found = BTreeSet::new();
        let mut marks = 0;
        for (index, drawing) in doc.drawings(page)?.iter().enumerate() {
            let id = ElementId::Drawing { page, index }.to_string();
            if !targets.has_drawing(&id) || !found.insert(id.clone()) {
                continue;
            }
            let region = drawing.bbox.expand(self.config.drawing_margin);
            match doc.add_redaction_mark(page, region) {
                Ok(()) => {
                    marks += 1;
                    report.applied(id, Some(page));
                }
                Err(e) => report.failed(id, Some(page), e.to_string()),
            }
        }
        report_missing(targets.drawings.iter().map(|t| t.id.as_str()), page, &found, report);
        Ok(marks)
    }
}

/// Records targets addressed to `page` that matched nothing.
fn report_missing<'t>(
    ids: impl Iterator<Item = &'t str>,
    page: usize,
    found: &BTreeSet<String>,
    report: &mut EditReport,
) {
    let mut seen = BTreeSet::new();
    for id in ids {
        let on_page = id.parse::<ElementId>().map_or(false, |e| e.page() == page);
        if on_page && !found.contains(id) && seen.insert(id) {
            report.skipped(id, Some(page), "no such element on the page");
        }
    }
}
