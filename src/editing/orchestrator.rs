//! Sequencing of one edit.
//!
//! Every page goes through the same stages, strictly in order:
//!
//! ```text
//! Pristine -> ObjectsPruned -> StreamsRewritten -> Finalized -> OverlaysApplied
//! ```
//!
//! Finalization rewrites the page's content, so it runs only after every
//! stream edit is persisted. Overlays go last so the graphics redaction
//! pass can never touch them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{debug, info, warn};

use super::compositor::OverlayCompositor;
use super::enrich::LookupMap;
use super::pruner::{ObjectPruner, PruneOutcome};
use super::report::EditReport;
use super::toolkit::{EditableDocument, RedactionScope, StreamRef};
use crate::content::rewriter::remove_first_inline_image;
use crate::content::{DeletionPlan, MatchPolicy, Occurrence, StreamRewriter, TraceIndex};
use crate::domain::{EditConfig, OverlayElement, OverlayPlan, TargetSet};
use crate::error::{UnmarkError, UnmarkResult};

/// Stage of a page edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EditStage {
    Pristine,
    ObjectsPruned,
    StreamsRewritten,
    Finalized,
    OverlaysApplied,
}

impl EditStage {
    /// The only stage reachable from this one.
    pub fn next(self) -> Option<EditStage> {
        match self {
            Self::Pristine => Some(Self::ObjectsPruned),
            Self::ObjectsPruned => Some(Self::StreamsRewritten),
            Self::StreamsRewritten => Some(Self::Finalized),
            Self::Finalized => Some(Self::OverlaysApplied),
            Self::OverlaysApplied => None,
        }
    }
}

impl fmt::Display for EditStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Drives one page through the edit stages.
pub struct PageEdit<'d, 'c> {
    doc: &'d mut dyn EditableDocument,
    config: &'c EditConfig,
    page: usize,
    stage: EditStage,
    pruned: PruneOutcome,
    report: EditReport,
}

impl<'d, 'c> PageEdit<'d, 'c> {
    /// Starts an edit of `page`; out-of-range pages are invalid input.
    pub fn begin(
        doc: &'d mut dyn EditableDocument,
        config: &'c EditConfig,
        page: usize,
    ) -> UnmarkResult<Self> {
        let count = doc.page_count();
        if page >= count {
            return Err(UnmarkError::invalid_input(
                "page_index",
                format!("page {} out of range, document has {} page(s)", page, count),
            ));
        }
        Ok(Self {
            doc,
            config,
            page,
            stage: EditStage::Pristine,
            pruned: PruneOutcome::default(),
            report: EditReport::new(),
        })
    }

    pub fn stage(&self) -> EditStage {
        self.stage
    }

    fn advance(&mut self, to: EditStage) -> UnmarkResult<()> {
        if self.stage.next() != Some(to) {
            return Err(UnmarkError::PdfProcessing {
                message: format!("cannot move from {} to {}", self.stage, to),
                page: Some(self.page),
                source: None,
            });
        }
        debug!("Page {}: {} -> {}", self.page, self.stage, to);
        self.stage = to;
        Ok(())
    }

    /// Deletes widgets, links and image objects, and marks drawings.
    pub fn prune_objects(&mut self, targets: &TargetSet) -> UnmarkResult<()> {
        self.advance(EditStage::ObjectsPruned)?;
        let pruner = ObjectPruner::new(self.config);
        match pruner.prune(&mut *self.doc, self.page, targets, &mut self.report) {
            Ok(outcome) => self.pruned = outcome,
            Err(e) => warn!("Object pruning on page {} failed: {}", self.page, e),
        }
        Ok(())
    }

    /// Normalizes the page content, then deletes planned text occurrences
    /// and pending inline images from every stream the page uses directly.
    ///
    /// Occurrences are ranked and planned per stream. A text target is
    /// reported applied only once one of its planned occurrences has been
    /// deleted and written back.
    pub fn rewrite_streams(&mut self, targets: &TargetSet) -> UnmarkResult<()> {
        self.advance(EditStage::StreamsRewritten)?;
        let page = self.page;

        let text_targets: Vec<_> = targets
            .text
            .iter()
            .filter(|t| t.applies_to(page) && t.is_actionable())
            .collect();
        if text_targets.is_empty() && self.pruned.inline_images.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.doc.normalize_contents(page) {
            warn!("Could not normalize contents of page {}: {}", page, e);
        }

        let groups = if text_targets.is_empty() {
            Vec::new()
        } else {
            self.doc.text_traces(page).unwrap_or_else(|e| {
                warn!("Text traces of page {} unavailable: {}", page, e);
                Vec::new()
            })
        };
        let policy = MatchPolicy::from(self.config);
        let mut planned: Vec<BTreeSet<(StreamRef, Occurrence)>> =
            vec![BTreeSet::new(); text_targets.len()];
        let mut plans: BTreeMap<StreamRef, DeletionPlan> = BTreeMap::new();
        for group in &groups {
            let index = TraceIndex::build(&group.traces);
            let plan = plans.entry(group.stream).or_default();
            for (target, occurrences) in text_targets.iter().zip(planned.iter_mut()) {
                let matched = plan.add_target(target, &index, &policy);
                occurrences.extend(matched.into_iter().map(|o| (group.stream, o)));
            }
        }

        let streams = match self.page_streams() {
            Ok(streams) => streams,
            Err(e) => {
                warn!("Streams of page {} unavailable: {}", page, e);
                Vec::new()
            }
        };
        let mut pending_inline = self.pruned.inline_images.clone();
        let mut deleted: BTreeSet<(StreamRef, Occurrence)> = BTreeSet::new();

        for stream in streams {
            let plan = plans.get(&stream).filter(|p| !p.is_empty());
            if plan.is_none() && pending_inline.is_empty() {
                continue;
            }
            let mut data = match self.doc.read_stream(stream) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Skipping unreadable stream {:?}: {}", stream, e);
                    continue;
                }
            };
            let mut removed = 0;
            let mut inline_removed = None;
            if !pending_inline.is_empty() && remove_first_inline_image(&mut data) {
                inline_removed = Some(pending_inline.remove(0));
                removed += 1;
            }
            let mut stream_deleted = BTreeSet::new();
            if let Some(plan) = plan {
                let outcome = StreamRewriter::new(plan).rewrite(&data);
                removed += outcome.removed;
                stream_deleted = outcome.deleted;
                data = outcome.data;
            }
            if removed == 0 {
                continue;
            }

            match self.doc.write_stream(stream, data) {
                Ok(()) => {
                    self.report.streams_modified += 1;
                    self.report.occurrences_removed += removed;
                    if let Some(id) = inline_removed {
                        info!("Removed inline image block for {}", id);
                        self.report.applied(id, Some(page));
                    }
                    deleted.extend(stream_deleted.into_iter().map(|o| (stream, o)));
                }
                Err(e) => {
                    warn!("Could not write stream {:?}: {}", stream, e);
                    if let Some(id) = inline_removed {
                        self.report.failed(id, Some(page), e.to_string());
                    }
                }
            }
        }

        for (target, occurrences) in text_targets.iter().zip(&planned) {
            let label = target.label();
            if occurrences.is_empty() {
                if target.page.is_some() {
                    self.report.skipped(label, Some(page), "no matching text");
                }
            } else if occurrences.iter().any(|o| deleted.contains(o)) {
                debug!(
                    "{} removed {} occurrence(s) on page {}",
                    label,
                    occurrences.iter().filter(|o| deleted.contains(*o)).count(),
                    page
                );
                self.report.applied(label, Some(page));
            } else {
                self.report.skipped(label, Some(page), "no stream match");
            }
        }
        for id in pending_inline {
            self.report.skipped(id, Some(page), "no inline image block found");
        }
        Ok(())
    }

    /// Page content streams followed by directly referenced form XObjects,
    /// without duplicates.
    fn page_streams(&self) -> UnmarkResult<Vec<StreamRef>> {
        let mut seen = BTreeSet::new();
        let mut streams = self.doc.content_streams(self.page)?;
        match self.doc.xobject_streams(self.page) {
            Ok(xobjects) => streams.extend(xobjects),
            Err(e) => warn!("XObjects of page {} unavailable: {}", self.page, e),
        }
        streams.retain(|s| seen.insert(*s));
        Ok(streams)
    }

    /// Flattens the drawing marks with a graphics-only redaction, if any
    /// marks were placed.
    pub fn finalize(&mut self) -> UnmarkResult<()> {
        self.advance(EditStage::Finalized)?;
        if self.pruned.marks == 0 {
            return Ok(());
        }
        match self.doc.apply_redactions(self.page, RedactionScope::GRAPHICS) {
            Ok(removed) => debug!(
                "Graphics redaction removed {} element(s) on page {}",
                removed, self.page
            ),
            Err(e) => self.report.failed(
                format!("graphics redaction of page {}", self.page),
                Some(self.page),
                e.to_string(),
            ),
        }
        Ok(())
    }

    pub fn apply_overlays(
        &mut self,
        compositor: &mut OverlayCompositor<'_>,
        overlays: &[OverlayElement],
    ) -> UnmarkResult<()> {
        self.advance(EditStage::OverlaysApplied)?;
        let applied = compositor.apply(&mut *self.doc, self.page, overlays, &mut self.report);
        self.report.overlays_applied += applied;
        Ok(())
    }

    /// Ends the edit and returns its report.
    pub fn finish(mut self) -> EditReport {
        self.report.pages_processed = 1;
        if self.report.applied_count() > 0 || self.report.streams_modified > 0 {
            self.report.pages_modified = 1;
        }
        self.report
    }
}

/// Runs edits over a document.
#[derive(Debug, Clone, Copy)]
pub struct EditOrchestrator<'c> {
    config: &'c EditConfig,
}

impl<'c> EditOrchestrator<'c> {
    pub fn new(config: &'c EditConfig) -> Self {
        Self { config }
    }

    /// Fills in missing target fields from one scan of the whole document.
    pub fn enrich_targets(&self, doc: &dyn EditableDocument, targets: &TargetSet) -> TargetSet {
        if targets.is_empty() {
            return targets.clone();
        }
        let lookup = LookupMap::build(doc);
        debug!("Lookup map holds {} element(s)", lookup.len());
        lookup.enrich(targets)
    }

    /// Applies removals and overlays to one page in place.
    pub fn edit_page(
        &self,
        doc: &mut dyn EditableDocument,
        page: usize,
        targets: &TargetSet,
        overlays: &[OverlayElement],
    ) -> UnmarkResult<EditReport> {
        let mut compositor = OverlayCompositor::new(self.config);
        self.run_page(doc, page, targets, overlays, &mut compositor)
    }

    fn run_page(
        &self,
        doc: &mut dyn EditableDocument,
        page: usize,
        targets: &TargetSet,
        overlays: &[OverlayElement],
        compositor: &mut OverlayCompositor<'_>,
    ) -> UnmarkResult<EditReport> {
        let mut edit = PageEdit::begin(doc, self.config, page)?;
        edit.prune_objects(targets)?;
        edit.rewrite_streams(targets)?;
        edit.finalize()?;
        edit.apply_overlays(compositor, overlays)?;
        Ok(edit.finish())
    }

    /// Enriches targets once, hides the requested layers, then edits every
    /// page in order.
    pub fn reconstruct(
        &self,
        doc: &mut dyn EditableDocument,
        targets: &TargetSet,
        overlays: &OverlayPlan,
        shared_image: Option<&[u8]>,
    ) -> UnmarkResult<EditReport> {
        let mut report = EditReport::new();
        let page_count = doc.page_count();
        let targets = self.enrich_targets(&*doc, targets);
        report_malformed_ids(&targets, &mut report);
        report_unplaced_regions(&targets, &mut report);

        for &layer in &targets.layers {
            let label = format!("layer {}", layer);
            match doc.set_layer_visibility(layer, false) {
                Ok(()) => report.applied(label, None),
                Err(e) => report.failed(label, None, e.to_string()),
            }
        }

        for page in overlays.pages().filter(|&p| p >= page_count) {
            report.skipped(
                format!("overlays for page {}", page),
                Some(page),
                "page out of range",
            );
        }

        let mut compositor = OverlayCompositor::new(self.config);
        for page in 0..page_count {
            let elements = resolve_overlays(overlays, page, shared_image, &mut report);
            let page_report = self.run_page(doc, page, &targets, &elements, &mut compositor)?;
            report.merge(page_report);
        }

        info!(
            "Reconstructed {} page(s): {} applied, {} failed",
            report.pages_processed,
            report.applied_count(),
            report.failed_count()
        );
        Ok(report)
    }

    /// Enriches targets and edits a single page, leaving layers alone.
    pub fn preview(
        &self,
        doc: &mut dyn EditableDocument,
        page: usize,
        targets: &TargetSet,
        overlays: &OverlayPlan,
        shared_image: Option<&[u8]>,
    ) -> UnmarkResult<EditReport> {
        if page >= doc.page_count() {
            return Err(UnmarkError::invalid_input(
                "page_index",
                format!("invalid page index {}", page),
            ));
        }
        let targets = self.enrich_targets(&*doc, targets);
        let mut report = EditReport::new();
        report_unplaced_regions(&targets, &mut report);
        let elements = resolve_overlays(overlays, page, shared_image, &mut report);
        report.merge(self.edit_page(doc, page, &targets, &elements)?);
        Ok(report)
    }
}

/// Resolves the overlay specs of `page`; specs that fail are recorded and
/// dropped.
fn resolve_overlays(
    overlays: &OverlayPlan,
    page: usize,
    shared_image: Option<&[u8]>,
    report: &mut EditReport,
) -> Vec<OverlayElement> {
    overlays
        .for_page(page)
        .iter()
        .filter_map(|spec| match spec.resolve(shared_image) {
            Ok(element) => Some(element),
            Err(e) => {
                report.failed(format!("overlay on page {}", page), Some(page), e.to_string());
                None
            }
        })
        .collect()
}

fn report_malformed_ids(targets: &TargetSet, report: &mut EditReport) {
    let objects = targets
        .images
        .iter()
        .chain(&targets.drawings)
        .chain(&targets.widgets)
        .chain(&targets.links);
    for target in objects.filter(|t| t.element_id().is_none()) {
        report.skipped(target.id.clone(), None, "malformed element id");
    }
}

fn report_unplaced_regions(targets: &TargetSet, report: &mut EditReport) {
    for target in targets.text.iter().filter(|t| t.is_unplaced_region()) {
        report.skipped(target.label(), None, "region without page");
    }
}
