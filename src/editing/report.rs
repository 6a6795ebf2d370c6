//! Per-element outcomes of an edit.

use std::fmt;

use serde::Serialize;

/// What happened to one removal target or overlay element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum OutcomeStatus {
    Applied,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementOutcome {
    pub element: String,
    pub page: Option<usize>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Statistics and outcomes of an edit operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditReport {
    pub outcomes: Vec<ElementOutcome>,
    pub pages_processed: usize,
    /// Pages where at least one element was applied.
    pub pages_modified: usize,
    pub streams_modified: usize,
    /// Show instructions and inline images deleted from streams.
    pub occurrences_removed: usize,
    pub overlays_applied: usize,
}

impl EditReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&mut self, element: impl Into<String>, page: Option<usize>) {
        self.record(element, page, OutcomeStatus::Applied);
    }

    pub fn skipped(&mut self, element: impl Into<String>, page: Option<usize>, reason: impl Into<String>) {
        self.record(element, page, OutcomeStatus::Skipped(reason.into()));
    }

    pub fn failed(&mut self, element: impl Into<String>, page: Option<usize>, reason: impl Into<String>) {
        let element = element.into();
        let reason = reason.into();
        log::warn!("{} failed: {}", element, reason);
        self.record(element, page, OutcomeStatus::Failed(reason));
    }

    fn record(&mut self, element: impl Into<String>, page: Option<usize>, status: OutcomeStatus) {
        self.outcomes.push(ElementOutcome {
            element: element.into(),
            page,
            status,
        });
    }

    pub fn applied_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Applied))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Failed(_)))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Skipped(_)))
    }

    fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    /// Outcomes recorded for `page`.
    pub fn for_page(&self, page: usize) -> impl Iterator<Item = &ElementOutcome> {
        self.outcomes.iter().filter(move |o| o.page == Some(page))
    }

    /// Returns true if anything was changed.
    pub fn has_changes(&self) -> bool {
        self.applied_count() > 0 || self.streams_modified > 0
    }

    /// Folds a per-page report into this one.
    pub fn merge(&mut self, other: EditReport) {
        self.outcomes.extend(other.outcomes);
        self.pages_processed += other.pages_processed;
        self.pages_modified += other.pages_modified;
        self.streams_modified += other.streams_modified;
        self.occurrences_removed += other.occurrences_removed;
        self.overlays_applied += other.overlays_applied;
    }
}

impl fmt::Display for EditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pages processed:     {}", self.pages_processed)?;
        writeln!(f, "Pages modified:      {}", self.pages_modified)?;
        writeln!(f, "Streams modified:    {}", self.streams_modified)?;
        writeln!(f, "Occurrences removed: {}", self.occurrences_removed)?;
        writeln!(f, "Overlays applied:    {}", self.overlays_applied)?;
        write!(
            f,
            "Elements: {} applied, {} skipped, {} failed",
            self.applied_count(),
            self.skipped_count(),
            self.failed_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_merge() {
        let mut report = EditReport::new();
        report.applied("p0_link_0", Some(0));
        report.skipped("text 'x'", Some(0), "no match");
        let mut page = EditReport::new();
        page.failed("text overlay 'A'", Some(1), "font");
        page.streams_modified = 2;
        report.merge(page);

        assert_eq!(report.applied_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.for_page(1).count(), 1);
        assert!(report.has_changes());
    }

    #[test]
    fn test_serializes_status_inline() {
        let mut report = EditReport::new();
        report.skipped("p0_img_0", Some(0), "no inline image");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["status"], "skipped");
        assert_eq!(json["outcomes"][0]["reason"], "no inline image");
    }
}
