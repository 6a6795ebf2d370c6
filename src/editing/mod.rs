//! Page editing: object pruning, stream rewriting and overlay compositing
//! sequenced per page, plus the read-only document analyses.
//!
//! [`EditService`] is the entry point. It owns a [`PdfToolkit`] and an
//! [`EditConfig`] and turns document bytes into summaries, previews or
//! edited documents.

pub mod analysis;
pub mod compositor;
pub mod enrich;
pub mod inventory;
pub mod orchestrator;
pub mod pruner;
pub mod report;
pub mod toolkit;

pub use analysis::{DocumentInfo, PageAnalysis};
pub use compositor::OverlayCompositor;
pub use enrich::LookupMap;
pub use inventory::{ElementKind, InventoryElement};
pub use orchestrator::{EditOrchestrator, EditStage, PageEdit};
pub use pruner::{ObjectPruner, PruneOutcome};
pub use report::{EditReport, ElementOutcome, OutcomeStatus};
pub use toolkit::{EditableDocument, PdfToolkit};

use std::path::Path;

use log::{info, warn};

use crate::backend::LopdfToolkit;
use crate::domain::{EditConfig, OverlayPlan, TargetSet};
use crate::error::{UnmarkError, UnmarkResult};

/// Edit service coordinating the toolkit and the editing stages.
///
/// Each call opens its own document from the given bytes; nothing is
/// shared between calls.
pub struct EditService {
    toolkit: Box<dyn PdfToolkit>,
    config: EditConfig,
}

impl EditService {
    /// Creates a service over the specified toolkit.
    pub fn new(toolkit: Box<dyn PdfToolkit>) -> Self {
        Self {
            toolkit,
            config: EditConfig::default(),
        }
    }

    /// Creates a service backed by the lopdf toolkit.
    pub fn with_lopdf() -> Self {
        Self::new(Box::new(LopdfToolkit::new()))
    }

    pub fn with_config(mut self, config: EditConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EditConfig {
        &self.config
    }

    /// Summarizes a document.
    pub fn info(&self, bytes: &[u8]) -> UnmarkResult<DocumentInfo> {
        let doc = self.toolkit.open(bytes)?;
        analysis::document_info(doc.as_ref(), bytes.len())
    }

    /// Lists the texts and elements of one page.
    pub fn analyze(&self, bytes: &[u8], page: usize, analyze_all: bool) -> UnmarkResult<PageAnalysis> {
        let doc = self.toolkit.open(bytes)?;
        analysis::analyze_page(doc.as_ref(), page, analyze_all)
    }

    /// Edits one page of a fresh copy and rasterizes it.
    ///
    /// # Returns
    /// PNG bytes of the edited page and the edit report
    pub fn preview(
        &self,
        bytes: &[u8],
        page: usize,
        targets: &TargetSet,
        overlays: &OverlayPlan,
        shared_image: Option<&[u8]>,
    ) -> UnmarkResult<(Vec<u8>, EditReport)> {
        let mut doc = self.toolkit.open(bytes)?;
        let orchestrator = EditOrchestrator::new(&self.config);
        let report = orchestrator.preview(doc.as_mut(), page, targets, overlays, shared_image)?;

        let geometry = doc.page_geometry(page)?;
        let scale = self.config.preview_scale_for(geometry.width, geometry.height);
        let png = doc.render_png(page, scale)?;
        info!("Rendered preview of page {} at scale {}", page, scale);
        Ok((png, report))
    }

    /// Edits every page and serializes the result.
    ///
    /// # Returns
    /// The edited document bytes and the edit report
    pub fn reconstruct(
        &self,
        bytes: &[u8],
        targets: &TargetSet,
        overlays: &OverlayPlan,
        shared_image: Option<&[u8]>,
    ) -> UnmarkResult<(Vec<u8>, EditReport)> {
        let mut doc = self.toolkit.open(bytes)?;
        let orchestrator = EditOrchestrator::new(&self.config);
        let report = orchestrator.reconstruct(doc.as_mut(), targets, overlays, shared_image)?;

        if self.config.save.subset_fonts {
            if let Err(e) = doc.subset_fonts() {
                warn!("Font subsetting skipped: {}", e);
            }
        }
        let output = doc.save(&self.config.save)?;
        info!("Saved {} bytes ({} input)", output.len(), bytes.len());
        Ok((output, report))
    }
}

impl Default for EditService {
    fn default() -> Self {
        Self::with_lopdf()
    }
}

/// Reads a whole input file.
pub fn read_input(path: &Path) -> UnmarkResult<Vec<u8>> {
    if !path.exists() {
        return Err(UnmarkError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "Input file does not exist"),
        });
    }
    std::fs::read(path).map_err(|source| UnmarkError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_creation() {
        let service = EditService::with_lopdf().with_config(EditConfig::new().with_drawing_margin(4.0));
        assert_eq!(service.config().drawing_margin, 4.0);
    }

    #[test]
    fn test_read_missing_input() {
        let err = read_input(Path::new("/nonexistent/input.pdf")).unwrap_err();
        assert!(matches!(err, UnmarkError::Io { .. }));
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        assert!(EditService::default().info(b"not a pdf").is_err());
    }
}
