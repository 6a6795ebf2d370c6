//! Surgical PDF content editing: remove selected text, images, vector
//! drawings, form fields and links from pages, and stamp text or image
//! overlays on top.
//!
//! Text removal works at the level of individual show instructions in the
//! page's content streams. Each targeted occurrence is located by its
//! encoded operand bytes and its rank among identical instructions, then
//! deleted without touching any other drawing operation. Everything else
//! (images, drawings, annotations, layers) is removed through the document
//! toolkit.
//!
//! # Features
//!
//! - **Surgical text removal**: deletes exactly the show instructions that
//!   were targeted, matching literal and hex encoded operands
//! - **Object pruning**: images (including inline images and image stamps),
//!   drawings, widgets and links by synthetic element id
//! - **Overlays**: text and image watermarks with rotation and opacity
//! - **Target enrichment**: fills in page and box of id-only targets from a
//!   single document scan
//! - **Analysis**: document summaries, per-page element inventories and
//!   suggested watermarks
//!
//! # Architecture
//!
//! - [`content`]: stream layout scanning, trace indexing, target matching
//!   and stream rewriting
//! - [`editing`]: the toolkit interface, object pruning, overlay
//!   compositing and the per-page edit pipeline
//! - [`backend`]: the lopdf toolkit, with MuPDF for rasterization
//! - [`domain`]: geometry, element ids, targets, overlays and configuration
//! - [`error`]: error taxonomy
//!
//! # Quick Start
//!
//! ```no_run
//! use unmark::{EditService, OverlayPlan, TargetSet};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = std::fs::read("input.pdf")?;
//! let targets = TargetSet::from_json(r#"{"text": ["CONFIDENTIAL"], "links": ["p0_link_0"]}"#)?;
//!
//! let service = EditService::with_lopdf();
//! let (output, report) = service.reconstruct(&input, &targets, &OverlayPlan::new(), None)?;
//! std::fs::write("output.pdf", output)?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```
//!
//! # Examples
//!
//! ## Watermark Every Page
//!
//! ```no_run
//! use unmark::{EditService, OverlayPlan, TargetSet};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = std::fs::read("input.pdf")?;
//! let overlays = OverlayPlan::from_json(
//!     r##"{"0": [{"type": "text", "text": "DRAFT", "x": 200, "y": 400,
//!                 "fontsize": 48, "angle": 45, "opacity": 0.3, "color": "#c00"}]}"##,
//! )?;
//!
//! let (output, _) = EditService::default().reconstruct(&input, &TargetSet::new(), &overlays, None)?;
//! std::fs::write("draft.pdf", output)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Locating Show Instructions
//!
//! ```
//! use unmark::content::ShowPattern;
//!
//! let stream = b"BT /F1 12 Tf (Secret) Tj ET";
//! let pattern = ShowPattern::literal("Secret").unwrap();
//! let found = pattern.find_at(stream, 0).unwrap();
//! assert_eq!(&stream[found.start..found.operand_end], b"(Secret)");
//! ```

pub mod backend;
pub mod content;
pub mod domain;
pub mod editing;
pub mod error;

pub use backend::{LopdfDocument, LopdfToolkit};
pub use domain::{EditConfig, ElementId, OverlayPlan, Rect, RemovalTarget, TargetSet};
pub use editing::{
    DocumentInfo, EditReport, EditService, EditableDocument, PageAnalysis, PdfToolkit,
};
pub use error::{UnmarkError, UnmarkResult};
