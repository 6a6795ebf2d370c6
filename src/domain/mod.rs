//! Domain models shared by the core and its callers.
//!
//! Geometry, synthetic element ids, the typed removal targets and overlay
//! elements, and the configuration record of an edit.

pub mod config;
pub mod geometry;
pub mod ids;
pub mod overlay;
pub mod target;

pub use config::{Compaction, EditConfig, FontSource, SaveOptions};
pub use geometry::{Matrix, Point, Rect};
pub use ids::ElementId;
pub use overlay::{
    Color, ImageOverlay, OverlayElement, OverlayPlan, OverlaySpec, TextOverlay,
};
pub use target::{ObjectTarget, RemovalTarget, TargetSet, TextTarget};
