//! Overlay stamping.

use std::collections::HashMap;

use log::{debug, warn};

use super::report::EditReport;
use super::toolkit::{EditableDocument, FontHandle, ImagePlacement, TextPlacement};
use crate::domain::{EditConfig, FontSource, ImageOverlay, OverlayElement, Point, TextOverlay};
use crate::error::{UnmarkError, UnmarkResult};

/// Inserts overlay elements onto pages whose removals are complete.
///
/// Fonts loaded during one compositor's lifetime are reused across
/// elements and pages.
#[derive(Debug)]
pub struct OverlayCompositor<'a> {
    config: &'a EditConfig,
    fonts: HashMap<String, FontHandle>,
}

impl<'a> OverlayCompositor<'a> {
    pub fn new(config: &'a EditConfig) -> Self {
        Self {
            config,
            fonts: HashMap::new(),
        }
    }

    /// Places every element in order; returns how many were applied.
    /// A failing element is recorded and the rest still go through.
    pub fn apply(
        &mut self,
        doc: &mut dyn EditableDocument,
        page: usize,
        elements: &[OverlayElement],
        report: &mut EditReport,
    ) -> usize {
        let mut applied = 0;
        for element in elements {
            let result = match element {
                OverlayElement::Text(text) => self.place_text(doc, page, text),
                OverlayElement::Image(image) => self.place_image(doc, page, image),
            };
            match result {
                Ok(()) => {
                    applied += 1;
                    report.applied(element.label(), Some(page));
                }
                Err(e) => report.failed(element.label(), Some(page), e.to_string()),
            }
        }
        applied
    }

    /// Draws `text` centred on its anchor point.
    ///
    /// The baseline origin sits half the rendered width left of the anchor
    /// and a third of the font size below it; rotation pivots on the anchor.
    pub fn place_text(
        &mut self,
        doc: &mut dyn EditableDocument,
        page: usize,
        text: &TextOverlay,
    ) -> UnmarkResult<()> {
        if text.content.is_empty() {
            return Err(UnmarkError::element("text overlay", "empty text"));
        }
        let font = self.resolve_font(doc, &text.fontname)?;
        let width = doc.text_width(&font, &text.content, text.fontsize)?;
        let origin = Point::new(
            text.point.x - width / 2.0,
            text.point.y + text.fontsize / 3.0,
        );
        doc.insert_text(
            page,
            &TextPlacement {
                text: text.content.clone(),
                origin,
                fontsize: text.fontsize,
                font,
                color: text.color,
                rotation_degrees: text.rotation_degrees,
                pivot: text.point,
                opacity: text.opacity,
                overlay: true,
            },
        )
    }

    pub fn place_image(
        &mut self,
        doc: &mut dyn EditableDocument,
        page: usize,
        image: &ImageOverlay,
    ) -> UnmarkResult<()> {
        if image.rect.is_empty() {
            return Err(UnmarkError::element("image overlay", "empty target rectangle"));
        }
        doc.insert_image(
            page,
            &ImagePlacement {
                rect: image.rect,
                bytes: image.bytes.clone(),
                rotation_degrees: image.rotation_degrees,
                opacity: image.opacity,
                overlay: true,
            },
        )
    }

    /// Loads the first usable candidate for `name`, ending with the default
    /// font.
    fn resolve_font(
        &mut self,
        doc: &mut dyn EditableDocument,
        name: &str,
    ) -> UnmarkResult<FontHandle> {
        if let Some(handle) = self.fonts.get(name) {
            return Ok(handle.clone());
        }
        let mut last_error = None;
        for source in self.config.font_candidates(name) {
            match doc.load_font(&source) {
                Ok(handle) => {
                    debug!("Font '{}' resolved to {:?}", name, source);
                    self.fonts.insert(name.to_string(), handle.clone());
                    return Ok(handle);
                }
                Err(e) => {
                    warn!("Font loading failed for '{}' from {}: {}", name, describe(&source), e);
                    last_error = Some(e);
                }
            }
        }
        Err(UnmarkError::element(
            format!("font '{}'", name),
            last_error.map_or_else(|| "no candidates".to_string(), |e| e.to_string()),
        ))
    }
}

fn describe(source: &FontSource) -> String {
    match source {
        FontSource::File(path) => format!("file {}", path),
        FontSource::Builtin(name) => format!("built-in {}", name),
    }
}
