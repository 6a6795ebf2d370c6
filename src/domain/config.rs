//! Tunable parameters of an edit operation.

use std::collections::BTreeMap;

/// Where a named overlay font comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    /// A font file on disk.
    File(String),
    /// A font built into the toolkit (`helv`, `tiro`, `cour`, ...).
    Builtin(String),
}

/// How aggressively unused objects are dropped on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compaction {
    None,
    /// Drop unreachable objects.
    Prune,
    /// Drop unreachable objects and empty streams, then renumber.
    #[default]
    Full,
}

/// Persistence options for the final document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    pub compaction: Compaction,
    pub compress: bool,
    pub subset_fonts: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compaction: Compaction::Full,
            compress: true,
            subset_fonts: true,
        }
    }
}

/// Configuration shared by all stages of an edit.
#[derive(Debug, Clone)]
pub struct EditConfig {
    /// Slack around a target box when testing a trace's centre.
    pub center_tolerance: f64,
    /// Fraction of a trace's own area that must fall inside the target box.
    pub min_overlap_ratio: f64,
    /// Margin added on every side of a drawing before marking it.
    pub drawing_margin: f64,
    /// Fraction of an inline image covered by an annotation for the
    /// annotation to be taken as the image's source.
    pub annotation_overlap_ratio: f64,
    pub preview_scale: f32,
    pub reduced_preview_scale: f32,
    /// Page width or height beyond which the reduced preview scale is used.
    pub large_page_threshold: f64,
    pub default_font: String,
    pub font_files: BTreeMap<String, FontSource>,
    pub save: SaveOptions,
}

impl Default for EditConfig {
    fn default() -> Self {
        let font_files = [
            ("song", "/usr/share/fonts/truetype/arphic/uming.ttc"),
            ("kai", "/usr/share/fonts/truetype/arphic/ukai.ttc"),
            ("xingkai", "/usr/share/fonts/truetype/arphic/ukai.ttc"),
            ("yahei", "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc"),
        ]
        .into_iter()
        .map(|(name, path)| (name.to_string(), FontSource::File(path.to_string())))
        .chain(std::iter::once((
            "times-roman".to_string(),
            FontSource::Builtin("tiro".to_string()),
        )))
        .collect();

        Self {
            center_tolerance: 0.5,
            min_overlap_ratio: 0.8,
            drawing_margin: 2.0,
            annotation_overlap_ratio: 0.9,
            preview_scale: 1.5,
            reduced_preview_scale: 1.0,
            large_page_threshold: 2000.0,
            default_font: "helv".to_string(),
            font_files,
            save: SaveOptions::default(),
        }
    }
}

impl EditConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drawing_margin(mut self, margin: f64) -> Self {
        self.drawing_margin = margin;
        self
    }

    pub fn with_font(mut self, name: impl Into<String>, source: FontSource) -> Self {
        self.font_files.insert(name.into(), source);
        self
    }

    pub fn with_save_options(mut self, save: SaveOptions) -> Self {
        self.save = save;
        self
    }

    /// Candidate fonts for `name`, most specific first, ending with the
    /// default font.
    pub fn font_candidates(&self, name: &str) -> Vec<FontSource> {
        let mut candidates = vec![self
            .font_files
            .get(name)
            .cloned()
            .unwrap_or_else(|| FontSource::Builtin(name.to_string()))];
        let fallback = FontSource::Builtin(self.default_font.clone());
        if !candidates.contains(&fallback) {
            candidates.push(fallback);
        }
        candidates
    }

    /// Raster scale for a page of the given size.
    pub fn preview_scale_for(&self, width: f64, height: f64) -> f32 {
        if width > self.large_page_threshold || height > self.large_page_threshold {
            self.reduced_preview_scale
        } else {
            self.preview_scale
        }
    }
}
