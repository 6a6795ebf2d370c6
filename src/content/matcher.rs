//! Resolution of text removal targets to ranked trace occurrences.

use std::collections::{BTreeMap, BTreeSet};

use super::trace::{Encoding, HexSignature, IndexedTrace, TraceIndex};
use crate::domain::{EditConfig, TextTarget};

/// Geometric thresholds of the matching policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    pub center_tolerance: f64,
    pub min_overlap_ratio: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            center_tolerance: 0.5,
            min_overlap_ratio: 0.8,
        }
    }
}

impl From<&EditConfig> for MatchPolicy {
    fn from(config: &EditConfig) -> Self {
        Self {
            center_tolerance: config.center_tolerance,
            min_overlap_ratio: config.min_overlap_ratio,
        }
    }
}

impl MatchPolicy {
    /// Whether `trace` is an occurrence denoted by `target`.
    ///
    /// With a box, the trace must sit mostly inside it (centre within the
    /// box, overlap above the ratio of the trace's own area); content, when
    /// also given, must then be contained one way or the other. Without a
    /// box, trimmed content must be equal.
    pub fn matches(&self, target: &TextTarget, trace: &IndexedTrace<'_>) -> bool {
        let content = target.trimmed_content();
        match target.bbox {
            Some(bbox) => {
                let trace_box = trace.trace.bbox;
                if !bbox.contains_point(trace_box.center(), self.center_tolerance) {
                    return false;
                }
                let overlap = match bbox.intersection(&trace_box) {
                    Some(inter) => inter.area(),
                    None => return false,
                };
                if overlap <= trace_box.area() * self.min_overlap_ratio {
                    return false;
                }
                match content {
                    None => true,
                    Some(wanted) => {
                        let text = trace.text.trim();
                        !text.is_empty() && (wanted.contains(text) || text.contains(wanted))
                    }
                }
            }
            None => content.map_or(false, |wanted| trace.text.trim() == wanted),
        }
    }
}

/// One planned deletion: the `rank`-th operand spelling a signature in one
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Occurrence {
    Hex(HexSignature, usize),
    Literal(String, usize),
}

impl Occurrence {
    /// The occurrence `trace` is deleted as.
    pub fn of(trace: &IndexedTrace<'_>) -> Self {
        match trace.encoding {
            Encoding::Hex => Self::Hex(trace.hex.clone(), trace.hex_rank),
            Encoding::Literal => Self::Literal(trace.text.clone(), trace.text_rank),
        }
    }
}

/// Ranks to delete, per signature, for one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    hex: BTreeMap<HexSignature, BTreeSet<usize>>,
    literal: BTreeMap<String, BTreeSet<usize>>,
}

impl DeletionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every trace of `index` matched by `target`; returns the
    /// occurrences scheduled for it.
    pub fn add_target(
        &mut self,
        target: &TextTarget,
        index: &TraceIndex<'_>,
        policy: &MatchPolicy,
    ) -> Vec<Occurrence> {
        if !target.is_actionable() {
            return Vec::new();
        }
        index
            .iter()
            .filter(|t| policy.matches(target, t))
            .filter_map(|t| self.add_trace(t))
            .collect()
    }

    /// Schedules `trace` under the signature of its own encoding, so exactly
    /// one rewriter pass can delete it.
    pub fn add_trace(&mut self, trace: &IndexedTrace<'_>) -> Option<Occurrence> {
        if trace.trace.is_empty() {
            return None;
        }
        let occurrence = Occurrence::of(trace);
        match &occurrence {
            Occurrence::Hex(signature, rank) => {
                self.hex.entry(signature.clone()).or_default().insert(*rank);
            }
            Occurrence::Literal(text, rank) => {
                self.literal.entry(text.clone()).or_default().insert(*rank);
            }
        }
        Some(occurrence)
    }

    pub fn hex(&self) -> &BTreeMap<HexSignature, BTreeSet<usize>> {
        &self.hex
    }

    pub fn literal(&self) -> &BTreeMap<String, BTreeSet<usize>> {
        &self.literal
    }

    pub fn is_empty(&self) -> bool {
        self.hex.is_empty() && self.literal.is_empty()
    }
}
