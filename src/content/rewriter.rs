//! Deletion of ranked show instructions from raw content streams.

use std::collections::BTreeSet;
use std::ops::Range;

use log::debug;

use super::layout::{is_token_end, StreamLayout};
use super::matcher::{DeletionPlan, Occurrence};
use super::pattern::{ShowMatch, ShowPattern};

/// Result of rewriting one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub data: Vec<u8>,
    pub modified: bool,
    /// Number of show occurrences deleted.
    pub removed: usize,
    /// The planned occurrences actually deleted.
    pub deleted: BTreeSet<Occurrence>,
}

/// Syntactic context a counted match was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShowContext {
    /// `(...) Tj` or `<...> Tj`.
    Instruction,
    /// An element of a `TJ` array.
    ArrayElement,
    /// Any other string operand inside `BT`..`ET`.
    TextObject,
}

/// Applies a [`DeletionPlan`] to content streams.
#[derive(Debug, Clone, Copy)]
pub struct StreamRewriter<'p> {
    plan: &'p DeletionPlan,
}

impl<'p> StreamRewriter<'p> {
    pub fn new(plan: &'p DeletionPlan) -> Self {
        Self { plan }
    }

    /// Deletes the planned occurrences from `data`.
    ///
    /// Every occurrence is planned under the encoding of its operand, so
    /// the hex and literal passes never delete the same instruction.
    /// Signatures that cannot be expressed as a pattern are skipped.
    pub fn rewrite(&self, data: &[u8]) -> RewriteOutcome {
        let mut out = data.to_vec();
        let mut deleted = BTreeSet::new();

        for (signature, ranks) in self.plan.hex() {
            match ShowPattern::hex(signature) {
                Ok(pattern) => deleted.extend(
                    delete_ranked(&mut out, &pattern, ranks)
                        .into_iter()
                        .map(|rank| Occurrence::Hex(signature.clone(), rank)),
                ),
                Err(e) => debug!("Skipping hex signature {}: {}", signature, e),
            }
        }
        for (text, ranks) in self.plan.literal() {
            match ShowPattern::literal(text) {
                Ok(pattern) => deleted.extend(
                    delete_ranked(&mut out, &pattern, ranks)
                        .into_iter()
                        .map(|rank| Occurrence::Literal(text.clone(), rank)),
                ),
                Err(e) => debug!("Skipping literal signature {:?}: {}", text, e),
            }
        }

        RewriteOutcome {
            data: out,
            modified: !deleted.is_empty(),
            removed: deleted.len(),
            deleted,
        }
    }
}

/// Deletes the occurrences of `pattern` whose stream-order count is in
/// `ranks`; returns the ranks deleted.
///
/// Only matches starting at a real string operand count, and never inside
/// inline image data. Inside a `TJ` array only a match spanning every string
/// of the array counts. A standalone show instruction is collapsed to a
/// single space; an array or other text-object operand is emptied.
pub fn delete_ranked(
    data: &mut Vec<u8>,
    pattern: &ShowPattern,
    ranks: &BTreeSet<usize>,
) -> BTreeSet<usize> {
    let Some(&last_rank) = ranks.iter().next_back() else {
        return BTreeSet::new();
    };
    let layout = StreamLayout::scan(data);
    let empty = pattern.encoding().empty_operand();
    let mut edits: Vec<(Range<usize>, &[u8])> = Vec::new();
    let mut deleted = BTreeSet::new();
    let mut count = 0;
    let mut pos = 0;

    while pos <= data.len() {
        let Some(m) = pattern.find_at(data, pos) else {
            break;
        };
        let context = if layout.is_string_start(m.start) && !layout.in_inline_image(m.start) {
            classify(&layout, data, &m)
        } else {
            None
        };
        let Some(context) = context else {
            pos = m.start + 1;
            continue;
        };

        count += 1;
        let consumed_end = match context {
            ShowContext::Instruction => m.show_end.unwrap_or(m.operand_end),
            _ => m.operand_end,
        };
        if ranks.contains(&count) {
            deleted.insert(count);
            match context {
                ShowContext::Instruction => edits.push((m.start..consumed_end, &b" "[..])),
                ShowContext::ArrayElement | ShowContext::TextObject => {
                    edits.push((m.start..m.operand_end, empty))
                }
            }
        }
        if count >= last_rank {
            break;
        }
        pos = consumed_end;
    }

    for (span, replacement) in edits.iter().rev() {
        data.splice(span.clone(), replacement.iter().copied());
    }
    if count < last_rank {
        debug!(
            "Pattern matched {} occurrence(s), ranks up to {} requested",
            count, last_rank
        );
    }
    deleted
}

fn classify(layout: &StreamLayout, data: &[u8], m: &ShowMatch) -> Option<ShowContext> {
    if let Some(array) = layout.show_array_at(m.start) {
        let whole = array.strings.start == m.start && array.strings.end == m.operand_end;
        return whole.then_some(ShowContext::ArrayElement);
    }
    if let Some(end) = m.show_end {
        if is_token_end(data, end) {
            return Some(ShowContext::Instruction);
        }
    }
    if layout.in_text_object(m.start) {
        return Some(ShowContext::TextObject);
    }
    None
}

/// Removes the first inline image block (`BI` through `EI`); returns whether
/// one was found.
pub fn remove_first_inline_image(data: &mut Vec<u8>) -> bool {
    let layout = StreamLayout::scan(data);
    match layout.inline_images().first() {
        Some(span) => {
            data.drain(span.clone());
            true
        }
        None => false,
    }
}
