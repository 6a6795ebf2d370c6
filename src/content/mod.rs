//! The content-stream surgical editor.
//!
//! Text removal runs in four steps over one page:
//!
//! 1. [`TraceIndex`] snapshots the page's text traces and ranks every
//!    occurrence of each glyph signature before anything is mutated.
//! 2. [`DeletionPlan`] resolves removal targets against the index into
//!    `signature -> ranks` maps, using [`MatchPolicy`].
//! 3. [`ShowPattern`] turns each signature into a byte pattern covering the
//!    ways a show instruction can spell it.
//! 4. [`StreamRewriter`] walks each content stream, counts pattern matches
//!    in stream order and deletes exactly the planned ranks.
//!
//! Streams are handled as raw bytes throughout; nothing outside a deleted
//! span changes.

pub mod layout;
pub mod matcher;
pub mod pattern;
pub mod rewriter;
pub mod trace;

pub use layout::StreamLayout;
pub use matcher::{DeletionPlan, MatchPolicy, Occurrence};
pub use pattern::{ShowMatch, ShowPattern};
pub use rewriter::{RewriteOutcome, StreamRewriter};
pub use trace::{Encoding, Glyph, HexSignature, IndexedTrace, RankCounter, TextTrace, TraceIndex};

use thiserror::Error;

/// Failures turning a signature into a stream pattern.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("empty signature")]
    EmptySignature,

    #[error("character {character:?} in '{signature}' cannot appear in a literal string")]
    Unencodable { signature: String, character: char },

    #[error("pattern for '{signature}' failed to compile: {source}")]
    Regex {
        signature: String,
        #[source]
        source: regex::Error,
    },
}

impl ContentError {
    /// The signature the error concerns.
    pub fn signature(&self) -> &str {
        match self {
            Self::EmptySignature => "",
            Self::Unencodable { signature, .. } | Self::Regex { signature, .. } => signature,
        }
    }
}
