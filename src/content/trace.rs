//! Text traces and their occurrence ranks.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::domain::Rect;

/// Default width of one glyph code, in bytes.
pub const DEFAULT_CODE_WIDTH: usize = 2;

/// The string syntax a show instruction's operand is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Encoding {
    /// `<...>` hex strings, matched against the glyph-code signature.
    Hex,
    /// `(...)` literal strings, matched against the character signature.
    Literal,
}

impl Encoding {
    /// An empty operand of this encoding.
    pub fn empty_operand(self) -> &'static [u8] {
        match self {
            Self::Hex => b"<>",
            Self::Literal => b"()",
        }
    }
}

/// One glyph of a show instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph {
    /// Character code as it appears in the string operand.
    pub code: u32,
    /// Mapped character.
    pub unicode: char,
}

impl Glyph {
    pub fn new(code: u32, unicode: char) -> Self {
        Self { code, unicode }
    }
}

/// The decoded form of one show instruction, as extracted from a page
/// before any mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct TextTrace {
    pub glyphs: Vec<Glyph>,
    pub bbox: Rect,
    /// Bytes per character code in the operand (1 for simple fonts, 2 for
    /// composite fonts).
    pub code_width: usize,
    /// Syntax of the string operand; a `TJ` array takes its first string's.
    pub encoding: Encoding,
}

impl TextTrace {
    /// A composite-font trace written as hex strings.
    pub fn new(glyphs: Vec<Glyph>, bbox: Rect) -> Self {
        Self {
            glyphs,
            bbox,
            code_width: DEFAULT_CODE_WIDTH,
            encoding: Encoding::Hex,
        }
    }

    pub fn with_code_width(mut self, code_width: usize) -> Self {
        self.code_width = code_width.max(1);
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// A literal-string trace whose codes are its characters, as for a
    /// simple font without a custom encoding.
    pub fn from_text(text: &str, bbox: Rect) -> Self {
        let glyphs = text.chars().map(|c| Glyph::new(u32::from(c), c)).collect();
        Self::new(glyphs, bbox)
            .with_code_width(1)
            .with_encoding(Encoding::Literal)
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Glyph codes, hex encoded at this trace's code width.
    pub fn hex_signature(&self) -> HexSignature {
        let codes: Vec<u32> = self.glyphs.iter().map(|g| g.code).collect();
        HexSignature::from_codes(&codes, self.code_width)
    }

    /// Mapped characters in show order.
    pub fn string_signature(&self) -> String {
        self.glyphs.iter().map(|g| g.unicode).collect()
    }
}

/// Fixed-width uppercase hex encoding of a glyph code sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HexSignature {
    hex: String,
    code_width: usize,
}

impl HexSignature {
    /// Encodes `codes` with `code_width` bytes each, widened when a code
    /// does not fit.
    pub fn from_codes(codes: &[u32], code_width: usize) -> Self {
        let needed = codes
            .iter()
            .map(|&c| ((32 - c.leading_zeros() as usize) + 7) / 8)
            .max()
            .unwrap_or(0);
        let code_width = code_width.max(needed).max(1);
        let digits = code_width * 2;
        let hex = codes
            .iter()
            .map(|c| format!("{:0width$X}", c, width = digits))
            .collect();
        Self { hex, code_width }
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }

    pub fn code_width(&self) -> usize {
        self.code_width
    }

    pub fn is_empty(&self) -> bool {
        self.hex.is_empty()
    }

    /// The hex digits of each code.
    pub fn codes(&self) -> impl Iterator<Item = &str> + '_ {
        let step = self.code_width * 2;
        (0..self.hex.len())
            .step_by(step)
            .map(move |i| &self.hex[i..(i + step).min(self.hex.len())])
    }
}

impl fmt::Display for HexSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

/// Running occurrence counter keyed by signature.
///
/// Scoped to one indexing pass; a rank is read after incrementing, so the
/// first occurrence of a signature is rank 1.
#[derive(Debug)]
pub struct RankCounter<K> {
    counts: HashMap<K, usize>,
}

impl<K: Eq + Hash> Default for RankCounter<K> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> RankCounter<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more occurrence of `key` and returns its rank.
    pub fn next(&mut self, key: K) -> usize {
        let count = self.counts.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    /// Occurrences of `key` counted so far.
    pub fn count(&self, key: &K) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }
}

/// A trace annotated with both signatures and their ranks.
#[derive(Debug, Clone)]
pub struct IndexedTrace<'a> {
    pub trace: &'a TextTrace,
    pub encoding: Encoding,
    pub hex: HexSignature,
    pub hex_rank: usize,
    pub text: String,
    pub text_rank: usize,
}

/// Rank snapshot of one stream's traces, in content order.
#[derive(Debug, Clone, Default)]
pub struct TraceIndex<'a> {
    entries: Vec<IndexedTrace<'a>>,
}

impl<'a> TraceIndex<'a> {
    /// Indexes `traces` in a single pass. Hex and string ranks are counted
    /// independently, and only among traces written in the same encoding:
    /// a stream pattern never matches operands of the other encoding.
    pub fn build(traces: &'a [TextTrace]) -> Self {
        let mut hex_ranks = RankCounter::new();
        let mut text_ranks = RankCounter::new();
        let entries = traces
            .iter()
            .map(|trace| {
                let hex = trace.hex_signature();
                let text = trace.string_signature();
                IndexedTrace {
                    trace,
                    encoding: trace.encoding,
                    hex_rank: hex_ranks.next((trace.encoding, hex.clone())),
                    hex,
                    text_rank: text_ranks.next((trace.encoding, text.clone())),
                    text,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedTrace<'a>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
