//! Byte patterns matching one glyph signature as it appears in a stream.
//!
//! A pattern matches the string operand holding the signature, tolerating a
//! `close-delimiter, adjustment, open-delimiter` gap between any two adjacent
//! glyphs so the same text split by kerning inside a `TJ` array still
//! matches. An optional trailing show operator is captured so the rewriter
//! can tell a standalone show instruction from an array element.
//!
//! Patterns run over raw bytes (`regex::bytes` with Unicode disabled), so
//! binary payloads sharing the stream are never re-encoded.

use regex::bytes::{Captures, Regex};

use super::trace::{Encoding, HexSignature};
use super::ContentError;

const HEX_GAP: &str = r"(?:\s*>\s*[-+]?[0-9]*\.?[0-9]*\s*<)?\s*";
const LITERAL_GAP: &str = r"(?:\)\s*[-+]?[0-9]*\.?[0-9]*\s*\()?";
const SHOW_OPERATOR: &str = r"(?P<show>\s*[Tt][Jj])?";

/// A compiled pattern for one signature.
#[derive(Debug, Clone)]
pub struct ShowPattern {
    regex: Regex,
    encoding: Encoding,
}

/// Byte spans of one pattern match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowMatch {
    /// Start of the string operand (its opening delimiter).
    pub start: usize,
    /// End of the string operand (past its closing delimiter).
    pub operand_end: usize,
    /// End of the trailing show operator, when one directly follows.
    pub show_end: Option<usize>,
}

impl ShowPattern {
    /// Pattern for a glyph-code signature inside hex strings.
    pub fn hex(signature: &HexSignature) -> Result<Self, ContentError> {
        if signature.is_empty() {
            return Err(ContentError::EmptySignature);
        }
        let core = signature
            .codes()
            .map(|code| code.chars().map(hex_digit_class).collect::<String>())
            .collect::<Vec<_>>()
            .join(HEX_GAP);
        let pattern = format!(r"(?s-u)(?P<operand><\s*{}\s*>){}", core, SHOW_OPERATOR);
        Self::compile(signature.as_str(), &pattern, Encoding::Hex)
    }

    /// Pattern for a character signature inside literal strings.
    ///
    /// Each character may appear raw or under any escape form a producer
    /// could have used; characters beyond one byte cannot occur in a literal
    /// string and make the signature unencodable.
    pub fn literal(text: &str) -> Result<Self, ContentError> {
        if text.is_empty() {
            return Err(ContentError::EmptySignature);
        }
        let mut parts = Vec::with_capacity(text.chars().count());
        for c in text.chars() {
            let byte = u8::try_from(u32::from(c)).map_err(|_| ContentError::Unencodable {
                signature: text.to_string(),
                character: c,
            })?;
            parts.push(literal_byte_alternatives(byte));
        }
        let core = parts.join(LITERAL_GAP);
        let pattern = format!(r"(?s-u)(?P<operand>\({}\)){}", core, SHOW_OPERATOR);
        Self::compile(text, &pattern, Encoding::Literal)
    }

    fn compile(signature: &str, pattern: &str, encoding: Encoding) -> Result<Self, ContentError> {
        let regex = Regex::new(pattern).map_err(|source| ContentError::Regex {
            signature: signature.to_string(),
            source,
        })?;
        Ok(Self { regex, encoding })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// First match starting at or after `from`.
    pub fn find_at(&self, data: &[u8], from: usize) -> Option<ShowMatch> {
        self.regex
            .captures_at(data, from)
            .and_then(|caps| Self::spans(&caps))
    }

    fn spans(caps: &Captures<'_>) -> Option<ShowMatch> {
        let operand = caps.name("operand")?;
        Some(ShowMatch {
            start: operand.start(),
            operand_end: operand.end(),
            show_end: caps.name("show").map(|m| m.end()),
        })
    }
}

fn hex_digit_class(c: char) -> String {
    if c.is_ascii_alphabetic() {
        format!("[{}{}]", c.to_ascii_uppercase(), c.to_ascii_lowercase())
    } else {
        c.to_string()
    }
}

/// Every spelling of `byte` inside a literal string, as a regex group.
fn literal_byte_alternatives(byte: u8) -> String {
    let mut alts = vec![format!(r"\\{:03o}", byte)];
    let short_octal = format!(r"\\{:o}", byte);
    if !alts.contains(&short_octal) {
        alts.push(short_octal);
    }
    match byte {
        b'\n' => alts.push(r"\\n".to_string()),
        b'\r' => alts.push(r"\\r".to_string()),
        b'\t' => alts.push(r"\\t".to_string()),
        0x08 => alts.push(r"\\b".to_string()),
        0x0C => alts.push(r"\\f".to_string()),
        b'(' | b')' | b'\\' => alts.push(format!(r"\\\x{:02X}", byte)),
        _ => {}
    }
    // a bare backslash always starts an escape
    if byte != b'\\' {
        alts.push(raw_byte(byte));
    }
    format!("(?:{})", alts.join("|"))
}

fn raw_byte(byte: u8) -> String {
    if byte.is_ascii_alphanumeric() {
        (byte as char).to_string()
    } else {
        format!(r"\x{:02X}", byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(pattern: &ShowPattern, data: &[u8]) -> Vec<ShowMatch> {
        let mut out = Vec::new();
        let mut pos = 0;
        while let Some(m) = pattern.find_at(data, pos) {
            pos = m.show_end.unwrap_or(m.operand_end);
            out.push(m);
        }
        out
    }

    #[test]
    fn test_literal_matches_plain_and_show() {
        let p = ShowPattern::literal("Hello").unwrap();
        let found = spans(&p, b"(Hello) Tj (Hello)'");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].show_end, Some(10));
        assert_eq!(found[1].show_end, None);
    }

    #[test]
    fn test_literal_tolerates_kerning_gaps() {
        let p = ShowPattern::literal("Hello").unwrap();
        let data = b"[(He) -12.5 (l) 30 (lo)] TJ";
        let m = p.find_at(data, 0).unwrap();
        assert_eq!((m.start, m.operand_end), (1, 23));
    }

    #[test]
    fn test_literal_escapes() {
        let p = ShowPattern::literal("a(b)\\").unwrap();
        assert!(p.find_at(b"(a\\(b\\)\\\\) Tj", 0).is_some());
        assert!(p.find_at(b"(a\\050b\\51\\134) Tj", 0).is_some());
        assert!(p.find_at(b"(a(b)\\\\) Tj", 0).is_some());
        let space = ShowPattern::literal("a b").unwrap();
        assert!(space.find_at(b"(a\\040b) Tj", 0).is_some());
    }

    #[test]
    fn test_literal_is_case_sensitive_but_operator_is_not() {
        let p = ShowPattern::literal("Hi").unwrap();
        assert!(p.find_at(b"(HI) Tj", 0).is_none());
        assert_eq!(p.find_at(b"(Hi) tj", 0).unwrap().show_end, Some(7));
    }

    #[test]
    fn test_hex_signature_matches_split_codes() {
        let sig = HexSignature::from_codes(&[0x48, 0x69], 2);
        let p = ShowPattern::hex(&sig).unwrap();
        assert!(p.find_at(b"<00480069> Tj", 0).is_some());
        assert!(p.find_at(b"[<0048> -250 <0069>] TJ", 0).is_some());
        assert!(p.find_at(b"< 00480069 > Tj", 0).is_some());
        assert!(p.find_at(b"<00480068> Tj", 0).is_none());
    }

    #[test]
    fn test_hex_digits_case_insensitive() {
        let sig = HexSignature::from_codes(&[0xAB], 1);
        let p = ShowPattern::hex(&sig).unwrap();
        assert!(p.find_at(b"<ab> Tj", 0).is_some());
        assert!(p.find_at(b"<AB> Tj", 0).is_some());
    }

    #[test]
    fn test_binary_bytes_are_matched_raw() {
        let p = ShowPattern::literal("\u{e9}t\u{e9}").unwrap();
        assert!(p.find_at(b"(\xe9t\xe9) Tj", 0).is_some());
        assert!(matches!(
            ShowPattern::literal("\u{4e2d}"),
            Err(ContentError::Unencodable { .. })
        ));
    }
}
