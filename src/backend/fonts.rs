//! Font dictionaries as the content interpreter sees them: code splitting,
//! Unicode mapping and glyph widths.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use super::{number, resolve, stream_bytes};
use crate::content::Glyph;

/// Character widths of a standard-14 family, codes 32 through 126, in
/// thousandths of the font size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base14 {
    Helvetica,
    Times,
    Courier,
}

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const TIMES_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

impl Base14 {
    /// Family for a `BaseFont` name, if it is one of the standard fonts.
    pub fn from_base_font(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.contains("courier") {
            Some(Self::Courier)
        } else if lower.contains("times") {
            Some(Self::Times)
        } else if lower.contains("helvetica") || lower.contains("arial") {
            Some(Self::Helvetica)
        } else {
            None
        }
    }

    pub fn base_font(self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::Times => "Times-Roman",
            Self::Courier => "Courier",
        }
    }

    pub fn width(self, code: u32) -> f64 {
        let table = match self {
            Self::Courier => return 600.0,
            Self::Helvetica => &HELVETICA_WIDTHS,
            Self::Times => &TIMES_WIDTHS,
        };
        match code {
            32..=126 => f64::from(table[(code - 32) as usize]),
            _ => f64::from(table[(b'n' - 32) as usize]),
        }
    }
}

/// WinAnsiEncoding positions 0x80 through 0x9F.
const WIN_ANSI_HIGH: [char; 32] = [
    '€', '\u{FFFD}', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\u{FFFD}', 'Ž',
    '\u{FFFD}', '\u{FFFD}', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ',
    '\u{FFFD}', 'ž', 'Ÿ',
];

/// Character for a single-byte code under WinAnsiEncoding.
pub fn win_ansi_char(code: u8) -> char {
    match code {
        0x80..=0x9F => WIN_ANSI_HIGH[usize::from(code - 0x80)],
        _ => char::from(code),
    }
}

/// WinAnsiEncoding code for `c`, if it has one.
pub fn win_ansi_code(c: char) -> Option<u8> {
    let value = u32::from(c);
    if value < 0x80 || (0xA0..=0xFF).contains(&value) {
        return u8::try_from(value).ok();
    }
    WIN_ANSI_HIGH
        .iter()
        .position(|&h| h == c && h != '\u{FFFD}')
        .and_then(|i| u8::try_from(0x80 + i).ok())
}

/// Character for a glyph name from a `Differences` array.
fn glyph_name_char(name: &str) -> Option<char> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c);
    }
    for prefix in ["uni", "u"] {
        let Some(hex) = name.strip_prefix(prefix).filter(|h| h.len() >= 4) else {
            continue;
        };
        if let Some(c) = hex
            .get(..hex.len().min(6))
            .and_then(|digits| u32::from_str_radix(digits, 16).ok())
            .and_then(char::from_u32)
        {
            return Some(c);
        }
    }
    let c = match name {
        "space" => ' ',
        "exclam" => '!',
        "quotedbl" => '"',
        "numbersign" => '#',
        "dollar" => '$',
        "percent" => '%',
        "ampersand" => '&',
        "quotesingle" => '\'',
        "parenleft" => '(',
        "parenright" => ')',
        "asterisk" => '*',
        "plus" => '+',
        "comma" => ',',
        "hyphen" | "minus" => '-',
        "period" => '.',
        "slash" => '/',
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        "colon" => ':',
        "semicolon" => ';',
        "less" => '<',
        "equal" => '=',
        "greater" => '>',
        "question" => '?',
        "at" => '@',
        "bracketleft" => '[',
        "backslash" => '\\',
        "bracketright" => ']',
        "asciicircum" => '^',
        "underscore" => '_',
        "grave" => '`',
        "braceleft" => '{',
        "bar" => '|',
        "braceright" => '}',
        "asciitilde" => '~',
        "bullet" => '•',
        "endash" => '–',
        "emdash" => '—',
        "quoteleft" => '‘',
        "quoteright" => '’',
        "quotedblleft" => '“',
        "quotedblright" => '”',
        _ => return None,
    };
    Some(c)
}

/// A parsed `ToUnicode` map: code to mapped text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicode {
    map: HashMap<u32, String>,
    /// Byte width of the codes seen in `begincodespacerange`, if any.
    code_width: Option<usize>,
}

impl ToUnicode {
    /// Parses the `bfchar` and `bfrange` sections of a CMap.
    pub fn parse(data: &[u8]) -> Self {
        let tokens = cmap_tokens(data);
        let mut cmap = Self::default();
        let mut i = 0;
        while i < tokens.len() {
            match &tokens[i] {
                CMapToken::Word(w) if w == "begincodespacerange" => {
                    if let Some(CMapToken::Hex(lo)) = tokens.get(i + 1) {
                        cmap.code_width = Some(lo.len().max(1));
                    }
                }
                CMapToken::Word(w) if w == "beginbfchar" => {
                    i += 1;
                    while let (Some(CMapToken::Hex(src)), Some(CMapToken::Hex(dst))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        cmap.map.insert(code_of(src), utf16_text(dst));
                        i += 2;
                    }
                    continue;
                }
                CMapToken::Word(w) if w == "beginbfrange" => {
                    i += 1;
                    loop {
                        let (Some(CMapToken::Hex(lo)), Some(CMapToken::Hex(hi))) =
                            (tokens.get(i), tokens.get(i + 1))
                        else {
                            break;
                        };
                        let (lo, hi) = (code_of(lo), code_of(hi));
                        match tokens.get(i + 2) {
                            Some(CMapToken::Hex(dst)) => {
                                let base = utf16_units(dst);
                                for (offset, code) in (lo..=hi).take(0x10000).enumerate() {
                                    let mut units = base.clone();
                                    if let Some(last) = units.last_mut() {
                                        *last = last.wrapping_add(offset as u16);
                                    }
                                    cmap.map.insert(code, String::from_utf16_lossy(&units));
                                }
                            }
                            Some(CMapToken::Array(items)) => {
                                for (code, dst) in (lo..=hi).zip(items) {
                                    cmap.map.insert(code, utf16_text(dst));
                                }
                            }
                            _ => break,
                        }
                        i += 3;
                    }
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        cmap
    }

    pub fn get(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }

    pub fn code_width(&self) -> Option<usize> {
        self.code_width
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

enum CMapToken {
    Hex(Vec<u8>),
    Array(Vec<Vec<u8>>),
    Word(String),
}

fn cmap_tokens(data: &[u8]) -> Vec<CMapToken> {
    let mut tokens = Vec::new();
    let mut array: Option<Vec<Vec<u8>>> = None;
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'<' => {
                let end = data[i..].iter().position(|&b| b == b'>').map_or(data.len(), |p| i + p);
                let bytes = super::lexer::decode_hex(&data[i + 1..end]);
                match array.as_mut() {
                    Some(items) => items.push(bytes),
                    None => tokens.push(CMapToken::Hex(bytes)),
                }
                i = end + 1;
            }
            b'[' => {
                array = Some(Vec::new());
                i += 1;
            }
            b']' => {
                if let Some(items) = array.take() {
                    tokens.push(CMapToken::Array(items));
                }
                i += 1;
            }
            b if b.is_ascii_alphabetic() => {
                let start = i;
                while i < data.len() && data[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(CMapToken::Word(String::from_utf8_lossy(&data[start..i]).into_owned()));
            }
            _ => i += 1,
        }
    }
    tokens
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| (u16::from(pair[0]) << 8) | u16::from(pair.get(1).copied().unwrap_or(0)))
        .collect()
}

fn utf16_text(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

/// Writes a `ToUnicode` CMap for two-byte codes.
pub fn write_to_unicode(entries: &[(u16, char)]) -> Vec<u8> {
    let mut out = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (code, c) in chunk {
            let mut units = [0u16; 2];
            let hex: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            out.push_str(&format!("<{:04X}> <{}>\n", code, hex));
        }
        out.push_str("endbfchar\n");
    }
    out.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    out.into_bytes()
}

/// Everything the interpreter needs from one font resource.
#[derive(Debug, Clone)]
pub struct FontInfo {
    pub base_font: String,
    /// Bytes per character code.
    pub code_width: usize,
    widths: HashMap<u32, f64>,
    default_width: f64,
    base14: Option<Base14>,
    to_unicode: Option<ToUnicode>,
    differences: HashMap<u32, char>,
    /// Ascent and descent in thousandths of the font size.
    pub ascent: f64,
    pub descent: f64,
}

impl FontInfo {
    /// Fallback for unknown font resources.
    pub fn fallback(name: &str) -> Self {
        Self {
            base_font: name.to_string(),
            code_width: 1,
            widths: HashMap::new(),
            default_width: 500.0,
            base14: Some(Base14::Helvetica),
            to_unicode: None,
            differences: HashMap::new(),
            ascent: 800.0,
            descent: -200.0,
        }
    }

    pub fn load(doc: &Document, dict: &Dictionary) -> Self {
        let base_font = dict
            .get(b"BaseFont")
            .ok()
            .and_then(|o| o.as_name_str().ok())
            .unwrap_or("Unknown")
            .to_string();
        let composite = dict
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name_str().ok())
            == Some("Type0");
        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_stream().ok())
            .and_then(|s| stream_bytes(s).ok())
            .map(|data| ToUnicode::parse(&data))
            .filter(|t| !t.is_empty());

        let mut info = Self::fallback(&base_font);
        info.base14 = Base14::from_base_font(&base_font);
        info.to_unicode = to_unicode;

        let descriptor_owner = if composite {
            let descendant = dict
                .get(b"DescendantFonts")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .and_then(|a| a.first())
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_dict().ok());
            info.code_width = 2;
            info.default_width = 1000.0;
            if let Some(descendant) = descendant {
                if let Some(dw) = descendant.get(b"DW").ok().and_then(number) {
                    info.default_width = dw;
                }
                if let Ok(w) = descendant.get(b"W") {
                    if let Ok(items) = resolve(doc, w).as_array() {
                        info.widths = cid_widths(doc, items);
                    }
                }
            }
            descendant
        } else {
            let first = dict.get(b"FirstChar").ok().and_then(number).unwrap_or(0.0) as u32;
            if let Some(widths) = dict
                .get(b"Widths")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
            {
                for (i, w) in widths.iter().enumerate() {
                    if let Some(w) = number(resolve(doc, w)) {
                        info.widths.insert(first + i as u32, w);
                    }
                }
            }
            if let Some(encoding) = dict.get(b"Encoding").ok().map(|o| resolve(doc, o)) {
                info.differences = differences(doc, encoding);
            }
            Some(dict)
        };

        if let Some(descriptor) = descriptor_owner
            .and_then(|d| d.get(b"FontDescriptor").ok())
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
        {
            if let Some(a) = descriptor.get(b"Ascent").ok().and_then(number).filter(|a| *a > 0.0) {
                info.ascent = a;
            }
            if let Some(d) = descriptor.get(b"Descent").ok().and_then(number).filter(|d| *d < 0.0) {
                info.descent = d;
            }
            if let Some(mw) = descriptor.get(b"MissingWidth").ok().and_then(number) {
                if !composite {
                    info.default_width = mw;
                }
            }
        }
        info
    }

    /// Splits a string operand into glyphs.
    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        bytes
            .chunks(self.code_width)
            .map(|chunk| {
                let code = code_of(chunk);
                Glyph::new(code, self.unicode(code))
            })
            .collect()
    }

    fn unicode(&self, code: u32) -> char {
        if let Some(c) = self
            .to_unicode
            .as_ref()
            .and_then(|t| t.get(code))
            .and_then(|s| s.chars().next())
        {
            return c;
        }
        if let Some(&c) = self.differences.get(&code) {
            return c;
        }
        match (self.code_width, u8::try_from(code)) {
            (1, Ok(byte)) => win_ansi_char(byte),
            _ => char::from_u32(code).unwrap_or('\u{FFFD}'),
        }
    }

    /// Advance of `code` in thousandths of the font size.
    pub fn width(&self, code: u32) -> f64 {
        if let Some(&w) = self.widths.get(&code) {
            return w;
        }
        match self.base14 {
            Some(family) if self.code_width == 1 && self.widths.is_empty() => family.width(code),
            _ => self.default_width,
        }
    }
}

fn cid_widths(doc: &Document, items: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < items.len() {
        let Some(first) = number(resolve(doc, &items[i])) else {
            break;
        };
        match items.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(w) = number(resolve(doc, w)) {
                        widths.insert(first as u32 + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(w)) = (
                    number(last),
                    items.get(i + 2).map(|o| resolve(doc, o)).and_then(number),
                ) else {
                    break;
                };
                for code in (first as u32..=last as u32).take(0x10000) {
                    widths.insert(code, w);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

fn differences(doc: &Document, encoding: &Object) -> HashMap<u32, char> {
    let mut map = HashMap::new();
    let Some(list) = encoding
        .as_dict()
        .ok()
        .and_then(|d| d.get(b"Differences").ok())
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
    else {
        return map;
    };
    let mut code = 0u32;
    for item in list {
        match item {
            Object::Integer(n) => code = u32::try_from(*n).unwrap_or(0),
            Object::Name(name) => {
                if let Some(c) = glyph_name_char(&String::from_utf8_lossy(name)) {
                    map.insert(code, c);
                }
                code += 1;
            }
            _ => {}
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base14_widths() {
        assert_eq!(Base14::Helvetica.width(u32::from(b'A')), 667.0);
        assert_eq!(Base14::Times.width(u32::from(b' ')), 250.0);
        assert_eq!(Base14::Courier.width(u32::from(b'W')), 600.0);
        assert_eq!(Base14::from_base_font("ABCDEF+Arial-BoldMT"), Some(Base14::Helvetica));
    }

    #[test]
    fn test_win_ansi_round_trip_for_specials() {
        assert_eq!(win_ansi_char(0x80), '€');
        assert_eq!(win_ansi_code('€'), Some(0x80));
        assert_eq!(win_ansi_code('é'), Some(0xE9));
        assert_eq!(win_ansi_code('水'), None);
    }

    #[test]
    fn test_to_unicode_bfchar_and_bfrange() {
        let cmap = ToUnicode::parse(
            b"1 begincodespacerange <0000> <FFFF> endcodespacerange\n\
              2 beginbfchar <0003> <0020> <0024> <0041> endbfchar\n\
              1 beginbfrange <0030> <0032> <0061> endbfrange\n\
              1 beginbfrange <0040> <0041> [<6C34> <5370>] endbfrange",
        );
        assert_eq!(cmap.code_width(), Some(2));
        assert_eq!(cmap.get(0x24), Some("A"));
        assert_eq!(cmap.get(0x32), Some("c"));
        assert_eq!(cmap.get(0x40), Some("水"));
        assert_eq!(cmap.get(0x41), Some("印"));
        assert_eq!(cmap.get(0x99), None);
    }

    #[test]
    fn test_written_cmap_parses_back() {
        let data = write_to_unicode(&[(5, 'x'), (9, '水')]);
        let cmap = ToUnicode::parse(&data);
        assert_eq!(cmap.get(5), Some("x"));
        assert_eq!(cmap.get(9), Some("水"));
    }

    #[test]
    fn test_glyph_names() {
        assert_eq!(glyph_name_char("A"), Some('A'));
        assert_eq!(glyph_name_char("uni6C34"), Some('水'));
        assert_eq!(glyph_name_char("quoteright"), Some('’'));
        assert_eq!(glyph_name_char("g123"), None);
    }

    #[test]
    fn test_fallback_decodes_single_bytes() {
        let font = FontInfo::fallback("F1");
        let glyphs = font.decode(b"Hi");
        assert_eq!(glyphs, vec![Glyph::new(0x48, 'H'), Glyph::new(0x69, 'i')]);
        assert_eq!(font.width(u32::from(b'H')), 722.0);
    }
}
