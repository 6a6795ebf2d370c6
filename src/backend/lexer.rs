//! Content stream tokenizer that keeps byte spans.
//!
//! Each operation remembers the range it occupies in the source stream, from
//! its first operand through its operator, so callers can splice operations
//! out of the raw bytes without re-serializing anything else.

use std::ops::Range;

use crate::content::layout::{
    inline_image_span, is_delimiter, is_whitespace, skip_hex_string, skip_literal_string,
    skip_regular,
};

/// One operand value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Name(String),
    /// A `(...)` literal string, unescaped.
    Str(Vec<u8>),
    /// A `<...>` hex string, decoded.
    HexStr(Vec<u8>),
    Array(Vec<Operand>),
    Dict(Vec<(String, Operand)>),
    Bool(bool),
    Null,
}

impl Operand {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Str(s) | Self::HexStr(s) => Some(s),
            _ => None,
        }
    }
}

/// An operator with its operands.
///
/// Inline images come out as a single `BI` operation whose operand is the
/// image dictionary and whose span covers `BI` through `EI`.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operator: String,
    pub operands: Vec<Operand>,
    pub span: Range<usize>,
}

impl Operation {
    pub fn number(&self, index: usize) -> Option<f64> {
        self.operands.get(index).and_then(Operand::as_number)
    }

    /// All operands as numbers, or `None` if any is not numeric.
    pub fn numbers(&self) -> Option<Vec<f64>> {
        self.operands.iter().map(Operand::as_number).collect()
    }
}

enum Token {
    Operand(Operand),
    Keyword(String),
    ArrayEnd,
    DictEnd,
}

struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn skip_space(&mut self) {
        while self.pos < self.data.len() {
            match self.data[self.pos] {
                b if is_whitespace(b) => self.pos += 1,
                b'%' => {
                    while self.pos < self.data.len()
                        && !matches!(self.data[self.pos], b'\n' | b'\r')
                    {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    /// Next token and its start offset.
    fn next(&mut self) -> Option<(usize, Token)> {
        self.skip_space();
        let start = self.pos;
        let b = *self.data.get(start)?;
        let token = match b {
            b'(' => {
                self.pos = skip_literal_string(self.data, start);
                let end = self.pos.saturating_sub(1).max(start + 1);
                Token::Operand(Operand::Str(unescape_literal(&self.data[start + 1..end])))
            }
            b'<' if self.data.get(start + 1) == Some(&b'<') => {
                self.pos = start + 2;
                Token::Operand(self.dict())
            }
            b'<' => {
                self.pos = skip_hex_string(self.data, start);
                let end = self.pos.saturating_sub(1).max(start + 1);
                Token::Operand(Operand::HexStr(decode_hex(&self.data[start + 1..end])))
            }
            b'>' if self.data.get(start + 1) == Some(&b'>') => {
                self.pos = start + 2;
                Token::DictEnd
            }
            b'[' => {
                self.pos += 1;
                Token::Operand(self.array())
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b'/' => {
                match self.data.get(start + 1) {
                    Some(&c) if !is_whitespace(c) && !is_delimiter(c) => {
                        self.pos = skip_regular(self.data, start + 1);
                        Token::Operand(Operand::Name(decode_name(&self.data[start + 1..self.pos])))
                    }
                    _ => {
                        self.pos = start + 1;
                        Token::Operand(Operand::Name(String::new()))
                    }
                }
            }
            _ if is_delimiter(b) => {
                self.pos += 1;
                return self.next();
            }
            _ => {
                self.pos = skip_regular(self.data, start);
                let word = &self.data[start..self.pos];
                match word {
                    b"true" => Token::Operand(Operand::Bool(true)),
                    b"false" => Token::Operand(Operand::Bool(false)),
                    b"null" => Token::Operand(Operand::Null),
                    _ => match parse_number(word) {
                        Some(n) => Token::Operand(Operand::Number(n)),
                        None => Token::Keyword(String::from_utf8_lossy(word).into_owned()),
                    },
                }
            }
        };
        Some((start, token))
    }

    fn array(&mut self) -> Operand {
        let mut items = Vec::new();
        while let Some((_, token)) = self.next() {
            match token {
                Token::Operand(o) => items.push(o),
                Token::ArrayEnd => break,
                Token::Keyword(_) | Token::DictEnd => {}
            }
        }
        Operand::Array(items)
    }

    fn dict(&mut self) -> Operand {
        let mut entries = Vec::new();
        let mut key: Option<String> = None;
        while let Some((_, token)) = self.next() {
            match token {
                Token::DictEnd => break,
                Token::Operand(o) => match key.take() {
                    Some(k) => entries.push((k, o)),
                    None => {
                        if let Operand::Name(n) = o {
                            key = Some(n);
                        }
                    }
                },
                Token::Keyword(_) | Token::ArrayEnd => {}
            }
        }
        Operand::Dict(entries)
    }
}

/// Splits `data` into operations.
pub fn tokenize(data: &[u8]) -> Vec<Operation> {
    let mut lexer = Lexer { data, pos: 0 };
    let mut operations = Vec::new();
    let mut operands = Vec::new();
    let mut first: Option<usize> = None;

    while let Some((start, token)) = lexer.next() {
        match token {
            Token::Operand(o) => {
                first.get_or_insert(start);
                operands.push(o);
            }
            Token::Keyword(word) if word == "BI" => {
                let Some(span) = inline_image_span(data, start) else {
                    break;
                };
                lexer.pos = span.end;
                operations.push(Operation {
                    operator: word,
                    operands: vec![inline_image_dict(&data[span.clone()])],
                    span,
                });
                operands.clear();
                first = None;
            }
            Token::Keyword(word) => {
                operations.push(Operation {
                    operator: word,
                    operands: std::mem::take(&mut operands),
                    span: first.take().unwrap_or(start)..lexer.pos,
                });
            }
            Token::ArrayEnd | Token::DictEnd => {}
        }
    }
    operations
}

/// Parses the `BI` dictionary up to `ID`.
fn inline_image_dict(block: &[u8]) -> Operand {
    let mut lexer = Lexer { data: block, pos: 2 };
    let mut entries = Vec::new();
    let mut key: Option<String> = None;
    while let Some((_, token)) = lexer.next() {
        match token {
            Token::Keyword(word) if word == "ID" => break,
            Token::Operand(o) => match key.take() {
                Some(k) => entries.push((k, o)),
                None => {
                    if let Operand::Name(n) = o {
                        key = Some(n);
                    }
                }
            },
            _ => {}
        }
    }
    Operand::Dict(entries)
}

fn parse_number(word: &[u8]) -> Option<f64> {
    let first = *word.first()?;
    if !(first.is_ascii_digit() || matches!(first, b'+' | b'-' | b'.')) {
        return None;
    }
    let text = std::str::from_utf8(word).ok()?;
    text.parse::<f64>().ok().or_else(|| {
        // tolerate doubled signs such as "--5" written by some producers
        text.trim_start_matches(['+', '-']).parse::<f64>().ok().map(|v| {
            if text.starts_with('-') {
                -v
            } else {
                v
            }
        })
    })
}

fn decode_name(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            if let Ok(v) = u8::from_str_radix(&String::from_utf8_lossy(&raw[i + 1..i + 3]), 16) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Decodes the body of a literal string (without the outer parentheses).
pub fn unescape_literal(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&e) = body.get(i) else { break };
        match e {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'0'..=b'7' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 3 && matches!(body.get(i), Some(b'0'..=b'7')) {
                    value = value * 8 + u32::from(body[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                out.push((value & 0xFF) as u8);
                continue;
            }
            b'\r' => {
                if body.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\n' => {}
            other => out.push(other),
        }
        i += 1;
    }
    out
}

/// Decodes the body of a hex string; an odd final digit is padded with 0.
pub fn decode_hex(body: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = body
        .iter()
        .filter_map(|&b| (b as char).to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}
