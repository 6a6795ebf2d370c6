//! Synthetic element identifiers.
//!
//! Ids are only stable within one document-open session. Their textual form
//! is shared with callers and must be reproduced exactly:
//!
//! - `p<page>_img_<xref>` (0 for inline images)
//! - `p<page>_draw_<index>`
//! - `p<page>_widget_<xref>`
//! - `p<page>_link_<index>`
//! - `p<page>_b<block>_l<line>_s<span>` for text spans

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

/// A parsed synthetic element id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementId {
    Image { page: usize, xref: u32 },
    Drawing { page: usize, index: usize },
    Widget { page: usize, xref: u32 },
    Link { page: usize, index: usize },
    TextSpan {
        page: usize,
        block: usize,
        line: usize,
        span: usize,
    },
}

impl ElementId {
    /// Page index the element lives on.
    pub fn page(&self) -> usize {
        match *self {
            Self::Image { page, .. }
            | Self::Drawing { page, .. }
            | Self::Widget { page, .. }
            | Self::Link { page, .. }
            | Self::TextSpan { page, .. } => page,
        }
    }

    /// Whether this id denotes an inline image (no object reference).
    pub fn is_inline_image(&self) -> bool {
        matches!(self, Self::Image { xref: 0, .. })
    }

    fn pattern() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^p(\d+)_(?:(img|draw|widget|link)_(\d+)|b(\d+)_l(\d+)_s(\d+))$")
                .expect("Valid element id regex")
        });
        &PATTERN
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image { page, xref } => write!(f, "p{}_img_{}", page, xref),
            Self::Drawing { page, index } => write!(f, "p{}_draw_{}", page, index),
            Self::Widget { page, xref } => write!(f, "p{}_widget_{}", page, xref),
            Self::Link { page, index } => write!(f, "p{}_link_{}", page, index),
            Self::TextSpan {
                page,
                block,
                line,
                span,
            } => write!(f, "p{}_b{}_l{}_s{}", page, block, line, span),
        }
    }
}

impl FromStr for ElementId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = Self::pattern()
            .captures(s)
            .ok_or_else(|| format!("'{}' is not a recognised element id", s))?;
        let num = |i: usize| -> Result<usize, String> {
            caps.get(i)
                .map(|m| m.as_str())
                .unwrap_or_default()
                .parse::<usize>()
                .map_err(|e| format!("'{}': {}", s, e))
        };
        let page = num(1)?;
        match caps.get(2).map(|m| m.as_str()) {
            Some(kind) => {
                let n = num(3)?;
                let xref = || u32::try_from(n).map_err(|e| format!("'{}': {}", s, e));
                Ok(match kind {
                    "img" => Self::Image { page, xref: xref()? },
                    "draw" => Self::Drawing { page, index: n },
                    "widget" => Self::Widget { page, xref: xref()? },
                    _ => Self::Link { page, index: n },
                })
            }
            None => Ok(Self::TextSpan {
                page,
                block: num(4)?,
                line: num(5)?,
                span: num(6)?,
            }),
        }
    }
}
