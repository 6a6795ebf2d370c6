//! Structural scan of a raw content stream.
//!
//! This is not a full content-stream parser. It only locates what the
//! rewriter needs to classify a pattern match: where string operands start,
//! which spans are text objects (`BT`..`ET`), which arrays feed a `TJ`, and
//! where inline images (`BI`..`ID`..`EI`) carry opaque binary data.

use std::ops::Range;

/// PDF whitespace characters.
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

/// PDF delimiter characters.
pub fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Whether a token ending at `end` is properly terminated.
pub fn is_token_end(data: &[u8], end: usize) -> bool {
    data.get(end)
        .map_or(true, |&b| is_whitespace(b) || is_delimiter(b))
}

/// An array consumed by `TJ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowArray {
    /// From `[` through the `TJ` operator.
    pub span: Range<usize>,
    /// From the first string operand's start to the last one's end.
    pub strings: Range<usize>,
}

/// Locations of the syntactic regions of one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamLayout {
    string_starts: Vec<usize>,
    text_objects: Vec<Range<usize>>,
    show_arrays: Vec<ShowArray>,
    inline_images: Vec<Range<usize>>,
}

#[derive(Debug)]
struct OpenArray {
    start: usize,
    strings: Option<Range<usize>>,
}

impl StreamLayout {
    /// Scans `data` once, left to right.
    pub fn scan(data: &[u8]) -> Self {
        let mut layout = Self::default();
        let n = data.len();
        let mut i = 0;
        let mut text_start: Option<usize> = None;
        let mut open_arrays: Vec<OpenArray> = Vec::new();
        let mut closed_array: Option<(Range<usize>, Option<Range<usize>>)> = None;

        while i < n {
            let b = data[i];
            if is_whitespace(b) {
                i += 1;
                continue;
            }
            match b {
                b'%' => {
                    while i < n && data[i] != b'\n' && data[i] != b'\r' {
                        i += 1;
                    }
                    continue;
                }
                b']' => {
                    i += 1;
                    closed_array = open_arrays.pop().map(|a| (a.start..i, a.strings));
                    continue;
                }
                _ => {}
            }

            let pending_array = closed_array.take();
            match b {
                b'(' => {
                    layout.string_starts.push(i);
                    let end = skip_literal_string(data, i);
                    extend_strings(&mut open_arrays, i..end);
                    i = end;
                }
                b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
                b'<' => {
                    layout.string_starts.push(i);
                    let end = skip_hex_string(data, i);
                    extend_strings(&mut open_arrays, i..end);
                    i = end;
                }
                b'[' => {
                    open_arrays.push(OpenArray {
                        start: i,
                        strings: None,
                    });
                    i += 1;
                }
                b'/' => i = skip_regular(data, i + 1),
                b'>' | b')' | b'{' | b'}' => i += 1,
                _ => {
                    let start = i;
                    i = skip_regular(data, i);
                    let token = &data[start..i];
                    if token.eq_ignore_ascii_case(b"BT") {
                        text_start = Some(start);
                    } else if token.eq_ignore_ascii_case(b"ET") {
                        if let Some(s) = text_start.take() {
                            layout.text_objects.push(s..i);
                        }
                    } else if token.eq_ignore_ascii_case(b"TJ") {
                        if let Some((span, Some(strings))) = pending_array {
                            layout.show_arrays.push(ShowArray {
                                span: span.start..i,
                                strings,
                            });
                        }
                    } else if token == b"BI" {
                        match inline_image_span(data, start) {
                            Some(span) => {
                                i = span.end;
                                layout.inline_images.push(span);
                            }
                            None => i = n,
                        }
                    }
                }
            }
        }

        layout
    }

    /// Whether a string operand (`(` or `<`) starts at `pos`.
    pub fn is_string_start(&self, pos: usize) -> bool {
        self.string_starts.binary_search(&pos).is_ok()
    }

    pub fn in_text_object(&self, pos: usize) -> bool {
        contains(&self.text_objects, pos)
    }

    /// Whether `pos` lies inside an array consumed by `TJ`.
    pub fn in_show_array(&self, pos: usize) -> bool {
        self.show_array_at(pos).is_some()
    }

    /// The `TJ` array enclosing `pos`.
    pub fn show_array_at(&self, pos: usize) -> Option<&ShowArray> {
        let idx = self.show_arrays.partition_point(|a| a.span.start <= pos);
        idx.checked_sub(1)
            .map(|i| &self.show_arrays[i])
            .filter(|a| a.span.contains(&pos))
    }

    pub fn in_inline_image(&self, pos: usize) -> bool {
        contains(&self.inline_images, pos)
    }

    /// Inline image blocks, `BI` through `EI` inclusive, in stream order.
    pub fn inline_images(&self) -> &[Range<usize>] {
        &self.inline_images
    }

    pub fn text_objects(&self) -> &[Range<usize>] {
        &self.text_objects
    }
}

fn extend_strings(open_arrays: &mut [OpenArray], string: Range<usize>) {
    if let Some(array) = open_arrays.last_mut() {
        let first = array.strings.as_ref().map_or(string.start, |r| r.start);
        array.strings = Some(first..string.end);
    }
}

fn contains(ranges: &[Range<usize>], pos: usize) -> bool {
    let idx = ranges.partition_point(|r| r.start <= pos);
    idx > 0 && ranges[idx - 1].contains(&pos)
}

pub(crate) fn skip_regular(data: &[u8], mut i: usize) -> usize {
    let start = i;
    while i < data.len() && !is_whitespace(data[i]) && !is_delimiter(data[i]) {
        i += 1;
    }
    if i == start {
        i + 1
    } else {
        i
    }
}

/// Returns the offset just past the literal string opening at `start`.
pub(crate) fn skip_literal_string(data: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < data.len() {
        match data[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    data.len()
}

pub(crate) fn skip_hex_string(data: &[u8], start: usize) -> usize {
    data[start..]
        .iter()
        .position(|&b| b == b'>')
        .map_or(data.len(), |p| start + p + 1)
}

/// Span of the inline image whose `BI` token starts at `bi`, through its `EI`.
///
/// A second `BI` before `ID` restarts the block there, so a span never
/// contains a nested start marker. The image data is skipped by its declared
/// length when the dictionary carries `/L` or `/Length`, otherwise up to the
/// first whitespace-delimited `EI`.
pub(crate) fn inline_image_span(data: &[u8], bi: usize) -> Option<Range<usize>> {
    let n = data.len();
    let mut start = bi;
    let mut i = bi + 2;
    let mut length: Option<usize> = None;
    let mut expect_length = false;

    let data_start = loop {
        while i < n && is_whitespace(data[i]) {
            i += 1;
        }
        if i >= n {
            return None;
        }
        match data[i] {
            b'/' => {
                let name_end = skip_regular(data, i + 1);
                let name = &data[i + 1..name_end];
                expect_length = name == b"L" || name == b"Length";
                i = name_end;
                continue;
            }
            b'(' => i = skip_literal_string(data, i),
            b'<' => i = skip_hex_string(data, i),
            b'[' | b']' | b'{' | b'}' | b'>' | b')' => i += 1,
            _ => {
                let tok_start = i;
                i = skip_regular(data, i);
                let token = &data[tok_start..i];
                if token == b"ID" {
                    // exactly one whitespace byte separates ID from the data
                    break i + 1;
                }
                if token == b"BI" {
                    start = tok_start;
                    length = None;
                } else if expect_length {
                    length = std::str::from_utf8(token)
                        .ok()
                        .and_then(|t| t.parse::<usize>().ok());
                }
            }
        }
        expect_length = false;
    };

    if let Some(len) = length {
        let mut j = data_start.saturating_add(len);
        while j < n && is_whitespace(data[j]) {
            j += 1;
        }
        if data.get(j..j + 2) == Some(b"EI") && is_token_end(data, j + 2) {
            return Some(start..j + 2);
        }
    }

    let mut j = data_start;
    while j + 2 <= n {
        if &data[j..j + 2] == b"EI"
            && (j == data_start || is_whitespace(data[j - 1]))
            && is_token_end(data, j + 2)
        {
            return Some(start..j + 2);
        }
        j += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strings_and_text_objects() {
        let data = b"BT /F1 12 Tf (a\\)b) Tj <0041> Tj ET q (x) Tj Q";
        let layout = StreamLayout::scan(data);
        assert!(layout.is_string_start(13));
        assert!(!layout.is_string_start(16));
        assert!(layout.is_string_start(23));
        assert_eq!(layout.text_objects().len(), 1);
        assert!(layout.in_text_object(13));
        assert!(!layout.in_text_object(data.len() - 6));
    }

    #[test]
    fn test_show_arrays_need_tj() {
        let data = b"BT [(A) -20 (B)] TJ [1 2] 0 d ET";
        let layout = StreamLayout::scan(data);
        assert!(layout.in_show_array(4));
        assert!(!layout.in_show_array(21));
    }

    #[test]
    fn test_show_array_string_extent() {
        let data = b"BT [-40 (He) 20 <6C6C6F> -5] TJ ET";
        let layout = StreamLayout::scan(data);
        let array = layout.show_array_at(9).unwrap();
        assert_eq!(&data[array.span.clone()], b"[-40 (He) 20 <6C6C6F> -5] TJ");
        assert_eq!(&data[array.strings.clone()], b"(He) 20 <6C6C6F>");
    }

    #[test]
    fn test_dictionary_brackets_are_not_strings() {
        let layout = StreamLayout::scan(b"/P <</MCID 0>> BDC (x) Tj EMC");
        assert!(!layout.is_string_start(3));
        assert!(layout.is_string_start(19));
    }

    #[test]
    fn test_inline_image_with_binary_payload() {
        let mut data = b"q BI /W 2 /H 1 /BPC 8 /CS /G ID ".to_vec();
        data.extend_from_slice(b"BT(Hi)Tj ET\xff");
        data.extend_from_slice(b" EI Q BT (Hi) Tj ET");
        let layout = StreamLayout::scan(&data);
        assert_eq!(layout.inline_images().len(), 1);
        let span = layout.inline_images()[0].clone();
        assert_eq!(&data[span.start..span.start + 2], b"BI");
        assert_eq!(&data[span.end - 2..span.end], b"EI");
        // only the text object after the image is real
        assert_eq!(layout.text_objects().len(), 1);
        assert!(layout.text_objects()[0].start > span.end);
    }

    #[test]
    fn test_inline_image_declared_length_skips_fake_ei() {
        let mut data = b"BI /W 4 /H 1 /L 4 ID ".to_vec();
        data.extend_from_slice(b"a EI");
        data.extend_from_slice(b"\nEI Q");
        let layout = StreamLayout::scan(&data);
        let span = layout.inline_images()[0].clone();
        assert_eq!(span.end, data.len() - 2);
    }

    #[test]
    fn test_nested_start_marker_restarts_block() {
        let data = b"BI /W 1 BI /W 1 /H 1 ID x EI";
        let layout = StreamLayout::scan(data);
        assert_eq!(layout.inline_images()[0].start, 8);
    }
}
