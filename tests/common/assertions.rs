//! Assertions over edited documents.

use unmark::{EditableDocument, LopdfToolkit, PdfToolkit};

/// Opens `pdf` with the lopdf toolkit, panicking on failure.
pub fn open(pdf: &[u8]) -> Box<dyn EditableDocument> {
    LopdfToolkit::new()
        .open(pdf)
        .expect("edited document should open")
}

/// All span texts of `page`, joined by newlines.
pub fn page_text(pdf: &[u8], page: usize) -> String {
    open(pdf)
        .text_spans(page)
        .expect("text spans")
        .into_iter()
        .map(|s| s.text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Asserts that `pattern` no longer shows on `page`.
///
/// # Panics
/// Panics if the pattern is still found in the page text.
pub fn assert_removed(pdf: &[u8], page: usize, pattern: &str) {
    let text = page_text(pdf, page);
    assert!(
        !text.contains(pattern),
        "'{}' should be removed from page {} but page text is:\n{}",
        pattern,
        page,
        text
    );
}

/// Asserts that `pattern` still shows on `page`.
pub fn assert_preserved(pdf: &[u8], page: usize, pattern: &str) {
    let text = page_text(pdf, page);
    assert!(
        text.contains(pattern),
        "'{}' should be preserved on page {} but page text is:\n{}",
        pattern,
        page,
        text
    );
}
