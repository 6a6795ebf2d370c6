//! Page rasterization using MuPDF.

use mupdf::{Colorspace, Document, ImageFormat, Matrix};

use crate::error::{UnmarkError, UnmarkResult};

/// Renders page `page` of the serialized document `pdf` to PNG bytes,
/// without an alpha channel.
pub fn render_png(pdf: &[u8], page: usize, scale: f32) -> UnmarkResult<Vec<u8>> {
    let document = Document::from_bytes(pdf, "pdf").map_err(|e| UnmarkError::PdfProcessing {
        message: "Failed to open PDF with MuPDF".to_string(),
        page: None,
        source: Some(Box::new(e)),
    })?;

    let index = i32::try_from(page)
        .map_err(|_| UnmarkError::invalid_input("page_index", format!("invalid page index {}", page)))?;
    let loaded = document
        .load_page(index)
        .map_err(|e| UnmarkError::PdfProcessing {
            message: format!("Failed to load page {}", page + 1),
            page: Some(page + 1),
            source: Some(Box::new(e)),
        })?;

    let pixmap = loaded
        .to_pixmap(
            &Matrix::new_scale(scale, scale),
            &Colorspace::device_rgb(),
            false,
            true,
        )
        .map_err(|e| UnmarkError::PdfProcessing {
            message: format!("Failed to render page {}", page + 1),
            page: Some(page + 1),
            source: Some(Box::new(e)),
        })?;

    let mut png = Vec::new();
    pixmap
        .write_to(&mut png, ImageFormat::PNG)
        .map_err(|e| UnmarkError::Toolkit {
            operation: "MuPDF".to_string(),
            message: format!("Failed to encode PNG: {}", e),
            source: Some(Box::new(e)),
        })?;
    Ok(png)
}
