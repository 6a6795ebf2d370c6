//! End-to-end edits of real PDFs through the lopdf toolkit.

mod common;

use anyhow::Result;
use common::*;
use lopdf::{Document, Object};
use unmark::domain::{Compaction, FontSource, SaveOptions};
use unmark::{EditConfig, EditService, OverlayPlan, TargetSet};

fn service() -> EditService {
    EditService::with_lopdf()
}

fn uncompressed_service() -> EditService {
    EditService::with_lopdf().with_config(EditConfig::default().with_save_options(SaveOptions {
        compaction: Compaction::Prune,
        compress: false,
        subset_fonts: false,
    }))
}

#[test]
fn test_document_info() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .with_title("Quarterly Report")
        .page(&format!("{}{}", text_content(&["Secret"]), IMAGE_CONTENT))
        .page(&text_content(&["Page two"]))
        .with_link(0, [72, 690, 200, 710], "https://example.com")
        .with_widget(1, [72, 500, 200, 520], "name", "Tx")
        .with_layer("Watermark")
        .build()?;

    let info = service().info(&pdf)?;
    assert_eq!(info.page_count, 2);
    assert_eq!(info.metadata["title"], "Quarterly Report");
    assert_eq!(info.metadata["author"], "");
    assert_eq!(info.file_size, pdf.len());
    assert_eq!(info.total_images, 1);
    assert_eq!(info.total_links, 1);
    assert_eq!(info.total_annots, 2);
    assert_eq!(info.total_fonts, 1);
    assert!(info.has_forms);
    assert!(info.has_ocg);
    assert!(!info.has_signatures);
    assert!(!info.is_scanned);
    assert!(!info.is_encrypted);
    assert_eq!((info.pages[1].width, info.pages[1].height), (612.0, 792.0));
    Ok(())
}

#[test]
fn test_scanned_document_detection() -> Result<()> {
    let pdf = TestPdfBuilder::new().page(IMAGE_CONTENT).build()?;
    assert!(service().info(&pdf)?.is_scanned);
    Ok(())
}

#[test]
fn test_analyze_page() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&format!("{}{}{}", text_content(&["Secret", "Public"]), IMAGE_CONTENT, DRAWING_CONTENT))
        .with_link(0, [72, 690, 200, 710], "https://example.com")
        .with_widget(0, [72, 500, 200, 520], "email", "Tx")
        .build()?;

    let analysis = service().analyze(&pdf, 0, false)?;
    assert!(analysis.texts.contains(&"Secret".to_string()));
    assert!(analysis.texts.contains(&"Public".to_string()));
    assert_eq!(analysis.image_ids.len(), 1);
    assert!(analysis.image_ids[0].starts_with("p0_img_"));
    assert_eq!(analysis.drawing_ids, vec!["p0_draw_0"]);
    assert_eq!((analysis.page_width, analysis.page_height), (612.0, 792.0));

    let contents: Vec<&str> = analysis
        .interactive_elements
        .iter()
        .map(|e| e.content.as_str())
        .collect();
    assert!(contents.contains(&"Link: https://example.com"));
    assert!(contents.contains(&"Field: email"));
    Ok(())
}

#[test]
fn test_analyze_suggests_repeated_text() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&format!("{}{}", text_content(&["CONFIDENTIAL"]), text_content(&["Intro"])))
        .page(&format!("{}{}", text_content(&["CONFIDENTIAL"]), text_content(&["Body"])))
        .build()?;

    let analysis = service().analyze(&pdf, 0, true)?;
    assert_eq!(analysis.suggested_watermarks, vec!["CONFIDENTIAL"]);
    assert!(service().analyze(&pdf, 0, false)?.suggested_watermarks.is_empty());
    Ok(())
}

#[test]
fn test_analyze_rejects_bad_page() -> Result<()> {
    let pdf = TestPdfBuilder::new().page(&text_content(&["x"])).build()?;
    assert!(service().analyze(&pdf, 4, false).is_err());
    Ok(())
}

#[test]
fn test_remove_text_keeps_neighbours() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&text_content(&["Secret", "Public"]))
        .page(&text_content(&["Secret again", "Secret"]))
        .build()?;
    // a bare string naming a whole span resolves to its first occurrence
    let targets = TargetSet::from_json(r#"{"text": ["Secret"]}"#)?;

    let (output, report) = uncompressed_service().reconstruct(&pdf, &targets, &OverlayPlan::new(), None)?;

    assert_removed(&output, 0, "Secret");
    assert_preserved(&output, 0, "Public");
    let page_two: Vec<String> = open(&output).text_spans(1)?.into_iter().map(|s| s.text).collect();
    assert!(page_two.contains(&"Secret again".to_string()));
    assert!(page_two.contains(&"Secret".to_string()));
    assert_eq!(report.occurrences_removed, 1);
    assert_eq!(report.pages_modified, 1);
    Ok(())
}

#[test]
fn test_remove_text_in_region_only() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&text_content(&["Secret", "Public", "Secret"]))
        .build()?;
    let before = open(&pdf).text_spans(0)?;
    let first = before.iter().find(|s| s.text == "Secret").map(|s| s.bbox).unwrap();
    let targets = TargetSet::from_json(&format!(
        r#"{{"text": [{{"content": "Secret", "page": 0, "bbox": [{}, {}, {}, {}]}}]}}"#,
        first.x0, first.y0, first.x1, first.y1
    ))?;

    let (output, _) = service().reconstruct(&pdf, &targets, &OverlayPlan::new(), None)?;

    let texts: Vec<String> = open(&output).text_spans(0)?.into_iter().map(|s| s.text).collect();
    assert_eq!(texts.iter().filter(|t| t.as_str() == "Secret").count(), 1);
    assert!(texts.contains(&"Public".to_string()));
    Ok(())
}

fn hello_page_and_form() -> Result<Vec<u8>> {
    TestPdfBuilder::new()
        .page(&format!("{}{}", text_content(&["Hello"]), FORM_CONTENT))
        .with_form("BT /F1 12 Tf 72 600 Td (Hello) Tj ET")
        .build()
}

/// Bounding boxes of the spans reading `text`, top to bottom.
fn span_boxes(pdf: &[u8], page: usize, text: &str) -> Result<Vec<unmark::Rect>> {
    let mut boxes: Vec<unmark::Rect> = open(pdf)
        .text_spans(page)?
        .into_iter()
        .filter(|s| s.text == text)
        .map(|s| s.bbox)
        .collect();
    boxes.sort_by(|a, b| a.y0.total_cmp(&b.y0));
    Ok(boxes)
}

fn region_json(bbox: unmark::Rect) -> String {
    format!(
        r#"{{"text": [{{"page": 0, "bbox": [{}, {}, {}, {}]}}]}}"#,
        bbox.x0 - 1.0,
        bbox.y0 - 1.0,
        bbox.x1 + 1.0,
        bbox.y1 + 1.0
    )
}

#[test]
fn test_remove_text_from_page_not_form() -> Result<()> {
    let pdf = hello_page_and_form()?;
    let before = span_boxes(&pdf, 0, "Hello")?;
    assert_eq!(before.len(), 2);
    let targets = TargetSet::from_json(&region_json(before[0]))?;

    let (output, report) = uncompressed_service().reconstruct(&pdf, &targets, &OverlayPlan::new(), None)?;

    assert_eq!(span_boxes(&output, 0, "Hello")?, vec![before[1]]);
    assert_eq!(report.occurrences_removed, 1);
    assert_eq!(report.applied_count(), 1);
    Ok(())
}

#[test]
fn test_remove_text_inside_form_xobject() -> Result<()> {
    let pdf = hello_page_and_form()?;
    let before = span_boxes(&pdf, 0, "Hello")?;
    let targets = TargetSet::from_json(&region_json(before[1]))?;

    let (output, report) = uncompressed_service().reconstruct(&pdf, &targets, &OverlayPlan::new(), None)?;

    assert_eq!(span_boxes(&output, 0, "Hello")?, vec![before[0]]);
    assert_eq!(report.occurrences_removed, 1);
    assert_eq!(report.streams_modified, 1);
    Ok(())
}

#[test]
fn test_remove_link_and_widget() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&text_content(&["Form"]))
        .with_link(0, [72, 690, 200, 710], "https://example.com")
        .with_widget(0, [72, 500, 200, 520], "email", "Tx")
        .build()?;
    let widget = open(&pdf).widgets(0)?[0].xref;
    let targets = TargetSet::from_json(&format!(
        r#"{{"links": ["p0_link_0"], "widgets": ["p0_widget_{}"]}}"#,
        widget
    ))?;

    let (output, report) = service().reconstruct(&pdf, &targets, &OverlayPlan::new(), None)?;

    let edited = open(&output);
    assert!(edited.links(0)?.is_empty());
    assert!(edited.widgets(0)?.is_empty());
    assert!(!edited.metadata()?.has_forms);
    assert_eq!(report.applied_count(), 2);
    Ok(())
}

#[test]
fn test_remove_image_object() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&format!("{}{}", IMAGE_CONTENT, text_content(&["Caption"])))
        .build()?;
    let image_id = service().analyze(&pdf, 0, false)?.image_ids[0].clone();
    let targets = TargetSet::from_json(&format!(r#"{{"xobjects": ["{}"]}}"#, image_id))?;

    let (output, report) = uncompressed_service().reconstruct(&pdf, &targets, &OverlayPlan::new(), None)?;

    assert_eq!(report.applied_count(), 1);
    let images = open(&output).images(0)?;
    assert_eq!((images[0].width, images[0].height), (1, 1));
    assert_preserved(&output, 0, "Caption");
    Ok(())
}

#[test]
fn test_remove_inline_image() -> Result<()> {
    let mut content = INLINE_IMAGE_CONTENT.to_vec();
    content.extend(text_content(&["Kept"]).as_bytes());
    let pdf = TestPdfBuilder::new().page_bytes(&content).build()?;
    assert_eq!(open(&pdf).images(0)?[0].xref, 0);
    let targets = TargetSet::from_json(r#"{"xobjects": ["p0_img_0"]}"#)?;

    let (output, _) = service().reconstruct(&pdf, &targets, &OverlayPlan::new(), None)?;

    assert!(open(&output).images(0)?.is_empty());
    assert_preserved(&output, 0, "Kept");
    Ok(())
}

#[test]
fn test_inline_image_under_stamp_removes_stamp() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page_bytes(INLINE_IMAGE_CONTENT)
        .with_stamp(0, [8, 8, 32, 32])
        .build()?;
    let targets = TargetSet::from_json(r#"{"xobjects": ["p0_img_0"]}"#)?;

    let (output, _) = service().reconstruct(&pdf, &targets, &OverlayPlan::new(), None)?;

    let edited = open(&output);
    assert!(edited.annotations(0)?.is_empty());
    assert_eq!(edited.images(0)?.len(), 1);
    Ok(())
}

#[test]
fn test_remove_drawing() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&format!("{}{}", DRAWING_CONTENT, text_content(&["Legend"])))
        .build()?;
    assert_eq!(open(&pdf).drawings(0)?.len(), 1);
    let targets = TargetSet::from_json(r#"{"drawings": ["p0_draw_0"]}"#)?;

    let (output, _) = service().reconstruct(&pdf, &targets, &OverlayPlan::new(), None)?;

    assert!(open(&output).drawings(0)?.is_empty());
    assert_preserved(&output, 0, "Legend");
    Ok(())
}

#[test]
fn test_overlay_inside_removed_drawing_survives() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&format!("{}{}", DRAWING_CONTENT, text_content(&["Legend"])))
        .build()?;
    let drawing = open(&pdf).drawings(0)?[0].bbox;
    let (x, y) = ((drawing.x0 + drawing.x1) / 2.0, (drawing.y0 + drawing.y1) / 2.0);
    let overlays = OverlayPlan::from_json(&format!(
        r#"{{"0": [{{"type": "text", "text": "STAMP", "x": {}, "y": {}, "fontsize": 10}},
                  {{"type": "image", "x": {}, "y": {}}}]}}"#,
        x, y, x, y
    ))?;
    let targets = TargetSet::from_json(r#"{"drawings": ["p0_draw_0"]}"#)?;

    let (output, report) =
        uncompressed_service().reconstruct(&pdf, &targets, &overlays, Some(&png_bytes(8, 4)))?;

    let edited = open(&output);
    assert!(edited.drawings(0)?.is_empty());
    assert_eq!(edited.images(0)?.len(), 1);
    assert!(drawing.contains_rect(&edited.images(0)?[0].bbox));
    assert_preserved(&output, 0, "STAMP");
    assert_preserved(&output, 0, "Legend");
    assert_eq!(report.overlays_applied, 2);
    Ok(())
}

#[test]
fn test_text_overlay_is_added_above_content() -> Result<()> {
    let pdf = TestPdfBuilder::new().page(&text_content(&["Body"])).build()?;
    let overlays = OverlayPlan::from_json(
        r##"{"0": [{"type": "text", "text": "DRAFT", "x": 300, "y": 400, "fontsize": 40,
                    "angle": 45, "opacity": 0.4, "color": "#c00"}]}"##,
    )?;

    let (output, report) = uncompressed_service().reconstruct(&pdf, &TargetSet::new(), &overlays, None)?;

    assert_eq!(report.overlays_applied, 1);
    assert_preserved(&output, 0, "Body");
    assert_preserved(&output, 0, "DRAFT");
    Ok(())
}

const DEJAVU_SANS: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

#[test]
fn test_embedded_overlay_font_is_subset() -> Result<()> {
    let Ok(full) = std::fs::read(DEJAVU_SANS) else {
        return Ok(());
    };
    let pdf = TestPdfBuilder::new().page(&text_content(&["Body"])).build()?;
    let overlays = OverlayPlan::from_json(
        r#"{"0": [{"type": "text", "text": "Stamp", "x": 300, "y": 400, "fontname": "dejavu"}]}"#,
    )?;
    let config = EditConfig::default()
        .with_font("dejavu", FontSource::File(DEJAVU_SANS.to_string()))
        .with_save_options(SaveOptions {
            compaction: Compaction::Prune,
            compress: false,
            subset_fonts: true,
        });

    let (output, report) =
        EditService::with_lopdf().with_config(config).reconstruct(&pdf, &TargetSet::new(), &overlays, None)?;

    assert_eq!(report.overlays_applied, 1);
    let doc = Document::load_mem(&output)?;
    let file = doc
        .objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .find(|s| s.dict.has(b"Length1"))
        .expect("embedded font file");
    assert!(file.content.len() < full.len() / 2);
    let renamed = doc
        .objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .filter_map(|d| d.get(b"BaseFont").and_then(Object::as_name_str).ok())
        .any(|name| name.len() == 17 && name.ends_with("+DejaVuSans"));
    assert!(renamed);
    assert_preserved(&output, 0, "Stamp");
    Ok(())
}

#[test]
fn test_image_overlay() -> Result<()> {
    let pdf = TestPdfBuilder::new().page(&text_content(&["Body"])).build()?;
    let overlays = OverlayPlan::from_json(r#"{"0": [{"type": "image", "x": 300, "y": 400, "opacity": 0.5}]}"#)?;
    let png = png_bytes(8, 4);

    let (output, report) = service().reconstruct(&pdf, &TargetSet::new(), &overlays, Some(&png))?;

    assert_eq!(report.overlays_applied, 1);
    let images = open(&output).images(0)?;
    assert_eq!(images.len(), 1);
    assert_eq!((images[0].width, images[0].height), (8, 4));
    let bbox = images[0].bbox;
    assert!((bbox.width() - 8.0).abs() < 1e-6 && (bbox.height() - 4.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_hide_layer() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&text_content(&["Body"]))
        .with_layer("Watermark")
        .build()?;
    let layer = open(&pdf).metadata()?.layers[0];
    let targets = TargetSet::from_json(&format!(r#"{{"layers": [{}]}}"#, layer))?;

    let (output, report) = uncompressed_service().reconstruct(&pdf, &targets, &OverlayPlan::new(), None)?;
    assert_eq!(report.applied_count(), 1);

    let doc = Document::load_mem(&output)?;
    let catalog = doc.get_dictionary(doc.trailer.get(b"Root")?.as_reference()?)?;
    let props = catalog.get(b"OCProperties")?.as_dict()?;
    let config = props.get(b"D")?.as_dict()?;
    assert_eq!(config.get(b"OFF")?.as_array()?.len(), 1);
    assert!(config.get(b"ON")?.as_array()?.is_empty());
    Ok(())
}

#[test]
fn test_preview_renders_png() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&text_content(&["Secret", "Public"]))
        .build()?;
    let targets = TargetSet::from_json(r#"{"text": ["Secret"]}"#)?;

    let (png, report) = service().preview(&pdf, 0, &targets, &OverlayPlan::new(), None)?;

    assert!(png.starts_with(b"\x89PNG"));
    assert_eq!(report.pages_processed, 1);
    assert!(service().preview(&pdf, 1, &targets, &OverlayPlan::new(), None).is_err());
    Ok(())
}

#[test]
fn test_reconstruct_output_reopens() -> Result<()> {
    let pdf = TestPdfBuilder::new()
        .page(&text_content(&["One"]))
        .page(&text_content(&["Two"]))
        .build()?;

    let (output, report) = service().reconstruct(&pdf, &TargetSet::new(), &OverlayPlan::new(), None)?;

    assert!(!report.has_changes());
    assert_eq!(service().info(&output)?.page_count, 2);
    assert_preserved(&output, 1, "Two");
    Ok(())
}
