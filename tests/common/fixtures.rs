//! Test fixtures and PDF builders.
//!
//! Builds small but structurally complete PDFs with lopdf: shared Helvetica
//! font, image and form XObject resources on the page tree, optional links,
//! form fields and an optional content group.

use std::io::Cursor;
use std::path::Path;

use anyhow::Result;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Page content that shows one literal string per entry, stacked down
/// from the top of a letter page.
pub fn text_content(lines: &[&str]) -> String {
    let mut content = String::from("BT\n/F1 12 Tf\n72 700 Td\n");
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            content.push_str("0 -20 Td\n");
        }
        content.push_str(&format!("({}) Tj\n", line));
    }
    content.push_str("ET\n");
    content
}

/// Draws the shared image XObject into a 100 unit square at (50, 50).
pub const IMAGE_CONTENT: &str = "q\n100 0 0 100 50 50 cm\n/Im1 Do\nQ\n";

/// A filled rectangle from (100, 100) to (300, 150) in PDF space.
pub const DRAWING_CONTENT: &str = "0 0 1 rg\n100 100 200 50 re\nf\n";

/// Draws the shared form XObject.
pub const FORM_CONTENT: &str = "q\n/Fm0 Do\nQ\n";

/// An inline 1x1 gray image drawn into a 20 unit square.
pub const INLINE_IMAGE_CONTENT: &[u8] = b"q\n20 0 0 20 10 10 cm\nBI /W 1 /H 1 /CS /G /BPC 8 ID \x80 EI\nQ\n";

#[derive(Debug, Clone)]
struct Annotation {
    page: usize,
    rect: [i64; 4],
    kind: AnnotationKind,
}

#[derive(Debug, Clone)]
enum AnnotationKind {
    Link(String),
    Widget { name: String, field_type: String },
    Stamp,
}

/// Builder for test PDFs.
///
/// # Example
///
/// ```no_run
/// let pdf = TestPdfBuilder::new()
///     .with_title("Quarterly Report")
///     .page(&text_content(&["Secret", "Public"]))
///     .with_link(0, [72, 690, 200, 710], "https://example.com")
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TestPdfBuilder {
    pages: Vec<Vec<u8>>,
    title: Option<String>,
    annotations: Vec<Annotation>,
    layer: Option<String>,
    form: Option<String>,
}

impl TestPdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Adds a page with the given content stream.
    pub fn page(self, content: &str) -> Self {
        self.page_bytes(content.as_bytes())
    }

    pub fn page_bytes(mut self, content: &[u8]) -> Self {
        self.pages.push(content.to_vec());
        self
    }

    /// Adds a URI link; `rect` is in PDF space.
    pub fn with_link(mut self, page: usize, rect: [i64; 4], uri: &str) -> Self {
        self.annotations.push(Annotation {
            page,
            rect,
            kind: AnnotationKind::Link(uri.to_string()),
        });
        self
    }

    /// Adds a form field widget; `rect` is in PDF space.
    pub fn with_widget(mut self, page: usize, rect: [i64; 4], name: &str, field_type: &str) -> Self {
        self.annotations.push(Annotation {
            page,
            rect,
            kind: AnnotationKind::Widget {
                name: name.to_string(),
                field_type: field_type.to_string(),
            },
        });
        self
    }

    /// Adds a stamp annotation; `rect` is in PDF space.
    pub fn with_stamp(mut self, page: usize, rect: [i64; 4]) -> Self {
        self.annotations.push(Annotation {
            page,
            rect,
            kind: AnnotationKind::Stamp,
        });
        self
    }

    /// Makes `content` available to every page as form XObject `/Fm0`.
    pub fn with_form(mut self, content: &str) -> Self {
        self.form = Some(content.to_string());
        self
    }

    /// Adds an optional content group named `name`.
    pub fn with_layer(mut self, name: &str) -> Self {
        self.layer = Some(name.to_string());
        self
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let mut doc = self.document();
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Builds the PDF and writes it to `path`.
    pub fn write(&self, path: &Path) -> Result<Vec<u8>> {
        let bytes = self.build()?;
        std::fs::write(path, &bytes)?;
        Ok(bytes)
    }

    fn document(&self) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![0x80; 12],
        ));
        let mut xobjects = dictionary! { "Im1" => image_id };
        if let Some(form) = &self.form {
            let form_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                    "Resources" => dictionary! {
                        "Font" => dictionary! { "F1" => font_id },
                    },
                },
                form.as_bytes().to_vec(),
            ));
            xobjects.set("Fm0", form_id);
        }
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => xobjects,
        });

        let mut kids = Vec::new();
        let mut fields = Vec::new();
        for (index, content) in self.pages.iter().enumerate() {
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.clone()));
            let annots: Vec<Object> = self
                .annotations
                .iter()
                .filter(|a| a.page == index)
                .map(|a| {
                    let id = add_annotation(&mut doc, a);
                    if matches!(a.kind, AnnotationKind::Widget { .. }) {
                        fields.push(Object::Reference(id));
                    }
                    Object::Reference(id)
                })
                .collect();
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            };
            if !annots.is_empty() {
                page.set("Annots", annots);
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        };
        if !fields.is_empty() {
            catalog.set("AcroForm", dictionary! { "Fields" => fields });
        }
        if let Some(name) = &self.layer {
            let layer = doc.add_object(dictionary! {
                "Type" => "OCG",
                "Name" => Object::string_literal(name.as_str()),
            });
            catalog.set(
                "OCProperties",
                dictionary! {
                    "OCGs" => vec![Object::Reference(layer)],
                    "D" => dictionary! { "ON" => vec![Object::Reference(layer)] },
                },
            );
        }
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", catalog_id);

        if let Some(title) = &self.title {
            let info_id = doc.add_object(dictionary! {
                "Title" => Object::string_literal(title.as_str()),
                "Producer" => Object::string_literal("unmark tests"),
            });
            doc.trailer.set("Info", info_id);
        }
        doc
    }
}

fn add_annotation(doc: &mut Document, annotation: &Annotation) -> ObjectId {
    let rect: Vec<Object> = annotation.rect.iter().map(|&v| Object::Integer(v)).collect();
    let dict = match &annotation.kind {
        AnnotationKind::Link(uri) => dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => rect,
            "A" => dictionary! {
                "S" => "URI",
                "URI" => Object::string_literal(uri.as_str()),
            },
        },
        AnnotationKind::Widget { name, field_type } => dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => field_type.as_str(),
            "T" => Object::string_literal(name.as_str()),
            "Rect" => rect,
        },
        AnnotationKind::Stamp => dictionary! {
            "Type" => "Annot",
            "Subtype" => "Stamp",
            "Rect" => rect,
        },
    };
    doc.add_object(dict)
}

/// A small opaque PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 30, 30, 255]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}
