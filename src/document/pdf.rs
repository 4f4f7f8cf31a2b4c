//! Pure-Rust PDF engine built on genpdf.

use std::path::PathBuf;

use genpdf::elements::{Break, Image as PdfImage, Paragraph};
use genpdf::style::{Style, StyledString};
use genpdf::{Document, Element};
use image::{DynamicImage, GenericImageView};
use tempfile::NamedTempFile;

use super::layout::{DocumentLayout, SignatureImage};
use super::{DocumentConfig, DocumentEngine, GeneratorError};

const FONT_SIZE_PT: u8 = 10;
const IMAGE_DPI: f64 = 150.0;
/// Signature images wider than this are scaled down before embedding.
const MAX_SIGNATURE_WIDTH_PX: u32 = 600;

pub struct GenpdfEngine {
    font_dir: PathBuf,
    font_family: String,
}

impl GenpdfEngine {
    pub fn new(config: &DocumentConfig) -> Self {
        Self {
            font_dir: config.font_dir.clone(),
            font_family: config.font_family.clone(),
        }
    }

    fn configure_document(&self, title: &str) -> Result<Document, GeneratorError> {
        let font_family = genpdf::fonts::from_files(&self.font_dir, &self.font_family, None)
            .map_err(|e| GeneratorError::Font(e.to_string()))?;

        let mut doc = Document::new(font_family);
        doc.set_title(title);
        doc.set_font_size(FONT_SIZE_PT);
        doc.set_line_spacing(1.25);

        let mut decorator = genpdf::SimplePageDecorator::new();
        decorator.set_margins(10);
        doc.set_page_decorator(decorator);
        Ok(doc)
    }
}

impl DocumentEngine for GenpdfEngine {
    fn name(&self) -> &'static str {
        "genpdf"
    }

    fn render(&self, layout: &DocumentLayout) -> Result<Vec<u8>, GeneratorError> {
        let mut doc = self.configure_document(&layout.title)?;

        doc.push(Paragraph::new(layout.title.as_str()).styled(Style::new().bold().with_font_size(16)));
        doc.push(Break::new(1));
        for paragraph in &layout.terms {
            for line in paragraph.lines() {
                doc.push(Paragraph::new(line));
            }
            doc.push(Break::new(1));
        }

        push_heading(&mut doc, "Client details");
        for (label, value) in &layout.details {
            doc.push(label_value(label, value));
        }

        if !layout.answers.is_empty() {
            doc.push(Break::new(1));
            push_heading(&mut doc, "Health questions");
            for (label, value) in &layout.answers {
                doc.push(label_value(label, DocumentLayout::display_value(value)));
            }
        }

        doc.push(Break::new(1));
        push_heading(&mut doc, "Signature");
        if layout.consent_given {
            doc.push(Paragraph::new("[x] I confirm I have read and agree to the above."));
        }

        // keeps the flattened signature on disk until rendering finishes
        let mut _signature_file: Option<NamedTempFile> = None;
        if let Some(signature) = &layout.signature_image {
            match flatten_signature(signature) {
                Ok((file, mut element)) => {
                    element.set_dpi(IMAGE_DPI);
                    doc.push(element);
                    _signature_file = Some(file);
                }
                Err(e) => {
                    log::debug!("Skipping signature image in genpdf output: {}", e);
                    doc.push(Paragraph::new("Drawn signature on file."));
                }
            }
        } else if layout.drawn_signature {
            doc.push(Paragraph::new("Drawn signature on file."));
        }
        if let Some(typed) = &layout.typed_signature {
            doc.push(Paragraph::new(typed.as_str()).styled(Style::new().italic()));
        }
        doc.push(
            Paragraph::new(format!(
                "Signed {} - Reference {}",
                layout.signed_at, layout.reference
            ))
            .styled(Style::new().with_font_size(8)),
        );

        let mut pdf = Vec::new();
        doc.render(&mut pdf)
            .map_err(|e| GeneratorError::Pdf(e.to_string()))?;
        Ok(pdf)
    }
}

fn push_heading(doc: &mut Document, text: &str) {
    doc.push(Paragraph::new(text).styled(Style::new().bold().with_font_size(12)));
}

fn label_value(label: &str, value: &str) -> Paragraph {
    let mut p = Paragraph::new("");
    p.push(StyledString::new(format!("{}: ", label), Style::new().bold()));
    p.push(StyledString::new(value.to_string(), Style::new()));
    p
}

/// genpdf cannot embed images with an alpha channel: paint the signature
/// over white, shrink it if needed, and write it out as an RGB PNG.
fn flatten_signature(
    signature: &SignatureImage,
) -> Result<(NamedTempFile, PdfImage), GeneratorError> {
    let img = image::load_from_memory(&signature.bytes)
        .map_err(|e| GeneratorError::Image(e.to_string()))?;

    let (w, _) = img.dimensions();
    let img = if w > MAX_SIGNATURE_WIDTH_PX {
        img.resize(
            MAX_SIGNATURE_WIDTH_PX,
            u32::MAX,
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        img
    };

    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut background = image::RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut background, &rgba, 0, 0);
    let rgb = DynamicImage::ImageRgba8(background).to_rgb8();

    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .map_err(GeneratorError::TempDir)?;
    rgb.save_with_format(file.path(), image::ImageFormat::Png)
        .map_err(|e| GeneratorError::Image(e.to_string()))?;

    let element =
        PdfImage::from_path(file.path()).map_err(|e| GeneratorError::Image(e.to_string()))?;
    Ok((file, element))
}
