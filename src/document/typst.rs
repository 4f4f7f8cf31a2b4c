//! Typst rendering engine.
//!
//! Writes the layout as Typst source into a temporary directory, invokes the
//! `typst` CLI and reads back the PDF.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{tempdir, TempDir};

use super::common::escape_typst_string;
use super::layout::DocumentLayout;
use super::{DocumentConfig, DocumentEngine, GeneratorError};

const SOURCE_FILE: &str = "consent.typ";
const OUTPUT_FILE: &str = "consent.pdf";
/// Optional page setup read from the static root.
const PREAMBLE_FILE: &str = "consent_preamble.typ";

const DEFAULT_PREAMBLE: &str = r#"#set page(paper: "a4", margin: 2cm)
#set text(size: 10.5pt)
#set par(justify: true)
"#;

pub struct TypstEngine {
    typst_bin: String,
    static_root: PathBuf,
    font_dir: PathBuf,
}

impl TypstEngine {
    pub fn new(config: &DocumentConfig) -> Self {
        Self {
            typst_bin: config.typst_bin.clone(),
            static_root: config.static_root.clone(),
            font_dir: config.font_dir.clone(),
        }
    }

    fn preamble(&self) -> Result<String, GeneratorError> {
        let path = self.static_root.join(PREAMBLE_FILE);
        if !path.exists() {
            return Ok(DEFAULT_PREAMBLE.to_string());
        }
        fs::read_to_string(&path).map_err(GeneratorError::TemplateIo)
    }
}

impl DocumentEngine for TypstEngine {
    fn name(&self) -> &'static str {
        "typst"
    }

    fn render(&self, layout: &DocumentLayout) -> Result<Vec<u8>, GeneratorError> {
        let temp_dir = tempdir().map_err(GeneratorError::TempDir)?;

        let signature_file = match &layout.signature_image {
            Some(image) => {
                let name = format!("signature.{}", image.format.extension());
                fs::write(temp_dir.path().join(&name), &image.bytes)
                    .map_err(GeneratorError::WriteSource)?;
                Some(name)
            }
            None => None,
        };

        let source = format!(
            "{}\n{}",
            self.preamble()?,
            render_source(layout, signature_file.as_deref())
        );
        fs::write(temp_dir.path().join(SOURCE_FILE), source)
            .map_err(GeneratorError::WriteSource)?;

        compile_typst_to_pdf(&self.typst_bin, &temp_dir, &self.font_dir)
    }
}

/// Typst markup for a layout. Every value goes through a string literal.
pub fn render_source(layout: &DocumentLayout, signature_file: Option<&str>) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "#heading(level: 1, \"{}\")\n\n",
        escape_typst_string(&layout.title)
    ));
    for paragraph in &layout.terms {
        out.push_str(&format!("#text(\"{}\")\n\n", escape_typst_string(paragraph)));
    }

    out.push_str("#heading(level: 2, \"Client details\")\n");
    out.push_str(&label_table(&layout.details));

    if !layout.answers.is_empty() {
        out.push_str("#heading(level: 2, \"Health questions\")\n");
        let answers: Vec<(String, String)> = layout
            .answers
            .iter()
            .map(|(label, value)| {
                (label.clone(), DocumentLayout::display_value(value).to_string())
            })
            .collect();
        out.push_str(&label_table(&answers));
    }

    out.push_str("#heading(level: 2, \"Signature\")\n");
    if layout.consent_given {
        out.push_str("#text(\"☑ I confirm I have read and agree to the above.\")\n\n");
    }
    match signature_file {
        Some(file) => out.push_str(&format!(
            "#image(\"{}\", width: 6cm)\n\n",
            escape_typst_string(file)
        )),
        None if layout.drawn_signature => {
            out.push_str("#text(\"Drawn signature on file.\")\n\n")
        }
        None => {}
    }
    if let Some(typed) = &layout.typed_signature {
        out.push_str(&format!(
            "#text(style: \"italic\", \"{}\")\n\n",
            escape_typst_string(typed)
        ));
    }
    out.push_str(&format!(
        "#text(size: 9pt, \"Signed {} · Reference {}\")\n",
        escape_typst_string(&layout.signed_at),
        escape_typst_string(&layout.reference)
    ));

    out
}

fn label_table(rows: &[(String, String)]) -> String {
    let mut table = String::from("#table(columns: (auto, 1fr), stroke: none,\n");
    for (label, value) in rows {
        table.push_str(&format!(
            "  strong(\"{}\"), \"{}\",\n",
            escape_typst_string(label),
            escape_typst_string(value)
        ));
    }
    table.push_str(")\n\n");
    table
}

/// Compile the source file in `temp_dir` to PDF.
fn compile_typst_to_pdf(
    typst_bin: &str,
    temp_dir: &TempDir,
    font_dir: &std::path::Path,
) -> Result<Vec<u8>, GeneratorError> {
    let typ_path = temp_dir.path().join(SOURCE_FILE);
    let output_path = temp_dir.path().join(OUTPUT_FILE);

    let mut command = Command::new(typst_bin);
    command
        .arg("compile")
        .arg(&typ_path)
        .arg(&output_path)
        .current_dir(temp_dir.path());
    if font_dir.is_dir() {
        command.arg("--font-path").arg(font_dir);
    }

    let output = command.output().map_err(GeneratorError::TypstIo)?;
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        log::debug!(
            "typst stderr: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Err(GeneratorError::TypstExit(code));
    }

    fs::read(&output_path).map_err(GeneratorError::ReadPdf)
}
