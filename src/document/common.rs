//! Helpers shared by the layout and the engines.

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LINE_BREAK: Regex = Regex::new(r"(?i)<br\s*/?>").unwrap();
    static ref BLOCK_END: Regex =
        Regex::new(r"(?i)</\s*(p|div|h[1-6]|ul|ol|table|tr|blockquote)\s*>").unwrap();
    static ref LIST_ITEM: Regex = Regex::new(r"(?i)<\s*li[^>]*>").unwrap();
    static ref TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref SPACES: Regex = Regex::new(r"[ \t\r\f]+").unwrap();
    static ref BLANK_LINES: Regex = Regex::new(r"\n\s*\n").unwrap();
}

/// Escape special characters for Typst string literals.
pub fn escape_typst_string(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', r#"\""#)
        .replace('\n', r"\n")
}

/// Reduce template HTML to plain paragraphs.
///
/// Block-level closing tags end a paragraph, `<br>` and list items end a line,
/// every other tag is dropped.
pub fn html_to_paragraphs(html: &str) -> Vec<String> {
    let text = LINE_BREAK.replace_all(html, "\n");
    let text = LIST_ITEM.replace_all(&text, "\n• ");
    let text = BLOCK_END.replace_all(&text, "\n\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    BLANK_LINES
        .split(&text)
        .map(|block| {
            block
                .lines()
                .map(|line| SPACES.replace_all(line.trim(), " ").to_string())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Image formats both engines can embed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Detect an embeddable image from its magic bytes.
pub fn detect_image_format(data: &[u8]) -> Option<ImageFormat> {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some(ImageFormat::Png);
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageFormat::Jpeg);
    }
    None
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d %B %Y").to_string()
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%d %B %Y %H:%M UTC").to_string()
}
