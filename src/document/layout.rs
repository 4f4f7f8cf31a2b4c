//! The printable layout of a submission, independent of any engine.

use super::common::{
    detect_image_format, format_date, format_timestamp, html_to_paragraphs, ImageFormat,
};
use crate::consent::model::{ConsentTemplate, Submission};
use crate::consent::questions::{answer_label, HEALTH_QUESTIONS};

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLayout {
    pub title: String,
    /// Consent text, one entry per paragraph.
    pub terms: Vec<String>,
    /// Client-visible fields as label/value pairs.
    pub details: Vec<(String, String)>,
    /// Health answers as label/value pairs.
    pub answers: Vec<(String, String)>,
    pub typed_signature: Option<String>,
    pub signature_image: Option<SignatureImage>,
    /// A drawn signature is on record, even if its image could not be loaded.
    pub drawn_signature: bool,
    pub signed_at: String,
    pub consent_given: bool,
    pub reference: String,
}

impl DocumentLayout {
    /// `signature_bytes` is the stored drawn signature, if it could be fetched.
    /// Bytes that are not a PNG or JPEG image are left out of the layout.
    pub fn build(
        template: &ConsentTemplate,
        submission: &Submission,
        signature_bytes: Option<Vec<u8>>,
    ) -> Self {
        let mut details = vec![
            ("Full Name".to_string(), submission.full_name.clone()),
            ("Email".to_string(), submission.email.clone()),
            ("Phone".to_string(), submission.phone.clone()),
            ("Treatment Date".to_string(), format_date(submission.treatment_date)),
            ("Treatment Type".to_string(), submission.treatment_type.clone()),
        ];
        details.retain(|(_, value)| !value.trim().is_empty());

        // known questions in form order, then any other stored keys
        let mut ordered: Vec<(usize, &String, &String)> = submission
            .answers
            .iter()
            .map(|(key, value)| {
                let position = HEALTH_QUESTIONS
                    .iter()
                    .position(|q| q.key == key)
                    .unwrap_or(usize::MAX);
                (position, key, value)
            })
            .collect();
        ordered.sort_by_key(|(position, _, _)| *position);
        let answers = ordered
            .into_iter()
            .map(|(_, key, value)| (answer_label(key), value.clone()))
            .collect();

        let signature_image = signature_bytes.and_then(|bytes| {
            detect_image_format(&bytes).map(|format| SignatureImage { bytes, format })
        });

        let typed = submission.typed_signature.trim();

        Self {
            title: template.title.clone(),
            terms: html_to_paragraphs(&template.body),
            details,
            answers,
            typed_signature: (!typed.is_empty()).then(|| typed.to_string()),
            signature_image,
            drawn_signature: submission.signature_image.is_some(),
            signed_at: format_timestamp(submission.signed_at),
            consent_given: submission.consent_given,
            reference: submission.id.to_string(),
        }
    }

    /// Display value for an answer; empty answers read as a dash.
    pub fn display_value(value: &str) -> &str {
        if value.trim().is_empty() {
            "-"
        } else {
            value
        }
    }
}
