//! Signature decoding.
//!
//! A drawn signature arrives as a data URI (`data:image/png;base64,...`) from
//! the signature pad; a typed signature is the client's name as text.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

const BASE64_MARKER: &str = ";base64,";
const DEFAULT_EXTENSION: &str = "png";
/// Longest name segment kept in a signature filename, so the full storage
/// key stays within the 255-character column.
pub const MAX_FILENAME_NAME_LEN: usize = 80;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("signature image is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("signature image is empty")]
    Empty,
    #[error("no drawn or typed signature provided")]
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawnSignature {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// The signature of record for a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureArtifact {
    Drawn(DrawnSignature),
    Typed(String),
}

/// Everything the decoder needs to name a drawn signature.
#[derive(Debug, Clone, Copy)]
pub struct SignatureInput<'a> {
    pub payload: &'a str,
    pub typed: &'a str,
    pub template_slug: &'a str,
    pub full_name: &'a str,
    pub signed_at: Option<DateTime<Utc>>,
    pub submission_id: Uuid,
}

pub fn decode_signature(input: SignatureInput<'_>) -> Result<SignatureArtifact, DecodeError> {
    let payload = input.payload.trim();
    if payload.is_empty() {
        let typed = input.typed.trim();
        if typed.is_empty() {
            return Err(DecodeError::Missing);
        }
        return Ok(SignatureArtifact::Typed(typed.to_string()));
    }

    let (bytes, extension) = decode_payload(payload)?;
    let filename = signature_filename(
        input.template_slug,
        input.full_name,
        input.signed_at,
        input.submission_id,
        extension,
    );

    Ok(SignatureArtifact::Drawn(DrawnSignature { filename, bytes }))
}

/// Decode a data-URI payload, returning the raw bytes and a file extension.
///
/// Without a `;base64,` marker the whole payload is taken as encoded bytes.
pub fn decode_payload(payload: &str) -> Result<(Vec<u8>, &'static str), DecodeError> {
    let (header, encoded) = match payload.split_once(BASE64_MARKER) {
        Some((header, encoded)) => (Some(header), encoded),
        None => (None, payload),
    };

    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64.decode(compact.as_bytes())?;
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let extension = header.map(extension_for).unwrap_or(DEFAULT_EXTENSION);
    Ok((bytes, extension))
}

fn extension_for(header: &str) -> &'static str {
    let mime = header.trim().trim_start_matches("data:").to_ascii_lowercase();
    match mime.split_once('/').map(|(_, subtype)| subtype) {
        Some("png") => "png",
        Some("jpeg") | Some("jpg") => "jpg",
        Some("gif") => "gif",
        Some("webp") => "webp",
        Some("svg+xml") => "svg",
        _ => DEFAULT_EXTENSION,
    }
}

/// Keep ASCII alphanumerics and spaces, then turn spaces into underscores.
pub fn normalize_name(full_name: &str) -> String {
    full_name
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect::<String>()
        .replace(' ', "_")
}

/// `{slug}-{name}-{unix seconds}-{first 8 hex of id}.{ext}`.
///
/// The id suffix separates two submissions by the same name in the same
/// second.
pub fn signature_filename(
    template_slug: &str,
    full_name: &str,
    signed_at: Option<DateTime<Utc>>,
    submission_id: Uuid,
    extension: &str,
) -> String {
    let seconds = signed_at.map(|t| t.timestamp()).unwrap_or(0);
    let id = submission_id.simple().to_string();
    let mut name = normalize_name(full_name);
    // ASCII only after normalizing, so byte truncation is safe
    name.truncate(MAX_FILENAME_NAME_LEN);
    format!(
        "{}-{}-{}-{}.{}",
        template_slug,
        name,
        seconds,
        &id[..8],
        extension
    )
}
