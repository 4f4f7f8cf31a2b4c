use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const MAX_SLUG_LEN: usize = 50;
pub const MAX_TITLE_LEN: usize = 200;

/// Health-question answers keyed by question key.
pub type Answers = BTreeMap<String, String>;

/// Reusable consent text shown before the client signs.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ConsentTemplate {
    #[schema(example = "a1b2c3d4-e5f6-7890-1234-567890abcdef")]
    pub id: Uuid,
    #[schema(example = "facial-consent")]
    pub slug: String,
    #[schema(example = "Facial Treatment Consent")]
    pub title: String,
    /// HTML body with the terms the client agrees to.
    #[schema(example = "<p>I understand the risks of this treatment.</p>")]
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsentTemplate {
    pub fn new(slug: String, title: String, body: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug,
            title,
            body,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Saved contact used to pre-fill repeat visits.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Client {
    pub id: Uuid,
    #[schema(example = "Jane Doe")]
    pub full_name: String,
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[schema(example = "+44 7700 900123")]
    pub phone: String,
    pub notes: String,
}

impl Client {
    pub fn new(full_name: String, email: String, phone: String, notes: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name,
            email,
            phone,
            notes,
        }
    }
}

/// One signed consent record.
///
/// Contact fields are copied from the form at submission time and never
/// follow later edits of the linked [`Client`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Submission {
    pub id: Uuid,
    pub template_id: Uuid,
    pub client_id: Option<Uuid>,
    #[schema(example = "Jane Doe")]
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[schema(example = "2025-11-05")]
    pub treatment_date: NaiveDate,
    #[schema(example = "Lash lift")]
    pub treatment_type: String,
    #[sqlx(json)]
    #[schema(value_type = Object, example = json!({"allergies": "no", "medications": ""}))]
    pub answers: Answers,
    /// Storage key of the drawn signature image.
    pub signature_image: Option<String>,
    pub typed_signature: String,
    pub signed_at: DateTime<Utc>,
    /// Storage key of the generated document.
    pub document: Option<String>,
    pub consent_given: bool,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Storage keys owned by this submission.
    pub fn artifact_keys(&self) -> Vec<String> {
        self.signature_image
            .iter()
            .chain(self.document.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTemplateRequest {
    #[schema(example = "Facial Treatment Consent")]
    pub title: String,
    /// Derived from the title when omitted.
    #[schema(example = "facial-consent")]
    pub slug: Option<String>,
    pub body: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateClientRequest {
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub notes: String,
}

/// Lowercase ASCII alphanumerics joined by single dashes, cut to
/// [`MAX_SLUG_LEN`].
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = false;

    for ch in title.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}
