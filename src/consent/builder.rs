//! Turns a validated form post into a persisted [`Submission`].

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use super::form::{validate, ConsentFormInput};
use super::model::{Client, ConsentTemplate, Submission};
use super::signature::{decode_signature, DecodeError, SignatureArtifact, SignatureInput};
use super::validation::{ValidationError, ValidationErrors};
use crate::db::{ConsentStore, StoreError};
use crate::storage::{object_key, ObjectStorage, SIGNATURE_NAMESPACE};

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The form should be shown again with these errors.
    #[error("invalid submission: {0}")]
    Invalid(ValidationErrors),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to store signature image: {0}")]
    Storage(String),
}

impl From<ValidationErrors> for SubmitError {
    fn from(errors: ValidationErrors) -> Self {
        SubmitError::Invalid(errors)
    }
}

impl From<DecodeError> for SubmitError {
    fn from(e: DecodeError) -> Self {
        SubmitError::Invalid(ValidationError::new("signature_data", e.to_string()).into())
    }
}

/// Validate, store the drawn signature, then persist the submission.
///
/// Nothing is written unless validation and decoding pass. If the record
/// cannot be saved, the uploaded signature is removed again.
pub async fn submit(
    store: &dyn ConsentStore,
    storage: &dyn ObjectStorage,
    template: &ConsentTemplate,
    client: Option<&Client>,
    input: &ConsentFormInput,
) -> Result<Submission, SubmitError> {
    let form = validate(input)?;

    let id = Uuid::new_v4();
    let signed_at = Utc::now();
    let artifact = decode_signature(SignatureInput {
        payload: &form.signature_data,
        typed: &form.typed_signature,
        template_slug: &template.slug,
        full_name: &form.full_name,
        signed_at: Some(signed_at),
        submission_id: id,
    })?;

    let signature_image = match artifact {
        SignatureArtifact::Drawn(drawn) => {
            let key = object_key(SIGNATURE_NAMESPACE, &drawn.filename);
            storage
                .upload_file(&key, &drawn.bytes)
                .await
                .map_err(SubmitError::Storage)?;
            log::debug!("Stored signature image {} ({} bytes)", key, drawn.bytes.len());
            Some(key)
        }
        SignatureArtifact::Typed(_) => None,
    };

    let submission = Submission {
        id,
        template_id: template.id,
        client_id: client.map(|c| c.id),
        full_name: form.full_name,
        email: form.email,
        phone: form.phone,
        treatment_date: form.treatment_date,
        treatment_type: form.treatment_type,
        answers: form.answers,
        signature_image,
        typed_signature: form.typed_signature,
        signed_at,
        document: None,
        consent_given: form.consent_given,
        created_at: signed_at,
    };

    if let Err(e) = store.insert_submission(&submission).await {
        if let Some(key) = &submission.signature_image {
            if let Err(cleanup) = storage.delete_file(key).await {
                log::warn!("Failed to remove orphaned signature {}: {}", key, cleanup);
            }
        }
        return Err(e.into());
    }

    log::info!(
        "Submission {} persisted for template '{}'",
        submission.id,
        template.slug
    );
    Ok(submission)
}

/// Resolve an optional `client_id` query value. Malformed or unknown ids
/// mean "no client".
pub async fn resolve_client(
    store: &dyn ConsentStore,
    client_id: Option<&str>,
) -> Result<Option<Client>, StoreError> {
    let id = match client_id.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => id,
            Err(_) => {
                log::debug!("Ignoring malformed client_id '{}'", raw);
                return Ok(None);
            }
        },
        None => return Ok(None),
    };
    store.get_client(&id).await
}
