//! The consent fill form: raw input and field-level validation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::model::{Answers, Client};
use super::questions::{QuestionKind, HEALTH_QUESTIONS};
use super::validation::{
    validate_email_optional, validate_max_len, validate_required, ValidationError,
    ValidationErrors,
};

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_PHONE_LEN: usize = 40;
pub const MAX_TREATMENT_TYPE_LEN: usize = 200;
pub const MAX_TYPED_SIGNATURE_LEN: usize = 255;

// `%y` first: `%Y` also accepts two digits and would read `25` as year 25.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"];

/// Raw form post. Keys outside this struct are dropped by deserialization.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsentFormInput {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub treatment_date: String,
    pub treatment_type: String,
    /// Data URI from the signature pad.
    pub signature_data: String,
    pub typed_signature: String,
    /// Checkbox value, absent when unticked.
    pub consent_given: Option<String>,
    pub allergies: String,
    pub pregnancy: String,
    pub medications: String,
    pub skin_conditions: String,
}

impl ConsentFormInput {
    /// Initial values for a form opened on behalf of a saved client.
    pub fn prefilled(client: &Client) -> Self {
        Self {
            full_name: client.full_name.clone(),
            email: client.email.clone(),
            phone: client.phone.clone(),
            ..Self::default()
        }
    }

    pub fn answer(&self, key: &str) -> Option<&str> {
        match key {
            "allergies" => Some(self.allergies.as_str()),
            "pregnancy" => Some(self.pregnancy.as_str()),
            "medications" => Some(self.medications.as_str()),
            "skin_conditions" => Some(self.skin_conditions.as_str()),
            _ => None,
        }
    }

    pub fn consent_checked(&self) -> bool {
        self.consent_given.as_deref().map(parse_checkbox).unwrap_or(false)
    }
}

/// Form input that passed every check.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedForm {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub treatment_date: NaiveDate,
    pub treatment_type: String,
    pub signature_data: String,
    pub typed_signature: String,
    pub consent_given: bool,
    pub answers: Answers,
}

pub fn parse_checkbox(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "false" | "0" | "off" | "no"
    )
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Validate every field, then the signature requirement.
///
/// Field errors are accumulated. The signature check only runs once all
/// fields are valid and is reported as a non-field error.
pub fn validate(input: &ConsentFormInput) -> Result<ValidatedForm, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if validate_required(&input.full_name, "full_name", &mut errors) {
        validate_max_len(input.full_name.trim(), "full_name", MAX_NAME_LEN, &mut errors);
    }
    validate_email_optional(&input.email, "email", &mut errors);
    validate_max_len(input.email.trim(), "email", MAX_EMAIL_LEN, &mut errors);
    validate_max_len(input.phone.trim(), "phone", MAX_PHONE_LEN, &mut errors);

    let treatment_date = if validate_required(&input.treatment_date, "treatment_date", &mut errors)
    {
        let parsed = parse_date(&input.treatment_date);
        if parsed.is_none() {
            errors.add(ValidationError::new("treatment_date", "Enter a valid date."));
        }
        parsed
    } else {
        None
    };

    if validate_required(&input.treatment_type, "treatment_type", &mut errors) {
        validate_max_len(
            input.treatment_type.trim(),
            "treatment_type",
            MAX_TREATMENT_TYPE_LEN,
            &mut errors,
        );
    }
    validate_max_len(
        input.typed_signature.trim(),
        "typed_signature",
        MAX_TYPED_SIGNATURE_LEN,
        &mut errors,
    );

    if !input.consent_checked() {
        errors.add(ValidationError::required("consent_given"));
    }

    let mut answers = Answers::new();
    for question in HEALTH_QUESTIONS {
        let value = input.answer(question.key).unwrap_or_default().trim();
        if value.is_empty() {
            if question.required {
                errors.add(ValidationError::required(question.key));
                continue;
            }
        } else if matches!(question.kind, QuestionKind::Choice(_)) && !question.accepts(value) {
            errors.add(ValidationError::invalid_choice(question.key, value));
            continue;
        }
        answers.insert(question.key.to_string(), value.to_string());
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    if input.signature_data.trim().is_empty() && input.typed_signature.trim().is_empty() {
        return Err(ValidationError::non_field(
            "Please provide either a drawn or typed signature.",
        )
        .into());
    }

    let treatment_date = match treatment_date {
        Some(date) => date,
        None => return Err(ValidationError::new("treatment_date", "Enter a valid date.").into()),
    };

    Ok(ValidatedForm {
        full_name: input.full_name.trim().to_string(),
        email: input.email.trim().to_string(),
        phone: input.phone.trim().to_string(),
        treatment_date,
        treatment_type: input.treatment_type.trim().to_string(),
        signature_data: input.signature_data.trim().to_string(),
        typed_signature: input.typed_signature.trim().to_string(),
        consent_given: true,
        answers,
    })
}
