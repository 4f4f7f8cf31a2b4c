//! Form validation errors.
//!
//! Errors are accumulated so a form can be re-rendered with every problem
//! highlighted at once.

use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ValidationError {
    /// `None` for errors that concern the form as a whole.
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn non_field(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn required(field: &str) -> Self {
        Self::new(field, "This field is required.")
    }

    pub fn too_long(field: &str, max: usize, actual: usize) -> Self {
        Self::new(
            field,
            format!(
                "Ensure this value has at most {} characters (it has {}).",
                max, actual
            ),
        )
    }

    pub fn invalid_choice(field: &str, value: &str) -> Self {
        Self::new(
            field,
            format!(
                "Select a valid choice. {} is not one of the available choices.",
                value
            ),
        )
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "[{}] {}", field, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field.as_deref() == Some(field))
    }

    /// Messages attached to `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.errors
            .iter()
            .filter(move |e| e.field.as_deref() == Some(field))
            .map(|e| e.message.as_str())
    }

    pub fn non_field(&self) -> impl Iterator<Item = &str> {
        self.errors
            .iter()
            .filter(|e| e.field.is_none())
            .map(|e| e.message.as_str())
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

// ============================================================================
// Field checks
// ============================================================================

/// Validate that a string is not empty after trimming.
pub fn validate_required(value: &str, field: &str, errors: &mut ValidationErrors) -> bool {
    if value.trim().is_empty() {
        errors.add(ValidationError::required(field));
        return false;
    }
    true
}

pub fn validate_max_len(value: &str, field: &str, max: usize, errors: &mut ValidationErrors) {
    let len = value.chars().count();
    if len > max {
        errors.add(ValidationError::too_long(field, max, len));
    }
}

/// Optional email: only checked when provided.
pub fn validate_email_optional(value: &str, field: &str, errors: &mut ValidationErrors) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return;
    }

    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !trimmed.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        errors.add(ValidationError::new(field, "Enter a valid email address."));
    }
}
