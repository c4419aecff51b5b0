//! Form input validation.
//!
//! Each form is checked by pure functions that collect every [`FieldError`]
//! instead of stopping at the first one. Handlers re-render the form with
//! the errors inline when the list is not empty.

use serde::Deserialize;

use kreddig_core::Email;

use crate::services::uploads::{self, UploadViolation, UploadedFile};

/// Longest accepted value for the name and email fields.
pub const MAX_FIELD_LENGTH: usize = 50;

const REQUIRED: &str = "This field is required.";
const INVALID_EMAIL: &str = "Invalid email address.";
const CSRF_INVALID: &str = "The CSRF token is invalid.";

/// A validation failure attached to one form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    /// The whole form was posted without a matching CSRF token.
    #[must_use]
    pub fn csrf() -> Self {
        Self::new("csrf_token", CSRF_INVALID)
    }
}

/// Errors collected for a form, looked up by field from templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors(Vec<FieldError>);

impl FormErrors {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages for one field, in the order they were found.
    #[must_use]
    pub fn for_field(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }
}

impl From<Vec<FieldError>> for FormErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

/// Posted email confirmation form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmationForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub csrf_token: String,
}

/// Posted inquiry form with its files already read.
#[derive(Debug, Clone, Default)]
pub struct InquiryForm {
    pub name: String,
    pub email: String,
    pub images: Vec<UploadedFile>,
    pub csrf_token: String,
}

/// A checked inquiry, ready for the workflow.
#[derive(Debug, Clone)]
pub struct ValidInquiry {
    pub name: String,
    pub email: Email,
}

/// Validate the email confirmation form.
///
/// # Errors
///
/// Returns every field error found.
pub fn validate_confirmation_form(form: &ConfirmationForm) -> Result<Email, Vec<FieldError>> {
    validate_email(&form.email)
}

/// Validate the inquiry form, including the uploaded files.
///
/// # Errors
///
/// Returns every field error found.
pub fn validate_inquiry_form(form: &InquiryForm) -> Result<ValidInquiry, Vec<FieldError>> {
    let mut errors = validate_name(&form.name);

    let email = match validate_email(&form.email) {
        Ok(email) => Some(email),
        Err(email_errors) => {
            errors.extend(email_errors);
            None
        }
    };

    if let Err(violations) = uploads::validate_batch(&form.images) {
        errors.extend(
            violations
                .iter()
                .map(|v| FieldError::new("images", v.to_string())),
        );
    }

    match email {
        Some(email) if errors.is_empty() => Ok(ValidInquiry {
            name: form.name.trim().to_string(),
            email,
        }),
        _ => Err(errors),
    }
}

/// The images error for an inquiry body cut off at the size limit.
#[must_use]
pub fn truncated_upload_error(files_seen: usize) -> FieldError {
    FieldError::new(
        "images",
        UploadViolation::for_truncated_body(files_seen).to_string(),
    )
}

/// Name: required, at most [`MAX_FIELD_LENGTH`] characters.
#[must_use]
pub fn validate_name(raw: &str) -> Vec<FieldError> {
    let name = raw.trim();
    if name.is_empty() {
        return vec![FieldError::new("name", REQUIRED)];
    }
    check_length("name", name).into_iter().collect()
}

/// Email: required, a valid address, at most [`MAX_FIELD_LENGTH`] characters.
///
/// # Errors
///
/// Returns the email field's errors.
pub fn validate_email(raw: &str) -> Result<Email, Vec<FieldError>> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(vec![FieldError::new("email", REQUIRED)]);
    }

    let mut errors = Vec::new();
    let parsed = Email::parse(value);
    if parsed.is_err() {
        errors.push(FieldError::new("email", INVALID_EMAIL));
    }
    errors.extend(check_length("email", value));

    match parsed {
        Ok(email) if errors.is_empty() => Ok(email),
        _ => Err(errors),
    }
}

fn check_length(field: &'static str, value: &str) -> Option<FieldError> {
    (value.chars().count() > MAX_FIELD_LENGTH).then(|| {
        FieldError::new(
            field,
            format!("Field cannot be longer than {MAX_FIELD_LENGTH} characters."),
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn jpeg(name: &str) -> UploadedFile {
        UploadedFile::new(
            name,
            Some("image/jpeg".to_string()),
            Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]),
        )
    }

    #[test]
    fn test_confirmation_form_valid() {
        let form = ConfirmationForm {
            email: " a@b.com ".to_string(),
            csrf_token: String::new(),
        };
        assert_eq!(validate_confirmation_form(&form).unwrap().as_str(), "a@b.com");
    }

    #[test]
    fn test_email_required() {
        let errors = validate_email("   ").unwrap_err();
        assert_eq!(errors, vec![FieldError::new("email", REQUIRED)]);
    }

    #[test]
    fn test_email_invalid_and_too_long() {
        let long = format!("{}@b.com", "a".repeat(50));
        let errors = validate_email(&long).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("50 characters"));

        let errors = validate_email(&"x".repeat(60)).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, INVALID_EMAIL);
    }

    #[test]
    fn test_email_at_length_limit() {
        let email = format!("{}@b.com", "a".repeat(44));
        assert_eq!(email.len(), MAX_FIELD_LENGTH);
        assert!(validate_email(&email).is_ok());
    }

    #[test]
    fn test_inquiry_form_collects_all_errors() {
        let form = InquiryForm {
            name: String::new(),
            email: "nope".to_string(),
            images: Vec::new(),
            csrf_token: String::new(),
        };
        let errors: FormErrors = validate_inquiry_form(&form).unwrap_err().into();

        assert_eq!(errors.for_field("name"), vec![REQUIRED]);
        assert_eq!(errors.for_field("email"), vec![INVALID_EMAIL]);
        assert_eq!(errors.for_field("images"), vec!["This field is required."]);
    }

    #[test]
    fn test_inquiry_form_valid() {
        let form = InquiryForm {
            name: " Ada ".to_string(),
            email: "a@b.com".to_string(),
            images: vec![jpeg("one.jpg"), jpeg("two.jpeg")],
            csrf_token: String::new(),
        };
        let valid = validate_inquiry_form(&form).unwrap();
        assert_eq!(valid.name, "Ada");
        assert_eq!(valid.email.as_str(), "a@b.com");
    }

    #[test]
    fn test_inquiry_form_reports_upload_violation() {
        let form = InquiryForm {
            name: "Ada".to_string(),
            email: "a@b.com".to_string(),
            images: (0..6).map(|i| jpeg(&format!("{i}.jpg"))).collect(),
            csrf_token: String::new(),
        };
        let errors: FormErrors = validate_inquiry_form(&form).unwrap_err().into();
        assert_eq!(errors.for_field("images"), vec!["Max file upload is 5!"]);
    }

    #[test]
    fn test_truncated_upload_error() {
        let mut errors = FormErrors::default();
        errors.push(truncated_upload_error(9));
        assert_eq!(errors.for_field("images"), vec!["Max file upload is 5!"]);
    }

    #[test]
    fn test_csrf_error() {
        let mut errors = FormErrors::default();
        errors.push(FieldError::csrf());
        assert_eq!(errors.for_field("csrf_token"), vec![CSRF_INVALID]);
    }
}
