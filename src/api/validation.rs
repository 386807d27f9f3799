//! Request field validation.

use serde::{Deserialize, Serialize};

/// One rejected request field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub description: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            description: description.into(),
        }
    }
}

pub type ValidationResult = Result<(), String>;

fn validate_length(value: &str, min: usize, max: usize) -> ValidationResult {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(format!("must contain from {min}-{max} characters"));
    }
    Ok(())
}

pub fn validate_username(value: &str) -> ValidationResult {
    validate_length(value, 3, 100)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err("must contain only lowercase letters, digits, or underscore".to_string());
    }
    Ok(())
}

pub fn validate_full_name(value: &str) -> ValidationResult {
    validate_length(value, 3, 100)?;
    if !value.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err("must contain only letters or spaces".to_string());
    }
    Ok(())
}

pub fn validate_password(value: &str) -> ValidationResult {
    validate_length(value, 6, 100)
}

pub fn validate_email(value: &str) -> ValidationResult {
    validate_length(value, 3, 200)?;
    let mut parts = value.splitn(2, '@');
    let (local, domain) = (parts.next().unwrap_or_default(), parts.next());
    match domain {
        Some(domain)
            if !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err("is not a valid email address".to_string()),
    }
}

pub fn validate_email_id(value: i64) -> ValidationResult {
    if value <= 0 {
        return Err("must be a positive integer".to_string());
    }
    Ok(())
}

pub fn validate_secret_code(value: &str) -> ValidationResult {
    validate_length(value, 32, 128)
}

/// Accumulates violations across the fields of one request
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldViolation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, field: &str, result: ValidationResult) -> &mut Self {
        if let Err(description) = result {
            self.0.push(FieldViolation::new(field, description));
        }
        self
    }

    pub fn into_result(self) -> Result<(), Vec<FieldViolation>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}
