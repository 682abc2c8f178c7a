//! # Field Validation Rules
//!
//! Pure checks applied before writes reach the storage layer. The seeder and
//! the CRUD handlers share these so both paths reject the same inputs.

use crate::error::ValidationError;

/// Maximum length for names and free-text business fields.
pub const MAX_NAME_LEN: usize = 200;

/// Maximum length for business codes (branch code, invoice number).
pub const MAX_CODE_LEN: usize = 40;

/// Checks that a required text field is non-empty after trimming.
pub fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

/// Structural email check: one `@`, non-empty local part, dot in the domain.
///
/// Deliverability is the cloud's problem; this only rejects obvious typos
/// before they become unique-index noise.
pub fn validate_email(value: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidEmail {
        value: value.to_string(),
    };

    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if host.is_empty() || tld.is_empty() || value.contains(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(())
}

/// Phone numbers: digits, `+`, `-`, spaces and parentheses, 5..=20 chars.
pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    let digits = value.chars().filter(char::is_ascii_digit).count();
    let allowed = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if digits < 5 || value.len() > 20 || !allowed {
        return Err(ValidationError::InvalidPhone {
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Business codes: uppercase alphanumerics plus `-`/`_`, non-empty.
pub fn validate_code(value: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidCode {
        value: value.to_string(),
    };
    if value.is_empty() || value.len() > MAX_CODE_LEN {
        return Err(invalid());
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '-' | '_'))
    {
        return Err(invalid());
    }
    Ok(())
}

/// Rejects negative money/quantity values.
pub fn require_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value < 0.0 {
        return Err(ValidationError::Negative { field });
    }
    Ok(())
}
