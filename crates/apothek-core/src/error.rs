//! # Domain Error Types

use thiserror::Error;

/// Field-level validation failure.
///
/// Raised by [`crate::validation`] before a write reaches the database, so
/// constraint violations surface as readable messages instead of driver
/// errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was empty or whitespace.
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    /// A field exceeded its maximum length.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// Email address failed the structural check.
    #[error("invalid email address: {value}")]
    InvalidEmail { value: String },

    /// Phone number contained characters other than digits, +, -, spaces.
    #[error("invalid phone number: {value}")]
    InvalidPhone { value: String },

    /// Business code (branch code, invoice number) had an invalid shape.
    #[error("invalid code: {value}")]
    InvalidCode { value: String },

    /// A monetary or quantity field was negative where it may not be.
    #[error("{field} must not be negative")]
    Negative { field: &'static str },
}
