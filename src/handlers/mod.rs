pub mod alerts;
pub mod analysis;
pub mod catalog;
pub mod dashboard;
pub mod email;
pub mod payments;
pub mod tools;
pub mod users;

use crate::error::AuditError;

/// Trimmed, non-empty text field.
pub(crate) fn required_text(field: &str, value: &str) -> Result<String, AuditError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuditError::validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

/// Strictly positive integer field.
pub(crate) fn positive(field: &str, value: i64) -> Result<i64, AuditError> {
    if value <= 0 {
        return Err(AuditError::validation(format!("{field} must be greater than 0")));
    }
    Ok(value)
}
