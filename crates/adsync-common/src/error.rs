//! Error types for adsync

use thiserror::Error;

/// Result type alias for shared adsync operations
pub type Result<T> = std::result::Result<T, AdsyncError>;

/// Errors shared by every adsync crate
#[derive(Error, Debug)]
pub enum AdsyncError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unknown audit status: {0}")]
    UnknownStatus(String),
}

/// Check that `name` is usable as an unquoted warehouse identifier
/// (dataset, table, or column name).
///
/// Only ASCII letters, digits and underscores are accepted, and the first
/// character must not be a digit.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        },
        _ => false,
    };

    if valid && name.len() <= 63 {
        Ok(())
    } else {
        Err(AdsyncError::InvalidIdentifier(name.to_string()))
    }
}
