//! Validation for catalog items.
//!
//! Provides validation functions to ensure data integrity before
//! inserting or updating items in the record store.

use super::models::{CatalogItem, GENERATED_ID_PREFIX};
use chrono::Datelike;
use std::fmt;

/// Year of the first motion picture, nothing older can be cataloged.
pub const MIN_YEAR: i32 = 1888;

/// Ids and asset keys longer than this are rejected.
pub const MAX_KEY_LENGTH: usize = 255;

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField {
        field: &'static str,
    },
    YearOutOfRange {
        value: i32,
        min: i32,
        max: i32,
    },
    InvalidCharacters {
        field: &'static str,
        value: String,
    },
    TooLong {
        field: &'static str,
        max: usize,
    },
    InvalidRange {
        field: &'static str,
        from: i32,
        to: i32,
    },
    Malformed {
        field: &'static str,
        reason: String,
    },
    /// No generated id is left past the highest one in use.
    IdSpaceExhausted,
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmptyField { field }
            | ValidationError::InvalidCharacters { field, .. }
            | ValidationError::TooLong { field, .. }
            | ValidationError::InvalidRange { field, .. }
            | ValidationError::Malformed { field, .. } => *field,
            ValidationError::YearOutOfRange { .. } => "year",
            ValidationError::IdSpaceExhausted => "id",
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField { field } => {
                write!(f, "Field '{}' is required but was empty", field)
            }
            ValidationError::YearOutOfRange { value, min, max } => {
                write!(f, "Field 'year' must be in [{}, {}], got {}", min, max, value)
            }
            ValidationError::InvalidCharacters { field, value } => {
                write!(f, "Field '{}' has invalid characters: {:?}", field, value)
            }
            ValidationError::TooLong { field, max } => {
                write!(f, "Field '{}' is longer than {} bytes", field, max)
            }
            ValidationError::InvalidRange { field, from, to } => {
                write!(f, "Range '{}' is empty: {} > {}", field, from, to)
            }
            ValidationError::Malformed { field, reason } => {
                write!(f, "Field '{}' is malformed: {}", field, reason)
            }
            ValidationError::IdSpaceExhausted => {
                write!(
                    f,
                    "No generated id is left after '{}{}'",
                    GENERATED_ID_PREFIX,
                    u64::MAX
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Latest accepted publication year, one year past the current UTC year.
pub fn max_year() -> i32 {
    chrono::Utc::now().year() + 1
}

pub fn validate_year(year: i32) -> ValidationResult<()> {
    let max = max_year();
    if !(MIN_YEAR..=max).contains(&year) {
        return Err(ValidationError::YearOutOfRange {
            value: year,
            min: MIN_YEAR,
            max,
        });
    }
    Ok(())
}

fn validate_key(field: &'static str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    if value.len() > MAX_KEY_LENGTH {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_KEY_LENGTH,
        });
    }
    let bad_char = |c: char| c.is_control() || c.is_whitespace() || c == '/' || c == '\\';
    if value.contains(bad_char) || value == "." || value == ".." {
        return Err(ValidationError::InvalidCharacters {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}

/// Ids end up in URL paths, so they must be a single path segment.
pub fn validate_id(id: &str) -> ValidationResult<()> {
    validate_key("id", id)
}

/// Asset keys are file names in the blob store.
pub fn validate_asset_key(key: &str) -> ValidationResult<()> {
    validate_key("asset_ref", key)?;
    if key.starts_with('.') {
        return Err(ValidationError::InvalidCharacters {
            field: "asset_ref",
            value: key.to_owned(),
        });
    }
    Ok(())
}

/// Validate a whole item, as it would be committed.
pub fn validate_item(item: &CatalogItem) -> ValidationResult<()> {
    validate_id(&item.id)?;
    if item.title.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "title" });
    }
    if item.genre.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "genre" });
    }
    validate_year(item.year)?;
    if let Some(key) = &item.asset_ref {
        validate_asset_key(key)?;
    }
    Ok(())
}
