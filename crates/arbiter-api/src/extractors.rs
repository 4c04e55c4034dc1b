//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs and helpers to extract
//! and validate JSON bodies, query strings and path identifiers in handlers.

use std::str::FromStr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;

use arbiter_core::ValidationError;

use crate::error::AppError;

/// Upper bound on free-text fields (reasons, notes).
pub const MAX_TEXT_LEN: usize = 4096;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Extract a query string, mapping parse errors to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Parse a path segment into a typed identifier.
pub fn parse_id<T>(raw: &str) -> Result<T, AppError>
where
    T: FromStr<Err = ValidationError>,
{
    raw.parse().map_err(AppError::from)
}

/// Reject free text longer than [`MAX_TEXT_LEN`] characters or carrying
/// NUL characters.
pub fn check_text_len(field: &'static str, value: Option<&str>) -> Result<(), String> {
    let Some(text) = value else {
        return Ok(());
    };
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(format!("{field} must not exceed {MAX_TEXT_LEN} characters"));
    }
    arbiter_core::reject_nul(field, text).map_err(|e| e.to_string())
}
