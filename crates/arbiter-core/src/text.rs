//! # Text Admissibility
//!
//! JSON strings may carry U+0000, but PostgreSQL `TEXT` and `JSONB` columns
//! cannot store it. Every free-text field and every opaque JSON payload is
//! checked here before it reaches a storage engine.

use serde_json::Value;

use crate::error::ValidationError;

/// Reject `text` if it contains a NUL character.
pub fn reject_nul(field: &'static str, text: &str) -> Result<(), ValidationError> {
    if text.contains('\0') {
        return Err(ValidationError::NulCharacter { field });
    }
    Ok(())
}

/// Reject a JSON value if any string or object key inside it contains a NUL
/// character.
pub fn reject_nul_in_json(field: &'static str, value: &Value) -> Result<(), ValidationError> {
    let mut pending = vec![value];
    while let Some(value) = pending.pop() {
        match value {
            Value::String(s) => reject_nul(field, s)?,
            Value::Array(items) => pending.extend(items),
            Value::Object(map) => {
                for (key, item) in map {
                    reject_nul(field, key)?;
                    pending.push(item);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }
    Ok(())
}
