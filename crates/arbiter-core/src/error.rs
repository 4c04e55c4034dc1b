//! # Error Types
//!
//! Leaf-level errors shared by every crate in the workspace. Domain crates
//! wrap these in their own `thiserror` enums.

use thiserror::Error;

/// A value failed construction-time validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An identifier string was empty after trimming.
    #[error("{kind} must not be empty")]
    EmptyIdentifier {
        /// The identifier kind (e.g. "market_id").
        kind: &'static str,
    },

    /// An identifier string exceeded the maximum length.
    #[error("{kind} must not exceed {max} characters (got {actual})")]
    IdentifierTooLong {
        /// The identifier kind.
        kind: &'static str,
        /// Maximum permitted length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// Text contained a NUL character, which no storage engine can hold.
    #[error("{field} must not contain NUL characters")]
    NulCharacter {
        /// The offending field.
        field: &'static str,
    },

    /// A UUID-backed identifier could not be parsed.
    #[error("invalid {kind}: {value:?}")]
    MalformedUuid {
        /// The identifier kind.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A timestamp string was not valid RFC 3339 UTC.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Timestamp arithmetic left the representable range.
    #[error("timestamp arithmetic overflow")]
    TimestampOverflow,
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifier_display() {
        let err = ValidationError::EmptyIdentifier { kind: "market_id" };
        assert_eq!(err.to_string(), "market_id must not be empty");
    }

    #[test]
    fn too_long_display_carries_lengths() {
        let err = ValidationError::IdentifierTooLong {
            kind: "actor_ref",
            max: 128,
            actual: 300,
        };
        let msg = err.to_string();
        assert!(msg.contains("128"));
        assert!(msg.contains("300"));
    }
}
