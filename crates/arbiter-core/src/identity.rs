//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier the arbiter handles. Two families:
//!
//! - **Minted here** (`ResolutionId`, `DisputeId`, `AuditEntryId`): random
//!   UUIDs generated when the record is created.
//! - **Owned elsewhere** (`MarketId`, `OutcomeId`, `ActorRef`): opaque strings
//!   issued by the market catalogue or the identity provider. They are
//!   trimmed and length-checked at construction and otherwise not
//!   interpreted.
//!
//! Type-level separation prevents passing an outcome where a market is
//! expected, which in this domain would silently pay out the wrong side.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum length of an externally issued identifier.
pub const MAX_EXTERNAL_ID_LEN: usize = 128;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ValidationError::MalformedUuid {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

macro_rules! external_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a validated identifier.
            ///
            /// Surrounding whitespace is trimmed. Empty values, values
            /// containing NUL, and values longer than
            /// [`MAX_EXTERNAL_ID_LEN`] are rejected.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::EmptyIdentifier { kind: $kind });
                }
                crate::text::reject_nul($kind, trimmed)?;
                let len = trimmed.chars().count();
                if len > MAX_EXTERNAL_ID_LEN {
                    return Err(ValidationError::IdentifierTooLong {
                        kind: $kind,
                        max: MAX_EXTERNAL_ID_LEN,
                        actual: len,
                    });
                }
                Ok(Self(trimmed.to_string()))
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier of a resolution record.
    ResolutionId,
    "resolution_id",
    "resolution"
);

uuid_identifier!(
    /// Unique identifier of a dispute.
    DisputeId,
    "dispute_id",
    "dispute"
);

uuid_identifier!(
    /// Unique identifier of an audit log entry.
    AuditEntryId,
    "audit_entry_id",
    "audit"
);

external_identifier!(
    /// Identifier of a market in the external market catalogue.
    MarketId,
    "market_id"
);

external_identifier!(
    /// Identifier of one outcome of a market.
    OutcomeId,
    "outcome_id"
);

external_identifier!(
    /// Reference to whoever performs an action: an operator account, a
    /// participant, or an oracle feed identity.
    ActorRef,
    "actor_ref"
);
