//! # arbiter-core — Foundational Types for the Resolution Arbiter
//!
//! Leaf crate of the workspace. Defines the primitives every other crate
//! builds on:
//!
//! 1. **Identifier newtypes.** `ResolutionId`, `DisputeId`, `AuditEntryId`
//!    wrap UUIDs minted by this system; `MarketId`, `OutcomeId` and
//!    `ActorRef` wrap identifiers owned by external systems. You cannot pass
//!    a `MarketId` where an `OutcomeId` is expected.
//!
//! 2. **UTC-only timestamps.** `Timestamp` is UTC, truncated to seconds, so
//!    that audit entries canonicalize to the same bytes on every node.
//!
//! 3. **Injectable time.** Every component reads `now` through the [`Clock`]
//!    trait. [`ManualClock`] makes dispute windows testable.
//!
//! 4. **Canonical digests.** `CanonicalBytes` (RFC 8785 JSON) is the only
//!    input accepted by [`sha256_digest`], which the audit hash chain uses.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `arbiter-*` crates.
//! - No `unsafe` code, no `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;
pub mod text;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_hex, ContentDigest};
pub use error::{CanonicalizationError, ValidationError};
pub use identity::{ActorRef, AuditEntryId, DisputeId, MarketId, OutcomeId, ResolutionId};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
pub use text::{reject_nul, reject_nul_in_json};
