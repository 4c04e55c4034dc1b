//! # arbiter-state — Resolution & Dispute Workflow
//!
//! Decides which outcome of a prediction market won, lets eligible actors
//! contest that decision during a bounded window, and records every step in
//! a tamper-evident audit trail.
//!
//! ## Components
//!
//! | Module | Role |
//! |---|---|
//! | [`audit`] | Audit entries, sealing into a per-resolution hash chain, chain verification |
//! | [`resolution`] | Resolution records and the status graph |
//! | [`dispute`] | Dispute records and review decisions |
//! | [`store`] | The storage seam: atomic conditional write batches, plus [`MemoryStore`] |
//! | [`workflow`] | The resolution state machine, the only writer |
//! | [`query`] | Read-only projections for operator tooling |
//! | [`ports`] | External collaborators: market directory and access policy |
//!
//! ## Concurrency
//!
//! The workflow holds no locks. Every transition is expressed as a
//! [`WriteBatch`] of guarded mutations; the storage engine applies the whole
//! batch atomically or not at all. Two racing transitions on the same
//! resolution therefore resolve to one winner and one `StaleState` (or
//! `DuplicateDispute`) failure regardless of how many service instances are
//! running.

pub mod audit;
pub mod config;
pub mod dispute;
pub mod error;
pub mod pagination;
pub mod ports;
pub mod query;
pub mod resolution;
pub mod store;
pub mod workflow;

pub use audit::{verify_chain, AuditAction, AuditLogEntry, AuditRecord, ChainVerification};
pub use config::WorkflowConfig;
pub use dispute::{Dispute, DisputeStatus, ReviewDecision};
pub use error::{ErrorKind, StoreError, WorkflowError};
pub use pagination::{Page, PageRequest};
pub use ports::{
    AccessPolicy, Action, AllowAll, InMemoryMarketDirectory, MarketDirectory, MarketInfo,
    MarketStatus, OutcomeInfo, PortError,
};
pub use query::{AuditTrailView, DisputeView, QuerySurface, ResolutionView};
pub use resolution::{
    FinalReason, Resolution, ResolutionFilter, ResolutionPatch, ResolutionSource,
    ResolutionStatus,
};
pub use store::{CommitReceipt, MemoryStore, Mutation, ResolutionStore, WriteBatch};
pub use workflow::{
    CreateDispute, CreateResolution, ResolutionWorkflow, ReviewDispute, ReviewOutcome,
};
