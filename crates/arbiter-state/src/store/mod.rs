//! # Storage Seam
//!
//! One trait, [`ResolutionStore`], covers the Resolution Store, the Dispute
//! Ledger and the Audit Recorder. They share a single write path,
//! [`ResolutionStore::commit`], because every workflow transition touches
//! more than one of them and must land atomically: an audit entry never
//! exists without its state change, and vice versa.
//!
//! A [`WriteBatch`] is an ordered list of [`Mutation`]s. Some mutations are
//! pure guards (`RequireNoOpenDisputes`, `ExpectOpenDisputes`); the others
//! are conditional writes whose condition is evaluated at commit time, not
//! when the caller read the data. Engines apply the batch in order and
//! discard all of it on the first failing condition.

mod audit_log;
mod disputes;
mod memory;
mod resolutions;

pub use memory::MemoryStore;

use async_trait::async_trait;

use arbiter_core::{ActorRef, DisputeId, MarketId, ResolutionId, Timestamp};

use crate::audit::{AuditLogEntry, AuditRecord};
use crate::dispute::{Dispute, DisputeStatus};
use crate::error::StoreError;
use crate::pagination::{Page, PageRequest};
use crate::resolution::{Resolution, ResolutionFilter, ResolutionPatch, ResolutionStatus};

/// One conditional step of a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a new resolution. Fails with `DuplicateResolution` if the
    /// market already has a current one.
    InsertResolution(Resolution),
    /// Compare-and-swap the status of a resolution.
    TransitionResolution {
        id: ResolutionId,
        expected: ResolutionStatus,
        to: ResolutionStatus,
        patch: ResolutionPatch,
        at: Timestamp,
    },
    /// `pending | disputed → disputed`.
    MarkDisputed { id: ResolutionId, at: Timestamp },
    /// `disputed → pending` if no open disputes remain at this point of the
    /// batch. No-op otherwise.
    ReconcileDisputed { id: ResolutionId, at: Timestamp },
    /// Guard: the resolution has zero open disputes.
    RequireNoOpenDisputes { resolution_id: ResolutionId },
    /// Guard: the open disputes of the resolution are exactly `dispute_ids`.
    ExpectOpenDisputes {
        resolution_id: ResolutionId,
        dispute_ids: Vec<DisputeId>,
    },
    /// Insert a new open dispute. Fails with `DuplicateDispute` if an open
    /// dispute for the same `(resolution_id, disputed_outcome_id)` exists.
    InsertDispute(Dispute),
    /// Compare-and-swap `open → to` on a dispute.
    ReviewDispute {
        resolution_id: ResolutionId,
        id: DisputeId,
        to: DisputeStatus,
        reviewer: ActorRef,
        notes: Option<String>,
        at: Timestamp,
    },
    /// Append an audit entry; sequence and digest are assigned at commit.
    AppendAudit(AuditRecord),
}

impl Mutation {
    /// The resolution whose row this mutation reads or writes.
    pub fn resolution_id(&self) -> ResolutionId {
        match self {
            Self::InsertResolution(r) => r.id,
            Self::TransitionResolution { id, .. }
            | Self::MarkDisputed { id, .. }
            | Self::ReconcileDisputed { id, .. } => *id,
            Self::RequireNoOpenDisputes { resolution_id }
            | Self::ExpectOpenDisputes { resolution_id, .. }
            | Self::ReviewDispute { resolution_id, .. } => *resolution_id,
            Self::InsertDispute(d) => d.resolution_id,
            Self::AppendAudit(record) => record.resolution_id,
        }
    }
}

/// An ordered set of mutations applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mutation.
    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Distinct resolution ids the batch touches, sorted. Engines that lock
    /// rows take the locks in this order.
    pub fn resolution_ids(&self) -> Vec<ResolutionId> {
        let mut ids: Vec<_> = self.mutations.iter().map(Mutation::resolution_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// What a successful commit wrote.
///
/// Holds the post-commit state of every resolution and dispute the batch
/// touched (one snapshot each) and every audit entry it sealed, in batch
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReceipt {
    pub resolutions: Vec<Resolution>,
    pub disputes: Vec<Dispute>,
    pub audit: Vec<AuditLogEntry>,
}

impl CommitReceipt {
    pub fn resolution(&self, id: ResolutionId) -> Option<&Resolution> {
        self.resolutions.iter().find(|r| r.id == id)
    }

    pub fn dispute(&self, id: DisputeId) -> Option<&Dispute> {
        self.disputes.iter().find(|d| d.id == id)
    }

    /// Record a resolution snapshot, replacing an earlier one of the same id.
    pub fn record_resolution(&mut self, resolution: Resolution) {
        match self.resolutions.iter_mut().find(|r| r.id == resolution.id) {
            Some(slot) => *slot = resolution,
            None => self.resolutions.push(resolution),
        }
    }

    /// Record a dispute snapshot, replacing an earlier one of the same id.
    pub fn record_dispute(&mut self, dispute: Dispute) {
        match self.disputes.iter_mut().find(|d| d.id == dispute.id) {
            Some(slot) => *slot = dispute,
            None => self.disputes.push(dispute),
        }
    }

    /// Take a resolution snapshot out of the receipt.
    pub fn take_resolution(&mut self, id: ResolutionId) -> Result<Resolution, StoreError> {
        let index = self
            .resolutions
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::Integrity(format!("commit receipt lacks resolution {id}")))?;
        Ok(self.resolutions.swap_remove(index))
    }

    /// Take a dispute snapshot out of the receipt.
    pub fn take_dispute(&mut self, id: DisputeId) -> Result<Dispute, StoreError> {
        let index = self
            .disputes
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| StoreError::Integrity(format!("commit receipt lacks dispute {id}")))?;
        Ok(self.disputes.swap_remove(index))
    }
}

/// Durable state of the resolution workflow.
#[async_trait]
pub trait ResolutionStore: Send + Sync {
    /// Apply every mutation of the batch atomically, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError>;

    async fn resolution(&self, id: ResolutionId) -> Result<Option<Resolution>, StoreError>;

    /// The market's resolution in `pending`, `disputed` or `confirmed`.
    async fn current_for_market(
        &self,
        market_id: &MarketId,
    ) -> Result<Option<Resolution>, StoreError>;

    /// Every resolution of the market, oldest first.
    async fn resolutions_for_market(
        &self,
        market_id: &MarketId,
    ) -> Result<Vec<Resolution>, StoreError>;

    /// Filtered listing ordered by `resolution_date` descending, id as tie-break.
    async fn list_resolutions(
        &self,
        filter: &ResolutionFilter,
        page: PageRequest,
    ) -> Result<Page<Resolution>, StoreError>;

    async fn dispute(&self, id: DisputeId) -> Result<Option<Dispute>, StoreError>;

    /// Disputes of a resolution in filing order, optionally by status.
    async fn disputes_for(
        &self,
        resolution_id: ResolutionId,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>, StoreError>;

    async fn count_open_disputes(&self, resolution_id: ResolutionId) -> Result<usize, StoreError>;

    /// Audit entries ordered by `(created_at, sequence)`.
    async fn audit_trail(&self, resolution_id: ResolutionId)
        -> Result<Vec<AuditLogEntry>, StoreError>;
}
