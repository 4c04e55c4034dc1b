//! In-memory storage engine.
//!
//! A single mutex around all three tables makes each batch a critical
//! section; the tables' undo journals make it all-or-nothing. Suitable for
//! a single process (development, tests). Multi-instance deployments use
//! the PostgreSQL engine, which gets the same guarantees from transactions
//! and unique indexes.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use arbiter_core::{DisputeId, MarketId, ResolutionId};

use super::audit_log::AuditLog;
use super::disputes::DisputeLedger;
use super::resolutions::ResolutionTable;
use super::{CommitReceipt, Mutation, ResolutionStore, WriteBatch};
use crate::audit::AuditLogEntry;
use crate::dispute::{Dispute, DisputeStatus};
use crate::error::StoreError;
use crate::pagination::{Page, PageRequest};
use crate::resolution::{Resolution, ResolutionFilter, ResolutionPatch, ResolutionStatus};

#[derive(Default)]
struct Tables {
    resolutions: ResolutionTable,
    disputes: DisputeLedger,
    audit: AuditLog,
}

impl Tables {
    fn apply(&mut self, mutation: Mutation, receipt: &mut CommitReceipt) -> Result<(), StoreError> {
        match mutation {
            Mutation::InsertResolution(resolution) => {
                let row = self.resolutions.insert(resolution)?;
                receipt.record_resolution(row);
            }
            Mutation::TransitionResolution {
                id,
                expected,
                to,
                patch,
                at,
            } => {
                let row = self.resolutions.transition(id, &[expected], to, &patch, at)?;
                receipt.record_resolution(row);
            }
            Mutation::MarkDisputed { id, at } => {
                let row = self.resolutions.transition(
                    id,
                    &[ResolutionStatus::Pending, ResolutionStatus::Disputed],
                    ResolutionStatus::Disputed,
                    &ResolutionPatch::default(),
                    at,
                )?;
                receipt.record_resolution(row);
            }
            Mutation::ReconcileDisputed { id, at } => {
                let status = self.resolutions.require(id)?.status;
                let row = if status == ResolutionStatus::Disputed && self.disputes.count_open(id) == 0 {
                    self.resolutions.transition(
                        id,
                        &[ResolutionStatus::Disputed],
                        ResolutionStatus::Pending,
                        &ResolutionPatch::default(),
                        at,
                    )?
                } else {
                    self.resolutions.require(id)?.clone()
                };
                receipt.record_resolution(row);
            }
            Mutation::RequireNoOpenDisputes { resolution_id } => {
                let open = self.disputes.count_open(resolution_id);
                if open > 0 {
                    return Err(StoreError::OpenDisputesExist {
                        resolution_id,
                        open,
                    });
                }
            }
            Mutation::ExpectOpenDisputes {
                resolution_id,
                mut dispute_ids,
            } => {
                dispute_ids.sort();
                if self.disputes.open_ids(resolution_id) != dispute_ids {
                    return Err(StoreError::OpenDisputeSetChanged { resolution_id });
                }
            }
            Mutation::InsertDispute(dispute) => {
                let row = self.disputes.insert(dispute)?;
                receipt.record_dispute(row);
            }
            Mutation::ReviewDispute {
                resolution_id,
                id,
                to,
                reviewer,
                notes,
                at,
            } => {
                let row = self
                    .disputes
                    .review(resolution_id, id, to, &reviewer, notes, at)?;
                receipt.record_dispute(row);
            }
            Mutation::AppendAudit(record) => {
                let entry = self.audit.append(record)?;
                receipt.audit.push(entry);
            }
        }
        Ok(())
    }

    fn commit(&mut self) {
        self.resolutions.commit();
        self.disputes.commit();
        self.audit.commit();
    }

    fn rollback(&mut self) {
        self.audit.rollback();
        self.disputes.rollback();
        self.resolutions.rollback();
    }
}

/// Storage engine backed by process memory. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl ResolutionStore for MemoryStore {
    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        let mut tables = self.tables.lock();
        let mut receipt = CommitReceipt::default();
        for mutation in batch.into_mutations() {
            if let Err(err) = tables.apply(mutation, &mut receipt) {
                tables.rollback();
                return Err(err);
            }
        }
        tables.commit();
        Ok(receipt)
    }

    async fn resolution(&self, id: ResolutionId) -> Result<Option<Resolution>, StoreError> {
        Ok(self.tables.lock().resolutions.get(id).cloned())
    }

    async fn current_for_market(
        &self,
        market_id: &MarketId,
    ) -> Result<Option<Resolution>, StoreError> {
        Ok(self.tables.lock().resolutions.current(market_id).cloned())
    }

    async fn resolutions_for_market(
        &self,
        market_id: &MarketId,
    ) -> Result<Vec<Resolution>, StoreError> {
        Ok(self.tables.lock().resolutions.history(market_id))
    }

    async fn list_resolutions(
        &self,
        filter: &ResolutionFilter,
        page: PageRequest,
    ) -> Result<Page<Resolution>, StoreError> {
        Ok(self.tables.lock().resolutions.list(filter, page))
    }

    async fn dispute(&self, id: DisputeId) -> Result<Option<Dispute>, StoreError> {
        Ok(self.tables.lock().disputes.get(id).cloned())
    }

    async fn disputes_for(
        &self,
        resolution_id: ResolutionId,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>, StoreError> {
        Ok(self.tables.lock().disputes.for_resolution(resolution_id, status))
    }

    async fn count_open_disputes(&self, resolution_id: ResolutionId) -> Result<usize, StoreError> {
        Ok(self.tables.lock().disputes.count_open(resolution_id))
    }

    async fn audit_trail(
        &self,
        resolution_id: ResolutionId,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        Ok(self.tables.lock().audit.trail(resolution_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditRecord};
    use crate::resolution::tests::sample;
    use arbiter_core::{ActorRef, OutcomeId, Timestamp};

    fn audit(rid: ResolutionId, action: AuditAction) -> Mutation {
        Mutation::AppendAudit(AuditRecord::new(
            rid,
            action,
            None,
            Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
            serde_json::json!({}),
        ))
    }

    fn open_dispute(rid: ResolutionId, outcome: &str) -> Dispute {
        Dispute {
            id: DisputeId::new(),
            resolution_id: rid,
            disputed_outcome_id: OutcomeId::new(outcome).unwrap(),
            reason: "wrong".into(),
            evidence: None,
            creator_ref: ActorRef::new("bob").unwrap(),
            status: DisputeStatus::Open,
            review_notes: None,
            reviewer_ref: None,
            created_at: Timestamp::parse("2026-01-01T01:00:00Z").unwrap(),
            reviewed_at: None,
        }
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_trace() {
        let store = MemoryStore::new();
        let r = sample("m1", "yes", "2026-01-01T00:00:00Z");
        store
            .commit(
                WriteBatch::new()
                    .with(Mutation::InsertResolution(r.clone()))
                    .with(audit(r.id, AuditAction::ResolutionCreated)),
            )
            .await
            .unwrap();

        let at = Timestamp::parse("2026-01-01T01:00:00Z").unwrap();
        let d = open_dispute(r.id, "no");
        let err = store
            .commit(
                WriteBatch::new()
                    .with(Mutation::InsertDispute(d.clone()))
                    .with(Mutation::MarkDisputed { id: r.id, at })
                    .with(audit(r.id, AuditAction::DisputeCreated))
                    .with(Mutation::InsertDispute(open_dispute(r.id, "no"))),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDispute { .. }));

        assert!(store.dispute(d.id).await.unwrap().is_none());
        assert_eq!(
            store.resolution(r.id).await.unwrap().unwrap().status,
            ResolutionStatus::Pending
        );
        assert_eq!(store.audit_trail(r.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_only_reverts_when_no_disputes_remain() {
        let store = MemoryStore::new();
        let r = sample("m1", "yes", "2026-01-01T00:00:00Z");
        let at = Timestamp::parse("2026-01-01T01:00:00Z").unwrap();
        let d1 = open_dispute(r.id, "no");
        let d2 = open_dispute(r.id, "maybe");
        store
            .commit(
                WriteBatch::new()
                    .with(Mutation::InsertResolution(r.clone()))
                    .with(Mutation::InsertDispute(d1.clone()))
                    .with(Mutation::InsertDispute(d2.clone()))
                    .with(Mutation::MarkDisputed { id: r.id, at }),
            )
            .await
            .unwrap();

        let reviewer = ActorRef::new("rev").unwrap();
        let receipt = store
            .commit(
                WriteBatch::new()
                    .with(Mutation::ReviewDispute {
                        resolution_id: r.id,
                        id: d1.id,
                        to: DisputeStatus::Rejected,
                        reviewer: reviewer.clone(),
                        notes: None,
                        at,
                    })
                    .with(Mutation::ReconcileDisputed { id: r.id, at }),
            )
            .await
            .unwrap();
        assert_eq!(receipt.resolution(r.id).unwrap().status, ResolutionStatus::Disputed);

        let receipt = store
            .commit(
                WriteBatch::new()
                    .with(Mutation::ReviewDispute {
                        resolution_id: r.id,
                        id: d2.id,
                        to: DisputeStatus::Rejected,
                        reviewer,
                        notes: None,
                        at,
                    })
                    .with(Mutation::ReconcileDisputed { id: r.id, at }),
            )
            .await
            .unwrap();
        assert_eq!(receipt.resolution(r.id).unwrap().status, ResolutionStatus::Pending);
    }

    #[tokio::test]
    async fn expect_open_disputes_detects_new_filing() {
        let store = MemoryStore::new();
        let r = sample("m1", "yes", "2026-01-01T00:00:00Z");
        let d1 = open_dispute(r.id, "no");
        store
            .commit(
                WriteBatch::new()
                    .with(Mutation::InsertResolution(r.clone()))
                    .with(Mutation::InsertDispute(d1.clone()))
                    .with(Mutation::InsertDispute(open_dispute(r.id, "maybe"))),
            )
            .await
            .unwrap();
        let err = store
            .commit(WriteBatch::new().with(Mutation::ExpectOpenDisputes {
                resolution_id: r.id,
                dispute_ids: vec![d1.id],
            }))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::OpenDisputeSetChanged { resolution_id: r.id });
    }

    #[tokio::test]
    async fn require_no_open_disputes_blocks_batch() {
        let store = MemoryStore::new();
        let r = sample("m1", "yes", "2026-01-01T00:00:00Z");
        store
            .commit(
                WriteBatch::new()
                    .with(Mutation::InsertResolution(r.clone()))
                    .with(Mutation::InsertDispute(open_dispute(r.id, "no"))),
            )
            .await
            .unwrap();
        let err = store
            .commit(
                WriteBatch::new()
                    .with(Mutation::TransitionResolution {
                        id: r.id,
                        expected: ResolutionStatus::Pending,
                        to: ResolutionStatus::Confirmed,
                        patch: ResolutionPatch::default(),
                        at: Timestamp::parse("2026-01-04T00:00:00Z").unwrap(),
                    })
                    .with(Mutation::RequireNoOpenDisputes { resolution_id: r.id }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OpenDisputesExist { open: 1, .. }));
        assert_eq!(
            store.resolution(r.id).await.unwrap().unwrap().status,
            ResolutionStatus::Pending
        );
    }
}
