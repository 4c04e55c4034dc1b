//! # Resolution State Machine
//!
//! The only writer of resolutions, disputes and audit entries. Each
//! operation:
//!
//! 1. asks the [`AccessPolicy`] whether the actor may act,
//! 2. reads current state and rejects requests that cannot succeed
//!    (fast path, for precise errors),
//! 3. commits one [`WriteBatch`] whose guards re-check every condition
//!    the decision depended on.
//!
//! Step 2 is advisory. Step 3 is what keeps racing requests correct: a
//! request whose precondition was invalidated between read and commit fails
//! with the store's `StaleState`, `DuplicateDispute`, `DisputeNotOpen` or
//! `OpenDisputesExist` and writes nothing.
//!
//! | From | Operation | To | Audit |
//! |---|---|---|---|
//! | none | `create_resolution` | pending | `resolution_created` |
//! | pending, disputed | `create_dispute` | disputed | `dispute_created` |
//! | pending, disputed | `review_dispute` (reject) | pending if none open, else disputed | `dispute_reviewed` |
//! | pending, disputed | `review_dispute` (accept) | final (overturned) + new pending | `resolution_overturned`, `resolution_created` |
//! | pending | `confirm_resolution` | confirmed | `resolution_confirmed` |
//! | confirmed | `finalize_resolution` | final (settled) | `resolution_finalized` |

use std::sync::Arc;

use serde_json::json;

use arbiter_core::{
    reject_nul, reject_nul_in_json, sha256_hex, ActorRef, CanonicalBytes, Clock, DisputeId,
    MarketId, OutcomeId, ResolutionId, Timestamp,
};

use crate::audit::{AuditAction, AuditRecord};
use crate::config::WorkflowConfig;
use crate::dispute::{Dispute, DisputeStatus, ReviewDecision, SUPERSEDED_NOTE};
use crate::error::{ErrorKind, WorkflowError};
use crate::ports::{AccessPolicy, Action, MarketDirectory, MarketInfo};
use crate::resolution::{
    FinalReason, Resolution, ResolutionPatch, ResolutionSource, ResolutionStatus,
};
use crate::store::{Mutation, ResolutionStore, WriteBatch};

/// Input of [`ResolutionWorkflow::create_resolution`].
#[derive(Debug, Clone)]
pub struct CreateResolution {
    pub market_id: MarketId,
    pub resolved_outcome_id: OutcomeId,
    pub source: ResolutionSource,
    pub resolver_ref: ActorRef,
    pub notes: Option<String>,
}

/// Input of [`ResolutionWorkflow::create_dispute`].
#[derive(Debug, Clone)]
pub struct CreateDispute {
    pub resolution_id: ResolutionId,
    pub disputed_outcome_id: OutcomeId,
    pub creator_ref: ActorRef,
    pub reason: String,
    pub evidence: Option<serde_json::Value>,
}

/// Input of [`ResolutionWorkflow::review_dispute`].
#[derive(Debug, Clone)]
pub struct ReviewDispute {
    pub dispute_id: DisputeId,
    pub reviewer_ref: ActorRef,
    pub decision: ReviewDecision,
    pub review_notes: Option<String>,
}

/// Result of a review.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    /// The reviewed dispute, now `accepted` or `rejected`.
    pub dispute: Dispute,
    /// The market's current resolution after the review: the same
    /// resolution after a reject, the replacement after an accept.
    pub resolution: Resolution,
    /// The overturned resolution, after an accept.
    pub overturned: Option<Resolution>,
    /// Sibling disputes closed as superseded, after an accept.
    pub superseded: Vec<Dispute>,
}

/// The resolution state machine.
#[derive(Clone)]
pub struct ResolutionWorkflow {
    store: Arc<dyn ResolutionStore>,
    markets: Arc<dyn MarketDirectory>,
    policy: Arc<dyn AccessPolicy>,
    clock: Arc<dyn Clock>,
    config: WorkflowConfig,
}

impl std::fmt::Debug for ResolutionWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionWorkflow")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResolutionWorkflow {
    pub fn new(
        store: Arc<dyn ResolutionStore>,
        markets: Arc<dyn MarketDirectory>,
        policy: Arc<dyn AccessPolicy>,
        clock: Arc<dyn Clock>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            markets,
            policy,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResolutionStore> {
        &self.store
    }

    pub fn markets(&self) -> &Arc<dyn MarketDirectory> {
        &self.markets
    }

    // ── Operations ──────────────────────────────────────────────────────

    /// Assert the winning outcome of a market and open its dispute window.
    pub async fn create_resolution(
        &self,
        request: CreateResolution,
    ) -> Result<Resolution, WorkflowError> {
        let result = self.create_resolution_inner(request).await;
        observe(Action::CreateResolution, &result);
        if let Ok(r) = &result {
            tracing::info!(
                resolution_id = %r.id,
                market_id = %r.market_id,
                outcome_id = %r.resolved_outcome_id,
                source = %r.source,
                window_ends = %r.dispute_window_ends,
                "resolution created"
            );
        }
        result
    }

    /// `pending → confirmed` once the window has elapsed with no open disputes.
    pub async fn confirm_resolution(
        &self,
        id: ResolutionId,
        actor: &ActorRef,
    ) -> Result<Resolution, WorkflowError> {
        let result = self.confirm_resolution_inner(id, actor).await;
        observe(Action::ConfirmResolution, &result);
        if result.is_ok() {
            tracing::info!(resolution_id = %id, actor = %actor, "resolution confirmed");
        }
        result
    }

    /// File a dispute against a `pending` or `disputed` resolution.
    pub async fn create_dispute(&self, request: CreateDispute) -> Result<Dispute, WorkflowError> {
        let result = self.create_dispute_inner(request).await;
        observe(Action::CreateDispute, &result);
        if let Ok(d) = &result {
            tracing::info!(
                dispute_id = %d.id,
                resolution_id = %d.resolution_id,
                outcome_id = %d.disputed_outcome_id,
                "dispute filed"
            );
        }
        result
    }

    /// Accept or reject an open dispute.
    pub async fn review_dispute(
        &self,
        request: ReviewDispute,
    ) -> Result<ReviewOutcome, WorkflowError> {
        let result = self.review_dispute_inner(request).await;
        observe(Action::ReviewDispute, &result);
        if let Ok(outcome) = &result {
            tracing::info!(
                dispute_id = %outcome.dispute.id,
                decision = %outcome.dispute.status,
                resolution_id = %outcome.resolution.id,
                resolution_status = %outcome.resolution.status,
                superseded = outcome.superseded.len(),
                "dispute reviewed"
            );
        }
        result
    }

    /// `confirmed → final` once the market's payout has completed.
    pub async fn finalize_resolution(
        &self,
        id: ResolutionId,
        actor: &ActorRef,
    ) -> Result<Resolution, WorkflowError> {
        let result = self.finalize_resolution_inner(id, actor).await;
        observe(Action::FinalizeResolution, &result);
        if result.is_ok() {
            tracing::info!(resolution_id = %id, actor = %actor, "resolution finalized");
        }
        result
    }

    // ── Implementations ────────────────────────────────────────────────

    async fn create_resolution_inner(
        &self,
        request: CreateResolution,
    ) -> Result<Resolution, WorkflowError> {
        if let Some(notes) = &request.notes {
            reject_nul("notes", notes)?;
        }
        self.authorize(&request.resolver_ref, Action::CreateResolution, None)
            .await?;

        let market = self.require_market(&request.market_id).await?;
        if !market.is_eligible() {
            return Err(WorkflowError::MarketNotEligible {
                market_id: request.market_id,
                reason: format!("market is {}", market.status.as_str()),
            });
        }
        if !market.has_outcome(&request.resolved_outcome_id) {
            return Err(WorkflowError::InvalidOutcome {
                market_id: request.market_id,
                outcome_id: request.resolved_outcome_id,
                reason: "not an outcome of the market",
            });
        }
        if let Some(current) = self.store.current_for_market(&request.market_id).await? {
            return Err(WorkflowError::DuplicateResolution {
                market_id: request.market_id,
                current: Some(current.id),
            });
        }

        let now = self.clock.now();
        let resolution = Resolution {
            id: ResolutionId::new(),
            market_id: request.market_id,
            resolved_outcome_id: request.resolved_outcome_id,
            source: request.source,
            resolver_ref: request.resolver_ref,
            resolution_date: now,
            dispute_window_ends: now.checked_add(self.config.dispute_window)?,
            notes: normalize_text(request.notes),
            status: ResolutionStatus::Pending,
            final_reason: None,
            supersedes: None,
            superseded_by: None,
            confirmed_at: None,
            finalized_at: None,
            updated_at: now,
        };
        let performer = match resolution.source {
            ResolutionSource::Oracle => None,
            ResolutionSource::Admin => Some(resolution.resolver_ref.clone()),
        };
        let audit = AuditRecord::new(
            resolution.id,
            AuditAction::ResolutionCreated,
            performer,
            now,
            created_detail(&resolution, None),
        );

        let mut receipt = self
            .store
            .commit(
                WriteBatch::new()
                    .with(Mutation::InsertResolution(resolution.clone()))
                    .with(Mutation::AppendAudit(audit)),
            )
            .await?;
        Ok(receipt.take_resolution(resolution.id)?)
    }

    async fn confirm_resolution_inner(
        &self,
        id: ResolutionId,
        actor: &ActorRef,
    ) -> Result<Resolution, WorkflowError> {
        self.authorize(actor, Action::ConfirmResolution, Some(id))
            .await?;
        let resolution = self.require_resolution(id).await?;
        match resolution.status {
            ResolutionStatus::Pending => {}
            ResolutionStatus::Disputed => {
                return Err(WorkflowError::OpenDisputesExist {
                    resolution_id: id,
                    open: self.store.count_open_disputes(id).await?,
                });
            }
            other => return Err(stale(id, "pending", other)),
        }
        let now = self.clock.now();
        if resolution.window_open_at(now) {
            return Err(WorkflowError::WindowOpen {
                resolution_id: id,
                window_ends: resolution.dispute_window_ends,
            });
        }

        let audit = AuditRecord::new(
            id,
            AuditAction::ResolutionConfirmed,
            Some(actor.clone()),
            now,
            json!({
                "from": ResolutionStatus::Pending,
                "to": ResolutionStatus::Confirmed,
                "resolved_outcome_id": resolution.resolved_outcome_id,
                "dispute_window_ends": resolution.dispute_window_ends,
            }),
        );
        let mut receipt = self
            .store
            .commit(
                WriteBatch::new()
                    .with(Mutation::TransitionResolution {
                        id,
                        expected: ResolutionStatus::Pending,
                        to: ResolutionStatus::Confirmed,
                        patch: ResolutionPatch {
                            confirmed_at: Some(now),
                            ..Default::default()
                        },
                        at: now,
                    })
                    .with(Mutation::RequireNoOpenDisputes { resolution_id: id })
                    .with(Mutation::AppendAudit(audit)),
            )
            .await?;
        Ok(receipt.take_resolution(id)?)
    }

    async fn create_dispute_inner(&self, request: CreateDispute) -> Result<Dispute, WorkflowError> {
        let reason = request.reason.trim().to_string();
        if reason.is_empty() {
            return Err(WorkflowError::EmptyReason);
        }
        reject_nul("reason", &reason)?;
        if let Some(evidence) = &request.evidence {
            reject_nul_in_json("evidence", evidence)?;
        }
        let rid = request.resolution_id;
        self.authorize(&request.creator_ref, Action::CreateDispute, Some(rid))
            .await?;

        let resolution = self.require_resolution(rid).await?;
        if !resolution.status.accepts_disputes() {
            return Err(stale(rid, "pending|disputed", resolution.status));
        }
        let now = self.clock.now();
        if !resolution.window_open_at(now) {
            return Err(WorkflowError::WindowClosed {
                resolution_id: rid,
                window_ends: resolution.dispute_window_ends,
            });
        }
        if request.disputed_outcome_id == resolution.resolved_outcome_id {
            return Err(WorkflowError::InvalidOutcome {
                market_id: resolution.market_id,
                outcome_id: request.disputed_outcome_id,
                reason: "equals the resolved outcome",
            });
        }
        let market = self.require_market(&resolution.market_id).await?;
        if !market.has_outcome(&request.disputed_outcome_id) {
            return Err(WorkflowError::InvalidOutcome {
                market_id: resolution.market_id,
                outcome_id: request.disputed_outcome_id,
                reason: "not an outcome of the market",
            });
        }

        let evidence_digest = match &request.evidence {
            Some(evidence) => Some(sha256_hex(&CanonicalBytes::new(evidence).map_err(|e| {
                WorkflowError::Internal(format!("cannot canonicalize evidence: {e}"))
            })?)),
            None => None,
        };
        let dispute = Dispute {
            id: DisputeId::new(),
            resolution_id: rid,
            disputed_outcome_id: request.disputed_outcome_id,
            reason,
            evidence: request.evidence,
            creator_ref: request.creator_ref,
            status: DisputeStatus::Open,
            review_notes: None,
            reviewer_ref: None,
            created_at: now,
            reviewed_at: None,
        };
        let audit = AuditRecord::new(
            rid,
            AuditAction::DisputeCreated,
            Some(dispute.creator_ref.clone()),
            now,
            json!({
                "dispute_id": dispute.id,
                "disputed_outcome_id": dispute.disputed_outcome_id,
                "resolved_outcome_id": resolution.resolved_outcome_id,
                "reason": dispute.reason,
                "evidence_digest": evidence_digest,
                "to": ResolutionStatus::Disputed,
            }),
        );

        let mut receipt = self
            .store
            .commit(
                WriteBatch::new()
                    .with(Mutation::InsertDispute(dispute.clone()))
                    .with(Mutation::MarkDisputed { id: rid, at: now })
                    .with(Mutation::AppendAudit(audit)),
            )
            .await?;
        Ok(receipt.take_dispute(dispute.id)?)
    }

    async fn review_dispute_inner(
        &self,
        request: ReviewDispute,
    ) -> Result<ReviewOutcome, WorkflowError> {
        if let Some(notes) = &request.review_notes {
            reject_nul("review_notes", notes)?;
        }
        let dispute = self
            .store
            .dispute(request.dispute_id)
            .await?
            .ok_or_else(|| not_found("dispute", request.dispute_id))?;
        self.authorize(
            &request.reviewer_ref,
            Action::ReviewDispute,
            Some(dispute.resolution_id),
        )
        .await?;
        if !dispute.is_open() {
            return Err(WorkflowError::DisputeNotOpen {
                dispute_id: dispute.id,
                status: dispute.status,
            });
        }
        let resolution = self.require_resolution(dispute.resolution_id).await?;
        let notes = normalize_text(request.review_notes);
        let now = self.clock.now();

        match request.decision {
            ReviewDecision::Reject => {
                self.reject(dispute, resolution, request.reviewer_ref, notes, now)
                    .await
            }
            ReviewDecision::Accept => {
                self.accept(dispute, resolution, request.reviewer_ref, notes, now)
                    .await
            }
        }
    }

    async fn reject(
        &self,
        dispute: Dispute,
        resolution: Resolution,
        reviewer: ActorRef,
        notes: Option<String>,
        now: Timestamp,
    ) -> Result<ReviewOutcome, WorkflowError> {
        let rid = resolution.id;
        let audit = AuditRecord::new(
            rid,
            AuditAction::DisputeReviewed,
            Some(reviewer.clone()),
            now,
            json!({
                "dispute_id": dispute.id,
                "disputed_outcome_id": dispute.disputed_outcome_id,
                "decision": ReviewDecision::Reject,
                "review_notes": notes,
            }),
        );
        let mut receipt = self
            .store
            .commit(
                WriteBatch::new()
                    .with(Mutation::ReviewDispute {
                        resolution_id: rid,
                        id: dispute.id,
                        to: DisputeStatus::Rejected,
                        reviewer,
                        notes,
                        at: now,
                    })
                    .with(Mutation::ReconcileDisputed { id: rid, at: now })
                    .with(Mutation::AppendAudit(audit)),
            )
            .await?;
        Ok(ReviewOutcome {
            dispute: receipt.take_dispute(dispute.id)?,
            resolution: receipt.take_resolution(rid)?,
            overturned: None,
            superseded: Vec::new(),
        })
    }

    async fn accept(
        &self,
        dispute: Dispute,
        resolution: Resolution,
        reviewer: ActorRef,
        notes: Option<String>,
        now: Timestamp,
    ) -> Result<ReviewOutcome, WorkflowError> {
        let old_id = resolution.id;
        if !resolution.status.accepts_disputes() {
            return Err(stale(old_id, "pending|disputed", resolution.status));
        }
        let siblings: Vec<DisputeId> = self
            .store
            .disputes_for(old_id, Some(DisputeStatus::Open))
            .await?
            .into_iter()
            .map(|d| d.id)
            .filter(|id| *id != dispute.id)
            .collect();

        let replacement = Resolution {
            id: ResolutionId::new(),
            market_id: resolution.market_id.clone(),
            resolved_outcome_id: dispute.disputed_outcome_id.clone(),
            source: ResolutionSource::Admin,
            resolver_ref: reviewer.clone(),
            resolution_date: now,
            dispute_window_ends: now.checked_add(self.config.dispute_window)?,
            notes: notes.clone(),
            status: ResolutionStatus::Pending,
            final_reason: None,
            supersedes: Some(old_id),
            superseded_by: None,
            confirmed_at: None,
            finalized_at: None,
            updated_at: now,
        };

        let mut batch = WriteBatch::new();
        batch.push(Mutation::ReviewDispute {
            resolution_id: old_id,
            id: dispute.id,
            to: DisputeStatus::Accepted,
            reviewer: reviewer.clone(),
            notes: notes.clone(),
            at: now,
        });
        batch.push(Mutation::ExpectOpenDisputes {
            resolution_id: old_id,
            dispute_ids: siblings.clone(),
        });
        for sibling in &siblings {
            batch.push(Mutation::ReviewDispute {
                resolution_id: old_id,
                id: *sibling,
                to: DisputeStatus::Rejected,
                reviewer: reviewer.clone(),
                notes: Some(SUPERSEDED_NOTE.to_string()),
                at: now,
            });
        }
        batch.push(Mutation::TransitionResolution {
            id: old_id,
            expected: resolution.status,
            to: ResolutionStatus::Final,
            patch: ResolutionPatch {
                final_reason: Some(FinalReason::Overturned),
                superseded_by: Some(replacement.id),
                finalized_at: Some(now),
                ..Default::default()
            },
            at: now,
        });
        batch.push(Mutation::InsertResolution(replacement.clone()));
        batch.push(Mutation::AppendAudit(AuditRecord::new(
            old_id,
            AuditAction::ResolutionOverturned,
            Some(reviewer.clone()),
            now,
            json!({
                "from": resolution.status,
                "to": ResolutionStatus::Final,
                "final_reason": FinalReason::Overturned,
                "accepted_dispute_id": dispute.id,
                "superseded_dispute_ids": siblings,
                "previous_outcome_id": resolution.resolved_outcome_id,
                "new_outcome_id": replacement.resolved_outcome_id,
                "superseded_by": replacement.id,
                "review_notes": notes,
            }),
        )));
        batch.push(Mutation::AppendAudit(AuditRecord::new(
            replacement.id,
            AuditAction::ResolutionCreated,
            Some(reviewer),
            now,
            created_detail(&replacement, Some(dispute.id)),
        )));

        let mut receipt = self.store.commit(batch).await?;
        let superseded = siblings
            .iter()
            .map(|id| receipt.take_dispute(*id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ReviewOutcome {
            dispute: receipt.take_dispute(dispute.id)?,
            resolution: receipt.take_resolution(replacement.id)?,
            overturned: Some(receipt.take_resolution(old_id)?),
            superseded,
        })
    }

    async fn finalize_resolution_inner(
        &self,
        id: ResolutionId,
        actor: &ActorRef,
    ) -> Result<Resolution, WorkflowError> {
        self.authorize(actor, Action::FinalizeResolution, Some(id))
            .await?;
        let resolution = self.require_resolution(id).await?;
        if resolution.status != ResolutionStatus::Confirmed {
            return Err(stale(id, "confirmed", resolution.status));
        }
        if !self.markets.payout_completed(&resolution.market_id).await? {
            return Err(WorkflowError::PayoutPending {
                market_id: resolution.market_id,
            });
        }
        let now = self.clock.now();
        let audit = AuditRecord::new(
            id,
            AuditAction::ResolutionFinalized,
            Some(actor.clone()),
            now,
            json!({
                "from": ResolutionStatus::Confirmed,
                "to": ResolutionStatus::Final,
                "final_reason": FinalReason::Settled,
                "resolved_outcome_id": resolution.resolved_outcome_id,
            }),
        );
        let mut receipt = self
            .store
            .commit(
                WriteBatch::new()
                    .with(Mutation::TransitionResolution {
                        id,
                        expected: ResolutionStatus::Confirmed,
                        to: ResolutionStatus::Final,
                        patch: ResolutionPatch {
                            final_reason: Some(FinalReason::Settled),
                            finalized_at: Some(now),
                            ..Default::default()
                        },
                        at: now,
                    })
                    .with(Mutation::AppendAudit(audit)),
            )
            .await?;
        Ok(receipt.take_resolution(id)?)
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    async fn authorize(
        &self,
        actor: &ActorRef,
        action: Action,
        resolution_id: Option<ResolutionId>,
    ) -> Result<(), WorkflowError> {
        if self.policy.can_perform(actor, action, resolution_id).await? {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden {
                actor: actor.clone(),
                action,
            })
        }
    }

    async fn require_resolution(&self, id: ResolutionId) -> Result<Resolution, WorkflowError> {
        self.store
            .resolution(id)
            .await?
            .ok_or_else(|| not_found("resolution", id))
    }

    async fn require_market(&self, id: &MarketId) -> Result<MarketInfo, WorkflowError> {
        self.markets
            .market(id)
            .await?
            .ok_or_else(|| not_found("market", id))
    }
}

fn observe<T>(action: Action, result: &Result<T, WorkflowError>) {
    match result {
        Ok(_) => {
            metrics::counter!("arbiter_transitions_total", "action" => action.as_str())
                .increment(1);
        }
        Err(err) => {
            metrics::counter!("arbiter_workflow_errors_total", "code" => err.code()).increment(1);
            match err.kind() {
                ErrorKind::Unavailable | ErrorKind::Internal => {
                    tracing::error!(action = %action, code = err.code(), error = %err, "workflow operation failed")
                }
                _ => {
                    tracing::info!(action = %action, code = err.code(), error = %err, "workflow operation rejected")
                }
            }
        }
    }
}

fn created_detail(resolution: &Resolution, accepted_dispute: Option<DisputeId>) -> serde_json::Value {
    json!({
        "market_id": resolution.market_id,
        "resolved_outcome_id": resolution.resolved_outcome_id,
        "source": resolution.source,
        "resolver_ref": resolution.resolver_ref,
        "status": resolution.status,
        "dispute_window_ends": resolution.dispute_window_ends,
        "supersedes": resolution.supersedes,
        "accepted_dispute_id": accepted_dispute,
    })
}

fn stale(id: ResolutionId, expected: &str, actual: ResolutionStatus) -> WorkflowError {
    WorkflowError::StaleState {
        resolution_id: id,
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn not_found(kind: &'static str, id: impl std::fmt::Display) -> WorkflowError {
    WorkflowError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn normalize_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
