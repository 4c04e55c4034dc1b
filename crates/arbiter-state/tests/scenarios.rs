//! # Workflow Scenario Tests
//!
//! End-to-end behavior of the resolution state machine against the
//! in-memory engine: the lifecycle scenarios, the racing-request scenarios
//! (on a multi-threaded runtime), and storage-outage atomicity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::Mutex;

use arbiter_core::{ActorRef, Clock, DisputeId, ManualClock, MarketId, OutcomeId, ResolutionId, Timestamp};
use arbiter_state::audit::verify_chain;
use arbiter_state::pagination::{Page, PageRequest};
use arbiter_state::{
    AllowAll, AuditAction, AuditLogEntry, AuditRecord, CommitReceipt, CreateDispute, CreateResolution, Dispute,
    DisputeStatus, FinalReason, InMemoryMarketDirectory, MarketInfo, MarketStatus, MemoryStore,
    OutcomeInfo, QuerySurface, Resolution, ResolutionFilter, ResolutionSource, ResolutionStatus,
    Mutation, ResolutionStore, ResolutionWorkflow, ReviewDecision, ReviewDispute, StoreError,
    WorkflowConfig, WorkflowError, WriteBatch,
};

const T0: &str = "2026-03-10T09:00:00Z";

struct Harness {
    workflow: ResolutionWorkflow,
    query: QuerySurface,
    store: Arc<dyn ResolutionStore>,
    clock: ManualClock,
    markets: InMemoryMarketDirectory,
}

fn outcome(id: &str) -> OutcomeId {
    OutcomeId::new(id).unwrap()
}

fn actor(id: &str) -> ActorRef {
    ActorRef::new(id).unwrap()
}

fn market_m() -> MarketId {
    MarketId::new("M").unwrap()
}

fn directory() -> InMemoryMarketDirectory {
    let markets = InMemoryMarketDirectory::new();
    markets.insert(MarketInfo {
        id: market_m(),
        title: "Which team wins the final?".into(),
        status: MarketStatus::Closed,
        outcomes: ["O1", "O2", "O3"]
            .iter()
            .map(|id| OutcomeInfo {
                id: outcome(id),
                title: format!("Outcome {id}"),
            })
            .collect(),
    });
    markets
}

fn harness_with_store(store: Arc<dyn ResolutionStore>) -> Harness {
    let clock = ManualClock::new(Timestamp::parse(T0).unwrap());
    let markets = directory();
    let config = WorkflowConfig::default();
    let workflow = ResolutionWorkflow::new(
        store.clone(),
        Arc::new(markets.clone()),
        Arc::new(AllowAll),
        Arc::new(clock.clone()),
        config.clone(),
    );
    let query = QuerySurface::new(store.clone(), Arc::new(markets.clone()), config);
    Harness {
        workflow,
        query,
        store,
        clock,
        markets,
    }
}

fn harness() -> Harness {
    harness_with_store(Arc::new(MemoryStore::new()))
}

impl Harness {
    async fn resolve(&self, outcome_id: &str) -> Resolution {
        self.workflow
            .create_resolution(CreateResolution {
                market_id: market_m(),
                resolved_outcome_id: outcome(outcome_id),
                source: ResolutionSource::Oracle,
                resolver_ref: actor("oracle-1"),
                notes: Some("feed settlement print".into()),
            })
            .await
            .unwrap()
    }

    async fn dispute(&self, rid: ResolutionId, outcome_id: &str) -> Result<Dispute, WorkflowError> {
        self.workflow
            .create_dispute(CreateDispute {
                resolution_id: rid,
                disputed_outcome_id: outcome(outcome_id),
                creator_ref: actor("trader-9"),
                reason: "official result differs".into(),
                evidence: Some(serde_json::json!({"source": "league website", "score": [2, 1]})),
            })
            .await
    }

    async fn review(
        &self,
        id: DisputeId,
        decision: ReviewDecision,
    ) -> Result<arbiter_state::ReviewOutcome, WorkflowError> {
        self.workflow
            .review_dispute(ReviewDispute {
                dispute_id: id,
                reviewer_ref: actor("reviewer-1"),
                decision,
                review_notes: Some("checked league records".into()),
            })
            .await
    }

    fn advance(&self, hours: i64) {
        self.clock.advance(Duration::hours(hours)).unwrap();
    }

    async fn status(&self, id: ResolutionId) -> ResolutionStatus {
        self.store.resolution(id).await.unwrap().unwrap().status
    }

    async fn trail(&self, id: ResolutionId) -> Vec<AuditLogEntry> {
        self.store.audit_trail(id).await.unwrap()
    }
}

fn actions(trail: &[AuditLogEntry]) -> Vec<AuditAction> {
    trail.iter().map(|e| e.action).collect()
}

// -- Lifecycle scenarios ------------------------------------------------------

#[tokio::test]
async fn test_reject_returns_resolution_to_pending() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    assert_eq!(r1.status, ResolutionStatus::Pending);

    h.advance(1);
    let d1 = h.dispute(r1.id, "O2").await.unwrap();
    assert_eq!(d1.status, DisputeStatus::Open);
    assert_eq!(h.status(r1.id).await, ResolutionStatus::Disputed);

    let review = h.review(d1.id, ReviewDecision::Reject).await.unwrap();
    assert_eq!(review.dispute.status, DisputeStatus::Rejected);
    assert_eq!(review.resolution.status, ResolutionStatus::Pending);
    assert_eq!(h.status(r1.id).await, ResolutionStatus::Pending);

    assert_eq!(
        actions(&h.trail(r1.id).await),
        vec![
            AuditAction::ResolutionCreated,
            AuditAction::DisputeCreated,
            AuditAction::DisputeReviewed,
        ]
    );
}

#[tokio::test]
async fn test_accept_overturns_and_opens_new_cycle() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    h.advance(1);
    let d1 = h.dispute(r1.id, "O2").await.unwrap();

    h.advance(2);
    let review_time = h.clock.now();
    let review = h.review(d1.id, ReviewDecision::Accept).await.unwrap();

    let r2 = review.resolution;
    assert_ne!(r2.id, r1.id);
    assert_eq!(r2.status, ResolutionStatus::Pending);
    assert_eq!(r2.resolved_outcome_id, outcome("O2"));
    assert_eq!(r2.resolution_date, review_time);
    assert_eq!(
        r2.dispute_window_ends,
        review_time.checked_add(Duration::hours(48)).unwrap()
    );
    assert_eq!(r2.source, ResolutionSource::Admin);
    assert_eq!(r2.supersedes, Some(r1.id));

    let old = h.store.resolution(r1.id).await.unwrap().unwrap();
    assert_eq!(old.status, ResolutionStatus::Final);
    assert_eq!(old.final_reason, Some(FinalReason::Overturned));
    assert_eq!(old.superseded_by, Some(r2.id));
    assert_eq!(review.overturned.unwrap().id, r1.id);

    let current = h.store.current_for_market(&market_m()).await.unwrap().unwrap();
    assert_eq!(current.id, r2.id);

    assert_eq!(
        actions(&h.trail(r1.id).await),
        vec![
            AuditAction::ResolutionCreated,
            AuditAction::DisputeCreated,
            AuditAction::ResolutionOverturned,
        ]
    );
    assert_eq!(actions(&h.trail(r2.id).await), vec![AuditAction::ResolutionCreated]);
}

#[tokio::test]
async fn test_confirm_waits_for_window() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    let ops = actor("ops-1");

    h.advance(1);
    let err = h.workflow.confirm_resolution(r1.id, &ops).await.unwrap_err();
    assert!(matches!(err, WorkflowError::WindowOpen { .. }));
    assert_eq!(h.trail(r1.id).await.len(), 1);

    h.advance(48);
    let confirmed = h.workflow.confirm_resolution(r1.id, &ops).await.unwrap();
    assert_eq!(confirmed.status, ResolutionStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());
}

#[tokio::test]
async fn test_confirm_at_exact_window_end_succeeds() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    h.advance(48);
    let confirmed = h
        .workflow
        .confirm_resolution(r1.id, &actor("ops-1"))
        .await
        .unwrap();
    assert_eq!(confirmed.status, ResolutionStatus::Confirmed);
}

#[tokio::test]
async fn test_second_confirm_is_stale_state() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    h.advance(49);
    h.workflow
        .confirm_resolution(r1.id, &actor("ops-1"))
        .await
        .unwrap();
    let err = h
        .workflow
        .confirm_resolution(r1.id, &actor("ops-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::StaleState { .. }));
    assert_eq!(h.trail(r1.id).await.len(), 2);
}

#[tokio::test]
async fn test_confirm_with_open_dispute_fails() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    h.advance(1);
    h.dispute(r1.id, "O2").await.unwrap();
    h.advance(48);
    let err = h
        .workflow
        .confirm_resolution(r1.id, &actor("ops-1"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        WorkflowError::OpenDisputesExist {
            resolution_id: r1.id,
            open: 1
        }
    );
    assert_eq!(h.status(r1.id).await, ResolutionStatus::Disputed);
}

#[tokio::test]
async fn test_dispute_after_window_is_closed() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    h.advance(48);
    let err = h.dispute(r1.id, "O2").await.unwrap_err();
    assert!(matches!(err, WorkflowError::WindowClosed { .. }));
    assert_eq!(h.status(r1.id).await, ResolutionStatus::Pending);
}

#[tokio::test]
async fn test_dispute_outcome_rules() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    let same = h.dispute(r1.id, "O1").await.unwrap_err();
    assert_eq!(same.code(), "INVALID_OUTCOME");
    let foreign = h.dispute(r1.id, "O9").await.unwrap_err();
    assert_eq!(foreign.code(), "INVALID_OUTCOME");
    assert_eq!(h.trail(r1.id).await.len(), 1);
}

#[tokio::test]
async fn test_duplicate_open_dispute_rejected_but_other_outcome_allowed() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    h.dispute(r1.id, "O2").await.unwrap();
    let dup = h.dispute(r1.id, "O2").await.unwrap_err();
    assert!(matches!(dup, WorkflowError::DuplicateDispute { .. }));
    h.dispute(r1.id, "O3").await.unwrap();
    assert_eq!(h.store.count_open_disputes(r1.id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_reject_keeps_disputed_while_others_open() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    let d2 = h.dispute(r1.id, "O2").await.unwrap();
    let d3 = h.dispute(r1.id, "O3").await.unwrap();

    let first = h.review(d2.id, ReviewDecision::Reject).await.unwrap();
    assert_eq!(first.resolution.status, ResolutionStatus::Disputed);
    let second = h.review(d3.id, ReviewDecision::Reject).await.unwrap();
    assert_eq!(second.resolution.status, ResolutionStatus::Pending);
}

#[tokio::test]
async fn test_accept_supersedes_sibling_disputes() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    let d2 = h.dispute(r1.id, "O2").await.unwrap();
    let d3 = h.dispute(r1.id, "O3").await.unwrap();

    let review = h.review(d2.id, ReviewDecision::Accept).await.unwrap();
    assert_eq!(review.superseded.len(), 1);
    let sibling = h.store.dispute(d3.id).await.unwrap().unwrap();
    assert_eq!(sibling.status, DisputeStatus::Rejected);
    assert_eq!(sibling.review_notes.as_deref(), Some("superseded"));

    let detail = &h.trail(r1.id).await[3].detail;
    assert_eq!(detail["accepted_dispute_id"], serde_json::json!(d2.id));
    assert_eq!(detail["superseded_dispute_ids"], serde_json::json!([d3.id]));
}

#[tokio::test]
async fn test_review_twice_is_dispute_not_open() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    let d1 = h.dispute(r1.id, "O2").await.unwrap();
    h.review(d1.id, ReviewDecision::Reject).await.unwrap();
    let err = h.review(d1.id, ReviewDecision::Accept).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::DisputeNotOpen {
            status: DisputeStatus::Rejected,
            ..
        }
    ));
}

#[tokio::test]
async fn test_disputes_on_confirmed_resolution_are_stale() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    h.advance(49);
    h.workflow
        .confirm_resolution(r1.id, &actor("ops-1"))
        .await
        .unwrap();
    let err = h.dispute(r1.id, "O2").await.unwrap_err();
    assert_eq!(err.code(), "STALE_STATE");
}

#[tokio::test]
async fn test_second_resolution_for_market_is_duplicate() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    let err = h
        .workflow
        .create_resolution(CreateResolution {
            market_id: market_m(),
            resolved_outcome_id: outcome("O2"),
            source: ResolutionSource::Admin,
            resolver_ref: actor("admin-1"),
            notes: None,
        })
        .await
        .unwrap_err();
    assert_eq!(
        err,
        WorkflowError::DuplicateResolution {
            market_id: market_m(),
            current: Some(r1.id)
        }
    );
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let h = harness();
    let err = h
        .workflow
        .confirm_resolution(ResolutionId::new(), &actor("ops-1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    let err = h.review(DisputeId::new(), ReviewDecision::Reject).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    let err = h
        .workflow
        .create_resolution(CreateResolution {
            market_id: MarketId::new("nope").unwrap(),
            resolved_outcome_id: outcome("O1"),
            source: ResolutionSource::Oracle,
            resolver_ref: actor("oracle-1"),
            notes: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_full_lifecycle_through_settlement() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    let d1 = h.dispute(r1.id, "O2").await.unwrap();
    let r2 = h.review(d1.id, ReviewDecision::Accept).await.unwrap().resolution;
    h.advance(49);
    h.workflow
        .confirm_resolution(r2.id, &actor("ops-1"))
        .await
        .unwrap();
    h.markets.set_payout_completed(&market_m(), true);
    let settled = h
        .workflow
        .finalize_resolution(r2.id, &actor("settlement"))
        .await
        .unwrap();
    assert_eq!(settled.final_reason, Some(FinalReason::Settled));
    assert!(h.store.current_for_market(&market_m()).await.unwrap().is_none());

    let history = h.query.market_history(&market_m()).await.unwrap();
    assert_eq!(
        history.iter().map(|v| v.resolution.id).collect::<Vec<_>>(),
        vec![r1.id, r2.id]
    );
    assert!(history.iter().all(|v| !v.is_current));

    for id in [r1.id, r2.id] {
        let trail = h.query.audit_trail(id).await.unwrap();
        assert!(trail.verification.chain_valid);
    }
    assert_eq!(
        actions(&h.trail(r2.id).await),
        vec![
            AuditAction::ResolutionCreated,
            AuditAction::ResolutionConfirmed,
            AuditAction::ResolutionFinalized,
        ]
    );
}

// -- Query surface ------------------------------------------------------------

#[tokio::test]
async fn test_views_carry_titles_and_dispute_counts() {
    let h = harness();
    let r1 = h.resolve("O1").await;
    h.dispute(r1.id, "O2").await.unwrap();

    let view = h.query.get_resolution(r1.id).await.unwrap();
    assert_eq!(view.market_title.as_deref(), Some("Which team wins the final?"));
    assert_eq!(view.resolved_outcome_title.as_deref(), Some("Outcome O1"));
    assert_eq!(view.open_dispute_count, 1);
    assert_eq!(view.disputes[0].disputed_outcome_title.as_deref(), Some("Outcome O2"));

    let open = h
        .query
        .list_disputes(r1.id, Some(DisputeStatus::Open))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    let rejected = h
        .query
        .list_disputes(r1.id, Some(DisputeStatus::Rejected))
        .await
        .unwrap();
    assert!(rejected.is_empty());
}

#[tokio::test]
async fn test_listing_filters_and_pages() {
    let h = harness();
    for i in 0..5 {
        let id = MarketId::new(format!("extra-{i}")).unwrap();
        h.markets.insert(MarketInfo {
            id: id.clone(),
            title: format!("Extra {i}"),
            status: MarketStatus::Closed,
            outcomes: vec![OutcomeInfo {
                id: outcome("yes"),
                title: "Yes".into(),
            }],
        });
        h.advance(1);
        h.workflow
            .create_resolution(CreateResolution {
                market_id: id,
                resolved_outcome_id: outcome("yes"),
                source: ResolutionSource::Oracle,
                resolver_ref: actor("oracle-1"),
                notes: None,
            })
            .await
            .unwrap();
    }
    let page: Page<_> = h
        .query
        .list_resolutions(&ResolutionFilter::default(), Some(1), Some(2))
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].resolution.market_id.as_str(), "extra-4");

    let filtered = h
        .query
        .list_resolutions(
            &ResolutionFilter {
                status: Some(ResolutionStatus::Final),
                market_id: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(filtered.total, 0);
    assert_eq!(filtered.limit, PageRequest::new(None, None, &WorkflowConfig::default()).limit);
}

// -- Concurrency --------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_disputes_have_one_winner() {
    let h = Arc::new(harness());
    let r1 = h.resolve("O1").await;
    h.advance(1);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move { h.dispute(r1.id, "O2").await }));
    }
    let mut wins = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => assert!(matches!(e, WorkflowError::DuplicateDispute { .. }), "{e}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(h.store.count_open_disputes(r1.id).await.unwrap(), 1);
    // created + one dispute_created
    assert_eq!(h.trail(r1.id).await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_confirm_and_accept_race_has_one_winner() {
    for _ in 0..20 {
        let h = Arc::new(harness());
        let r1 = h.resolve("O1").await;
        h.advance(1);
        let d1 = h.dispute(r1.id, "O2").await.unwrap();
        h.advance(48);

        let confirm = {
            let h = h.clone();
            tokio::spawn(async move {
                h.workflow.confirm_resolution(r1.id, &actor("ops-1")).await
            })
        };
        let accept = {
            let h = h.clone();
            tokio::spawn(async move { h.review(d1.id, ReviewDecision::Accept).await })
        };
        let (confirm, accept) = (confirm.await.unwrap(), accept.await.unwrap());
        assert!(
            confirm.is_ok() != accept.is_ok(),
            "exactly one must win: {confirm:?} / {accept:?}"
        );
        if let Err(e) = confirm {
            assert!(matches!(
                e,
                WorkflowError::StaleState { .. } | WorkflowError::OpenDisputesExist { .. }
            ));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_confirm_and_reject_race_is_consistent() {
    for _ in 0..20 {
        let h = Arc::new(harness());
        let r1 = h.resolve("O1").await;
        h.advance(1);
        let d1 = h.dispute(r1.id, "O2").await.unwrap();
        h.advance(48);

        let ops = actor("ops-1");
        let (confirm, reject) = tokio::join!(
            h.workflow.confirm_resolution(r1.id, &ops),
            h.review(d1.id, ReviewDecision::Reject)
        );
        assert!(reject.is_ok());
        let status = h.status(r1.id).await;
        match confirm {
            Ok(_) => assert_eq!(status, ResolutionStatus::Confirmed),
            Err(_) => assert_eq!(status, ResolutionStatus::Pending),
        }
        let expected = if status == ResolutionStatus::Confirmed { 4 } else { 3 };
        assert_eq!(h.trail(r1.id).await.len(), expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_produce_one_replacement() {
    let h = Arc::new(harness());
    let r1 = h.resolve("O1").await;
    let d2 = h.dispute(r1.id, "O2").await.unwrap();
    let d3 = h.dispute(r1.id, "O3").await.unwrap();

    let (a, b) = tokio::join!(
        h.review(d2.id, ReviewDecision::Accept),
        h.review(d3.id, ReviewDecision::Accept)
    );
    assert!(a.is_ok() != b.is_ok());
    let history = h.store.resolutions_for_market(&market_m()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history.iter().filter(|r| r.is_current()).count(),
        1
    );
}

// -- Wrapped store -------------------------------------------------------------

/// Wraps the memory engine. Fails every commit while `down` is set, and
/// commits `before_confirm` (once) just ahead of the next confirm batch.
#[derive(Default)]
struct HookedStore {
    inner: MemoryStore,
    down: AtomicBool,
    before_confirm: Mutex<Option<WriteBatch>>,
}

fn is_confirm(batch: &WriteBatch) -> bool {
    batch.clone().into_mutations().iter().any(|m| {
        matches!(
            m,
            Mutation::TransitionResolution {
                to: ResolutionStatus::Confirmed,
                ..
            }
        )
    })
}

#[async_trait]
impl ResolutionStore for HookedStore {
    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("statement timeout".into()));
        }
        if is_confirm(&batch) {
            let interleaved = self.before_confirm.lock().take();
            if let Some(interleaved) = interleaved {
                self.inner.commit(interleaved).await?;
            }
        }
        self.inner.commit(batch).await
    }

    async fn resolution(&self, id: ResolutionId) -> Result<Option<Resolution>, StoreError> {
        self.inner.resolution(id).await
    }

    async fn current_for_market(&self, market_id: &MarketId) -> Result<Option<Resolution>, StoreError> {
        self.inner.current_for_market(market_id).await
    }

    async fn resolutions_for_market(&self, market_id: &MarketId) -> Result<Vec<Resolution>, StoreError> {
        self.inner.resolutions_for_market(market_id).await
    }

    async fn list_resolutions(
        &self,
        filter: &ResolutionFilter,
        page: PageRequest,
    ) -> Result<Page<Resolution>, StoreError> {
        self.inner.list_resolutions(filter, page).await
    }

    async fn dispute(&self, id: DisputeId) -> Result<Option<Dispute>, StoreError> {
        self.inner.dispute(id).await
    }

    async fn disputes_for(
        &self,
        resolution_id: ResolutionId,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>, StoreError> {
        self.inner.disputes_for(resolution_id, status).await
    }

    async fn count_open_disputes(&self, resolution_id: ResolutionId) -> Result<usize, StoreError> {
        self.inner.count_open_disputes(resolution_id).await
    }

    async fn audit_trail(&self, resolution_id: ResolutionId) -> Result<Vec<AuditLogEntry>, StoreError> {
        self.inner.audit_trail(resolution_id).await
    }
}

/// An open dispute on `resolution` for `outcome_id`, filed at `at`.
fn open_dispute(resolution: &Resolution, outcome_id: &str, at: Timestamp) -> Dispute {
    Dispute {
        id: DisputeId::new(),
        resolution_id: resolution.id,
        disputed_outcome_id: outcome(outcome_id),
        reason: "filed while confirm was in flight".into(),
        evidence: None,
        creator_ref: actor("trader-9"),
        status: DisputeStatus::Open,
        review_notes: None,
        reviewer_ref: None,
        created_at: at,
        reviewed_at: None,
    }
}

#[tokio::test]
async fn test_storage_outage_is_retryable_and_writes_nothing() {
    let store = Arc::new(HookedStore::default());
    let h = harness_with_store(store.clone());
    let r1 = h.resolve("O1").await;
    let d1 = h.dispute(r1.id, "O2").await.unwrap();

    store.down.store(true, Ordering::SeqCst);
    let err = h.review(d1.id, ReviewDecision::Accept).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.code(), "STORAGE_UNAVAILABLE");

    assert_eq!(h.status(r1.id).await, ResolutionStatus::Disputed);
    assert!(h.store.dispute(d1.id).await.unwrap().unwrap().is_open());
    assert_eq!(h.trail(r1.id).await.len(), 2);

    store.down.store(false, Ordering::SeqCst);
    let review = h.review(d1.id, ReviewDecision::Accept).await.unwrap();
    assert_eq!(review.resolution.resolved_outcome_id, outcome("O2"));
    assert!(verify_chain(&h.trail(r1.id).await).chain_valid);
}

// -- Disputes landing inside a confirm ----------------------------------------

#[tokio::test]
async fn test_confirm_loses_to_dispute_filed_after_its_read() {
    let store = Arc::new(HookedStore::default());
    let h = harness_with_store(store.clone());
    let r1 = h.resolve("O1").await;
    h.advance(48);

    // A complete dispute batch commits after confirm read `pending`.
    let filed_at = h.clock.now();
    let dispute = open_dispute(&r1, "O2", filed_at);
    *store.before_confirm.lock() = Some(
        WriteBatch::new()
            .with(Mutation::InsertDispute(dispute.clone()))
            .with(Mutation::MarkDisputed { id: r1.id, at: filed_at })
            .with(Mutation::AppendAudit(AuditRecord::new(
                r1.id,
                AuditAction::DisputeCreated,
                Some(actor("trader-9")),
                filed_at,
                serde_json::json!({ "dispute_id": dispute.id }),
            ))),
    );

    let err = h
        .workflow
        .confirm_resolution(r1.id, &actor("ops-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::StaleState { .. }), "{err}");

    let r1_now = h.store.resolution(r1.id).await.unwrap().unwrap();
    assert_eq!(r1_now.status, ResolutionStatus::Disputed);
    assert!(r1_now.confirmed_at.is_none());
    assert_eq!(
        actions(&h.trail(r1.id).await),
        vec![AuditAction::ResolutionCreated, AuditAction::DisputeCreated]
    );
}

#[tokio::test]
async fn test_confirm_rechecks_open_disputes_inside_its_batch() {
    let store = Arc::new(HookedStore::default());
    let h = harness_with_store(store.clone());
    let r1 = h.resolve("O1").await;
    h.advance(48);

    // Only the dispute row lands; the status flip has not happened yet, so
    // the status compare-and-swap alone would let the confirm through.
    let dispute = open_dispute(&r1, "O3", h.clock.now());
    *store.before_confirm.lock() =
        Some(WriteBatch::new().with(Mutation::InsertDispute(dispute.clone())));

    let err = h
        .workflow
        .confirm_resolution(r1.id, &actor("ops-1"))
        .await
        .unwrap_err();
    match err {
        WorkflowError::OpenDisputesExist { open, .. } => assert_eq!(open, 1),
        other => panic!("expected OpenDisputesExist, got {other}"),
    }

    // The transition that ran before the guard was rolled back.
    let r1_now = h.store.resolution(r1.id).await.unwrap().unwrap();
    assert_eq!(r1_now.status, ResolutionStatus::Pending);
    assert!(r1_now.confirmed_at.is_none());
    assert_eq!(actions(&h.trail(r1.id).await), vec![AuditAction::ResolutionCreated]);
    assert!(verify_chain(&h.trail(r1.id).await).chain_valid);
}
