//! # Database Persistence Layer
//!
//! PostgreSQL storage engine for the resolution workflow via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, the API
//! stores resolutions, disputes, and the audit log in PostgreSQL through
//! [`PgResolutionStore`]. When absent, it runs on the in-memory engine
//! (suitable for development and testing; state does not survive restarts).
//!
//! ## Write batches
//!
//! Each [`WriteBatch`] runs in one transaction:
//!
//! 1. Every resolution row the batch touches is locked with
//!    `SELECT … FOR UPDATE`, in id order.
//! 2. Mutations are applied in batch order. Guards read under the lock;
//!    status changes are `UPDATE … WHERE status = $expected`.
//! 3. The first failing mutation drops the transaction, rolling back
//!    everything the batch wrote.
//!
//! Partial unique indexes reject a second current resolution per market and
//! a second open dispute per `(resolution, outcome)` even across instances.

pub mod audit;
pub mod disputes;
pub mod resolutions;

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use thiserror::Error;
use uuid::Uuid;

use arbiter_core::{AuditEntryId, DisputeId, MarketId, ResolutionId};
use arbiter_state::{
    AuditLogEntry, CommitReceipt, Dispute, DisputeStatus, Mutation, Page, PageRequest,
    Resolution, ResolutionFilter, ResolutionPatch, ResolutionStatus, ResolutionStore, StoreError,
    WriteBatch,
};

const ONE_CURRENT_PER_MARKET: &str = "resolutions_one_current_per_market";
const ONE_OPEN_PER_OUTCOME: &str = "disputes_one_open_per_outcome";

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if no URL is configured (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = database_url else {
        tracing::warn!(
            "DATABASE_URL not set, running on the in-memory store. \
             State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

// -- Errors -------------------------------------------------------------------

/// Failure inside a database operation, before classification.
#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Whether this is a unique violation of the named constraint or index.
    fn violates(&self, constraint: &str) -> bool {
        match self {
            Self::Sqlx(err) => err
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation() && db.constraint() == Some(constraint)),
            Self::Store(_) => false,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Store(err) => err,
            DbError::Sqlx(err) => classify(err),
        }
    }
}

/// SQLSTATE classes worth retrying: connection exceptions, serialization
/// failures and deadlocks, resource exhaustion, operator intervention.
const TRANSIENT_SQLSTATE_CLASSES: [&str; 4] = ["08", "40", "53", "57"];

fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let transient = db
                .code()
                .is_some_and(|code| TRANSIENT_SQLSTATE_CLASSES.iter().any(|c| code.starts_with(*c)));
            if transient {
                StoreError::Unavailable(err.to_string())
            } else {
                StoreError::Integrity(err.to_string())
            }
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::RowNotFound => StoreError::Integrity(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

/// A stored row that cannot be turned back into a record.
pub(crate) fn corrupt(table: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Integrity(format!("corrupt {table} row: {reason}"))
}

/// Parse a text column into one of the workflow's string enums.
pub(crate) fn parse_column<T>(table: &str, column: &str, raw: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = String>,
{
    raw.parse()
        .map_err(|e: String| corrupt(table, format!("{column}: {e}")))
}

// -- Storage engine -----------------------------------------------------------

/// [`ResolutionStore`] on PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgResolutionStore {
    pool: PgPool,
}

impl PgResolutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn conn(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Postgres>, StoreError> {
        self.pool.acquire().await.map_err(classify)
    }
}

/// `resolution` must exist and be in one of `expected`; otherwise the
/// matching guard failure.
async fn require_status(
    conn: &mut PgConnection,
    id: ResolutionId,
    expected: &[ResolutionStatus],
) -> DbResult<Resolution> {
    let current = resolutions::get(conn, id)
        .await?
        .ok_or(StoreError::ResolutionNotFound(id))?;
    if !expected.contains(&current.status) {
        return Err(StoreError::StaleState {
            resolution_id: id,
            expected: expected
                .iter()
                .map(ResolutionStatus::as_str)
                .collect::<Vec<_>>()
                .join("|"),
            actual: current.status,
        }
        .into());
    }
    Ok(current)
}

/// Move a locked resolution from one of `expected` to `to`.
async fn transition(
    conn: &mut PgConnection,
    id: ResolutionId,
    expected: &[ResolutionStatus],
    to: ResolutionStatus,
    patch: &ResolutionPatch,
    at: arbiter_core::Timestamp,
) -> DbResult<Resolution> {
    let current = require_status(conn, id, expected).await?;
    if !current.status.can_transition_to(to) {
        return Err(StoreError::Integrity(format!(
            "illegal transition {} -> {to} on resolution {id}",
            current.status
        ))
        .into());
    }
    resolutions::update_status(conn, id, current.status, to, patch, at)
        .await?
        .ok_or_else(|| {
            StoreError::StaleState {
                resolution_id: id,
                expected: current.status.as_str().to_string(),
                actual: current.status,
            }
            .into()
        })
}

async fn apply(
    conn: &mut PgConnection,
    mutation: Mutation,
    receipt: &mut CommitReceipt,
) -> DbResult<()> {
    match mutation {
        Mutation::InsertResolution(resolution) => {
            if let Err(err) = resolutions::insert(conn, &resolution).await {
                if err.violates(ONE_CURRENT_PER_MARKET) {
                    return Err(StoreError::DuplicateResolution {
                        market_id: resolution.market_id,
                    }
                    .into());
                }
                return Err(err);
            }
            receipt.record_resolution(resolution);
        }
        Mutation::TransitionResolution {
            id,
            expected,
            to,
            patch,
            at,
        } => {
            let row = transition(conn, id, &[expected], to, &patch, at).await?;
            receipt.record_resolution(row);
        }
        Mutation::MarkDisputed { id, at } => {
            let row = transition(
                conn,
                id,
                &[ResolutionStatus::Pending, ResolutionStatus::Disputed],
                ResolutionStatus::Disputed,
                &ResolutionPatch::default(),
                at,
            )
            .await?;
            receipt.record_resolution(row);
        }
        Mutation::ReconcileDisputed { id, at } => {
            let current = resolutions::get(conn, id)
                .await?
                .ok_or(StoreError::ResolutionNotFound(id))?;
            let row = if current.status == ResolutionStatus::Disputed
                && disputes::count_open(conn, id).await? == 0
            {
                transition(
                    conn,
                    id,
                    &[ResolutionStatus::Disputed],
                    ResolutionStatus::Pending,
                    &ResolutionPatch::default(),
                    at,
                )
                .await?
            } else {
                current
            };
            receipt.record_resolution(row);
        }
        Mutation::RequireNoOpenDisputes { resolution_id } => {
            let open = disputes::count_open(conn, resolution_id).await?;
            if open > 0 {
                return Err(StoreError::OpenDisputesExist {
                    resolution_id,
                    open,
                }
                .into());
            }
        }
        Mutation::ExpectOpenDisputes {
            resolution_id,
            mut dispute_ids,
        } => {
            dispute_ids.sort();
            if disputes::open_ids(conn, resolution_id).await? != dispute_ids {
                return Err(StoreError::OpenDisputeSetChanged { resolution_id }.into());
            }
        }
        Mutation::InsertDispute(dispute) => {
            if let Err(err) = disputes::insert(conn, &dispute).await {
                if err.violates(ONE_OPEN_PER_OUTCOME) {
                    return Err(StoreError::DuplicateDispute {
                        resolution_id: dispute.resolution_id,
                        disputed_outcome_id: dispute.disputed_outcome_id,
                    }
                    .into());
                }
                return Err(err);
            }
            receipt.record_dispute(dispute);
        }
        Mutation::ReviewDispute {
            resolution_id,
            id,
            to,
            reviewer,
            notes,
            at,
        } => {
            let closed =
                disputes::close(conn, resolution_id, id, to, &reviewer, notes.as_deref(), at)
                    .await?;
            let row = match closed {
                Some(row) => row,
                None => return Err(review_failure(conn, resolution_id, id).await?.into()),
            };
            receipt.record_dispute(row);
        }
        Mutation::AppendAudit(record) => {
            let previous = audit::last(conn, record.resolution_id).await?;
            let entry = AuditLogEntry::seal(record, AuditEntryId::new(), previous.as_ref())
                .map_err(|e| StoreError::Integrity(format!("cannot seal audit entry: {e}")))?;
            audit::insert(conn, &entry).await?;
            receipt.audit.push(entry);
        }
    }
    Ok(())
}

/// Explain why the review CAS matched no row.
async fn review_failure(
    conn: &mut PgConnection,
    resolution_id: ResolutionId,
    id: DisputeId,
) -> DbResult<StoreError> {
    let Some(dispute) = disputes::get(conn, id).await? else {
        return Ok(StoreError::DisputeNotFound(id));
    };
    if dispute.resolution_id != resolution_id {
        return Ok(StoreError::Integrity(format!(
            "dispute {id} belongs to {}, not {resolution_id}",
            dispute.resolution_id
        )));
    }
    Ok(StoreError::DisputeNotOpen {
        dispute_id: id,
        status: dispute.status,
    })
}

#[async_trait]
impl ResolutionStore for PgResolutionStore {
    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        let ids: Vec<Uuid> = batch.resolution_ids().into_iter().map(|id| id.0).collect();
        let mut tx = self.pool.begin().await.map_err(classify)?;
        resolutions::lock(&mut tx, &ids).await?;

        let mut receipt = CommitReceipt::default();
        for mutation in batch.into_mutations() {
            // Dropping `tx` on the error path rolls the batch back.
            apply(&mut tx, mutation, &mut receipt).await?;
        }
        tx.commit().await.map_err(classify)?;
        Ok(receipt)
    }

    async fn resolution(&self, id: ResolutionId) -> Result<Option<Resolution>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(resolutions::get(&mut conn, id).await?)
    }

    async fn current_for_market(
        &self,
        market_id: &MarketId,
    ) -> Result<Option<Resolution>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(resolutions::current_for_market(&mut conn, market_id).await?)
    }

    async fn resolutions_for_market(
        &self,
        market_id: &MarketId,
    ) -> Result<Vec<Resolution>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(resolutions::history(&mut conn, market_id).await?)
    }

    async fn list_resolutions(
        &self,
        filter: &ResolutionFilter,
        page: PageRequest,
    ) -> Result<Page<Resolution>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(resolutions::list(&mut conn, filter, page).await?)
    }

    async fn dispute(&self, id: DisputeId) -> Result<Option<Dispute>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(disputes::get(&mut conn, id).await?)
    }

    async fn disputes_for(
        &self,
        resolution_id: ResolutionId,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(disputes::for_resolution(&mut conn, resolution_id, status).await?)
    }

    async fn count_open_disputes(&self, resolution_id: ResolutionId) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        Ok(disputes::count_open(&mut conn, resolution_id).await?)
    }

    async fn audit_trail(
        &self,
        resolution_id: ResolutionId,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(audit::trail(&mut conn, resolution_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_are_integrity_failures() {
        let err = classify(sqlx::Error::ColumnNotFound("status".into()));
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[test]
    fn pool_errors_are_retryable() {
        assert!(matches!(
            classify(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            classify(sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn store_errors_pass_through() {
        let rid = ResolutionId::new();
        let err: StoreError = DbError::from(StoreError::ResolutionNotFound(rid)).into();
        assert_eq!(err, StoreError::ResolutionNotFound(rid));
        assert!(!DbError::from(StoreError::ResolutionNotFound(rid)).violates(ONE_CURRENT_PER_MARKET));
    }

    #[test]
    fn unknown_enum_value_is_corrupt() {
        let err = parse_column::<ResolutionStatus>("resolutions", "status", "settled").unwrap_err();
        match err {
            StoreError::Integrity(msg) => assert!(msg.contains("status")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn init_pool_without_url_is_in_memory() {
        assert!(init_pool(None).await.unwrap().is_none());
    }
}
