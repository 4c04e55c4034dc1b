//! Dispute persistence operations.
//!
//! The partial unique index `disputes_one_open_per_outcome` rejects a second
//! open dispute for the same `(resolution_id, disputed_outcome_id)`.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use arbiter_core::{ActorRef, DisputeId, OutcomeId, ResolutionId, Timestamp};
use arbiter_state::{Dispute, DisputeStatus};

use super::{corrupt, parse_column, DbResult};

macro_rules! dispute_columns {
    () => {
        "id, resolution_id, disputed_outcome_id, reason, evidence, creator_ref, status,
         review_notes, reviewer_ref, created_at, reviewed_at"
    };
}

/// Insert a new dispute record.
pub async fn insert(conn: &mut PgConnection, record: &Dispute) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO disputes (id, resolution_id, disputed_outcome_id, reason, evidence,
         creator_ref, status, review_notes, reviewer_ref, created_at, reviewed_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(record.id.0)
    .bind(record.resolution_id.0)
    .bind(record.disputed_outcome_id.as_str())
    .bind(&record.reason)
    .bind(record.evidence.as_ref())
    .bind(record.creator_ref.as_str())
    .bind(record.status.as_str())
    .bind(record.review_notes.as_deref())
    .bind(record.reviewer_ref.as_ref().map(ActorRef::as_str))
    .bind(*record.created_at.as_datetime())
    .bind(record.reviewed_at.map(|ts| *ts.as_datetime()))
    .execute(conn)
    .await?;
    Ok(())
}

/// Compare-and-swap `open → to`, recording the reviewer.
///
/// Returns `None` when the dispute is missing, belongs to another
/// resolution, or is no longer open.
pub async fn close(
    conn: &mut PgConnection,
    resolution_id: ResolutionId,
    id: DisputeId,
    to: DisputeStatus,
    reviewer: &ActorRef,
    notes: Option<&str>,
    at: Timestamp,
) -> DbResult<Option<Dispute>> {
    let row = sqlx::query_as::<_, DisputeRow>(concat!(
        "UPDATE disputes SET status = $3, reviewer_ref = $4, review_notes = $5, reviewed_at = $6
         WHERE id = $1 AND resolution_id = $2 AND status = 'open'
         RETURNING ",
        dispute_columns!()
    ))
    .bind(id.0)
    .bind(resolution_id.0)
    .bind(to.as_str())
    .bind(reviewer.as_str())
    .bind(notes)
    .bind(*at.as_datetime())
    .fetch_optional(conn)
    .await?;
    row.map(DisputeRow::into_record).transpose()
}

/// Fetch a dispute by ID.
pub async fn get(conn: &mut PgConnection, id: DisputeId) -> DbResult<Option<Dispute>> {
    let row = sqlx::query_as::<_, DisputeRow>(concat!(
        "SELECT ",
        dispute_columns!(),
        " FROM disputes WHERE id = $1"
    ))
    .bind(id.0)
    .fetch_optional(conn)
    .await?;
    row.map(DisputeRow::into_record).transpose()
}

/// Disputes of a resolution in filing order, optionally by status.
pub async fn for_resolution(
    conn: &mut PgConnection,
    resolution_id: ResolutionId,
    status: Option<DisputeStatus>,
) -> DbResult<Vec<Dispute>> {
    let rows = sqlx::query_as::<_, DisputeRow>(concat!(
        "SELECT ",
        dispute_columns!(),
        " FROM disputes
         WHERE resolution_id = $1 AND ($2::text IS NULL OR status = $2)
         ORDER BY row_seq"
    ))
    .bind(resolution_id.0)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(DisputeRow::into_record).collect()
}

pub async fn count_open(conn: &mut PgConnection, resolution_id: ResolutionId) -> DbResult<usize> {
    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM disputes WHERE resolution_id = $1 AND status = 'open'",
    )
    .bind(resolution_id.0)
    .fetch_one(conn)
    .await?;
    usize::try_from(open).map_err(|_| corrupt("disputes", format!("negative count {open}")).into())
}

/// IDs of the open disputes of a resolution, sorted.
pub async fn open_ids(
    conn: &mut PgConnection,
    resolution_id: ResolutionId,
) -> DbResult<Vec<DisputeId>> {
    let mut ids: Vec<DisputeId> = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM disputes WHERE resolution_id = $1 AND status = 'open'",
    )
    .bind(resolution_id.0)
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(DisputeId::from_uuid)
    .collect();
    ids.sort();
    Ok(ids)
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct DisputeRow {
    id: Uuid,
    resolution_id: Uuid,
    disputed_outcome_id: String,
    reason: String,
    evidence: Option<serde_json::Value>,
    creator_ref: String,
    status: String,
    review_notes: Option<String>,
    reviewer_ref: Option<String>,
    created_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
}

impl DisputeRow {
    fn into_record(self) -> DbResult<Dispute> {
        const TABLE: &str = "disputes";
        Ok(Dispute {
            id: DisputeId::from_uuid(self.id),
            resolution_id: ResolutionId::from_uuid(self.resolution_id),
            disputed_outcome_id: OutcomeId::new(self.disputed_outcome_id)
                .map_err(|e| corrupt(TABLE, e))?,
            reason: self.reason,
            evidence: self.evidence,
            creator_ref: ActorRef::new(self.creator_ref).map_err(|e| corrupt(TABLE, e))?,
            status: parse_column(TABLE, "status", &self.status)?,
            review_notes: self.review_notes,
            reviewer_ref: self
                .reviewer_ref
                .map(ActorRef::new)
                .transpose()
                .map_err(|e| corrupt(TABLE, e))?,
            created_at: Timestamp::from_utc(self.created_at),
            reviewed_at: self.reviewed_at.map(Timestamp::from_utc),
        })
    }
}
