//! Resolution persistence operations.
//!
//! All functions run on a connection the caller owns, usually the
//! transaction of a write batch. Status transitions are validated in the
//! application layer (`ResolutionStatus::can_transition_to`); the partial
//! unique index `resolutions_one_current_per_market` enforces one current
//! resolution per market.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use arbiter_core::{ActorRef, MarketId, OutcomeId, ResolutionId, Timestamp};
use arbiter_state::{
    FinalReason, Page, PageRequest, Resolution, ResolutionFilter, ResolutionPatch,
    ResolutionStatus,
};

use super::{corrupt, parse_column, DbResult};

macro_rules! resolution_columns {
    () => {
        "id, market_id, resolved_outcome_id, source, resolver_ref, resolution_date,
         dispute_window_ends, notes, status, final_reason, supersedes, superseded_by,
         confirmed_at, finalized_at, updated_at"
    };
}

/// Lock the given rows for the rest of the transaction, in id order.
pub async fn lock(conn: &mut PgConnection, ids: &[Uuid]) -> DbResult<()> {
    sqlx::query("SELECT id FROM resolutions WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(ids)
        .fetch_all(conn)
        .await?;
    Ok(())
}

/// Insert a new resolution record.
pub async fn insert(conn: &mut PgConnection, record: &Resolution) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO resolutions (id, market_id, resolved_outcome_id, source, resolver_ref,
         resolution_date, dispute_window_ends, notes, status, final_reason, supersedes,
         superseded_by, confirmed_at, finalized_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(record.id.0)
    .bind(record.market_id.as_str())
    .bind(record.resolved_outcome_id.as_str())
    .bind(record.source.as_str())
    .bind(record.resolver_ref.as_str())
    .bind(*record.resolution_date.as_datetime())
    .bind(*record.dispute_window_ends.as_datetime())
    .bind(record.notes.as_deref())
    .bind(record.status.as_str())
    .bind(record.final_reason.map(|r| r.as_str()))
    .bind(record.supersedes.map(|id| id.0))
    .bind(record.superseded_by.map(|id| id.0))
    .bind(record.confirmed_at.map(|ts| *ts.as_datetime()))
    .bind(record.finalized_at.map(|ts| *ts.as_datetime()))
    .bind(*record.updated_at.as_datetime())
    .execute(conn)
    .await?;
    Ok(())
}

/// Compare-and-swap the status from `expected` to `to`, writing the patch.
///
/// Returns `None` when the row is missing or no longer in `expected`.
pub async fn update_status(
    conn: &mut PgConnection,
    id: ResolutionId,
    expected: ResolutionStatus,
    to: ResolutionStatus,
    patch: &ResolutionPatch,
    at: Timestamp,
) -> DbResult<Option<Resolution>> {
    let row = sqlx::query_as::<_, ResolutionRow>(concat!(
        "UPDATE resolutions SET status = $3,
         final_reason = COALESCE($4, final_reason),
         superseded_by = COALESCE($5, superseded_by),
         confirmed_at = COALESCE($6, confirmed_at),
         finalized_at = COALESCE($7, finalized_at),
         updated_at = $8
         WHERE id = $1 AND status = $2
         RETURNING ",
        resolution_columns!()
    ))
    .bind(id.0)
    .bind(expected.as_str())
    .bind(to.as_str())
    .bind(patch.final_reason.map(|r| r.as_str()))
    .bind(patch.superseded_by.map(|id| id.0))
    .bind(patch.confirmed_at.map(|ts| *ts.as_datetime()))
    .bind(patch.finalized_at.map(|ts| *ts.as_datetime()))
    .bind(*at.as_datetime())
    .fetch_optional(conn)
    .await?;
    row.map(ResolutionRow::into_record).transpose()
}

/// Fetch a resolution by ID.
pub async fn get(conn: &mut PgConnection, id: ResolutionId) -> DbResult<Option<Resolution>> {
    let row = sqlx::query_as::<_, ResolutionRow>(concat!(
        "SELECT ",
        resolution_columns!(),
        " FROM resolutions WHERE id = $1"
    ))
    .bind(id.0)
    .fetch_optional(conn)
    .await?;
    row.map(ResolutionRow::into_record).transpose()
}

/// The market's resolution in `pending`, `disputed` or `confirmed`.
pub async fn current_for_market(
    conn: &mut PgConnection,
    market_id: &MarketId,
) -> DbResult<Option<Resolution>> {
    let row = sqlx::query_as::<_, ResolutionRow>(concat!(
        "SELECT ",
        resolution_columns!(),
        " FROM resolutions
         WHERE market_id = $1 AND status IN ('pending', 'disputed', 'confirmed')"
    ))
    .bind(market_id.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(ResolutionRow::into_record).transpose()
}

/// Every resolution of the market in insertion order.
pub async fn history(
    conn: &mut PgConnection,
    market_id: &MarketId,
) -> DbResult<Vec<Resolution>> {
    let rows = sqlx::query_as::<_, ResolutionRow>(concat!(
        "SELECT ",
        resolution_columns!(),
        " FROM resolutions WHERE market_id = $1 ORDER BY row_seq"
    ))
    .bind(market_id.as_str())
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(ResolutionRow::into_record).collect()
}

/// Filtered listing, newest `resolution_date` first.
pub async fn list(
    conn: &mut PgConnection,
    filter: &ResolutionFilter,
    page: PageRequest,
) -> DbResult<Page<Resolution>> {
    let status = filter.status.map(|s| s.as_str());
    let market_id = filter.market_id.as_ref().map(MarketId::as_str);

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM resolutions
         WHERE ($1::text IS NULL OR status = $1)
           AND ($2::text IS NULL OR market_id = $2)",
    )
    .bind(status)
    .bind(market_id)
    .fetch_one(&mut *conn)
    .await?;

    let offset = i64::try_from(page.offset())
        .map_err(|_| corrupt("resolutions", "page offset out of range"))?;
    let rows = sqlx::query_as::<_, ResolutionRow>(concat!(
        "SELECT ",
        resolution_columns!(),
        " FROM resolutions
         WHERE ($1::text IS NULL OR status = $1)
           AND ($2::text IS NULL OR market_id = $2)
         ORDER BY resolution_date DESC, id DESC
         LIMIT $3 OFFSET $4"
    ))
    .bind(status)
    .bind(market_id)
    .bind(i64::from(page.limit))
    .bind(offset)
    .fetch_all(conn)
    .await?;

    let items = rows
        .into_iter()
        .map(ResolutionRow::into_record)
        .collect::<DbResult<Vec<_>>>()?;
    Ok(Page {
        items,
        page: page.page,
        limit: page.limit,
        total: u64::try_from(total).unwrap_or(0),
    })
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct ResolutionRow {
    id: Uuid,
    market_id: String,
    resolved_outcome_id: String,
    source: String,
    resolver_ref: String,
    resolution_date: DateTime<Utc>,
    dispute_window_ends: DateTime<Utc>,
    notes: Option<String>,
    status: String,
    final_reason: Option<String>,
    supersedes: Option<Uuid>,
    superseded_by: Option<Uuid>,
    confirmed_at: Option<DateTime<Utc>>,
    finalized_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl ResolutionRow {
    fn into_record(self) -> DbResult<Resolution> {
        const TABLE: &str = "resolutions";
        let final_reason = self
            .final_reason
            .as_deref()
            .map(|raw| parse_column::<FinalReason>(TABLE, "final_reason", raw))
            .transpose()?;
        Ok(Resolution {
            id: ResolutionId::from_uuid(self.id),
            market_id: MarketId::new(self.market_id).map_err(|e| corrupt(TABLE, e))?,
            resolved_outcome_id: OutcomeId::new(self.resolved_outcome_id)
                .map_err(|e| corrupt(TABLE, e))?,
            source: parse_column(TABLE, "source", &self.source)?,
            resolver_ref: ActorRef::new(self.resolver_ref).map_err(|e| corrupt(TABLE, e))?,
            resolution_date: Timestamp::from_utc(self.resolution_date),
            dispute_window_ends: Timestamp::from_utc(self.dispute_window_ends),
            notes: self.notes,
            status: parse_column(TABLE, "status", &self.status)?,
            final_reason,
            supersedes: self.supersedes.map(ResolutionId::from_uuid),
            superseded_by: self.superseded_by.map(ResolutionId::from_uuid),
            confirmed_at: self.confirmed_at.map(Timestamp::from_utc),
            finalized_at: self.finalized_at.map(Timestamp::from_utc),
            updated_at: Timestamp::from_utc(self.updated_at),
        })
    }
}
