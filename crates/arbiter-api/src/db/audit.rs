//! Audit log persistence, an immutable per-resolution hash chain.
//!
//! Entries are sealed in the application layer (`AuditLogEntry::seal`)
//! against the last stored entry of the same resolution. The resolution row
//! lock taken by the batch serializes appenders; the unique
//! `(resolution_id, sequence)` constraint backs it up. A trigger rejects
//! UPDATE and DELETE on the table.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use arbiter_core::{ActorRef, AuditEntryId, ResolutionId, Timestamp};
use arbiter_state::AuditLogEntry;

use super::{corrupt, parse_column, DbResult};

macro_rules! audit_columns {
    () => {
        "id, resolution_id, sequence, action, performer_ref, created_at, detail,
         previous_digest, digest"
    };
}

/// Append a sealed entry.
pub async fn insert(conn: &mut PgConnection, entry: &AuditLogEntry) -> DbResult<()> {
    let sequence = i64::try_from(entry.sequence)
        .map_err(|_| corrupt("audit_log", format!("sequence {} out of range", entry.sequence)))?;
    sqlx::query(
        "INSERT INTO audit_log (id, resolution_id, sequence, action, performer_ref,
         created_at, detail, previous_digest, digest)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(entry.id.0)
    .bind(entry.resolution_id.0)
    .bind(sequence)
    .bind(entry.action.as_str())
    .bind(entry.performer_ref.as_ref().map(ActorRef::as_str))
    .bind(*entry.created_at.as_datetime())
    .bind(&entry.detail)
    .bind(entry.previous_digest.as_deref())
    .bind(&entry.digest)
    .execute(conn)
    .await?;
    Ok(())
}

/// The entry with the highest sequence for the resolution.
pub async fn last(
    conn: &mut PgConnection,
    resolution_id: ResolutionId,
) -> DbResult<Option<AuditLogEntry>> {
    let row = sqlx::query_as::<_, AuditRow>(concat!(
        "SELECT ",
        audit_columns!(),
        " FROM audit_log WHERE resolution_id = $1 ORDER BY sequence DESC LIMIT 1"
    ))
    .bind(resolution_id.0)
    .fetch_optional(conn)
    .await?;
    row.map(AuditRow::into_record).transpose()
}

/// The full trail of a resolution ordered by `(created_at, sequence)`.
pub async fn trail(
    conn: &mut PgConnection,
    resolution_id: ResolutionId,
) -> DbResult<Vec<AuditLogEntry>> {
    let rows = sqlx::query_as::<_, AuditRow>(concat!(
        "SELECT ",
        audit_columns!(),
        " FROM audit_log WHERE resolution_id = $1 ORDER BY created_at, sequence"
    ))
    .bind(resolution_id.0)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(AuditRow::into_record).collect()
}

/// Database row for audit entries.
#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    resolution_id: Uuid,
    sequence: i64,
    action: String,
    performer_ref: Option<String>,
    created_at: DateTime<Utc>,
    detail: serde_json::Value,
    previous_digest: Option<String>,
    digest: String,
}

impl AuditRow {
    fn into_record(self) -> DbResult<AuditLogEntry> {
        const TABLE: &str = "audit_log";
        Ok(AuditLogEntry {
            id: AuditEntryId::from_uuid(self.id),
            resolution_id: ResolutionId::from_uuid(self.resolution_id),
            sequence: u64::try_from(self.sequence)
                .map_err(|_| corrupt(TABLE, format!("negative sequence {}", self.sequence)))?,
            action: parse_column(TABLE, "action", &self.action)?,
            performer_ref: self
                .performer_ref
                .map(ActorRef::new)
                .transpose()
                .map_err(|e| corrupt(TABLE, e))?,
            created_at: Timestamp::from_utc(self.created_at),
            detail: self.detail,
            previous_digest: self.previous_digest,
            digest: self.digest,
        })
    }
}
