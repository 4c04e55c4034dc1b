//! # Audit Recorder
//!
//! Every state-affecting action against a resolution leaves exactly one
//! [`AuditLogEntry`]. Entries are sealed by the storage engine inside the
//! same atomic unit as the state change they describe:
//!
//! - `sequence` starts at 1 per resolution and increases by one per entry.
//! - `created_at` is clamped to never precede the previous entry, so
//!   `(created_at, sequence)` order equals commit order.
//! - `digest` is SHA-256 over the JCS-canonical entry (without `digest`),
//!   and `previous_digest` links to the prior entry of the same resolution.
//!
//! [`verify_chain`] replays a trail and reports the first broken link.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use arbiter_core::{
    sha256_hex, ActorRef, AuditEntryId, CanonicalBytes, CanonicalizationError, ResolutionId,
    Timestamp,
};

/// The kind of action an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ResolutionCreated,
    ResolutionConfirmed,
    DisputeCreated,
    DisputeReviewed,
    ResolutionOverturned,
    ResolutionFinalized,
}

impl AuditAction {
    /// The canonical string name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolutionCreated => "resolution_created",
            Self::ResolutionConfirmed => "resolution_confirmed",
            Self::DisputeCreated => "dispute_created",
            Self::DisputeReviewed => "dispute_reviewed",
            Self::ResolutionOverturned => "resolution_overturned",
            Self::ResolutionFinalized => "resolution_finalized",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::ResolutionCreated,
            Self::ResolutionConfirmed,
            Self::DisputeCreated,
            Self::DisputeReviewed,
            Self::ResolutionOverturned,
            Self::ResolutionFinalized,
        ]
        .into_iter()
        .find(|a| a.as_str() == s)
        .ok_or_else(|| format!("unknown audit action {s:?}"))
    }
}

/// An audit entry as submitted by the workflow, before sealing.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub resolution_id: ResolutionId,
    pub action: AuditAction,
    /// `None` for system actions (oracle-created resolutions).
    pub performer_ref: Option<ActorRef>,
    pub created_at: Timestamp,
    /// Snapshot of the relevant before/after fields.
    pub detail: serde_json::Value,
}

impl AuditRecord {
    pub fn new(
        resolution_id: ResolutionId,
        action: AuditAction,
        performer_ref: Option<ActorRef>,
        created_at: Timestamp,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            resolution_id,
            action,
            performer_ref,
            created_at,
            detail,
        }
    }
}

/// An immutable, sealed audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub resolution_id: ResolutionId,
    /// Position in the resolution's trail, starting at 1.
    pub sequence: u64,
    pub action: AuditAction,
    pub performer_ref: Option<ActorRef>,
    pub created_at: Timestamp,
    #[schema(value_type = Object)]
    pub detail: serde_json::Value,
    /// Digest of the preceding entry. `None` for the first entry.
    pub previous_digest: Option<String>,
    /// SHA-256 (hex) of this entry's canonical form without `digest`.
    pub digest: String,
}

/// The hashed projection of an entry: every field except `digest`.
#[derive(Serialize)]
struct DigestInput<'a> {
    id: &'a AuditEntryId,
    resolution_id: &'a ResolutionId,
    sequence: u64,
    action: AuditAction,
    performer_ref: &'a Option<ActorRef>,
    created_at: &'a Timestamp,
    detail: &'a serde_json::Value,
    previous_digest: &'a Option<String>,
}

impl AuditLogEntry {
    /// Recompute the digest from the entry's other fields.
    pub fn compute_digest(&self) -> Result<String, CanonicalizationError> {
        let input = DigestInput {
            id: &self.id,
            resolution_id: &self.resolution_id,
            sequence: self.sequence,
            action: self.action,
            performer_ref: &self.performer_ref,
            created_at: &self.created_at,
            detail: &self.detail,
            previous_digest: &self.previous_digest,
        };
        Ok(sha256_hex(&CanonicalBytes::new(&input)?))
    }

    /// Seal a record as the entry following `previous` in its trail.
    pub fn seal(
        record: AuditRecord,
        id: AuditEntryId,
        previous: Option<&AuditLogEntry>,
    ) -> Result<Self, CanonicalizationError> {
        let created_at = match previous {
            Some(prev) if prev.created_at > record.created_at => prev.created_at,
            _ => record.created_at,
        };
        let mut entry = Self {
            id,
            resolution_id: record.resolution_id,
            sequence: previous.map_or(1, |p| p.sequence + 1),
            action: record.action,
            performer_ref: record.performer_ref,
            created_at,
            detail: record.detail,
            previous_digest: previous.map(|p| p.digest.clone()),
            digest: String::new(),
        };
        entry.digest = entry.compute_digest()?;
        Ok(entry)
    }
}

/// Result of replaying a resolution's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChainVerification {
    pub total_entries: usize,
    pub chain_valid: bool,
    /// Sequence number of the first entry that fails verification.
    pub first_broken_sequence: Option<u64>,
}

/// Verify sequence continuity, ordering, digest linkage and digest contents.
pub fn verify_chain(entries: &[AuditLogEntry]) -> ChainVerification {
    let mut previous: Option<&AuditLogEntry> = None;
    for (index, entry) in entries.iter().enumerate() {
        let expected_sequence = index as u64 + 1;
        let linked = entry.previous_digest.as_deref() == previous.map(|p| p.digest.as_str());
        let ordered = previous.map_or(true, |p| p.created_at <= entry.created_at);
        let intact = matches!(entry.compute_digest(), Ok(ref d) if *d == entry.digest);
        if entry.sequence != expected_sequence || !linked || !ordered || !intact {
            tracing::warn!(
                resolution_id = %entry.resolution_id,
                sequence = entry.sequence,
                "audit chain verification failed"
            );
            return ChainVerification {
                total_entries: entries.len(),
                chain_valid: false,
                first_broken_sequence: Some(entry.sequence),
            };
        }
        previous = Some(entry);
    }
    ChainVerification {
        total_entries: entries.len(),
        chain_valid: true,
        first_broken_sequence: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(rid: ResolutionId, action: AuditAction, at: &str) -> AuditRecord {
        AuditRecord::new(
            rid,
            action,
            Some(ActorRef::new("ops").unwrap()),
            Timestamp::parse(at).unwrap(),
            json!({"status": "pending"}),
        )
    }

    fn chain(rid: ResolutionId) -> Vec<AuditLogEntry> {
        let first = AuditLogEntry::seal(
            record(rid, AuditAction::ResolutionCreated, "2026-01-01T00:00:00Z"),
            AuditEntryId::new(),
            None,
        )
        .unwrap();
        let second = AuditLogEntry::seal(
            record(rid, AuditAction::DisputeCreated, "2026-01-01T01:00:00Z"),
            AuditEntryId::new(),
            Some(&first),
        )
        .unwrap();
        vec![first, second]
    }

    #[test]
    fn sealing_links_entries() {
        let rid = ResolutionId::new();
        let entries = chain(rid);
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[0].previous_digest, None);
        assert_eq!(entries[1].sequence, 2);
        assert_eq!(entries[1].previous_digest.as_deref(), Some(entries[0].digest.as_str()));
        assert_eq!(entries[0].digest.len(), 64);
    }

    #[test]
    fn created_at_is_clamped_to_previous() {
        let rid = ResolutionId::new();
        let first = AuditLogEntry::seal(
            record(rid, AuditAction::ResolutionCreated, "2026-01-01T05:00:00Z"),
            AuditEntryId::new(),
            None,
        )
        .unwrap();
        let skewed = AuditLogEntry::seal(
            record(rid, AuditAction::ResolutionConfirmed, "2026-01-01T04:59:00Z"),
            AuditEntryId::new(),
            Some(&first),
        )
        .unwrap();
        assert_eq!(skewed.created_at, first.created_at);
        assert!(verify_chain(&[first, skewed]).chain_valid);
    }

    #[test]
    fn intact_chain_verifies() {
        let result = verify_chain(&chain(ResolutionId::new()));
        assert!(result.chain_valid);
        assert_eq!(result.total_entries, 2);
        assert_eq!(result.first_broken_sequence, None);
    }

    #[test]
    fn empty_chain_is_valid() {
        assert!(verify_chain(&[]).chain_valid);
    }

    #[test]
    fn tampered_detail_is_detected() {
        let mut entries = chain(ResolutionId::new());
        entries[1].detail = json!({"status": "confirmed"});
        let result = verify_chain(&entries);
        assert!(!result.chain_valid);
        assert_eq!(result.first_broken_sequence, Some(2));
    }

    #[test]
    fn removed_entry_is_detected() {
        let mut entries = chain(ResolutionId::new());
        entries.remove(0);
        assert!(!verify_chain(&entries).chain_valid);
    }

    #[test]
    fn action_names_are_snake_case() {
        let json = serde_json::to_string(&AuditAction::ResolutionOverturned).unwrap();
        assert_eq!(json, "\"resolution_overturned\"");
        assert_eq!(
            "dispute_reviewed".parse::<AuditAction>().unwrap(),
            AuditAction::DisputeReviewed
        );
    }
}
