//! # Disputes
//!
//! A dispute claims that a different outcome should have won. It is filed
//! while its resolution's window is open and reviewed exactly once.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use arbiter_core::{ActorRef, DisputeId, OutcomeId, ResolutionId, Timestamp};

/// Review notes written onto sibling disputes closed by an accepted one.
pub const SUPERSEDED_NOTE: &str = "superseded";

/// Lifecycle status of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    /// Awaiting review.
    Open,
    /// Upheld. Terminal.
    Accepted,
    /// Dismissed, or closed because a sibling was accepted. Terminal.
    Rejected,
}

impl DisputeStatus {
    /// The canonical string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisputeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown dispute status {other:?}")),
        }
    }
}

/// A reviewer's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Accept,
    Reject,
}

impl ReviewDecision {
    /// The dispute status this decision produces.
    pub fn target_status(&self) -> DisputeStatus {
        match self {
            Self::Accept => DisputeStatus::Accepted,
            Self::Reject => DisputeStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }
}

impl std::fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contestation of a resolution's chosen outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Dispute {
    /// Unique identifier.
    pub id: DisputeId,
    /// The contested resolution.
    pub resolution_id: ResolutionId,
    /// The outcome the filer claims should have won.
    pub disputed_outcome_id: OutcomeId,
    /// Why the resolution is wrong. Never empty.
    pub reason: String,
    /// Opaque supporting material. Stored as submitted.
    #[schema(value_type = Option<Object>)]
    pub evidence: Option<serde_json::Value>,
    /// Who filed the dispute.
    pub creator_ref: ActorRef,
    /// Lifecycle status.
    pub status: DisputeStatus,
    /// Reviewer's notes, set on review.
    pub review_notes: Option<String>,
    /// Who reviewed the dispute.
    pub reviewer_ref: Option<ActorRef>,
    /// Filing instant.
    pub created_at: Timestamp,
    /// Review instant.
    pub reviewed_at: Option<Timestamp>,
}

impl Dispute {
    /// Whether the dispute still awaits review.
    pub fn is_open(&self) -> bool {
        self.status == DisputeStatus::Open
    }

    /// Record a review. Callers check `is_open` first.
    pub fn close(
        &mut self,
        to: DisputeStatus,
        reviewer: ActorRef,
        notes: Option<String>,
        at: Timestamp,
    ) {
        self.status = to;
        self.reviewer_ref = Some(reviewer);
        self.review_notes = notes;
        self.reviewed_at = Some(at);
    }
}
