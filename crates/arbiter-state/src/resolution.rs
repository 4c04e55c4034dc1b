//! # Resolution Records
//!
//! A resolution asserts which outcome of a market won. At most one
//! resolution per market is *current* (`pending`, `disputed` or
//! `confirmed`); overturned and settled resolutions stay behind as history.
//!
//! ## Status Graph
//!
//! ```text
//!             file dispute            reject (last open)
//!   pending ───────────────▶ disputed ──────────────────▶ pending
//!      │                        │
//!      │ confirm                │ accept
//!      ▼                        ▼
//!  confirmed ──finalize──▶ final (settled)     final (overturned)
//! ```
//!
//! Accepting a dispute on a `pending` or `disputed` resolution finalizes it
//! as overturned and creates a fresh `pending` resolution for the market.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use arbiter_core::{ActorRef, MarketId, OutcomeId, ResolutionId, Timestamp};

/// Lifecycle status of a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Proposed, inside or past its dispute window, no open disputes.
    Pending,
    /// At least one dispute is open.
    Disputed,
    /// Window elapsed with no open disputes. Awaiting payout.
    Confirmed,
    /// Terminal: either settled after payout or overturned by a dispute.
    Final,
}

impl ResolutionStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [ResolutionStatus; 4] =
        [Self::Pending, Self::Disputed, Self::Confirmed, Self::Final];

    /// The canonical string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Disputed => "disputed",
            Self::Confirmed => "confirmed",
            Self::Final => "final",
        }
    }

    /// Whether a resolution in this status is the market's current one.
    pub fn is_current(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final)
    }

    /// Whether disputes may be filed against a resolution in this status.
    pub fn accepts_disputes(&self) -> bool {
        matches!(self, Self::Pending | Self::Disputed)
    }

    /// Valid target statuses from this status.
    pub fn valid_transitions(&self) -> &'static [ResolutionStatus] {
        match self {
            Self::Pending => &[Self::Disputed, Self::Confirmed, Self::Final],
            Self::Disputed => &[Self::Disputed, Self::Pending, Self::Final],
            Self::Confirmed => &[Self::Final],
            Self::Final => &[],
        }
    }

    /// Whether `to` is reachable in one step.
    pub fn can_transition_to(&self, to: ResolutionStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown resolution status {s:?}"))
    }
}

/// Who asserted the resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// An automated data feed.
    Oracle,
    /// A human operator, or the replacement created by an accepted dispute.
    Admin,
}

impl ResolutionSource {
    /// The canonical string name of this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oracle => "oracle",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oracle" => Ok(Self::Oracle),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown resolution source {other:?}")),
        }
    }
}

/// Why a resolution reached `final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinalReason {
    /// Replaced by the resolution created from an accepted dispute.
    Overturned,
    /// Payout completed after confirmation.
    Settled,
}

impl FinalReason {
    /// The canonical string name of this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overturned => "overturned",
            Self::Settled => "settled",
        }
    }
}

impl std::fmt::Display for FinalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FinalReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overturned" => Ok(Self::Overturned),
            "settled" => Ok(Self::Settled),
            other => Err(format!("unknown final reason {other:?}")),
        }
    }
}

/// A proposed-then-settled outcome assignment for one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Resolution {
    /// Unique identifier.
    pub id: ResolutionId,
    /// The market being resolved.
    pub market_id: MarketId,
    /// The outcome asserted as the winner.
    pub resolved_outcome_id: OutcomeId,
    /// Oracle or admin.
    pub source: ResolutionSource,
    /// Oracle identity or admin actor.
    pub resolver_ref: ActorRef,
    /// Creation instant.
    pub resolution_date: Timestamp,
    /// Disputes are accepted strictly before this instant.
    pub dispute_window_ends: Timestamp,
    /// Optional free text supplied by the resolver.
    pub notes: Option<String>,
    /// Lifecycle status.
    pub status: ResolutionStatus,
    /// Set when `status` becomes `final`.
    pub final_reason: Option<FinalReason>,
    /// The overturned resolution this one replaces.
    pub supersedes: Option<ResolutionId>,
    /// The resolution that replaced this one.
    pub superseded_by: Option<ResolutionId>,
    /// When the resolution was confirmed.
    pub confirmed_at: Option<Timestamp>,
    /// When the resolution became final.
    pub finalized_at: Option<Timestamp>,
    /// Last mutation instant.
    pub updated_at: Timestamp,
}

impl Resolution {
    /// Whether this is the market's current resolution.
    pub fn is_current(&self) -> bool {
        self.status.is_current()
    }

    /// Whether the dispute window is still open at `now`.
    pub fn window_open_at(&self, now: Timestamp) -> bool {
        now < self.dispute_window_ends
    }

    /// Apply a transition: new status, patch fields, bump `updated_at`.
    pub fn apply(&mut self, to: ResolutionStatus, patch: &ResolutionPatch, at: Timestamp) {
        self.status = to;
        if let Some(reason) = patch.final_reason {
            self.final_reason = Some(reason);
        }
        if let Some(next) = patch.superseded_by {
            self.superseded_by = Some(next);
        }
        if let Some(ts) = patch.confirmed_at {
            self.confirmed_at = Some(ts);
        }
        if let Some(ts) = patch.finalized_at {
            self.finalized_at = Some(ts);
        }
        self.updated_at = at;
    }
}

/// Fields written alongside a status transition. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPatch {
    pub final_reason: Option<FinalReason>,
    pub superseded_by: Option<ResolutionId>,
    pub confirmed_at: Option<Timestamp>,
    pub finalized_at: Option<Timestamp>,
}

/// Filter for resolution listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionFilter {
    pub status: Option<ResolutionStatus>,
    pub market_id: Option<MarketId>,
}

impl ResolutionFilter {
    /// Whether `resolution` passes the filter.
    pub fn matches(&self, resolution: &Resolution) -> bool {
        self.status.map_or(true, |s| s == resolution.status)
            && self
                .market_id
                .as_ref()
                .map_or(true, |m| m == &resolution.market_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample(market: &str, outcome: &str, at: &str) -> Resolution {
        let at = Timestamp::parse(at).unwrap();
        Resolution {
            id: ResolutionId::new(),
            market_id: MarketId::new(market).unwrap(),
            resolved_outcome_id: OutcomeId::new(outcome).unwrap(),
            source: ResolutionSource::Oracle,
            resolver_ref: ActorRef::new("oracle-feed").unwrap(),
            resolution_date: at,
            dispute_window_ends: at.checked_add(chrono::Duration::hours(48)).unwrap(),
            notes: None,
            status: ResolutionStatus::Pending,
            final_reason: None,
            supersedes: None,
            superseded_by: None,
            confirmed_at: None,
            finalized_at: None,
            updated_at: at,
        }
    }

    #[test]
    fn terminal_status_has_no_transitions() {
        assert!(ResolutionStatus::Final.is_terminal());
        assert!(ResolutionStatus::Final.valid_transitions().is_empty());
        for status in ResolutionStatus::ALL {
            assert_eq!(status.is_current(), status != ResolutionStatus::Final);
        }
    }

    #[test]
    fn confirmed_cannot_return_to_pending() {
        assert!(!ResolutionStatus::Confirmed.can_transition_to(ResolutionStatus::Pending));
        assert!(!ResolutionStatus::Confirmed.can_transition_to(ResolutionStatus::Disputed));
        assert!(ResolutionStatus::Confirmed.can_transition_to(ResolutionStatus::Final));
    }

    #[test]
    fn disputed_cannot_be_confirmed_directly() {
        assert!(!ResolutionStatus::Disputed.can_transition_to(ResolutionStatus::Confirmed));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in ResolutionStatus::ALL {
            assert_eq!(status.as_str().parse::<ResolutionStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("overturned".parse::<ResolutionStatus>().is_err());
    }

    #[test]
    fn window_is_exclusive_at_end() {
        let r = sample("m1", "yes", "2026-01-01T00:00:00Z");
        assert!(r.window_open_at(r.resolution_date));
        assert!(!r.window_open_at(r.dispute_window_ends));
    }

    #[test]
    fn apply_keeps_unpatched_fields() {
        let mut r = sample("m1", "yes", "2026-01-01T00:00:00Z");
        let at = Timestamp::parse("2026-01-04T00:00:00Z").unwrap();
        r.apply(
            ResolutionStatus::Confirmed,
            &ResolutionPatch {
                confirmed_at: Some(at),
                ..Default::default()
            },
            at,
        );
        assert_eq!(r.status, ResolutionStatus::Confirmed);
        assert_eq!(r.confirmed_at, Some(at));
        assert_eq!(r.final_reason, None);
        assert_eq!(r.updated_at, at);
    }

    #[test]
    fn filter_matches_on_both_fields() {
        let r = sample("m1", "yes", "2026-01-01T00:00:00Z");
        assert!(ResolutionFilter::default().matches(&r));
        let f = ResolutionFilter {
            status: Some(ResolutionStatus::Pending),
            market_id: Some(MarketId::new("m1").unwrap()),
        };
        assert!(f.matches(&r));
        let f = ResolutionFilter {
            status: Some(ResolutionStatus::Final),
            market_id: None,
        };
        assert!(!f.matches(&r));
    }
}
