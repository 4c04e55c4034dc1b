//! # Error Types
//!
//! [`StoreError`] is what storage engines report. [`WorkflowError`] is what
//! callers of the state machine see; it is classified by [`ErrorKind`] so
//! transports can render validation failures, business-rule conflicts,
//! authorization denials and transient infrastructure faults differently.

use thiserror::Error;

use arbiter_core::{ActorRef, DisputeId, MarketId, OutcomeId, ResolutionId, ValidationError};

use crate::dispute::DisputeStatus;
use crate::ports::{Action, PortError};
use crate::resolution::ResolutionStatus;

/// Failure reported by a [`ResolutionStore`](crate::store::ResolutionStore).
///
/// Every variant except `Unavailable` and `Integrity` is a guard failure:
/// the batch was rejected as a whole and nothing was written.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("resolution {0} not found")]
    ResolutionNotFound(ResolutionId),

    #[error("dispute {0} not found")]
    DisputeNotFound(DisputeId),

    #[error("resolution {resolution_id} is {actual}, expected {expected}")]
    StaleState {
        resolution_id: ResolutionId,
        expected: String,
        actual: ResolutionStatus,
    },

    #[error("market {market_id} already has a current resolution")]
    DuplicateResolution { market_id: MarketId },

    #[error("resolution {resolution_id} already has an open dispute for outcome {disputed_outcome_id}")]
    DuplicateDispute {
        resolution_id: ResolutionId,
        disputed_outcome_id: OutcomeId,
    },

    #[error("dispute {dispute_id} is {status}, not open")]
    DisputeNotOpen {
        dispute_id: DisputeId,
        status: DisputeStatus,
    },

    #[error("resolution {resolution_id} has {open} open dispute(s)")]
    OpenDisputesExist {
        resolution_id: ResolutionId,
        open: usize,
    },

    #[error("open disputes of resolution {resolution_id} changed since they were read")]
    OpenDisputeSetChanged { resolution_id: ResolutionId },

    /// Transient: timeout, lost connection, pool exhausted.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row violates an invariant or cannot be decoded.
    #[error("storage integrity violation: {0}")]
    Integrity(String),
}

/// Coarse classification of a [`WorkflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is malformed. Never retried.
    Validation,
    /// A referenced record does not exist.
    NotFound,
    /// A business rule rejected the transition in the current state.
    Conflict,
    /// The actor may not perform the action.
    Authorization,
    /// Transient infrastructure failure. Safe to retry after re-reading state.
    Unavailable,
    /// Corrupt data or a broken internal invariant.
    Internal,
}

/// Failure of a state machine operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid outcome {outcome_id} for market {market_id}: {reason}")]
    InvalidOutcome {
        market_id: MarketId,
        outcome_id: OutcomeId,
        reason: &'static str,
    },

    #[error("dispute reason must not be empty")]
    EmptyReason,

    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("market {market_id} is not eligible for resolution: {reason}")]
    MarketNotEligible {
        market_id: MarketId,
        reason: String,
    },

    #[error("market {market_id} already has a current resolution")]
    DuplicateResolution {
        market_id: MarketId,
        current: Option<ResolutionId>,
    },

    #[error("dispute window of resolution {resolution_id} closed at {window_ends}")]
    WindowClosed {
        resolution_id: ResolutionId,
        window_ends: arbiter_core::Timestamp,
    },

    #[error("dispute window of resolution {resolution_id} is open until {window_ends}")]
    WindowOpen {
        resolution_id: ResolutionId,
        window_ends: arbiter_core::Timestamp,
    },

    #[error("resolution {resolution_id} has {open} open dispute(s)")]
    OpenDisputesExist {
        resolution_id: ResolutionId,
        open: usize,
    },

    #[error("resolution {resolution_id} is {actual}, expected {expected}")]
    StaleState {
        resolution_id: ResolutionId,
        expected: String,
        actual: String,
    },

    #[error("resolution {resolution_id} already has an open dispute for outcome {disputed_outcome_id}")]
    DuplicateDispute {
        resolution_id: ResolutionId,
        disputed_outcome_id: OutcomeId,
    },

    #[error("dispute {dispute_id} is {status}, not open")]
    DisputeNotOpen {
        dispute_id: DisputeId,
        status: DisputeStatus,
    },

    #[error("payout for market {market_id} has not completed")]
    PayoutPending { market_id: MarketId },

    #[error("{actor} may not {action}")]
    Forbidden { actor: ActorRef, action: Action },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("{0}")]
    CollaboratorUnavailable(#[from] PortError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// The error's class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOutcome { .. } | Self::EmptyReason | Self::InvalidInput(_) => {
                ErrorKind::Validation
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::MarketNotEligible { .. }
            | Self::DuplicateResolution { .. }
            | Self::WindowClosed { .. }
            | Self::WindowOpen { .. }
            | Self::OpenDisputesExist { .. }
            | Self::StaleState { .. }
            | Self::DuplicateDispute { .. }
            | Self::DisputeNotOpen { .. }
            | Self::PayoutPending { .. } => ErrorKind::Conflict,
            Self::Forbidden { .. } => ErrorKind::Authorization,
            Self::StorageUnavailable(_) | Self::CollaboratorUnavailable(_) => {
                ErrorKind::Unavailable
            }
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidOutcome { .. } => "INVALID_OUTCOME",
            Self::EmptyReason => "EMPTY_REASON",
            Self::InvalidInput(_) => "VALIDATION_ERROR",
            Self::MarketNotEligible { .. } => "MARKET_NOT_ELIGIBLE",
            Self::DuplicateResolution { .. } => "DUPLICATE_RESOLUTION",
            Self::WindowClosed { .. } => "WINDOW_CLOSED",
            Self::WindowOpen { .. } => "WINDOW_OPEN",
            Self::OpenDisputesExist { .. } => "OPEN_DISPUTES_EXIST",
            Self::StaleState { .. } => "STALE_STATE",
            Self::DuplicateDispute { .. } => "DUPLICATE_DISPUTE",
            Self::DisputeNotOpen { .. } => "DISPUTE_NOT_OPEN",
            Self::PayoutPending { .. } => "PAYOUT_PENDING",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::CollaboratorUnavailable(_) => "COLLABORATOR_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry after re-reading current state.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ResolutionNotFound(id) => Self::NotFound {
                kind: "resolution",
                id: id.to_string(),
            },
            StoreError::DisputeNotFound(id) => Self::NotFound {
                kind: "dispute",
                id: id.to_string(),
            },
            StoreError::StaleState {
                resolution_id,
                expected,
                actual,
            } => Self::StaleState {
                resolution_id,
                expected,
                actual: actual.to_string(),
            },
            StoreError::DuplicateResolution { market_id } => Self::DuplicateResolution {
                market_id,
                current: None,
            },
            StoreError::DuplicateDispute {
                resolution_id,
                disputed_outcome_id,
            } => Self::DuplicateDispute {
                resolution_id,
                disputed_outcome_id,
            },
            StoreError::DisputeNotOpen { dispute_id, status } => {
                Self::DisputeNotOpen { dispute_id, status }
            }
            StoreError::OpenDisputesExist {
                resolution_id,
                open,
            } => Self::OpenDisputesExist {
                resolution_id,
                open,
            },
            StoreError::OpenDisputeSetChanged { resolution_id } => Self::StaleState {
                resolution_id,
                expected: "unchanged open disputes".to_string(),
                actual: "open disputes changed".to_string(),
            },
            StoreError::Unavailable(msg) => Self::StorageUnavailable(msg),
            StoreError::Integrity(msg) => Self::Internal(msg),
        }
    }
}
