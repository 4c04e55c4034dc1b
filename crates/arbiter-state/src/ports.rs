//! # External Collaborators
//!
//! The workflow consumes two capabilities it does not implement:
//!
//! - [`MarketDirectory`]: market metadata (outcomes, eligibility, titles)
//!   and the payout-completed signal that drives `confirmed → final`.
//! - [`AccessPolicy`]: "may actor X perform action Y on resolution Z".
//!
//! Both are async traits consumed as `Arc<dyn _>` so deployments can plug
//! in HTTP clients, role tables, or the in-memory versions defined here.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use arbiter_core::{ActorRef, MarketId, OutcomeId, ResolutionId};

/// A collaborator could not answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },
    #[error("{collaborator} returned malformed data: {reason}")]
    Malformed {
        collaborator: &'static str,
        reason: String,
    },
}

// ── Market directory ───────────────────────────────────────────────────

/// Trading status of a market as reported by the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Open,
    Closed,
    Cancelled,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One outcome of a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OutcomeInfo {
    pub id: OutcomeId,
    pub title: String,
}

/// The slice of market data the workflow needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MarketInfo {
    pub id: MarketId,
    pub title: String,
    pub status: MarketStatus,
    pub outcomes: Vec<OutcomeInfo>,
}

impl MarketInfo {
    /// Cancelled markets are never resolved.
    pub fn is_eligible(&self) -> bool {
        self.status != MarketStatus::Cancelled
    }

    pub fn outcome(&self, id: &OutcomeId) -> Option<&OutcomeInfo> {
        self.outcomes.iter().find(|o| &o.id == id)
    }

    pub fn has_outcome(&self, id: &OutcomeId) -> bool {
        self.outcome(id).is_some()
    }
}

/// Market lookup.
#[async_trait]
pub trait MarketDirectory: Send + Sync {
    /// The market, or `None` if the catalogue does not know it.
    async fn market(&self, id: &MarketId) -> Result<Option<MarketInfo>, PortError>;

    /// Whether the payout process for the market has completed.
    async fn payout_completed(&self, id: &MarketId) -> Result<bool, PortError>;
}

/// Error loading a market fixture file.
#[derive(Error, Debug)]
pub enum DirectoryLoadError {
    #[error("failed to read market file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse market file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
struct MarketFixture {
    #[serde(flatten)]
    info: MarketInfo,
    #[serde(default)]
    payout_completed: bool,
}

#[derive(Debug, Clone)]
struct DirectoryEntry {
    info: MarketInfo,
    payout_completed: bool,
}

/// A market directory held in memory. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketDirectory {
    markets: Arc<RwLock<HashMap<MarketId, DirectoryEntry>>>,
}

impl InMemoryMarketDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of markets, each optionally carrying a
    /// `payout_completed` flag.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DirectoryLoadError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, DirectoryLoadError> {
        let fixtures: Vec<MarketFixture> = serde_json::from_str(raw)?;
        let directory = Self::new();
        {
            let mut markets = directory.markets.write();
            for fixture in fixtures {
                markets.insert(
                    fixture.info.id.clone(),
                    DirectoryEntry {
                        info: fixture.info,
                        payout_completed: fixture.payout_completed,
                    },
                );
            }
        }
        Ok(directory)
    }

    /// Add or replace a market. Payout status resets to incomplete.
    pub fn insert(&self, info: MarketInfo) {
        self.markets.write().insert(
            info.id.clone(),
            DirectoryEntry {
                info,
                payout_completed: false,
            },
        );
    }

    /// Change a market's trading status. Returns false for unknown markets.
    pub fn set_status(&self, id: &MarketId, status: MarketStatus) -> bool {
        match self.markets.write().get_mut(id) {
            Some(entry) => {
                entry.info.status = status;
                true
            }
            None => false,
        }
    }

    /// Signal payout completion. Returns false for unknown markets.
    pub fn set_payout_completed(&self, id: &MarketId, completed: bool) -> bool {
        match self.markets.write().get_mut(id) {
            Some(entry) => {
                entry.payout_completed = completed;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.markets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.read().is_empty()
    }
}

#[async_trait]
impl MarketDirectory for InMemoryMarketDirectory {
    async fn market(&self, id: &MarketId) -> Result<Option<MarketInfo>, PortError> {
        Ok(self.markets.read().get(id).map(|e| e.info.clone()))
    }

    async fn payout_completed(&self, id: &MarketId) -> Result<bool, PortError> {
        Ok(self
            .markets
            .read()
            .get(id)
            .map_or(false, |e| e.payout_completed))
    }
}

// ── Access policy ──────────────────────────────────────────────────────

/// A mutating workflow operation subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateResolution,
    ConfirmResolution,
    CreateDispute,
    ReviewDispute,
    FinalizeResolution,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Self::CreateResolution,
        Self::ConfirmResolution,
        Self::CreateDispute,
        Self::ReviewDispute,
        Self::FinalizeResolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateResolution => "create_resolution",
            Self::ConfirmResolution => "confirm_resolution",
            Self::CreateDispute => "create_dispute",
            Self::ReviewDispute => "review_dispute",
            Self::FinalizeResolution => "finalize_resolution",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization predicate. The workflow calls it before every mutation;
/// correctness under races comes from the storage guards, not from here.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn can_perform(
        &self,
        actor: &ActorRef,
        action: Action,
        resolution_id: Option<ResolutionId>,
    ) -> Result<bool, PortError>;
}

/// Permits everything. Development and tests only.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessPolicy for AllowAll {
    async fn can_perform(
        &self,
        _actor: &ActorRef,
        _action: Action,
        _resolution_id: Option<ResolutionId>,
    ) -> Result<bool, PortError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURE: &str = r#"[
        {
            "id": "btc-100k",
            "title": "BTC above 100k on Dec 31?",
            "status": "closed",
            "outcomes": [{"id": "yes", "title": "Yes"}, {"id": "no", "title": "No"}],
            "payout_completed": true
        },
        {
            "id": "election",
            "title": "Who wins?",
            "status": "cancelled",
            "outcomes": [{"id": "a", "title": "A"}]
        }
    ]"#;

    #[tokio::test]
    async fn loads_fixture_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        let directory = InMemoryMarketDirectory::from_json_file(file.path()).unwrap();
        assert_eq!(directory.len(), 2);

        let btc = MarketId::new("btc-100k").unwrap();
        let info = directory.market(&btc).await.unwrap().unwrap();
        assert!(info.is_eligible());
        assert!(info.has_outcome(&OutcomeId::new("no").unwrap()));
        assert!(directory.payout_completed(&btc).await.unwrap());

        let election = MarketId::new("election").unwrap();
        let info = directory.market(&election).await.unwrap().unwrap();
        assert!(!info.is_eligible());
        assert!(!directory.payout_completed(&election).await.unwrap());
    }

    #[test]
    fn rejects_malformed_fixture() {
        assert!(matches!(
            InMemoryMarketDirectory::from_json_str("{\"id\": 1}"),
            Err(DirectoryLoadError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn unknown_market_is_none() {
        let directory = InMemoryMarketDirectory::new();
        let id = MarketId::new("missing").unwrap();
        assert!(directory.market(&id).await.unwrap().is_none());
        assert!(!directory.payout_completed(&id).await.unwrap());
        assert!(!directory.set_payout_completed(&id, true));
    }

    #[tokio::test]
    async fn allow_all_allows() {
        let actor = ActorRef::new("anyone").unwrap();
        for action in Action::ALL {
            assert!(AllowAll.can_perform(&actor, action, None).await.unwrap());
        }
    }
}
