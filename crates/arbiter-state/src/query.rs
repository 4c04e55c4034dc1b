//! # Query Surface
//!
//! Read-only, denormalized projections for operator tooling. No business
//! rules live here. Market and outcome titles come from the
//! [`MarketDirectory`]; when it cannot answer, the view is returned without
//! titles instead of failing the read.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use arbiter_core::{DisputeId, MarketId, ResolutionId};

use crate::audit::{verify_chain, AuditLogEntry, ChainVerification};
use crate::config::WorkflowConfig;
use crate::dispute::{Dispute, DisputeStatus};
use crate::error::WorkflowError;
use crate::pagination::{Page, PageRequest};
use crate::ports::{MarketDirectory, MarketInfo};
use crate::resolution::{Resolution, ResolutionFilter};
use crate::store::ResolutionStore;

/// A dispute with its outcome title.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DisputeView {
    #[serde(flatten)]
    pub dispute: Dispute,
    pub disputed_outcome_title: Option<String>,
}

/// A resolution with its disputes and market/outcome titles.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ResolutionView {
    #[serde(flatten)]
    pub resolution: Resolution,
    pub market_title: Option<String>,
    pub resolved_outcome_title: Option<String>,
    pub is_current: bool,
    pub open_dispute_count: usize,
    pub disputes: Vec<DisputeView>,
}

/// A resolution's audit trail and the result of replaying its hash chain.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AuditTrailView {
    pub resolution_id: ResolutionId,
    pub entries: Vec<AuditLogEntry>,
    pub verification: ChainVerification,
}

/// Read-through projections over the store.
#[derive(Clone)]
pub struct QuerySurface {
    store: Arc<dyn ResolutionStore>,
    markets: Arc<dyn MarketDirectory>,
    config: WorkflowConfig,
}

/// Per-request memo of market lookups.
type MarketCache = HashMap<MarketId, Option<MarketInfo>>;

impl QuerySurface {
    pub fn new(
        store: Arc<dyn ResolutionStore>,
        markets: Arc<dyn MarketDirectory>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            markets,
            config,
        }
    }

    /// One resolution with its disputes.
    pub async fn get_resolution(&self, id: ResolutionId) -> Result<ResolutionView, WorkflowError> {
        let resolution = self.require_resolution(id).await?;
        let mut cache = MarketCache::new();
        self.resolution_view(resolution, &mut cache).await
    }

    /// Filtered page of resolutions, newest first.
    pub async fn list_resolutions(
        &self,
        filter: &ResolutionFilter,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Page<ResolutionView>, WorkflowError> {
        let request = PageRequest::new(page, limit, &self.config);
        let page = self.store.list_resolutions(filter, request).await?;
        let mut cache = MarketCache::new();
        let mut views = Vec::with_capacity(page.items.len());
        for resolution in page.items {
            views.push(self.resolution_view(resolution, &mut cache).await?);
        }
        Ok(Page {
            items: views,
            page: page.page,
            limit: page.limit,
            total: page.total,
        })
    }

    /// Audit entries in `(created_at, sequence)` order plus chain verification.
    pub async fn audit_trail(&self, id: ResolutionId) -> Result<AuditTrailView, WorkflowError> {
        self.require_resolution(id).await?;
        let entries = self.store.audit_trail(id).await?;
        let verification = verify_chain(&entries);
        Ok(AuditTrailView {
            resolution_id: id,
            entries,
            verification,
        })
    }

    pub async fn get_dispute(&self, id: DisputeId) -> Result<DisputeView, WorkflowError> {
        let dispute = self
            .store
            .dispute(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "dispute",
                id: id.to_string(),
            })?;
        let resolution = self.require_resolution(dispute.resolution_id).await?;
        let mut cache = MarketCache::new();
        let market = self.market(&resolution.market_id, &mut cache).await;
        Ok(dispute_view(dispute, market.as_ref()))
    }

    /// Disputes of a resolution in filing order.
    pub async fn list_disputes(
        &self,
        resolution_id: ResolutionId,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<DisputeView>, WorkflowError> {
        let resolution = self.require_resolution(resolution_id).await?;
        let disputes = self.store.disputes_for(resolution_id, status).await?;
        let mut cache = MarketCache::new();
        let market = self.market(&resolution.market_id, &mut cache).await;
        Ok(disputes
            .into_iter()
            .map(|d| dispute_view(d, market.as_ref()))
            .collect())
    }

    /// Every resolution a market has had, oldest first.
    pub async fn market_history(
        &self,
        market_id: &MarketId,
    ) -> Result<Vec<ResolutionView>, WorkflowError> {
        let history = self.store.resolutions_for_market(market_id).await?;
        let mut cache = MarketCache::new();
        let mut views = Vec::with_capacity(history.len());
        for resolution in history {
            views.push(self.resolution_view(resolution, &mut cache).await?);
        }
        Ok(views)
    }

    async fn resolution_view(
        &self,
        resolution: Resolution,
        cache: &mut MarketCache,
    ) -> Result<ResolutionView, WorkflowError> {
        let disputes = self.store.disputes_for(resolution.id, None).await?;
        let market = self.market(&resolution.market_id, cache).await;
        let open_dispute_count = disputes.iter().filter(|d| d.is_open()).count();
        Ok(ResolutionView {
            market_title: market.as_ref().map(|m| m.title.clone()),
            resolved_outcome_title: market
                .as_ref()
                .and_then(|m| m.outcome(&resolution.resolved_outcome_id))
                .map(|o| o.title.clone()),
            is_current: resolution.is_current(),
            open_dispute_count,
            disputes: disputes
                .into_iter()
                .map(|d| dispute_view(d, market.as_ref()))
                .collect(),
            resolution,
        })
    }

    async fn market(&self, id: &MarketId, cache: &mut MarketCache) -> Option<MarketInfo> {
        if let Some(hit) = cache.get(id) {
            return hit.clone();
        }
        let info = match self.markets.market(id).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(market_id = %id, error = %e, "market lookup failed, omitting titles");
                None
            }
        };
        cache.insert(id.clone(), info.clone());
        info
    }

    async fn require_resolution(&self, id: ResolutionId) -> Result<Resolution, WorkflowError> {
        self.store
            .resolution(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "resolution",
                id: id.to_string(),
            })
    }
}

fn dispute_view(dispute: Dispute, market: Option<&MarketInfo>) -> DisputeView {
    let disputed_outcome_title = market
        .and_then(|m| m.outcome(&dispute.disputed_outcome_id))
        .map(|o| o.title.clone());
    DisputeView {
        dispute,
        disputed_outcome_title,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use crate::store::MemoryStore;
    use crate::workflow::{CreateResolution, ResolutionWorkflow};
    use crate::{AllowAll, ResolutionSource};
    use arbiter_core::{ActorRef, ManualClock, OutcomeId, Timestamp};
    use async_trait::async_trait;

    struct FlakyDirectory {
        inner: crate::InMemoryMarketDirectory,
        down: parking_lot::Mutex<bool>,
    }

    #[async_trait]
    impl MarketDirectory for FlakyDirectory {
        async fn market(&self, id: &MarketId) -> Result<Option<MarketInfo>, PortError> {
            if *self.down.lock() {
                return Err(PortError::Unavailable {
                    collaborator: "market directory",
                    reason: "connection refused".into(),
                });
            }
            self.inner.market(id).await
        }

        async fn payout_completed(&self, id: &MarketId) -> Result<bool, PortError> {
            self.inner.payout_completed(id).await
        }
    }

    #[tokio::test]
    async fn titles_degrade_when_directory_is_down() {
        let inner = crate::InMemoryMarketDirectory::from_json_str(
            r#"[{"id": "m1", "title": "Match winner", "status": "closed",
                "outcomes": [{"id": "home", "title": "Home"}, {"id": "away", "title": "Away"}]}]"#,
        )
        .unwrap();
        let directory = Arc::new(FlakyDirectory {
            inner,
            down: parking_lot::Mutex::new(false),
        });
        let store: Arc<dyn ResolutionStore> = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Timestamp::parse("2026-01-01T00:00:00Z").unwrap());
        let workflow = ResolutionWorkflow::new(
            store.clone(),
            directory.clone(),
            Arc::new(AllowAll),
            Arc::new(clock),
            WorkflowConfig::default(),
        );
        let r = workflow
            .create_resolution(CreateResolution {
                market_id: MarketId::new("m1").unwrap(),
                resolved_outcome_id: OutcomeId::new("home").unwrap(),
                source: ResolutionSource::Oracle,
                resolver_ref: ActorRef::new("sports-feed").unwrap(),
                notes: None,
            })
            .await
            .unwrap();
        let query = QuerySurface::new(store, directory.clone(), WorkflowConfig::default());

        let view = query.get_resolution(r.id).await.unwrap();
        assert_eq!(view.market_title.as_deref(), Some("Match winner"));
        assert_eq!(view.resolved_outcome_title.as_deref(), Some("Home"));
        assert!(view.is_current);

        *directory.down.lock() = true;
        let view = query.get_resolution(r.id).await.unwrap();
        assert_eq!(view.market_title, None);
        assert_eq!(view.resolution.id, r.id);
    }

    #[tokio::test]
    async fn missing_resolution_is_not_found() {
        let query = QuerySurface::new(
            Arc::new(MemoryStore::new()),
            Arc::new(crate::InMemoryMarketDirectory::new()),
            WorkflowConfig::default(),
        );
        let err = query.audit_trail(ResolutionId::new()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(query
            .market_history(&MarketId::new("nothing").unwrap())
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn view_serializes_flat() {
        let resolution = crate::resolution::tests::sample("m1", "yes", "2026-01-01T00:00:00Z");
        let view = ResolutionView {
            resolution,
            market_title: Some("Title".into()),
            resolved_outcome_title: None,
            is_current: true,
            open_dispute_count: 0,
            disputes: vec![],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["market_id"], "m1");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["market_title"], "Title");
    }
}
