//! # Market Directory Clients
//!
//! [`HttpMarketDirectory`] talks to the markets service over HTTP:
//!
//! | Method | Path | Result |
//! |--------|------|--------|
//! | GET | `{base}/v1/markets/{id}` | [`MarketInfo`], 404 → unknown market |
//! | GET | `{base}/v1/markets/{id}/payout` | `{"completed": bool}`, 404 → not completed |
//!
//! Transport failures are retried with backoff; 5xx responses and exhausted
//! retries surface as [`PortError::Unavailable`], undecodable bodies as
//! [`PortError::Malformed`].
//!
//! [`market_directory`] picks the implementation from [`AppConfig`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;

use arbiter_core::MarketId;
use arbiter_state::ports::DirectoryLoadError;
use arbiter_state::{InMemoryMarketDirectory, MarketDirectory, MarketInfo, PortError};

use crate::state::AppConfig;

const COLLABORATOR: &str = "market directory";

/// Retries after the first attempt.
const MAX_RETRIES: u32 = 2;

/// Base delay between retries (doubles each attempt).
const BASE_DELAY_MS: u64 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The market directory could not be set up.
#[derive(Error, Debug)]
pub enum DirectorySetupError {
    #[error("MARKETS_API_URL is not a valid base URL: {0:?}")]
    InvalidUrl(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("MARKETS_FILE: {0}")]
    File(#[from] DirectoryLoadError),
}

#[derive(Debug, Deserialize)]
struct PayoutStatus {
    completed: bool,
}

/// Market directory backed by the markets service.
#[derive(Debug, Clone)]
pub struct HttpMarketDirectory {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpMarketDirectory {
    pub fn new(base_url: &str) -> Result<Self, DirectorySetupError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| DirectorySetupError::InvalidUrl(base_url.to_string()))?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url })
    }

    /// `{base}/v1/markets/{id}[/{suffix}]` with the id percent-encoded as
    /// a single path segment.
    fn market_url(&self, id: &MarketId, suffix: Option<&str>) -> Result<Url, PortError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| PortError::Unavailable {
                collaborator: COLLABORATOR,
                reason: format!("base URL {} cannot carry a path", self.base_url),
            })?;
            segments.pop_if_empty().extend(["v1", "markets", id.as_str()]);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, PortError> {
        for attempt in 0..MAX_RETRIES {
            match self.http.get(url.clone()).send().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        %url,
                        "market directory request failed, retrying in {delay:?}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        self.http.get(url).send().await.map_err(unavailable)
    }
}

fn unavailable(err: impl std::fmt::Display) -> PortError {
    PortError::Unavailable {
        collaborator: COLLABORATOR,
        reason: err.to_string(),
    }
}

fn malformed(err: impl std::fmt::Display) -> PortError {
    PortError::Malformed {
        collaborator: COLLABORATOR,
        reason: err.to_string(),
    }
}

/// Map a non-success, non-404 status to a port error.
fn status_error(status: StatusCode) -> PortError {
    if status.is_server_error() {
        unavailable(format!("markets service returned {status}"))
    } else {
        malformed(format!("unexpected status {status}"))
    }
}

#[async_trait]
impl MarketDirectory for HttpMarketDirectory {
    async fn market(&self, id: &MarketId) -> Result<Option<MarketInfo>, PortError> {
        let resp = self.get(self.market_url(id, None)?).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => return Err(status_error(status)),
            _ => {}
        }
        let info: MarketInfo = resp.json().await.map_err(malformed)?;
        if &info.id != id {
            return Err(malformed(format!(
                "asked for market {id}, got market {}",
                info.id
            )));
        }
        Ok(Some(info))
    }

    async fn payout_completed(&self, id: &MarketId) -> Result<bool, PortError> {
        let resp = self.get(self.market_url(id, Some("payout"))?).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => return Ok(false),
            status if !status.is_success() => return Err(status_error(status)),
            _ => {}
        }
        let payout: PayoutStatus = resp.json().await.map_err(malformed)?;
        Ok(payout.completed)
    }
}

/// Choose the market directory: the markets service when `MARKETS_API_URL`
/// is set, else the `MARKETS_FILE` fixture, else an empty in-memory table.
pub fn market_directory(
    config: &AppConfig,
) -> Result<Arc<dyn MarketDirectory>, DirectorySetupError> {
    if let Some(url) = &config.markets_api_url {
        tracing::info!(%url, "using markets service");
        return Ok(Arc::new(HttpMarketDirectory::new(url)?));
    }
    if let Some(path) = &config.markets_file {
        let directory = InMemoryMarketDirectory::from_json_file(path)?;
        tracing::info!(path = %path.display(), markets = directory.len(), "loaded market file");
        return Ok(Arc::new(directory));
    }
    tracing::warn!(
        "neither MARKETS_API_URL nor MARKETS_FILE set; every market lookup will miss"
    );
    Ok(Arc::new(InMemoryMarketDirectory::new()))
}
