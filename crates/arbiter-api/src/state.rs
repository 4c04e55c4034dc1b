//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! AppState holds:
//! - **Workflow** — the resolution state machine, the only writer
//! - **Query** — read-only projections over the same store
//! - **Config** — process configuration read from the environment
//! - **Database pool** — present when `DATABASE_URL` is set
//! - **Prometheus handle** — renders `/metrics` when a recorder is installed

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use arbiter_core::{ActorRef, Clock, SystemClock};
use arbiter_state::config::InvalidConfig;
use arbiter_state::{
    AccessPolicy, AllowAll, InMemoryMarketDirectory, MarketDirectory, MemoryStore, QuerySurface,
    ResolutionStore, ResolutionWorkflow, WorkflowConfig,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use thiserror::Error;

use crate::policy::{parse_role_table, Role, RoleTableError};

// -- Configuration ------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Invalid process configuration. Start-up aborts on any of these.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be a number, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("LOG_FORMAT must be `text` or `json`, got {0:?}")]
    InvalidLogFormat(String),

    #[error("ACTOR_ROLES: {0}")]
    InvalidActorRoles(#[from] RoleTableError),

    #[error("invalid workflow configuration: {0}")]
    InvalidWorkflow(#[from] InvalidConfig),
}

/// Process configuration.
///
/// Custom `Debug` redacts the auth token and database URL.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Shared bearer secret. `None` disables authentication.
    pub auth_token: Option<String>,
    pub database_url: Option<String>,
    pub workflow: WorkflowConfig,
    pub markets_api_url: Option<String>,
    pub markets_file: Option<PathBuf>,
    /// Actor → role table. `None` means every actor is `admin`.
    pub actor_roles: Option<HashMap<ActorRef, Role>>,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            workflow: WorkflowConfig::default(),
            markets_api_url: None,
            markets_file: None,
            actor_roles: None,
            log_format: LogFormat::Text,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("workflow", &self.workflow)
            .field("markets_api_url", &self.markets_api_url)
            .field("markets_file", &self.markets_file)
            .field("actor_roles", &self.actor_roles.as_ref().map(HashMap::len))
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = parse_or(get("PORT"), "PORT", defaults.port)?;
        let window_secs: i64 = parse_or(
            get("DISPUTE_WINDOW_SECS"),
            "DISPUTE_WINDOW_SECS",
            defaults.workflow.dispute_window.num_seconds(),
        )?;
        let workflow = WorkflowConfig {
            dispute_window: chrono::Duration::try_seconds(window_secs).ok_or(
                ConfigError::InvalidNumber {
                    var: "DISPUTE_WINDOW_SECS",
                    value: window_secs.to_string(),
                },
            )?,
            default_page_size: parse_or(
                get("DEFAULT_PAGE_SIZE"),
                "DEFAULT_PAGE_SIZE",
                defaults.workflow.default_page_size,
            )?,
            max_page_size: parse_or(
                get("MAX_PAGE_SIZE"),
                "MAX_PAGE_SIZE",
                defaults.workflow.max_page_size,
            )?,
        };
        workflow.validate()?;

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };

        let actor_roles = get("ACTOR_ROLES")
            .map(|raw| parse_role_table(&raw))
            .transpose()?;

        Ok(Self {
            port,
            auth_token: get("AUTH_TOKEN"),
            database_url: get("DATABASE_URL"),
            workflow,
            markets_api_url: get("MARKETS_API_URL"),
            markets_file: get("MARKETS_FILE").map(PathBuf::from),
            actor_roles,
            log_format,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

// -- Application State --------------------------------------------------------

/// The collaborators the workflow runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ResolutionStore>,
    pub markets: Arc<dyn MarketDirectory>,
    pub policy: Arc<dyn AccessPolicy>,
    pub clock: Arc<dyn Clock>,
}

impl Default for Collaborators {
    /// In-memory store, empty market directory, allow-all policy, system clock.
    fn default() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            markets: Arc::new(InMemoryMarketDirectory::new()),
            policy: Arc::new(AllowAll),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub workflow: ResolutionWorkflow,
    pub query: QuerySurface,
    pub config: Arc<AppConfig>,
    /// PostgreSQL pool, when the PostgreSQL engine backs the store.
    pub db_pool: Option<PgPool>,
    pub prometheus: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("db_pool", &self.db_pool.is_some())
            .field("prometheus", &self.prometheus.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Development state: default configuration, in-memory everything.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), Collaborators::default())
    }

    /// Wire the workflow and query surface over the given collaborators.
    pub fn with_config(config: AppConfig, collaborators: Collaborators) -> Self {
        let workflow = ResolutionWorkflow::new(
            Arc::clone(&collaborators.store),
            Arc::clone(&collaborators.markets),
            collaborators.policy,
            collaborators.clock,
            config.workflow.clone(),
        );
        let query = QuerySurface::new(
            collaborators.store,
            collaborators.markets,
            config.workflow.clone(),
        );
        Self {
            workflow,
            query,
            config: Arc::new(config),
            db_pool: None,
            prometheus: None,
        }
    }

    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
