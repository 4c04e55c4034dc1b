//! # arbiter-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the resolution arbiter.
//! Binds to configurable port (default 8080).

use std::sync::Arc;

use anyhow::Context;
use arbiter_api::db::{self, PgResolutionStore};
use arbiter_api::directory::market_directory;
use arbiter_api::policy::RoleAccessPolicy;
use arbiter_api::state::{AppConfig, AppState, Collaborators, LogFormat};
use arbiter_core::SystemClock;
use arbiter_state::{AccessPolicy, MemoryStore, ResolutionStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    // Initialize structured tracing.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(?config, "starting arbiter API");

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    // Storage engine: PostgreSQL when configured, in-memory otherwise.
    let db_pool = db::init_pool(config.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;
    let store: Arc<dyn ResolutionStore> = match &db_pool {
        Some(pool) => Arc::new(PgResolutionStore::new(pool.clone())),
        None => Arc::new(MemoryStore::new()),
    };

    let markets = market_directory(&config).context("market directory setup failed")?;

    let policy: Arc<dyn AccessPolicy> = match &config.actor_roles {
        Some(roles) => {
            tracing::info!(actors = roles.len(), "role table loaded");
            Arc::new(RoleAccessPolicy::new(roles.clone()))
        }
        None => {
            tracing::warn!("ACTOR_ROLES not set. Every actor is treated as admin.");
            Arc::new(RoleAccessPolicy::permissive())
        }
    };

    let port = config.port;
    let collaborators = Collaborators {
        store,
        markets,
        policy,
        clock: Arc::new(SystemClock),
    };
    let mut state = AppState::with_config(config, collaborators).with_prometheus(prometheus);
    if let Some(pool) = db_pool {
        state = state.with_db_pool(pool);
    }

    let app = arbiter_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Arbiter API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Arbiter API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received, draining connections");
}
