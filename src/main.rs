//! pipeline-sentinel daemon entry point.
//!
//! Restores a change listener for every monitorable pipeline, then runs
//! until interrupted. Listeners are stopped before the shared pool is
//! torn down.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use pipeline_sentinel::config::SentinelConfig;
use pipeline_sentinel::listener::ListenerRegistry;
use pipeline_sentinel::notify::{EmailSender, NotificationDispatcher};
use pipeline_sentinel::persistence::{
    AccessRepository, EventStore, PipelineRepository, StepRepository, UserRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = SentinelConfig::from_env();
    tracing::info!("starting pipeline-sentinel");

    // Application database pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    // Repositories and collaborators
    let pipelines = Arc::new(PipelineRepository::new(pool.clone()));
    let steps = Arc::new(StepRepository::new(pool.clone()));
    let events = Arc::new(EventStore::new(pool.clone()));
    let users = Arc::new(UserRepository::new(pool.clone()));
    let access = Arc::new(AccessRepository::new(pool.clone()));

    let mailer = EmailSender::from_settings(&config.email)?;
    let notifier = Arc::new(NotificationDispatcher::new(users, access, mailer));

    // Listener fleet
    let registry = Arc::new(ListenerRegistry::new(
        pipelines,
        steps,
        events,
        notifier,
        config.listener.clone(),
    ));
    registry.restore_all_listeners().await;
    tracing::info!(
        active = registry.active_count().await,
        "listener restoration complete"
    );

    // Run until interrupted
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received; stopping listeners");

    registry.shutdown().await;
    pool.close().await;

    Ok(())
}
