//! Supervision of the active listener fleet.
//!
//! The registry owns the only state shared across listener tasks: a
//! mutex-guarded map from pipeline id to its running listener. Start,
//! stop, and restore are silently safe: a pipeline create/delete must
//! never fail because monitoring could not start.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::ListenerSettings;
use crate::domain::{MonitoringConfig, ToolKind};
use crate::notify::NotificationDispatcher;
use crate::persistence::{EventStore, PipelineRepository, StepRepository};

use super::postgres::PostgresChangeListener;
use super::ToolListener;

/// Supervises the set of active change listeners, at most one per
/// pipeline id.
///
/// The map is mutated from HTTP-triggered lifecycle calls and from the
/// startup restoration routine; the mutex is held across the whole
/// start-listener critical section so concurrent starts stay
/// idempotent.
#[derive(Debug)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<i32, ToolListener>>,
    pipelines: Arc<PipelineRepository>,
    steps: Arc<StepRepository>,
    events: Arc<EventStore>,
    notifier: Arc<NotificationDispatcher>,
    settings: ListenerSettings,
}

impl ListenerRegistry {
    /// Creates an empty registry over the injected collaborators.
    #[must_use]
    pub fn new(
        pipelines: Arc<PipelineRepository>,
        steps: Arc<StepRepository>,
        events: Arc<EventStore>,
        notifier: Arc<NotificationDispatcher>,
        settings: ListenerSettings,
    ) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            pipelines,
            steps,
            events,
            notifier,
            settings,
        }
    }

    /// Starts monitoring a pipeline. Idempotent: a second call for the
    /// same pipeline id returns immediately.
    ///
    /// Fire-and-forget: configuration problems (no steps, unextractable
    /// connection info, unknown tool) and step-read failures are logged
    /// and the listener simply does not start. Callers are never failed
    /// by monitoring trouble.
    pub async fn start_listener(&self, pipeline_id: i32) {
        let mut listeners = self.listeners.lock().await;
        if listeners.contains_key(&pipeline_id) {
            tracing::debug!(pipeline_id, "pipeline already monitored");
            return;
        }

        let steps = match self.steps.steps_for_pipeline(pipeline_id).await {
            Ok(steps) => steps,
            Err(e) => {
                tracing::warn!(
                    pipeline_id,
                    error = %e,
                    "could not read pipeline steps; monitoring not started"
                );
                return;
            }
        };

        let step_configs: Vec<serde_json::Value> =
            steps.into_iter().map(|step| step.step_config).collect();
        let config = match MonitoringConfig::from_step_configs(pipeline_id, &step_configs) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(pipeline_id, error = %e, "monitoring not started");
                return;
            }
        };

        let listener = self.build_listener(config);
        listener.start().await;
        listeners.insert(pipeline_id, listener);
        tracing::info!(pipeline_id, "schema change listener registered");
    }

    /// Stops and removes the pipeline's listener. No-op when none is
    /// registered.
    pub async fn stop_listener(&self, pipeline_id: i32) {
        let removed = self.listeners.lock().await.remove(&pipeline_id);
        match removed {
            Some(listener) => {
                listener.stop().await;
                tracing::info!(pipeline_id, "schema change listener removed");
            }
            None => {
                tracing::debug!(pipeline_id, "no listener registered for pipeline");
            }
        }
    }

    /// Restores listeners for every monitorable pipeline. Run once at
    /// process startup.
    ///
    /// Deleted and broken pipelines are excluded by the repository
    /// query. Listener startup only spawns a task, so restoration never
    /// blocks on an unreachable source database.
    pub async fn restore_all_listeners(&self) {
        let pipeline_ids = match self.pipelines.monitorable_pipeline_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "could not list pipelines; restoration skipped");
                return;
            }
        };

        tracing::info!(count = pipeline_ids.len(), "restoring schema change listeners");
        for pipeline_id in pipeline_ids {
            self.start_listener(pipeline_id).await;
        }
    }

    /// Stops every registered listener. Called before the shared
    /// connection pool is torn down at process exit.
    pub async fn shutdown(&self) {
        let drained: Vec<(i32, ToolListener)> = {
            let mut listeners = self.listeners.lock().await;
            listeners.drain().collect()
        };

        for (pipeline_id, listener) in drained {
            listener.stop().await;
            tracing::info!(pipeline_id, "listener stopped during shutdown");
        }
    }

    /// Number of currently registered listeners.
    pub async fn active_count(&self) -> usize {
        self.listeners.lock().await.len()
    }

    /// Whether a listener is registered for the pipeline.
    pub async fn is_registered(&self, pipeline_id: i32) -> bool {
        self.listeners.lock().await.contains_key(&pipeline_id)
    }

    /// Constructs the listener implementation for the config's tool.
    fn build_listener(&self, config: MonitoringConfig) -> ToolListener {
        match config.tool {
            ToolKind::Postgres => ToolListener::Postgres(Arc::new(PostgresChangeListener::new(
                config,
                self.settings.clone(),
                Arc::clone(&self.events),
                Arc::clone(&self.pipelines),
                Arc::clone(&self.notifier),
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::EmailSettings;
    use crate::domain::SourceDbConfig;
    use crate::listener::ListenerState;
    use crate::notify::EmailSender;
    use crate::persistence::{AccessRepository, UserRepository};

    /// Registry wired to an unreachable application database: every
    /// repository call fails fast with a connection error.
    fn unreachable_registry() -> ListenerRegistry {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(250))
            .connect_lazy_with(
                sqlx::postgres::PgConnectOptions::new()
                    .host("127.0.0.1")
                    .port(1)
                    .database("app")
                    .username("app")
                    .password("app"),
            );
        let email = EmailSettings {
            smtp_host: "127.0.0.1".to_string(),
            smtp_port: 2525,
            smtp_username: "sentinel@example.com".to_string(),
            smtp_password: String::new(),
            use_tls: false,
        };
        let Ok(mailer) = EmailSender::from_settings(&email) else {
            panic!("mail transport should build without connecting");
        };
        let notifier = Arc::new(NotificationDispatcher::new(
            Arc::new(UserRepository::new(pool.clone())),
            Arc::new(AccessRepository::new(pool.clone())),
            mailer,
        ));
        ListenerRegistry::new(
            Arc::new(PipelineRepository::new(pool.clone())),
            Arc::new(StepRepository::new(pool.clone())),
            Arc::new(EventStore::new(pool)),
            notifier,
            ListenerSettings {
                poll_interval: Duration::from_millis(50),
                reconnect_delay: Duration::from_millis(50),
                setup_timeout: Duration::from_millis(250),
                stop_timeout: Duration::from_secs(2),
                channel: "schema_changes".to_string(),
            },
        )
    }

    fn stopped_listener(registry: &ListenerRegistry, pipeline_id: i32) -> ToolListener {
        registry.build_listener(MonitoringConfig {
            pipeline_id,
            tool: ToolKind::Postgres,
            db: SourceDbConfig {
                host: "127.0.0.1".to_string(),
                port: 1,
                dbname: "source".to_string(),
                user: "source".to_string(),
                password: "source".to_string(),
            },
            schema: "public".to_string(),
            tables: Vec::new(),
        })
    }

    #[tokio::test]
    async fn start_listener_without_readable_steps_registers_nothing() {
        let registry = unreachable_registry();
        registry.start_listener(42).await;
        assert_eq!(registry.active_count().await, 0);
        assert!(!registry.is_registered(42).await);
    }

    #[tokio::test]
    async fn stop_listener_on_unregistered_pipeline_is_a_no_op() {
        let registry = unreachable_registry();
        registry.stop_listener(99).await;
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn second_start_for_registered_pipeline_returns_immediately() {
        let registry = unreachable_registry();
        let listener = stopped_listener(&registry, 7);
        registry.listeners.lock().await.insert(7, listener);

        // The map already holds pipeline 7, so this start must return
        // before touching the (unreachable) step repository.
        registry.start_listener(7).await;

        assert_eq!(registry.active_count().await, 1);
        let listeners = registry.listeners.lock().await;
        let Some(listener) = listeners.get(&7) else {
            panic!("listener disappeared from registry");
        };
        assert_eq!(listener.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn shutdown_drains_every_listener() {
        let registry = unreachable_registry();
        {
            let mut listeners = registry.listeners.lock().await;
            listeners.insert(1, stopped_listener(&registry, 1));
            listeners.insert(2, stopped_listener(&registry, 2));
        }
        assert_eq!(registry.active_count().await, 2);

        registry.shutdown().await;
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn build_listener_selects_postgres_implementation() {
        let registry = unreachable_registry();
        let listener = stopped_listener(&registry, 3);
        assert_eq!(listener.tool(), ToolKind::Postgres);
        assert_eq!(listener.pipeline_id(), 3);
        assert_eq!(listener.state(), ListenerState::Stopped);
    }
}
