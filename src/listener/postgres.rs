//! Postgres change listener: one background task per monitored pipeline.
//!
//! Each listener owns a single connection to the pipeline's source
//! database for its entire session, provisions a server-side DDL event
//! trigger, and consumes JSON notifications from a LISTEN/NOTIFY
//! channel. Any driver error routes through a fixed-delay reconnect;
//! retries are unbounded and an unreachable source yields a quiet retry
//! loop, never a crash.

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgListener, PgPoolOptions};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::config::ListenerSettings;
use crate::domain::{MonitoringConfig, PreparedChange};
use crate::error::SentinelError;
use crate::notify::NotificationDispatcher;
use crate::persistence::{EventStore, PipelineRepository};

use super::ListenerState;

/// Schema change listener for Postgres-family sources.
///
/// Created by the registry, which enforces at most one instance per
/// pipeline id. `start` spawns the run loop as an independent task;
/// `stop` signals it and joins with a bounded timeout.
#[derive(Debug)]
pub struct PostgresChangeListener {
    core: Arc<ListenerCore>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Everything the run loop needs, shared between the handle and the
/// spawned task.
#[derive(Debug)]
struct ListenerCore {
    config: MonitoringConfig,
    settings: ListenerSettings,
    channel: String,
    events: Arc<EventStore>,
    pipelines: Arc<PipelineRepository>,
    notifier: Arc<NotificationDispatcher>,
    stop_tx: watch::Sender<bool>,
    state_tx: watch::Sender<ListenerState>,
}

impl PostgresChangeListener {
    /// Creates a stopped listener for the given monitoring config.
    #[must_use]
    pub fn new(
        config: MonitoringConfig,
        settings: ListenerSettings,
        events: Arc<EventStore>,
        pipelines: Arc<PipelineRepository>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        let channel = sanitize_channel(&settings.channel);
        let (stop_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(ListenerState::Stopped);
        Self {
            core: Arc::new(ListenerCore {
                config,
                settings,
                channel,
                events,
                pipelines,
                notifier,
                stop_tx,
                state_tx,
            }),
            task: Mutex::new(None),
        }
    }

    /// The pipeline this listener monitors.
    #[must_use]
    pub fn pipeline_id(&self) -> i32 {
        self.core.config.pipeline_id
    }

    /// The notification channel this listener subscribes to: the
    /// configured base name with non-alphanumeric characters stripped.
    ///
    /// Listeners sharing a source database and a channel base receive
    /// each other's notifications; each records them under its own
    /// pipeline id. Kept as baseline behavior.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.core.channel
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ListenerState {
        *self.core.state_tx.borrow()
    }

    /// Spawns the run loop as a background task. No-op if the task is
    /// already running.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                tracing::debug!(
                    pipeline_id = self.core.config.pipeline_id,
                    "change listener already running"
                );
                return;
            }
        }

        self.core.stop_tx.send_replace(false);
        let core = Arc::clone(&self.core);
        *task = Some(tokio::spawn(async move { core.run().await }));
        tracing::info!(
            pipeline_id = self.core.config.pipeline_id,
            channel = %self.core.channel,
            "change listener started"
        );
    }

    /// Signals the run loop to stop and joins it, bounded by the
    /// configured stop timeout; the task is aborted if the timeout
    /// elapses. Idempotent.
    pub async fn stop(&self) {
        self.core.stop_tx.send_replace(true);

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.core.settings.stop_timeout, handle)
                .await
                .is_err()
            {
                tracing::warn!(
                    pipeline_id = self.core.config.pipeline_id,
                    "listener did not stop within the join timeout; aborting"
                );
                abort.abort();
            }
        }

        self.core.set_state(ListenerState::Stopped);
        tracing::info!(
            pipeline_id = self.core.config.pipeline_id,
            "change listener stopped"
        );
    }
}

impl ListenerCore {
    fn set_state(&self, state: ListenerState) {
        self.state_tx.send_replace(state);
    }

    fn stopped(&self, stop_rx: &watch::Receiver<bool>) -> bool {
        *stop_rx.borrow()
    }

    /// Outer loop: one session per connection, fixed-delay reconnect on
    /// any session error, until the stop signal is observed.
    async fn run(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        loop {
            if self.stopped(&stop_rx) {
                break;
            }
            match self.run_session(&mut stop_rx).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::error!(
                        pipeline_id = self.config.pipeline_id,
                        error = %e,
                        delay = ?self.settings.reconnect_delay,
                        "listener session failed; reconnecting"
                    );
                    self.set_state(ListenerState::Reconnecting);
                    // Stop-aware sleep: wakes early when stop is signaled.
                    let _ = tokio::time::timeout(self.settings.reconnect_delay, stop_rx.changed())
                        .await;
                }
            }
        }
        self.set_state(ListenerState::Stopped);
    }

    /// One connection's lifetime: connect, provision, listen. Returns
    /// `Ok(())` only when the stop signal was observed.
    async fn run_session(
        &self,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), SentinelError> {
        self.set_state(ListenerState::Connecting);

        let pool = tokio::time::timeout(self.settings.setup_timeout, self.open_source_pool())
            .await
            .map_err(|_| {
                SentinelError::Connection("timed out connecting to source database".to_string())
            })??;

        let session = self.listen_on(&pool, stop_rx).await;
        pool.close().await;
        session
    }

    /// Opens the listener's single source-database connection.
    async fn open_source_pool(&self) -> Result<PgPool, SentinelError> {
        let options = PgConnectOptions::new()
            .host(&self.config.db.host)
            .port(self.config.db.port)
            .database(&self.config.db.dbname)
            .username(&self.config.db.user)
            .password(&self.config.db.password);

        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.settings.setup_timeout)
            .connect_with(options)
            .await
            .map_err(|e| SentinelError::connection(&e))
    }

    /// Provisions the event trigger, subscribes to the channel, and
    /// consumes notifications until stop or error.
    async fn listen_on(
        &self,
        pool: &PgPool,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), SentinelError> {
        tokio::time::timeout(self.settings.setup_timeout, self.provision_event_trigger(pool))
            .await
            .map_err(|_| {
                SentinelError::Connection("timed out provisioning event trigger".to_string())
            })??;

        let mut listener = PgListener::connect_with(pool)
            .await
            .map_err(|e| SentinelError::connection(&e))?;
        listener
            .listen(&self.channel)
            .await
            .map_err(|e| SentinelError::connection(&e))?;

        self.set_state(ListenerState::Listening);
        tracing::info!(
            pipeline_id = self.config.pipeline_id,
            channel = %self.channel,
            "listening for schema change notifications"
        );

        loop {
            if self.stopped(stop_rx) {
                return Ok(());
            }
            // The bounded wait doubles as the stop-signal checkpoint.
            match tokio::time::timeout(self.settings.poll_interval, listener.recv()).await {
                Err(_elapsed) => continue,
                Ok(Ok(notification)) => self.handle_notification(notification.payload()).await,
                Ok(Err(e)) => return Err(SentinelError::connection(&e)),
            }
        }
    }

    /// Installs the DDL notification function and its guarded event
    /// trigger on the source database.
    async fn provision_event_trigger(&self, pool: &PgPool) -> Result<(), SentinelError> {
        let (function_sql, trigger_sql) =
            provisioning_sql(&self.config.schema, &self.channel, &self.config.tables);

        sqlx::raw_sql(&function_sql)
            .execute(pool)
            .await
            .map_err(|e| SentinelError::connection(&e))?;
        sqlx::raw_sql(&trigger_sql)
            .execute(pool)
            .await
            .map_err(|e| SentinelError::connection(&e))?;

        if self.config.tables.is_empty() {
            tracing::info!(
                pipeline_id = self.config.pipeline_id,
                schema = %self.config.schema,
                "event trigger configured; monitoring all tables in schema"
            );
        } else {
            tracing::info!(
                pipeline_id = self.config.pipeline_id,
                schema = %self.config.schema,
                tables = ?self.config.tables,
                "event trigger configured; monitoring listed tables"
            );
        }
        Ok(())
    }

    /// The per-event pipeline: decode, classify, persist, notify, and
    /// on a breaking change mark the pipeline broken. Strictly
    /// sequential; failures in one stage are logged and do not block
    /// the others.
    async fn handle_notification(&self, payload: &str) {
        let pipeline_id = self.config.pipeline_id;

        let prepared = match PreparedChange::from_wire(payload) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::error!(pipeline_id, error = %e, "dropping undecodable notification");
                return;
            }
        };

        tracing::info!(
            pipeline_id,
            command_tag = %prepared.event.command_tag,
            object = %prepared.event.object_identity,
            breaking = prepared.change_type.is_breaking(),
            "schema change received"
        );

        // Pipeline name is decoration for the notification body.
        let pipeline_name = match self.pipelines.get_pipeline(pipeline_id).await {
            Ok(pipeline) => pipeline.name,
            Err(e) => {
                tracing::error!(pipeline_id, error = %e, "could not load pipeline details");
                "N/A".to_string()
            }
        };

        let stored = prepared.stored_payload();
        if let Err(e) = self
            .events
            .add_event(pipeline_id, prepared.change_type, &stored)
            .await
        {
            tracing::error!(pipeline_id, error = %e, "failed to record schema change event");
        }

        if let Err(e) = self
            .notifier
            .notify_schema_change(
                pipeline_id,
                &pipeline_name,
                &prepared.message,
                prepared.change_type.is_breaking(),
            )
            .await
        {
            tracing::error!(pipeline_id, error = %e, "failed to dispatch schema change notification");
        }

        if prepared.change_type.is_breaking() {
            tracing::warn!(pipeline_id, "breaking change detected; marking pipeline broken");
            match self.pipelines.mark_broken(pipeline_id).await {
                Ok(true) => tracing::info!(pipeline_id, "pipeline marked broken"),
                Ok(false) => {
                    tracing::warn!(pipeline_id, "no pipeline found to mark broken");
                }
                Err(e) => {
                    tracing::error!(pipeline_id, error = %e, "failed to mark pipeline broken");
                }
            }
        }
    }
}

/// Strips every non-alphanumeric character from the channel base name.
#[must_use]
pub fn sanitize_channel(base: &str) -> String {
    base.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Builds the two provisioning statements: the notification function
/// and the guarded event trigger. The function filters captured DDL
/// commands by the fully-qualified table allow-list, or by schema name
/// when no allow-list is configured, and emits the JSON payload on the
/// given channel.
fn provisioning_sql(schema: &str, channel: &str, tables: &[String]) -> (String, String) {
    let safe_schema: String = schema.chars().filter(|c| c.is_alphanumeric()).collect();
    let function_name = format!("notify_ddl_change_{safe_schema}");
    let trigger_name = format!("ddl_notify_trigger_{safe_schema}");

    let tables_filter = if tables.is_empty() {
        format!("AND obj.schema_name = '{schema}'")
    } else {
        let identities: Vec<String> = tables.iter().map(|t| format!("'{schema}.{t}'")).collect();
        format!("AND obj.object_identity IN ({})", identities.join(", "))
    };

    let function_sql = format!(
        "CREATE OR REPLACE FUNCTION {function_name}() RETURNS event_trigger AS $$\n\
         DECLARE\n\
             obj record;\n\
             payload json;\n\
         BEGIN\n\
             FOR obj IN SELECT * FROM pg_event_trigger_ddl_commands() LOOP\n\
                 IF TRUE {tables_filter} THEN\n\
                     payload = json_build_object(\n\
                         'command_tag', obj.command_tag,\n\
                         'schema_name', obj.schema_name,\n\
                         'object_type', obj.object_type,\n\
                         'object_identity', obj.object_identity,\n\
                         'in_extension', obj.in_extension,\n\
                         'command', current_query()\n\
                     );\n\
                     PERFORM pg_notify('{channel}', payload::text);\n\
                 END IF;\n\
             END LOOP;\n\
         END;\n\
         $$ LANGUAGE plpgsql;"
    );

    let trigger_sql = format!(
        "DO $$\n\
         BEGIN\n\
             IF NOT EXISTS (\n\
                 SELECT 1 FROM pg_event_trigger WHERE evtname = '{trigger_name}'\n\
             ) THEN\n\
                 EXECUTE 'CREATE EVENT TRIGGER {trigger_name}\n\
                          ON ddl_command_end\n\
                          WHEN TAG IN (''ALTER TABLE'', ''CREATE TABLE'', ''DROP TABLE'')\n\
                          EXECUTE FUNCTION {function_name}();';\n\
             END IF;\n\
         END$$;"
    );

    (function_sql, trigger_sql)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::EmailSettings;
    use crate::domain::{SourceDbConfig, ToolKind};
    use crate::notify::EmailSender;
    use crate::persistence::{AccessRepository, UserRepository};

    #[test]
    fn sanitize_channel_strips_non_alphanumerics() {
        assert_eq!(sanitize_channel("schema_changes"), "schemachanges");
        assert_eq!(sanitize_channel("my-channel.01"), "mychannel01");
        assert_eq!(sanitize_channel("plain"), "plain");
    }

    #[test]
    fn provisioning_sql_filters_by_schema_without_allow_list() {
        let (function_sql, trigger_sql) = provisioning_sql("analytics", "schemachanges", &[]);
        assert!(function_sql.contains("CREATE OR REPLACE FUNCTION notify_ddl_change_analytics()"));
        assert!(function_sql.contains("AND obj.schema_name = 'analytics'"));
        assert!(function_sql.contains("pg_notify('schemachanges'"));
        assert!(trigger_sql.contains("ddl_notify_trigger_analytics"));
        assert!(trigger_sql.contains("IF NOT EXISTS"));
        assert!(trigger_sql.contains("''ALTER TABLE'', ''CREATE TABLE'', ''DROP TABLE''"));
    }

    #[test]
    fn provisioning_sql_filters_by_qualified_identities_with_allow_list() {
        let tables = vec!["orders".to_string(), "customers".to_string()];
        let (function_sql, _) = provisioning_sql("public", "schemachanges", &tables);
        assert!(
            function_sql
                .contains("AND obj.object_identity IN ('public.orders', 'public.customers')")
        );
        assert!(!function_sql.contains("obj.schema_name = 'public'"));
    }

    #[test]
    fn provisioning_sql_sanitizes_object_names() {
        let (function_sql, trigger_sql) = provisioning_sql("my-schema", "chan", &[]);
        assert!(function_sql.contains("notify_ddl_change_myschema"));
        assert!(trigger_sql.contains("ddl_notify_trigger_myschema"));
        // The filter itself still uses the schema name as configured.
        assert!(function_sql.contains("obj.schema_name = 'my-schema'"));
    }

    fn unreachable_listener(settings: ListenerSettings) -> PostgresChangeListener {
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
        let notifier = NotificationDispatcher::new(
            Arc::new(UserRepository::new(pool.clone())),
            Arc::new(AccessRepository::new(pool.clone())),
            mailer,
        );
        let config = MonitoringConfig {
            pipeline_id: 1,
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
        };
        PostgresChangeListener::new(
            config,
            settings,
            Arc::new(EventStore::new(pool.clone())),
            Arc::new(PipelineRepository::new(pool)),
            Arc::new(notifier),
        )
    }

    fn fast_settings() -> ListenerSettings {
        ListenerSettings {
            poll_interval: Duration::from_millis(50),
            reconnect_delay: Duration::from_millis(50),
            setup_timeout: Duration::from_millis(250),
            stop_timeout: Duration::from_secs(2),
            channel: "schema_changes".to_string(),
        }
    }

    #[tokio::test]
    async fn listener_starts_in_stopped_state() {
        let listener = unreachable_listener(fast_settings());
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert_eq!(listener.channel(), "schemachanges");
        assert_eq!(listener.pipeline_id(), 1);
    }

    #[tokio::test]
    async fn unreachable_source_retries_until_stopped() {
        let listener = unreachable_listener(fast_settings());
        listener.start().await;

        // Give the task a few connect/reconnect cycles.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let state = listener.state();
        assert!(
            matches!(state, ListenerState::Connecting | ListenerState::Reconnecting),
            "expected an active retry state, got {state}"
        );

        // Starting again while running is a no-op.
        listener.start().await;

        listener.stop().await;
        assert_eq!(listener.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let listener = unreachable_listener(fast_settings());
        listener.stop().await;
        assert_eq!(listener.state(), ListenerState::Stopped);
    }
}
