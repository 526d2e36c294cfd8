//! Central error type for the schema change detection engine.
//!
//! [`SentinelError`] mirrors the failure taxonomy of the subsystem:
//! configuration problems keep a listener from starting, connection
//! problems are retried forever, decode problems drop a single
//! notification, and persistence/notification problems are logged
//! without interrupting each other.

/// Error enum covering every failure class in the subsystem.
///
/// Most variants are *handled* rather than surfaced: the listener
/// machinery logs them and keeps running. Only the synchronous query
/// surface and process bootstrap propagate errors to callers.
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    /// Monitoring configuration could not be derived from a pipeline's
    /// step configuration (missing connection info, schema, etc.).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The step configuration names a schema-change tool with no
    /// registered listener implementation.
    #[error("no schema change listener implemented for tool: {0}")]
    UnknownTool(String),

    /// Driver or network failure while connecting to, provisioning, or
    /// listening on a pipeline's source database. Always retried after
    /// a fixed delay.
    #[error("source connection error: {0}")]
    Connection(String),

    /// A delivered notification payload could not be decoded. The
    /// notification is dropped; the listener continues.
    #[error("payload decode error: {0}")]
    Decode(String),

    /// Application-database failure (event log, pipeline/step/user
    /// repositories).
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Email transport failure. Per-recipient; never blocks delivery to
    /// the remaining recipients.
    #[error("notification error: {0}")]
    Notification(String),

    /// No pipeline row exists for the given id.
    #[error("pipeline not found: {0}")]
    PipelineNotFound(i32),
}

impl SentinelError {
    /// Wraps a database error from the application database.
    #[must_use]
    pub fn persistence(err: &sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Wraps a database error from a pipeline's source database.
    #[must_use]
    pub fn connection(err: &sqlx::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_tool_name() {
        let err = SentinelError::UnknownTool("mysql".to_string());
        assert_eq!(
            err.to_string(),
            "no schema change listener implemented for tool: mysql"
        );
    }

    #[test]
    fn display_includes_pipeline_id() {
        let err = SentinelError::PipelineNotFound(42);
        assert_eq!(err.to_string(), "pipeline not found: 42");
    }
}
