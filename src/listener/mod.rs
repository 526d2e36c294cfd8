//! Change listeners: per-pipeline background tasks watching a source
//! database for DDL changes.
//!
//! [`registry::ListenerRegistry`] supervises the fleet; one
//! [`postgres::PostgresChangeListener`] task exists per monitored
//! pipeline. [`ToolListener`] is the closed set of listener
//! implementations, selected by the `schema_change_tool` named in a
//! pipeline's step configuration.

pub mod postgres;
pub mod registry;

use std::sync::Arc;

use crate::domain::ToolKind;

pub use postgres::PostgresChangeListener;
pub use registry::ListenerRegistry;

/// Lifecycle state of one change listener.
///
/// `Stopped` is both initial and terminal; any I/O error in an active
/// state routes through `Reconnecting` back to `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not running.
    Stopped,
    /// Opening a connection and provisioning the event trigger.
    Connecting,
    /// Subscribed and waiting for notifications.
    Listening,
    /// Connection lost; sleeping out the fixed delay before retrying.
    Reconnecting,
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Connecting => "connecting",
            Self::Listening => "listening",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// The closed, registered set of listener implementations, keyed by
/// [`ToolKind`]. Adding a tool means adding a variant here and an arm
/// to each match below.
#[derive(Debug, Clone)]
pub enum ToolListener {
    /// Postgres-family listener using event triggers and LISTEN/NOTIFY.
    Postgres(Arc<PostgresChangeListener>),
}

impl ToolListener {
    /// The pipeline this listener monitors.
    #[must_use]
    pub fn pipeline_id(&self) -> i32 {
        match self {
            Self::Postgres(listener) => listener.pipeline_id(),
        }
    }

    /// The tool this listener implements.
    #[must_use]
    pub const fn tool(&self) -> ToolKind {
        match self {
            Self::Postgres(_) => ToolKind::Postgres,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ListenerState {
        match self {
            Self::Postgres(listener) => listener.state(),
        }
    }

    /// Starts the listener's background task. No-op if already running.
    pub async fn start(&self) {
        match self {
            Self::Postgres(listener) => listener.start().await,
        }
    }

    /// Stops the listener and waits (bounded) for its task to exit.
    pub async fn stop(&self) {
        match self {
            Self::Postgres(listener) => listener.stop().await,
        }
    }
}
