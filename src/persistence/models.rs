//! Database models for pipelines, steps, and schema change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ChangeType;
use crate::error::SentinelError;

/// Lifecycle status of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Scheduled and executing normally.
    Running,
    /// Created but not currently scheduled.
    Stopped,
    /// Taken out of scheduling after a breaking schema change.
    Broken,
}

impl PipelineStatus {
    /// Storage representation, matching the `pipelines.status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Broken => "broken",
        }
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "broken" => Ok(Self::Broken),
            other => Err(SentinelError::Persistence(format!(
                "unknown pipeline status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline row from the `pipelines` table.
#[derive(Debug, Clone, Serialize)]
pub struct Pipeline {
    /// Primary key.
    pub pipeline_id: i32,
    /// Display name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Current lifecycle status.
    pub status: PipelineStatus,
    /// Owning user id.
    pub created_by: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A step row from the `pipeline_steps` table.
///
/// `step_config` is the tool-specific JSON blob monitoring configuration
/// is derived from.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    /// Primary key.
    pub step_id: i32,
    /// Owning pipeline.
    pub pipeline_id: i32,
    /// Position within the pipeline; the first step carries the source
    /// connection details.
    pub step_order: i32,
    /// Tool-specific configuration.
    pub step_config: serde_json::Value,
}

/// A stored schema change event from the `schema_change` table.
///
/// Immutable once created; never updated or deleted by this subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaChangeEvent {
    /// Auto-increment row id.
    pub id: i64,
    /// Pipeline the change was observed for.
    pub pipeline_id: i32,
    /// Receipt time, assigned by the database.
    pub event_time: DateTime<Utc>,
    /// Breaking/non-breaking classification.
    pub change_type: ChangeType,
    /// Raw DDL event augmented with `human_readable_message` and
    /// `is_breaking`.
    pub payload: serde_json::Value,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_status_round_trips_through_storage_form() {
        for status in [
            PipelineStatus::Running,
            PipelineStatus::Stopped,
            PipelineStatus::Broken,
        ] {
            let Ok(parsed) = status.as_str().parse::<PipelineStatus>() else {
                panic!("round trip failed for {status}");
            };
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("paused".parse::<PipelineStatus>().is_err());
    }
}
