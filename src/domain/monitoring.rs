//! Monitoring configuration derived from a pipeline's step configuration.
//!
//! A pipeline's first step carries the connection details of the source
//! database it ingests from; [`MonitoringConfig::from_step_configs`]
//! extracts them using a fixed precedence of config shapes. The config is
//! derived on demand and never persisted.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::SentinelError;

/// The closed set of schema-change tools with a listener implementation.
///
/// Parsing an unknown tool string is a typed configuration error, not a
/// silent map miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Postgres-family sources monitored via event triggers and
    /// LISTEN/NOTIFY.
    Postgres,
}

impl ToolKind {
    /// Canonical tool identifier as written in step configurations.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
        }
    }
}

impl std::str::FromStr for ToolKind {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            other => Err(SentinelError::UnknownTool(other.to_string())),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters for a pipeline's source database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDbConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub dbname: String,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
}

/// Everything a change listener needs to monitor one pipeline's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringConfig {
    /// Owning pipeline.
    pub pipeline_id: i32,
    /// Listener implementation selector.
    pub tool: ToolKind,
    /// Source database connection parameters.
    pub db: SourceDbConfig,
    /// Schema to monitor.
    pub schema: String,
    /// Explicit table allow-list; when empty, the whole schema is
    /// monitored.
    pub tables: Vec<String>,
}

impl MonitoringConfig {
    /// Derives a monitoring configuration from a pipeline's ordered step
    /// configurations.
    ///
    /// The first step selects the tool (`schema_change_tool`) and the
    /// connection details: `connection_config.source`, else
    /// `connection_config.extractor`, else flat top-level
    /// `host/dbname/user/password/port/schema` fields. The monitored
    /// schema resolves `target_schema`, else the nested object's
    /// `schema`, else the top-level `schema`. The table allow-list is
    /// the union of every step's `table_sync_config` or `tables` array.
    ///
    /// # Errors
    ///
    /// [`SentinelError::Configuration`] when no step exists, no tool is
    /// named, or connection details cannot be extracted;
    /// [`SentinelError::UnknownTool`] when the named tool has no
    /// listener implementation.
    pub fn from_step_configs(
        pipeline_id: i32,
        step_configs: &[Value],
    ) -> Result<Self, SentinelError> {
        let first = step_configs.first().ok_or_else(|| {
            SentinelError::Configuration(format!("pipeline {pipeline_id} has no steps"))
        })?;

        let tool = first
            .get("schema_change_tool")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SentinelError::Configuration(format!(
                    "pipeline {pipeline_id}: first step names no schema_change_tool"
                ))
            })?
            .parse::<ToolKind>()?;

        let (db, schema) = extract_db_config_and_schema(first).ok_or_else(|| {
            SentinelError::Configuration(format!(
                "pipeline {pipeline_id}: could not extract source connection config"
            ))
        })?;

        Ok(Self {
            pipeline_id,
            tool,
            db,
            schema,
            tables: extract_tables(step_configs),
        })
    }
}

/// Connection details and monitored schema from one step config, trying
/// the nested shape first and the flat shape second.
fn extract_db_config_and_schema(config: &Value) -> Option<(SourceDbConfig, String)> {
    let conn_conf = config.get("connection_config");
    let db_info = conn_conf
        .and_then(|c| c.get("source"))
        .or_else(|| conn_conf.and_then(|c| c.get("extractor")));

    if let Some(db_info) = db_info {
        let db = SourceDbConfig {
            host: get_str(db_info, "host")?.to_string(),
            port: get_port(db_info)?,
            dbname: get_str(db_info, "database")
                .or_else(|| get_str(db_info, "dbname"))?
                .to_string(),
            user: get_str(db_info, "username")
                .or_else(|| get_str(db_info, "user"))?
                .to_string(),
            password: get_str(db_info, "password")?.to_string(),
        };
        let schema = get_str(config, "target_schema")
            .or_else(|| get_str(db_info, "schema"))
            .or_else(|| get_str(config, "schema"))?
            .to_string();
        return Some((db, schema));
    }

    // Flat shape: every field must be present at the top level.
    let db = SourceDbConfig {
        host: get_str(config, "host")?.to_string(),
        port: get_port(config)?,
        dbname: get_str(config, "dbname")?.to_string(),
        user: get_str(config, "user")?.to_string(),
        password: get_str(config, "password")?.to_string(),
    };
    let schema = get_str(config, "schema")?.to_string();
    Some((db, schema))
}

/// Union of every step's monitored-table declarations, deduplicated and
/// sorted for deterministic trigger provisioning.
fn extract_tables(step_configs: &[Value]) -> Vec<String> {
    let mut tables = BTreeSet::new();
    for config in step_configs {
        let declared = config
            .get("table_sync_config")
            .or_else(|| config.get("tables"));
        if let Some(Value::Array(entries)) = declared {
            for entry in entries {
                if let Some(name) = entry.as_str() {
                    tables.insert(name.to_string());
                }
            }
        }
    }
    tables.into_iter().collect()
}

fn get_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Accepts the port as a JSON number or a numeric string.
fn get_port(value: &Value) -> Option<u16> {
    match value.get("port")? {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
