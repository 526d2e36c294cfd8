//! Raw DDL event wire type and its classified, storage-ready form.
//!
//! The event-trigger function installed on a monitored database emits a
//! JSON notification per captured DDL command. [`RawDdlEvent`] is that
//! wire shape; [`PreparedChange`] is the result of running one event
//! through classification and summarization.

use serde::{Deserialize, Serialize};

use crate::error::SentinelError;

use super::classifier;
use super::message;

/// One DDL command as delivered on the notification channel.
///
/// Only `command_tag` is required on the wire; every other field defaults
/// when absent so a partially populated payload still decodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDdlEvent {
    /// Postgres command tag, e.g. `"ALTER TABLE"`.
    pub command_tag: String,
    /// Schema containing the affected object.
    #[serde(default)]
    pub schema_name: String,
    /// Object type reported by the event trigger (e.g. `"table"`).
    #[serde(default)]
    pub object_type: String,
    /// Fully qualified identity, e.g. `"public.orders"`.
    #[serde(default)]
    pub object_identity: String,
    /// Whether the command ran inside an extension script.
    #[serde(default)]
    pub in_extension: bool,
    /// Full text of the DDL command that fired the trigger.
    #[serde(default)]
    pub command: String,
}

impl RawDdlEvent {
    /// Returns the bare table name from `object_identity`, stripping any
    /// schema qualifier.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.object_identity
            .rsplit('.')
            .next()
            .unwrap_or(&self.object_identity)
    }
}

/// Whether a schema change is expected to invalidate dependent pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Likely to break downstream pipeline logic (rename, type change).
    Breaking,
    /// Additive or otherwise tolerated change.
    NonBreaking,
}

impl ChangeType {
    /// Storage representation, matching the `schema_change.change_type`
    /// column values.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Breaking => "breaking",
            Self::NonBreaking => "non_breaking",
        }
    }

    /// Returns `true` for [`ChangeType::Breaking`].
    #[must_use]
    pub const fn is_breaking(self) -> bool {
        matches!(self, Self::Breaking)
    }
}

impl std::str::FromStr for ChangeType {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breaking" => Ok(Self::Breaking),
            "non_breaking" => Ok(Self::NonBreaking),
            other => Err(SentinelError::Persistence(format!(
                "unknown change type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded notification after classification and summarization, ready
/// for persistence and delivery.
#[derive(Debug, Clone)]
pub struct PreparedChange {
    /// The decoded wire event.
    pub event: RawDdlEvent,
    /// Breaking/non-breaking classification.
    pub change_type: ChangeType,
    /// One-sentence description of the change.
    pub message: String,
}

impl PreparedChange {
    /// Decodes a notification payload and runs it through the classifier
    /// and message generator.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Decode`] when the payload is not valid
    /// JSON for [`RawDdlEvent`]. The caller logs and drops the single
    /// notification; a decode failure never stops a listener.
    pub fn from_wire(payload: &str) -> Result<Self, SentinelError> {
        let event: RawDdlEvent = serde_json::from_str(payload)
            .map_err(|e| SentinelError::Decode(e.to_string()))?;

        let change_type = if classifier::is_breaking(&event) {
            ChangeType::Breaking
        } else {
            ChangeType::NonBreaking
        };
        let message = message::human_readable_message(&event);

        Ok(Self {
            event,
            change_type,
            message,
        })
    }

    /// Builds the JSON payload persisted for this change: the raw event
    /// augmented with the generated message and the breaking flag.
    #[must_use]
    pub fn stored_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "command_tag": self.event.command_tag,
            "schema_name": self.event.schema_name,
            "object_type": self.event.object_type,
            "object_identity": self.event.object_identity,
            "in_extension": self.event.in_extension,
            "command": self.event.command,
            "human_readable_message": self.message,
            "is_breaking": self.change_type.is_breaking(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_wire_payload() {
        let payload = r#"{
            "command_tag": "ALTER TABLE",
            "schema_name": "public",
            "object_type": "table",
            "object_identity": "public.orders",
            "in_extension": false,
            "command": "ALTER TABLE orders RENAME COLUMN qty TO quantity"
        }"#;
        let Ok(prepared) = PreparedChange::from_wire(payload) else {
            panic!("expected payload to decode");
        };
        assert_eq!(prepared.event.command_tag, "ALTER TABLE");
        assert_eq!(prepared.change_type, ChangeType::Breaking);
    }

    #[test]
    fn missing_optional_fields_default() {
        let payload = r#"{"command_tag": "CREATE TABLE"}"#;
        let Ok(prepared) = PreparedChange::from_wire(payload) else {
            panic!("expected payload to decode");
        };
        assert_eq!(prepared.event.schema_name, "");
        assert!(!prepared.event.in_extension);
        assert_eq!(prepared.change_type, ChangeType::NonBreaking);
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let result = PreparedChange::from_wire("not json at all");
        assert!(matches!(result, Err(SentinelError::Decode(_))));
    }

    #[test]
    fn missing_command_tag_is_a_decode_error() {
        let result = PreparedChange::from_wire(r#"{"schema_name": "public"}"#);
        assert!(matches!(result, Err(SentinelError::Decode(_))));
    }

    #[test]
    fn stored_payload_carries_message_and_breaking_flag() {
        let payload = r#"{
            "command_tag": "DROP TABLE",
            "schema_name": "public",
            "object_identity": "public.temp_table",
            "command": "DROP TABLE temp_table"
        }"#;
        let Ok(prepared) = PreparedChange::from_wire(payload) else {
            panic!("expected payload to decode");
        };
        let stored = prepared.stored_payload();
        assert_eq!(
            stored.get("human_readable_message").and_then(|v| v.as_str()),
            Some("Table 'temp_table' was deleted from schema 'public'")
        );
        assert_eq!(stored.get("is_breaking").and_then(serde_json::Value::as_bool), Some(false));
        assert_eq!(
            stored.get("command").and_then(|v| v.as_str()),
            Some("DROP TABLE temp_table")
        );
    }

    #[test]
    fn table_name_strips_schema_qualifier() {
        let event = RawDdlEvent {
            command_tag: "DROP TABLE".to_string(),
            schema_name: "sales".to_string(),
            object_type: "table".to_string(),
            object_identity: "sales.orders".to_string(),
            in_extension: false,
            command: String::new(),
        };
        assert_eq!(event.table_name(), "orders");
    }

    #[test]
    fn table_name_without_qualifier_is_unchanged() {
        let event = RawDdlEvent {
            command_tag: "DROP TABLE".to_string(),
            schema_name: String::new(),
            object_type: String::new(),
            object_identity: "orders".to_string(),
            in_extension: false,
            command: String::new(),
        };
        assert_eq!(event.table_name(), "orders");
    }

    #[test]
    fn change_type_round_trips_through_storage_form() {
        for ct in [ChangeType::Breaking, ChangeType::NonBreaking] {
            let Ok(parsed) = ct.as_str().parse::<ChangeType>() else {
                panic!("round trip failed");
            };
            assert_eq!(parsed, ct);
        }
        assert!("bogus".parse::<ChangeType>().is_err());
    }
}
