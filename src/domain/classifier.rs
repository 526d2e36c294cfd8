//! Breaking-change classification for raw DDL events.
//!
//! This is a conservative text-pattern heuristic, not a semantic diff:
//! it scans the captured command text for the keyword shapes that rename
//! or retype objects downstream pipelines bind to. Additive changes
//! (new tables, new columns, constraint churn) are treated as
//! non-breaking.

use super::ddl_event::RawDdlEvent;

/// Command tags eligible to carry a breaking change.
const BREAKING_ELIGIBLE_TAGS: [&str; 2] = ["ALTER TABLE", "DROP TABLE"];

/// Returns `true` when the event is classified as a breaking change.
///
/// Only `ALTER TABLE` and `DROP TABLE` commands are eligible. Within
/// those, the full command text (case-insensitive) is scanned for a
/// column rename, a column type change, or a table rename. Everything
/// else, `CREATE TABLE` included, is non-breaking.
#[must_use]
pub fn is_breaking(event: &RawDdlEvent) -> bool {
    let tag = event.command_tag.to_uppercase();
    if !BREAKING_ELIGIBLE_TAGS.contains(&tag.as_str()) {
        return false;
    }

    let command = event.command.to_uppercase();
    if command.contains("RENAME COLUMN") {
        return true;
    }
    if command.contains("ALTER COLUMN") && command.contains("TYPE") {
        return true;
    }
    if command.contains("RENAME TO") {
        return true;
    }
    false
}
