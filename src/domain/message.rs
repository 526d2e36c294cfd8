//! Human-readable summaries of raw DDL events.
//!
//! Dispatches on the command tag, and for `ALTER TABLE` on a fixed
//! priority order of substring matches. Identifier extraction is
//! keyword-anchored over the upper-cased command text, so extracted
//! column/table/constraint names surface upper-cased even when the
//! original DDL used lowercase. The table name itself comes from
//! `object_identity` and keeps its original case.

use regex::Regex;

use super::ddl_event::{ChangeType, RawDdlEvent};

mod patterns {
    // Hardcoded patterns; each one is exercised by the tests below.
    #![allow(clippy::expect_used)]

    use std::sync::LazyLock;

    use regex::Regex;

    pub(super) static DROP_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"DROP COLUMN\s+(?:IF EXISTS\s+)?([^\s;]+)").expect("valid pattern")
    });
    pub(super) static ADD_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"ADD COLUMN\s+(?:IF NOT EXISTS\s+)?([^\s;]+)").expect("valid pattern")
    });
    pub(super) static RENAME_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"RENAME COLUMN\s+([^\s]+)\s+TO\s+([^\s;]+)").expect("valid pattern")
    });
    pub(super) static ALTER_COLUMN_TYPE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"ALTER COLUMN\s+([^\s]+)\s+TYPE\s+([^;]+)").expect("valid pattern")
    });
    pub(super) static RENAME_TO: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"RENAME TO\s+([^\s;]+)").expect("valid pattern"));
    pub(super) static ADD_CONSTRAINT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"ADD CONSTRAINT\s+([^\s]+)").expect("valid pattern"));
    pub(super) static DROP_CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"DROP CONSTRAINT\s+(?:IF EXISTS\s+)?([^\s;]+)").expect("valid pattern")
    });
}

/// Maps a raw DDL event to a one-sentence description.
#[must_use]
pub fn human_readable_message(event: &RawDdlEvent) -> String {
    let command_tag = event.command_tag.to_uppercase();
    let table_name = event.table_name();
    let schema_name = &event.schema_name;

    match command_tag.as_str() {
        "ALTER TABLE" => describe_alter_table(&event.command, table_name, schema_name),
        "CREATE TABLE" => {
            format!("New table '{table_name}' was created in schema '{schema_name}'")
        }
        "DROP TABLE" => {
            format!("Table '{table_name}' was deleted from schema '{schema_name}'")
        }
        _ => format!(
            "Database schema change detected: {command_tag} operation on {}",
            event.object_identity
        ),
    }
}

/// Summary plus a warning paragraph for breaking changes. Used in
/// notification bodies.
#[must_use]
pub fn detailed_message(event: &RawDdlEvent, change_type: ChangeType) -> String {
    let mut message = human_readable_message(event);
    if change_type.is_breaking() {
        message.push_str(
            "\n\n⚠️  WARNING: This is a breaking change that may affect your data pipeline!",
        );
    }
    message
}

/// `ALTER TABLE` dispatch. Branch order matters: a command matching more
/// than one pattern resolves to the first branch listed here.
fn describe_alter_table(command: &str, table_name: &str, schema_name: &str) -> String {
    let command_upper = command.to_uppercase();

    if command_upper.contains("DROP COLUMN") {
        if let Some(column) = capture_one(&patterns::DROP_COLUMN, &command_upper) {
            return format!(
                "Column '{column}' was removed from table '{table_name}' in schema '{schema_name}'"
            );
        }
        format!("A column was removed from table '{table_name}' in schema '{schema_name}'")
    } else if command_upper.contains("ADD COLUMN") {
        if let Some(column) = capture_one(&patterns::ADD_COLUMN, &command_upper) {
            return format!(
                "Column '{column}' was added to table '{table_name}' in schema '{schema_name}'"
            );
        }
        format!("A new column was added to table '{table_name}' in schema '{schema_name}'")
    } else if command_upper.contains("RENAME COLUMN") {
        if let Some((old_name, new_name)) = capture_two(&patterns::RENAME_COLUMN, &command_upper) {
            return format!(
                "Column '{old_name}' was renamed to '{new_name}' in table '{table_name}' in schema '{schema_name}'"
            );
        }
        format!("A column was renamed in table '{table_name}' in schema '{schema_name}'")
    } else if command_upper.contains("ALTER COLUMN") && command_upper.contains("TYPE") {
        if let Some((column, new_type)) = capture_two(&patterns::ALTER_COLUMN_TYPE, &command_upper)
        {
            let new_type = new_type.trim();
            return format!(
                "Column '{column}' data type was changed to '{new_type}' in table '{table_name}' in schema '{schema_name}'"
            );
        }
        format!("A column data type was modified in table '{table_name}' in schema '{schema_name}'")
    } else if command_upper.contains("RENAME TO") {
        if let Some(new_table) = capture_one(&patterns::RENAME_TO, &command_upper) {
            return format!(
                "Table '{table_name}' was renamed to '{new_table}' in schema '{schema_name}'"
            );
        }
        format!("Table '{table_name}' was renamed in schema '{schema_name}'")
    } else if command_upper.contains("ADD CONSTRAINT") {
        if let Some(constraint) = capture_one(&patterns::ADD_CONSTRAINT, &command_upper) {
            return format!(
                "Constraint '{constraint}' was added to table '{table_name}' in schema '{schema_name}'"
            );
        }
        format!("A constraint was added to table '{table_name}' in schema '{schema_name}'")
    } else if command_upper.contains("DROP CONSTRAINT") {
        if let Some(constraint) = capture_one(&patterns::DROP_CONSTRAINT, &command_upper) {
            return format!(
                "Constraint '{constraint}' was removed from table '{table_name}' in schema '{schema_name}'"
            );
        }
        format!("A constraint was removed from table '{table_name}' in schema '{schema_name}'")
    } else {
        format!("Table '{table_name}' structure was modified in schema '{schema_name}'")
    }
}

/// First capture group, trimmed of surrounding quote characters.
fn capture_one(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| trim_quotes(m.as_str()).to_string())
}

/// First two capture groups; the second keeps its raw form so type
/// expressions survive intact.
fn capture_two(pattern: &Regex, text: &str) -> Option<(String, String)> {
    let caps = pattern.captures(text)?;
    let first = caps.get(1)?;
    let second = caps.get(2)?;
    Some((
        trim_quotes(first.as_str()).to_string(),
        trim_quotes(second.as_str()).to_string(),
    ))
}

fn trim_quotes(s: &str) -> &str {
    s.trim_matches('"').trim_matches('\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(tag: &str, identity: &str, command: &str) -> RawDdlEvent {
        RawDdlEvent {
            command_tag: tag.to_string(),
            schema_name: "public".to_string(),
            object_type: "table".to_string(),
            object_identity: identity.to_string(),
            in_extension: false,
            command: command.to_string(),
        }
    }

    #[test]
    fn create_table_message() {
        let e = event(
            "CREATE TABLE",
            "public.temp_table",
            "CREATE TABLE temp_table (id int)",
        );
        assert_eq!(
            human_readable_message(&e),
            "New table 'temp_table' was created in schema 'public'"
        );
    }

    #[test]
    fn drop_table_message() {
        let e = event("DROP TABLE", "public.temp_table", "DROP TABLE temp_table");
        assert_eq!(
            human_readable_message(&e),
            "Table 'temp_table' was deleted from schema 'public'"
        );
    }

    #[test]
    fn rename_identifiers_surface_upper_cased() {
        // Extraction runs over the upper-cased command text, so the
        // column names come back upper-cased even though the original
        // DDL is lowercase. The table name, taken from object_identity,
        // keeps its case. Baseline behavior, kept deliberately.
        let e = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders RENAME COLUMN qty TO quantity",
        );
        assert_eq!(
            human_readable_message(&e),
            "Column 'QTY' was renamed to 'QUANTITY' in table 'orders' in schema 'public'"
        );
    }

    #[test]
    fn drop_column_message() {
        let e = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders DROP COLUMN IF EXISTS discount",
        );
        assert_eq!(
            human_readable_message(&e),
            "Column 'DISCOUNT' was removed from table 'orders' in schema 'public'"
        );
    }

    #[test]
    fn add_column_message() {
        let e = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders ADD COLUMN discount numeric",
        );
        assert_eq!(
            human_readable_message(&e),
            "Column 'DISCOUNT' was added to table 'orders' in schema 'public'"
        );
    }

    #[test]
    fn alter_column_type_message() {
        let e = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders ALTER COLUMN qty TYPE bigint",
        );
        assert_eq!(
            human_readable_message(&e),
            "Column 'QTY' data type was changed to 'BIGINT' in table 'orders' in schema 'public'"
        );
    }

    #[test]
    fn table_rename_message() {
        let e = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders RENAME TO purchases",
        );
        assert_eq!(
            human_readable_message(&e),
            "Table 'orders' was renamed to 'PURCHASES' in schema 'public'"
        );
    }

    #[test]
    fn add_constraint_message() {
        let e = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders ADD CONSTRAINT orders_qty_chk CHECK (qty > 0)",
        );
        assert_eq!(
            human_readable_message(&e),
            "Constraint 'ORDERS_QTY_CHK' was added to table 'orders' in schema 'public'"
        );
    }

    #[test]
    fn drop_constraint_message() {
        let e = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders DROP CONSTRAINT IF EXISTS orders_qty_chk",
        );
        assert_eq!(
            human_readable_message(&e),
            "Constraint 'ORDERS_QTY_CHK' was removed from table 'orders' in schema 'public'"
        );
    }

    #[test]
    fn drop_column_wins_over_later_branches() {
        // A command containing multiple keyword shapes resolves to the
        // first branch in priority order.
        let e = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders DROP COLUMN old_qty ADD COLUMN qty int",
        );
        assert!(human_readable_message(&e).starts_with("Column 'OLD_QTY' was removed"));
    }

    #[test]
    fn unrecognized_alter_falls_back_to_generic_sentence() {
        let e = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders SET SCHEMA archive",
        );
        assert_eq!(
            human_readable_message(&e),
            "Table 'orders' structure was modified in schema 'public'"
        );
    }

    #[test]
    fn unknown_tag_names_tag_and_identity() {
        let e = event("CREATE INDEX", "public.orders_idx", "CREATE INDEX ...");
        assert_eq!(
            human_readable_message(&e),
            "Database schema change detected: CREATE INDEX operation on public.orders_idx"
        );
    }

    #[test]
    fn quoted_identifiers_are_unquoted() {
        let e = event(
            "ALTER TABLE",
            "public.orders",
            r#"ALTER TABLE orders DROP COLUMN "Discount""#,
        );
        assert_eq!(
            human_readable_message(&e),
            "Column 'DISCOUNT' was removed from table 'orders' in schema 'public'"
        );
    }

    #[test]
    fn detailed_message_appends_warning_only_when_breaking() {
        let breaking = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders RENAME TO purchases",
        );
        let detailed = detailed_message(&breaking, ChangeType::Breaking);
        assert!(detailed.contains("WARNING: This is a breaking change"));

        let benign = event("CREATE TABLE", "public.t", "CREATE TABLE t (id int)");
        let detailed = detailed_message(&benign, ChangeType::NonBreaking);
        assert!(!detailed.contains("WARNING"));
    }

    #[test]
    fn deterministic_for_identical_input() {
        let e = event(
            "ALTER TABLE",
            "public.orders",
            "ALTER TABLE orders ADD COLUMN note text",
        );
        assert_eq!(human_readable_message(&e), human_readable_message(&e));
    }
}
