//! Domain layer: DDL event model, breaking-change classification, and
//! monitoring configuration.
//!
//! Everything in this module is pure: no I/O, deterministic output for
//! identical input. The listener machinery feeds raw wire payloads in and
//! gets classified, summarized, storage-ready events out.

pub mod classifier;
pub mod ddl_event;
pub mod message;
pub mod monitoring;

pub use classifier::is_breaking;
pub use ddl_event::{ChangeType, PreparedChange, RawDdlEvent};
pub use message::human_readable_message;
pub use monitoring::{MonitoringConfig, SourceDbConfig, ToolKind};
