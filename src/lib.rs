//! # pipeline-sentinel
//!
//! Schema change detection engine for data pipeline backends.
//!
//! A fleet of long-lived, per-pipeline background listeners watches each
//! pipeline's source database for DDL changes, classifies every change
//! as breaking or non-breaking, persists it, notifies stakeholders, and
//! on a breaking change flips the owning pipeline into a broken state so
//! it stops being scheduled.
//!
//! ## Architecture
//!
//! ```text
//! ListenerRegistry (start / stop / restore)
//!     │
//!     ├── PostgresChangeListener (one task per pipeline)
//!     │       │  event trigger + LISTEN/NOTIFY on the source database
//!     │       │
//!     │       ├── Classifier + MessageGenerator (domain/)
//!     │       ├── EventStore (persistence/)
//!     │       ├── NotificationDispatcher (notify/)
//!     │       └── PipelineRepository::mark_broken
//!     │
//!     └── ChangeDetectionService (service/): query surface
//! ```
//!
//! Pipeline/user CRUD, dashboards, and ETL execution live in the
//! surrounding backend; this crate consumes their tables through the
//! repositories in [`persistence`].

pub mod config;
pub mod domain;
pub mod error;
pub mod listener;
pub mod notify;
pub mod persistence;
pub mod service;
