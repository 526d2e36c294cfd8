//! Persistence layer: application-database repositories.
//!
//! All repositories share one `sqlx::PgPool` and use runtime-checked
//! queries with tuple rows mapped into the model structs. The
//! `schema_change` event log is owned by this subsystem; the pipeline,
//! step, and user tables are owned by the surrounding CRUD layer and
//! only read (plus the one `mark_broken` write).

pub mod event_store;
pub mod models;
pub mod pipeline_repo;
pub mod step_repo;
pub mod user_repo;

pub use event_store::EventStore;
pub use pipeline_repo::PipelineRepository;
pub use step_repo::StepRepository;
pub use user_repo::{AccessRepository, UserRepository};
