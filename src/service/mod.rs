//! Service layer: the query surface consumed by the API layer.

pub mod change_service;

pub use change_service::{ChangeDetectionService, SchemaChangeView};
