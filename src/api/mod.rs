//! Async service API
//!
//! Wraps the blocking [`crate::processor::EditPipeline`] in a bounded worker
//! pool for servers and batch callers.

pub mod editor;

pub use editor::{EditService, HealthStatus};
