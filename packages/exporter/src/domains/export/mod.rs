//! Audit evidence export domain.
//!
//! Submission creates an export job; the [`ExportWorker`] drives claimed
//! jobs through the [`ExportPipeline`] to a published bundle.

pub mod actions;
pub mod data;
pub mod models;
pub mod pipeline;
pub mod testing;
pub mod worker;

pub use actions::{create_export_job, get_export_job, process_export_job, ProcessOutcome};
pub use pipeline::{ExportError, ExportPipeline};
pub use worker::{ExportWorker, ExportWorkerConfig};
