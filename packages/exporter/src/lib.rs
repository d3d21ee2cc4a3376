// Audit Evidence Export Service - Core Library
//
// Turns an export request ("produce an audit evidence bundle for framework F")
// into a durably stored artifact via an asynchronous job pipeline with
// crash recovery, progress reporting, and bounded retries.
//
// Architecture follows domain-driven design: kernel holds infrastructure
// (job store, retry policy, collaborator traits), domains hold the export
// business logic.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
