//! Shared data model for the Atlas Codex extraction orchestrator.
//!
//! This crate is the single source of truth for every type crossing a
//! gateway boundary (job store, queue, broadcast, model router, page
//! fetcher). Nothing here talks to the network or a database — that
//! belongs to the gateway crates that depend on this one.

pub mod error;
pub mod job;
pub mod orchestrator_state;
pub mod value;
pub mod work_item;

pub use error::{AtlasError, FetchErrorKind, ModelErrorKind};
pub use job::{
    Job, JobParams, JobStatus, JobSummary, JobType, LogEntry, LogLevel, CURRENT_SCHEMA_VERSION,
};
pub use orchestrator_state::{ExtractedRecord, ExtractionTarget, OrchestratorState};
pub use value::{ExtractedValue, Provenance};
pub use work_item::WorkItem;
