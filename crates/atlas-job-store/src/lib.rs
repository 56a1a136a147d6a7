//! C1 Job Store Gateway.
//!
//! Atomic create/read/update/list of canonical job records, with
//! schema migration on read. Implementations must never read-modify-
//! write across transactions — creates and updates go through the
//! store's native conditional primitives.

pub mod filter;
pub mod memory;
pub mod migration;
pub mod sanitize;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use atlas_types::{AtlasError, Job, JobStatus, LogEntry};

pub use filter::{JobFilter, JobPage};

/// The subset of a job's fields an `update()` call may touch.
/// `updated_at` is always bumped by the store, never by the caller.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub result: Option<atlas_types::ExtractedValue>,
    pub error: Option<String>,
    pub heartbeat: Option<i64>,
    pub clear_result: bool,
    pub clear_error: bool,
}

impl JobPatch {
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn result(mut self, result: atlas_types::ExtractedValue) -> Self {
        self.result = Some(result);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn heartbeat(mut self, millis: i64) -> Self {
        self.heartbeat = Some(millis);
        self
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomic create. Fails with `AtlasError::AlreadyExists` if the id
    /// is taken, or `AtlasError::ValidationError` if the canonical
    /// schema rejects the record.
    async fn put(&self, job: Job) -> Result<(), AtlasError>;

    /// Strongly consistent read. `Ok(None)` if absent. Schema-version
    /// mismatches are migrated in-memory before returning; the caller
    /// only ever observes the current schema.
    async fn get(&self, id: Uuid) -> Result<Option<Job>, AtlasError>;

    /// Conditional write: succeeds only if the record exists and the
    /// requested status transition (if any) is legal. Always bumps
    /// `updated_at`.
    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, AtlasError>;

    /// Atomic list-append. Failures are swallowed after logging —
    /// logging must never break extraction.
    async fn append_log(&self, id: Uuid, entry: LogEntry);

    /// Bounded scan with optional predicates and a caller-visible
    /// `hasMore` flag.
    async fn list(&self, filter: JobFilter) -> Result<JobPage, AtlasError>;

    /// Tombstone.
    async fn delete(&self, id: Uuid) -> Result<(), AtlasError>;
}
