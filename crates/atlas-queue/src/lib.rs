//! C2 Queue Gateway.
//!
//! No ordering is guaranteed (§4.2). Workers must be idempotent:
//! re-processing an already-`completed` job is a no-op, which C9/C6
//! enforce, not this crate.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use atlas_types::{AtlasError, WorkItem};

/// Default visibility timeout: must cover a worker's maximum wall-
/// clock budget plus cleanup reserve (§4.2), so a slow-but-alive
/// worker is never raced by a second receiver.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 15 * 60;

/// Attempts before an item is diverted to the dead-letter sink.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// A handle returned by `receive()`, opaque to callers, needed by
/// `ack`/`fail` to identify which delivery is being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receipt(pub String);

#[derive(Debug, Clone)]
pub struct ReceivedItem {
    pub item: WorkItem,
    pub receipt: Receipt,
    pub delivery_attempt: u32,
}

#[async_trait]
pub trait QueueGateway: Send + Sync {
    /// Best-effort send. On failure the job stays `pending` and the
    /// Health Monitor will reclaim it — callers must not treat this
    /// as fatal to job creation.
    async fn enqueue(&self, item: WorkItem) -> Result<(), AtlasError>;

    /// Long-poll receive returning zero or one item with a visibility
    /// timeout covering the worker's maximum wall-clock budget.
    async fn receive(&self, visibility_timeout_secs: u64) -> Result<Option<ReceivedItem>, AtlasError>;

    /// Delete on success.
    async fn ack(&self, receipt: &Receipt) -> Result<(), AtlasError>;

    /// Leave for redelivery; past `MAX_DELIVERY_ATTEMPTS` the item is
    /// diverted to the dead-letter sink instead of being requeued.
    async fn fail(&self, receipt: &Receipt) -> Result<(), AtlasError>;

    /// Items that exhausted delivery attempts, for inspection/tests.
    async fn dead_letters(&self) -> Vec<WorkItem>;
}
