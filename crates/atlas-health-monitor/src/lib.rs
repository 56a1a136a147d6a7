//! C10 Health Monitor.
//!
//! Runs on a schedule (the worker/gateway binaries own the actual
//! timer), scanning C1 for stuck `processing` jobs and orphaned
//! `pending` jobs and reconciling both (§4.10).

pub mod telemetry;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use atlas_job_store::{JobFilter, JobPatch, JobStore};
use atlas_types::{ExtractedValue, Job, JobStatus, WorkItem};

pub use telemetry::{HealthReport, ModelTierHealth, ResourceUtilization, StoreHealth};

/// Stuck-processing thresholds (§4.10): any one firing classifies a
/// `processing` job as stuck.
pub const STUCK_UPDATED_AT_THRESHOLD: Duration = Duration::from_secs(5 * 60);
pub const STUCK_HEARTBEAT_THRESHOLD: Duration = Duration::from_secs(2 * 60);
pub const STUCK_CREATED_AT_THRESHOLD: Duration = Duration::from_secs(10 * 60);

/// A `pending` job older than this is considered orphaned — never
/// picked up by a worker (§4.10).
pub const ORPHANED_PENDING_THRESHOLD: Duration = Duration::from_secs(10 * 60);

/// Note text the monitor attaches when it promotes a stuck-but-
/// partial job to `completed` (§4.10, §8 scenario 6).
pub const RECOVERED_NOTE: &str = "recovered by monitor";

/// Where reaped-without-recovery jobs are reported, modeled as its
/// own small trait (rather than reusing `QueueGateway::fail`, which
/// needs a delivery receipt the monitor never holds) so a deployment
/// can wire in whatever dead-letter sink it actually has.
pub trait DeadLetterSink: Send + Sync {
    fn record(&self, item: WorkItem, reason: String);
}

/// Discards everything; useful for tests and for deployments that
/// don't yet have a dead-letter sink wired in.
pub struct NullDeadLetterSink;

impl DeadLetterSink for NullDeadLetterSink {
    fn record(&self, _item: WorkItem, _reason: String) {}
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub recovered: Vec<Uuid>,
    pub failed_stuck: Vec<Uuid>,
    pub failed_orphaned: Vec<Uuid>,
}

pub struct HealthMonitor {
    store: std::sync::Arc<dyn JobStore>,
    dead_letters: std::sync::Arc<dyn DeadLetterSink>,
}

impl HealthMonitor {
    pub fn new(
        store: std::sync::Arc<dyn JobStore>,
        dead_letters: std::sync::Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self { store, dead_letters }
    }

    /// One reaper pass. Scans `processing` jobs for staleness and
    /// `pending` jobs for orphaning, reconciling each per §4.10. All
    /// transitions go through the store's own validation, same as any
    /// other caller.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = Utc::now();

        let processing = self
            .store
            .list(JobFilter {
                status: Some(JobStatus::Processing),
                page_size: atlas_job_store::filter::MAX_PAGE_SIZE,
                ..Default::default()
            })
            .await
            .unwrap_or_default();

        for summary in processing.jobs {
            let Ok(Some(job)) = self.store.get(summary.id).await else {
                continue;
            };
            if let Some(reason) = classify_stuck(&job, now) {
                self.reap_stuck(job, reason, &mut report).await;
            }
        }

        let pending = self
            .store
            .list(JobFilter {
                status: Some(JobStatus::Pending),
                page_size: atlas_job_store::filter::MAX_PAGE_SIZE,
                ..Default::default()
            })
            .await
            .unwrap_or_default();

        for summary in pending.jobs {
            let Ok(Some(job)) = self.store.get(summary.id).await else {
                continue;
            };
            if now.signed_duration_since(job.created_at).num_seconds()
                > ORPHANED_PENDING_THRESHOLD.as_secs() as i64
            {
                self.reap_orphaned(job, &mut report).await;
            }
        }

        report
    }

    async fn reap_stuck(&self, job: Job, reason: &'static str, report: &mut SweepReport) {
        let id = job.id;
        if let Some(result) = job.result.clone().filter(|_| has_partial_data(&job)) {
            let annotated = annotate_recovery(result);
            match self
                .store
                .update(id, JobPatch::default().status(JobStatus::Completed).result(annotated))
                .await
            {
                Ok(_) => {
                    info!(job_id = %id, reason, "stuck job recovered with partial results");
                    report.recovered.push(id);
                }
                Err(e) => warn!(job_id = %id, error = %e, "failed to recover stuck job"),
            }
            return;
        }

        let failure_reason = format!("stuck job reaped by health monitor: {reason}");
        match self
            .store
            .update(
                id,
                JobPatch::default()
                    .status(JobStatus::Failed)
                    .error(failure_reason.clone()),
            )
            .await
        {
            Ok(_) => {
                info!(job_id = %id, reason, "stuck job failed and sent to dead-letter sink");
                self.dead_letters.record(
                    WorkItem::new(id, job.job_type, job.params.clone()),
                    failure_reason,
                );
                report.failed_stuck.push(id);
            }
            Err(e) => warn!(job_id = %id, error = %e, "failed to fail stuck job"),
        }
    }

    async fn reap_orphaned(&self, job: Job, report: &mut SweepReport) {
        let id = job.id;
        match self
            .store
            .update(
                id,
                JobPatch::default().status(JobStatus::Failed).error("orphaned".to_string()),
            )
            .await
        {
            Ok(_) => {
                info!(job_id = %id, "orphaned pending job failed");
                report.failed_orphaned.push(id);
            }
            Err(e) => warn!(job_id = %id, error = %e, "failed to fail orphaned job"),
        }
    }

}

/// Any of §4.10's staleness checks that classify a `processing` job
/// as stuck.
fn classify_stuck(job: &Job, now: DateTime<Utc>) -> Option<&'static str> {
    if now.signed_duration_since(job.updated_at).num_seconds()
        > STUCK_UPDATED_AT_THRESHOLD.as_secs() as i64
    {
        return Some("updatedAt stale for more than 5 minutes");
    }
    if let Some(heartbeat_ms) = job.heartbeat {
        if heartbeat_ms > 0 {
            let heartbeat = DateTime::<Utc>::from_timestamp_millis(heartbeat_ms).unwrap_or(now);
            if now.signed_duration_since(heartbeat).num_seconds()
                > STUCK_HEARTBEAT_THRESHOLD.as_secs() as i64
            {
                return Some("heartbeat stale for more than 2 minutes");
            }
        }
    }
    if now.signed_duration_since(job.created_at).num_seconds()
        > STUCK_CREATED_AT_THRESHOLD.as_secs() as i64
    {
        return Some("processing for more than 10 minutes");
    }
    None
}

/// Whether a job's `result` carries anything worth preserving, per
/// §4.10's "if the stuck job has any partial results". §9's opaque
/// `ExtractedValue` has no universal emptiness notion beyond the
/// null/empty-container cases, so anything else counts as partial.
fn has_partial_data(job: &Job) -> bool {
    match &job.result {
        None => false,
        Some(ExtractedValue::Null) => false,
        Some(ExtractedValue::Array(items)) => !items.is_empty(),
        Some(ExtractedValue::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Attach the monitor's recovery note to a result. §3/§8 require a
/// `completed` job's `error` to stay null, so the note travels inside
/// the result payload rather than the job's `error` field — the same
/// reconciliation `atlas-orchestrator` applies to its own
/// `_timeout_fallback` case; see `DESIGN.md`.
fn annotate_recovery(result: ExtractedValue) -> ExtractedValue {
    match result {
        ExtractedValue::Object(mut map) => {
            map.insert(
                "_recovery_note".to_string(),
                ExtractedValue::String(RECOVERED_NOTE.to_string()),
            );
            ExtractedValue::Object(map)
        }
        other => {
            let mut map = std::collections::BTreeMap::new();
            map.insert("data".to_string(), other);
            map.insert(
                "_recovery_note".to_string(),
                ExtractedValue::String(RECOVERED_NOTE.to_string()),
            );
            ExtractedValue::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_job_store::memory::InMemoryJobStore;
    use atlas_types::{JobParams, JobType};
    use std::sync::Arc;

    struct RecordingSink(std::sync::Mutex<Vec<(WorkItem, String)>>);

    impl RecordingSink {
        fn new() -> Self {
            Self(std::sync::Mutex::new(Vec::new()))
        }
    }

    impl DeadLetterSink for RecordingSink {
        fn record(&self, item: WorkItem, reason: String) {
            self.0.lock().unwrap().push((item, reason));
        }
    }

    fn processing_job(updated_minutes_ago: i64, result: Option<ExtractedValue>) -> Job {
        let mut job = Job::new(
            Uuid::new_v4(),
            JobType::SyncExtract,
            "https://example.com".into(),
            JobParams {
                extraction_instructions: "title".into(),
                ..Default::default()
            },
        );
        job.status = JobStatus::Processing;
        job.updated_at = Utc::now() - chrono::Duration::minutes(updated_minutes_ago);
        job.result = result;
        job
    }

    #[tokio::test]
    async fn stuck_job_with_partial_results_is_recovered_not_failed() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut map = std::collections::BTreeMap::new();
        map.insert("title".to_string(), ExtractedValue::String("Example Domain".into()));
        let job = processing_job(10, Some(ExtractedValue::Object(map)));
        let id = job.id;
        store.put(job).await.unwrap();

        let monitor = HealthMonitor::new(store.clone(), Arc::new(NullDeadLetterSink));
        let report = monitor.sweep().await;

        assert_eq!(report.recovered, vec![id]);
        let recovered = store.get(id).await.unwrap().unwrap();
        assert_eq!(recovered.status, JobStatus::Completed);
        assert!(recovered.error.is_none());
        let result = recovered.result.unwrap();
        let obj = result.as_object().unwrap();
        assert_eq!(
            obj.get("_recovery_note"),
            Some(&ExtractedValue::String(RECOVERED_NOTE.to_string()))
        );
    }

    #[tokio::test]
    async fn stuck_job_without_results_is_failed_and_dead_lettered() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = processing_job(10, None);
        let id = job.id;
        store.put(job).await.unwrap();

        let sink = Arc::new(RecordingSink::new());
        let monitor = HealthMonitor::new(store.clone(), sink.clone());
        let report = monitor.sweep().await;

        assert_eq!(report.failed_stuck, vec![id]);
        let failed = store.get(id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.is_some());

        let recorded = sink.0.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0.job_id, id);
    }

    #[tokio::test]
    async fn healthy_processing_job_is_left_untouched() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = processing_job(1, None);
        let id = job.id;
        store.put(job).await.unwrap();

        let monitor = HealthMonitor::new(store.clone(), Arc::new(NullDeadLetterSink));
        let report = monitor.sweep().await;

        assert!(report.recovered.is_empty() && report.failed_stuck.is_empty());
        let untouched = store.get(id).await.unwrap().unwrap();
        assert_eq!(untouched.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn orphaned_pending_job_older_than_ten_minutes_is_failed() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut job = Job::new(
            Uuid::new_v4(),
            JobType::SyncExtract,
            "https://example.com".into(),
            JobParams {
                extraction_instructions: "title".into(),
                ..Default::default()
            },
        );
        job.created_at = Utc::now() - chrono::Duration::minutes(15);
        job.updated_at = job.created_at;
        let id = job.id;
        store.put(job).await.unwrap();

        let monitor = HealthMonitor::new(store.clone(), Arc::new(NullDeadLetterSink));
        let report = monitor.sweep().await;

        assert_eq!(report.failed_orphaned, vec![id]);
        let failed = store.get(id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("orphaned"));
    }
}
