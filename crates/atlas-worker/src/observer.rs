//! Bridges `atlas_orchestrator::OrchestratorObserver` to C9, so the
//! loop's progress reaches the job's log and the broadcast stream
//! without the orchestrator crate depending on C1/C3 directly.

use std::sync::Arc;

use atlas_lifecycle::JobLifecycleManager;
use atlas_orchestrator::OrchestratorObserver;
use atlas_types::LogLevel;
use uuid::Uuid;

pub struct LifecycleObserver {
    lifecycle: Arc<JobLifecycleManager>,
    job_id: Uuid,
    correlation_id: String,
}

impl LifecycleObserver {
    pub fn new(lifecycle: Arc<JobLifecycleManager>, job_id: Uuid, correlation_id: String) -> Self {
        Self {
            lifecycle,
            job_id,
            correlation_id,
        }
    }
}

impl OrchestratorObserver for LifecycleObserver {
    /// Fire-and-forget, same as C3's own publish contract (§4.3): a
    /// slow or failing log append must never stall the orchestration
    /// loop that called this.
    fn log(&self, level: LogLevel, message: String) {
        let lifecycle = self.lifecycle.clone();
        let job_id = self.job_id;
        let correlation_id = self.correlation_id.clone();
        tokio::spawn(async move {
            lifecycle.log(job_id, level, message, &correlation_id).await;
        });
    }
}
