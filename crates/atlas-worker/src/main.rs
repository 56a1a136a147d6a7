//! The worker process (§5): long-poll C2, drive one job through C6,
//! and guarantee a final status write via C9 before the process's
//! `cleanupReserve` tail.

mod config;
mod observer;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use atlas_agent_pool::AgentPool;
use atlas_broadcast::memory::InMemoryBroadcastGateway;
use atlas_broadcast::BroadcastGateway;
use atlas_job_store::{JobPatch, JobStore};
use atlas_lifecycle::JobLifecycleManager;
use atlas_model_router::{HttpInferenceBackend, InferenceBackend};
use atlas_orchestrator::{compute_job_budget, OrchestratorDeps};
use atlas_page_fetcher::{HttpPageFetcher, NoopBrowserRenderer, PageFetcher, ResultCache};
use atlas_queue::{QueueGateway, ReceivedItem};
use atlas_types::{ExtractedValue, JobStatus};

use config::WorkerConfig;
use observer::LifecycleObserver;

/// Result-cache bound (§5 "LRU bound, e.g. 100 entries") and TTL.
const RESULT_CACHE_CAPACITY: usize = 100;
const RESULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[cfg(not(feature = "postgres"))]
fn build_store() -> Arc<dyn JobStore> {
    Arc::new(atlas_job_store::memory::InMemoryJobStore::new())
}

#[cfg(not(feature = "postgres"))]
fn build_queue() -> Arc<dyn QueueGateway> {
    Arc::new(atlas_queue::memory::InMemoryQueueGateway::new())
}

#[cfg(feature = "postgres")]
async fn build_store(database_url: &str) -> Arc<dyn JobStore> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect(database_url)
        .await
        .expect("failed to connect to DATABASE_URL");
    Arc::new(atlas_job_store::postgres::PostgresJobStore::new(pool))
}

#[cfg(feature = "postgres")]
async fn build_queue(database_url: &str) -> Arc<dyn QueueGateway> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect(database_url)
        .await
        .expect("failed to connect to DATABASE_URL");
    Arc::new(atlas_queue::postgres::PostgresQueueGateway::new(pool))
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atlas_worker=info,atlas_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::parse();

    #[cfg(not(feature = "postgres"))]
    let (store, queue): (Arc<dyn JobStore>, Arc<dyn QueueGateway>) = (build_store(), build_queue());
    #[cfg(feature = "postgres")]
    let (store, queue): (Arc<dyn JobStore>, Arc<dyn QueueGateway>) = (
        build_store(&config.database_url).await,
        build_queue(&config.database_url).await,
    );

    let broadcast: Arc<dyn BroadcastGateway> = Arc::new(InMemoryBroadcastGateway::new());
    let lifecycle = Arc::new(JobLifecycleManager::new(
        store.clone(),
        queue.clone(),
        broadcast.clone(),
    ));

    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(
        Arc::new(NoopBrowserRenderer),
        Arc::new(ResultCache::new(RESULT_CACHE_CAPACITY, RESULT_CACHE_TTL)),
    ));
    let backend: Arc<dyn InferenceBackend> = Arc::new(HttpInferenceBackend::from_env(
        config.model_base_url.clone(),
        config.model_api_key.clone(),
    ));
    let deps = OrchestratorDeps {
        fetcher: fetcher.clone(),
        backend: backend.clone(),
        agent_pool: AgentPool::new(fetcher.clone(), backend.clone()),
    };

    let health_monitor = atlas_health_monitor::HealthMonitor::new(
        store.clone(),
        Arc::new(atlas_health_monitor::NullDeadLetterSink),
    );
    tokio::spawn(run_health_monitor_loop(
        health_monitor,
        Duration::from_secs(config.health_monitor_interval_secs),
    ));

    info!(
        lambda_timeout_secs = config.lambda_timeout_secs,
        cleanup_reserve_secs = config.cleanup_reserve_secs,
        "atlas-worker starting"
    );

    run_worker_loop(config, store, queue, lifecycle, deps).await;
}

async fn run_health_monitor_loop(monitor: atlas_health_monitor::HealthMonitor, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let report = monitor.sweep().await;
        if !report.recovered.is_empty() || !report.failed_stuck.is_empty() || !report.failed_orphaned.is_empty() {
            info!(
                recovered = report.recovered.len(),
                failed_stuck = report.failed_stuck.len(),
                failed_orphaned = report.failed_orphaned.len(),
                "health monitor sweep reaped jobs"
            );
        }
    }
}

/// The main receive/process/ack loop (§5). A single logical worker
/// task per job; bounded parallelism inside the job is C7's concern.
async fn run_worker_loop(
    config: WorkerConfig,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn QueueGateway>,
    lifecycle: Arc<JobLifecycleManager>,
    deps: OrchestratorDeps,
) {
    let process_start = Instant::now();

    loop {
        let remaining = config.lambda_timeout().saturating_sub(process_start.elapsed());
        if remaining < config.refuse_new_work_threshold() {
            info!("remaining process budget below threshold, shutting down for redelivery");
            break;
        }

        match queue.receive(config.queue_visibility_timeout_secs).await {
            Ok(Some(received)) => {
                handle_work_item(&config, &store, &queue, &lifecycle, &deps, received, remaining).await;
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_secs(config.queue_poll_interval_secs)).await;
            }
            Err(e) => {
                warn!(error = %e, "queue receive failed, backing off");
                tokio::time::sleep(Duration::from_secs(config.queue_poll_interval_secs)).await;
            }
        }
    }
}

async fn handle_work_item(
    config: &WorkerConfig,
    store: &Arc<dyn JobStore>,
    queue: &Arc<dyn QueueGateway>,
    lifecycle: &Arc<JobLifecycleManager>,
    deps: &OrchestratorDeps,
    received: ReceivedItem,
    remaining_process_budget: Duration,
) {
    let job_id = received.item.job_id;

    // §5 "refuses to start a job if its remaining process budget is
    // less than 60 s" — re-checked here since time may have passed
    // between the outer loop's check and this delivery.
    if remaining_process_budget < config.refuse_new_work_threshold() {
        warn!(job_id = %job_id, "insufficient remaining budget, returning item for redelivery");
        let _ = queue.fail(&received.receipt).await;
        return;
    }

    let job = match store.get(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!(job_id = %job_id, "work item references a missing job, acking");
            let _ = queue.ack(&received.receipt).await;
            return;
        }
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "job store read failed, returning item for redelivery");
            let _ = queue.fail(&received.receipt).await;
            return;
        }
    };

    // Idempotency guard (§4.2): re-processing an already-terminal job
    // is a no-op at this layer.
    if job.status.is_terminal() {
        let _ = queue.ack(&received.receipt).await;
        return;
    }

    if let Err(e) = lifecycle
        .update_job(job_id, JobPatch::default().status(JobStatus::Processing))
        .await
    {
        warn!(job_id = %job_id, error = %e, "failed to mark job processing, returning item for redelivery");
        let _ = queue.fail(&received.receipt).await;
        return;
    }

    let job_deadline_duration = compute_job_budget(
        Duration::from_millis(job.params.timeout_ms),
        remaining_process_budget,
        config.cleanup_reserve(),
    );
    let job_deadline = Instant::now() + job_deadline_duration;

    let observer = LifecycleObserver::new(lifecycle.clone(), job_id, job.correlation_id.clone());
    let heartbeat_handle = spawn_heartbeat(
        lifecycle.clone(),
        job_id,
        Duration::from_secs(config.heartbeat_interval_secs),
    );

    let outcome = atlas_orchestrator::run(&job, deps, &observer, job_deadline).await;
    heartbeat_handle.abort();

    let persisted = match outcome.status {
        JobStatus::Completed => {
            lifecycle
                .complete_job(job_id, outcome.result.unwrap_or(ExtractedValue::Null))
                .await
        }
        _ => {
            lifecycle
                .fail_job(job_id, outcome.error.unwrap_or_else(|| "job failed".to_string()))
                .await
        }
    };

    match persisted {
        Ok(_) => {
            let _ = queue.ack(&received.receipt).await;
        }
        Err(e) => {
            // §7: a `StoreFailure` on the final status write is
            // escalated — one forced, status-only retry, then a
            // non-zero exit so the Health Monitor reconciles.
            warn!(job_id = %job_id, error = %e, "final status write failed, retrying once");
            let retry = store
                .update(job_id, JobPatch::default().status(outcome.status))
                .await;
            match retry {
                Ok(_) => {
                    let _ = queue.ack(&received.receipt).await;
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "final status write failed twice, exiting");
                    std::process::exit(1);
                }
            }
        }
    }
}

fn spawn_heartbeat(
    lifecycle: Arc<JobLifecycleManager>,
    job_id: Uuid,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now_millis = chrono::Utc::now().timestamp_millis();
            if let Err(e) = lifecycle
                .update_job(job_id, JobPatch::default().heartbeat(now_millis))
                .await
            {
                // §5: heartbeat failure is non-fatal.
                warn!(job_id = %job_id, error = %e, "heartbeat write failed");
            }
        }
    })
}
