//! Process-level configuration (§6 "Environment configuration"),
//! read from env vars (optionally via a `.env` file) with `clap`'s
//! `env` attribute, the way the teacher reads `DATABASE_URL`/
//! `ENTITY_GATEWAY_ADDR` straight from the process environment.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "atlas-worker")]
pub struct WorkerConfig {
    /// Process wall-clock cap (§6 `LAMBDA_TIMEOUT`); the worker exits
    /// cleanly once its remaining budget drops under `cleanup_reserve_secs`.
    #[arg(long, env = "LAMBDA_TIMEOUT", default_value_t = 900)]
    pub lambda_timeout_secs: u64,

    /// Tail of the process budget reserved for a guaranteed final
    /// status write (§5, §9).
    #[arg(long, env = "CLEANUP_RESERVE", default_value_t = 30)]
    pub cleanup_reserve_secs: u64,

    /// The worker refuses new work once its remaining process budget
    /// drops below this (§5 "refuses to start a job if its remaining
    /// process budget is less than 60 s").
    #[arg(long, env = "REFUSE_NEW_WORK_THRESHOLD_SECS", default_value_t = 60)]
    pub refuse_new_work_threshold_secs: u64,

    /// Heartbeat write cadence (§5, default 10 s).
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = 10)]
    pub heartbeat_interval_secs: u64,

    /// How often the worker's long-poll receive blocks before
    /// retrying on an empty queue.
    #[arg(long, env = "QUEUE_POLL_INTERVAL_SECS", default_value_t = 5)]
    pub queue_poll_interval_secs: u64,

    /// Visibility timeout handed to C2's `receive()`, must cover the
    /// worker's maximum wall-clock budget (§4.2, §5).
    #[arg(long, env = "QUEUE_VISIBILITY_TIMEOUT_SECS", default_value_t = 900)]
    pub queue_visibility_timeout_secs: u64,

    /// How often the in-process Health Monitor sweep runs (§4.10).
    #[arg(long, env = "HEALTH_MONITOR_INTERVAL_SECS", default_value_t = 60)]
    pub health_monitor_interval_secs: u64,

    /// OpenAI-compatible chat-completions endpoint for C4.
    #[arg(long, env = "ATLAS_MODEL_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub model_base_url: String,

    /// API key for the model provider.
    #[arg(long, env = "ATLAS_MODEL_API_KEY", default_value = "")]
    pub model_api_key: String,

    /// Postgres connection string; only consulted when the `postgres`
    /// feature is enabled.
    #[arg(long, env = "DATABASE_URL", default_value = "")]
    pub database_url: String,
}

impl WorkerConfig {
    pub fn lambda_timeout(&self) -> Duration {
        Duration::from_secs(self.lambda_timeout_secs)
    }

    pub fn cleanup_reserve(&self) -> Duration {
        Duration::from_secs(self.cleanup_reserve_secs)
    }

    pub fn refuse_new_work_threshold(&self) -> Duration {
        Duration::from_secs(self.refuse_new_work_threshold_secs)
    }
}
