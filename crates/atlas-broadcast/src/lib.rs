//! C3 Broadcast Gateway.
//!
//! Must never block the orchestration path: `publish` schedules the
//! send on a detached task and never returns an error the caller
//! needs to act on — failures are logged and a "gone" subscriber is
//! pruned lazily.

pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atlas_types::{ExtractedValue, LogLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BroadcastEvent {
    JobUpdate {
        job_id: Uuid,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ExtractedValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Log {
        job_id: Uuid,
        message: String,
        level: LogLevel,
        timestamp: DateTime<Utc>,
    },
}

impl BroadcastEvent {
    pub fn job_update(
        job_id: Uuid,
        status: impl Into<String>,
        result: Option<ExtractedValue>,
        error: Option<String>,
    ) -> Self {
        BroadcastEvent::JobUpdate {
            job_id,
            status: status.into(),
            result,
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn log(job_id: Uuid, message: impl Into<String>, level: LogLevel) -> Self {
        BroadcastEvent::Log {
            job_id,
            message: message.into(),
            level,
            timestamp: Utc::now(),
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            BroadcastEvent::JobUpdate { job_id, .. } => *job_id,
            BroadcastEvent::Log { job_id, .. } => *job_id,
        }
    }
}

/// A subscriber's registration. TTL-bounded per §4.3: subscriptions
/// that outlive their lease are pruned the same way a send-failed
/// subscriber is pruned.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub job_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

pub trait BroadcastGateway: Send + Sync {
    /// Best-effort, non-blocking publish. Never returns an error the
    /// caller must handle — the orchestration path must not stall on
    /// subscriber delivery.
    fn publish(&self, event: BroadcastEvent);

    /// Register a new subscriber for a job's events, with a TTL
    /// lease. Returns a receiver the caller drains independently.
    fn subscribe(&self, job_id: Uuid, ttl_secs: i64) -> (Uuid, tokio::sync::mpsc::Receiver<BroadcastEvent>);

    /// Drop a subscription early (client disconnect).
    fn unsubscribe(&self, subscription_id: Uuid);

    /// Current live subscription count, for telemetry/tests.
    fn subscriber_count(&self) -> usize;
}
