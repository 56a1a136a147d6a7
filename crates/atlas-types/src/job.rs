//! The canonical `Job` record and its status-transition graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AtlasError;
use crate::value::ExtractedValue;

pub const CURRENT_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    SyncExtract,
    Scrape,
    Crawl,
    AutonomousExtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl JobStatus {
    /// The transition graph from `spec.md` §3:
    /// pending → {processing, cancelled, failed}
    /// processing → {completed, failed, cancelled, timeout}
    /// {failed, cancelled, timeout} → {processing} (retry)
    /// completed is terminal.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Processing | Cancelled | Failed) => true,
            (Processing, Completed | Failed | Cancelled | Timeout) => true,
            (Failed | Cancelled | Timeout, Processing) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// An append-only log entry. Truncated to a bounded size on write by
/// the Job Store Gateway (§4.1) — the struct itself just carries the
/// already-bounded message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
    pub correlation_id: String,
}

/// Maximum bytes retained per log message; longer messages are
/// truncated with a trailing marker. Fixes the source's "streamJobLog
/// can arbitrarily truncate" behavior (§9 Open Questions) with one
/// deterministic cap.
pub const LOG_ENTRY_MAX_BYTES: usize = 4096;

impl LogEntry {
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        let mut message = message.into();
        if message.len() > LOG_ENTRY_MAX_BYTES {
            const MARKER: &str = "...[truncated]";
            let mut cut = LOG_ENTRY_MAX_BYTES.saturating_sub(MARKER.len());
            while cut > 0 && !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
            message.push_str(MARKER);
        }
        Self {
            timestamp: Utc::now().timestamp_millis(),
            level,
            message,
            correlation_id: correlation_id.into(),
        }
    }
}

/// Frozen configuration for a job, set at creation and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParams {
    pub extraction_instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_links")]
    pub max_links: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub stop_patterns: Vec<String>,
    #[serde(default)]
    pub link_include_patterns: Vec<String>,
    #[serde(default)]
    pub link_exclude_patterns: Vec<String>,
    #[serde(default)]
    pub model_tier_preference: Option<String>,
    #[serde(default)]
    pub unified_extractor_enabled: bool,
    #[serde(default)]
    pub gpt5_enabled: bool,
    #[serde(default)]
    pub force_model: Option<String>,
    #[serde(default)]
    pub autonomous: bool,
}

fn default_max_pages() -> u32 {
    10
}
fn default_max_links() -> u32 {
    50
}
fn default_max_depth() -> u32 {
    5
}
fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            extraction_instructions: String::new(),
            output_schema: None,
            max_pages: default_max_pages(),
            max_links: default_max_links(),
            max_depth: default_max_depth(),
            timeout_ms: default_timeout_ms(),
            stop_patterns: Vec::new(),
            link_include_patterns: Vec::new(),
            link_exclude_patterns: Vec::new(),
            model_tier_preference: None,
            unified_extractor_enabled: false,
            gpt5_enabled: false,
            force_model: None,
            autonomous: false,
        }
    }
}

/// The unit of work. See `spec.md` §3 for invariants; `JobStore`
/// implementations (C1) are responsible for enforcing them atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub url: String,
    pub params: JobParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<i64>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    pub correlation_id: String,
    #[serde(default = "current_schema_version")]
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<DateTime<Utc>>,
}

fn current_schema_version() -> String {
    CURRENT_SCHEMA_VERSION.to_string()
}

/// Retention window applied at creation time (§3: "retained for a
/// configured window, default 7 days").
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

impl Job {
    pub fn new(id: Uuid, job_type: JobType, url: String, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_type,
            status: JobStatus::Pending,
            url,
            params,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            heartbeat: None,
            logs: Vec::new(),
            correlation_id: Uuid::new_v4().to_string(),
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            ttl: Some(now + chrono::Duration::days(DEFAULT_RETENTION_DAYS)),
        }
    }

    /// Validate the invariants in `spec.md` §3 that a single record
    /// must satisfy regardless of how it got here (fresh write,
    /// migrated read, or test fixture).
    pub fn validate(&self) -> Result<(), AtlasError> {
        if self.params.extraction_instructions.trim().is_empty() && self.params.output_schema.is_none()
        {
            return Err(AtlasError::ValidationError(
                "job must carry extraction instructions or an output schema".into(),
            ));
        }
        if self.url.trim().is_empty() {
            return Err(AtlasError::ValidationError("job url must not be empty".into()));
        }
        if self.updated_at < self.created_at {
            return Err(AtlasError::ValidationError(
                "updatedAt must be >= createdAt".into(),
            ));
        }
        match self.status {
            JobStatus::Completed => {
                if self.result.is_none() || self.error.is_some() {
                    return Err(AtlasError::ValidationError(
                        "completed jobs must carry a non-null result and no error".into(),
                    ));
                }
            }
            JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout => {
                if self.error.is_none() {
                    return Err(AtlasError::ValidationError(
                        "failed/cancelled/timeout jobs must carry an error".into(),
                    ));
                }
            }
            JobStatus::Pending | JobStatus::Processing => {}
        }
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// The bounded `list()` projection (§4.1): enough to render a list
/// view without shipping full `result`/`logs` payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_graph_matches_spec() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));

        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Timeout));

        assert!(JobStatus::Failed.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Timeout.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Cancelled.can_transition_to(JobStatus::Processing));

        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn validate_rejects_completed_without_result() {
        let mut job = Job::new(
            Uuid::new_v4(),
            JobType::SyncExtract,
            "https://example.com".into(),
            JobParams {
                extraction_instructions: "title".into(),
                ..Default::default()
            },
        );
        job.status = JobStatus::Completed;
        assert!(job.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_pending_job() {
        let job = Job::new(
            Uuid::new_v4(),
            JobType::SyncExtract,
            "https://example.com".into(),
            JobParams {
                extraction_instructions: "title".into(),
                ..Default::default()
            },
        );
        assert!(job.validate().is_ok());
    }
}
