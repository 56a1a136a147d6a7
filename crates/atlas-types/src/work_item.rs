//! The queue message shape (§6): `{jobId, type, params, timestamp}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::{JobParams, JobType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub job_id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub params: JobParams,
    pub timestamp: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(job_id: Uuid, job_type: JobType, params: JobParams) -> Self {
        Self {
            job_id,
            job_type,
            params,
            timestamp: Utc::now(),
        }
    }
}
