//! In-memory reference implementation. Used by tests and by any
//! single-process deployment that doesn't need cross-process
//! durability.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use atlas_types::{AtlasError, Job, JobSummary, LogEntry};

use crate::filter::{clamp_page_size, JobFilter, JobPage};
use crate::sanitize::sanitize_result;
use crate::{JobPatch, JobStore};

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, job: Job) -> Result<(), AtlasError> {
        job.validate()?;
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(AtlasError::AlreadyExists);
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, AtlasError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, AtlasError> {
        let mut jobs = self.jobs.write().await;
        let existing = jobs.get(&id).ok_or(AtlasError::NotFound)?;
        let mut job = existing.clone();

        if let Some(next_status) = patch.status {
            if !job.status.can_transition_to(next_status) {
                return Err(AtlasError::InvalidTransition {
                    from: job.status,
                    to: next_status,
                });
            }
            job.status = next_status;
        }

        if let Some(result) = patch.result {
            job.result = Some(sanitize_result(result));
        } else if patch.clear_result {
            job.result = None;
        }

        if let Some(error) = patch.error {
            job.error = Some(error);
        } else if patch.clear_error {
            job.error = None;
        }

        if let Some(heartbeat) = patch.heartbeat {
            job.heartbeat = Some(heartbeat);
        }

        job.touch();
        job.validate()?;
        jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn append_log(&self, id: Uuid, entry: LogEntry) {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) => job.logs.push(entry),
            None => warn!(job_id = %id, "append_log: job not found, dropping entry"),
        }
    }

    async fn list(&self, filter: JobFilter) -> Result<JobPage, AtlasError> {
        let jobs = self.jobs.read().await;
        let page_size = clamp_page_size(filter.page_size) as usize;

        let mut matching: Vec<&Job> = jobs
            .values()
            .filter(|job| filter.status.is_none_or(|s| job.status as u8 == s as u8))
            .filter(|job| filter.job_type.is_none_or(|t| job.job_type as u8 == t as u8))
            .filter(|job| filter.created_after.is_none_or(|after| job.created_at > after))
            .collect();
        matching.sort_by_key(|job| job.created_at);

        let start = filter
            .cursor
            .as_deref()
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (start + page_size).min(matching.len());
        let has_more = end < matching.len();
        let page: Vec<JobSummary> = matching[start..end].iter().map(|j| JobSummary::from(*j)).collect();

        Ok(JobPage {
            jobs: page,
            has_more,
            next_cursor: has_more.then(|| end.to_string()),
        })
    }

    async fn delete(&self, id: Uuid) -> Result<(), AtlasError> {
        self.jobs.write().await.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_types::{JobParams, JobType};

    fn sample_job() -> Job {
        Job::new(
            Uuid::new_v4(),
            JobType::SyncExtract,
            "https://example.com".into(),
            JobParams {
                extraction_instructions: "Extract the page title".into(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        store.put(job.clone()).await.unwrap();
        let err = store.put(job).await.unwrap_err();
        assert!(matches!(err, AtlasError::AlreadyExists));
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_and_record_unchanged() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        let id = job.id;
        store.put(job).await.unwrap();

        store
            .update(id, JobPatch::default().status(atlas_types::JobStatus::Processing))
            .await
            .unwrap();
        store
            .update(
                id,
                JobPatch::default()
                    .status(atlas_types::JobStatus::Completed)
                    .result(atlas_types::ExtractedValue::String("done".into())),
            )
            .await
            .unwrap();

        let err = store
            .update(id, JobPatch::default().status(atlas_types::JobStatus::Processing))
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::InvalidTransition { .. }));

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, atlas_types::JobStatus::Completed);
    }

    #[tokio::test]
    async fn list_respects_bounded_page_size_and_has_more() {
        let store = InMemoryJobStore::new();
        for _ in 0..5 {
            store.put(sample_job()).await.unwrap();
        }
        let page = store
            .list(JobFilter::default().with_page_size(2))
            .await
            .unwrap();
        assert_eq!(page.jobs.len(), 2);
        assert!(page.has_more);
    }
}
