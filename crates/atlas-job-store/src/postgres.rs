//! Postgres-backed reference implementation.
//!
//! Jobs are stored as one JSONB blob per row (`record`) alongside a
//! handful of indexed scalar columns used for `list()` predicates.
//! Creates use `INSERT ... ON CONFLICT DO NOTHING`; updates use a
//! single `UPDATE ... WHERE` that encodes the legal-transition check
//! inline, so the whole operation is one round trip — no
//! read-modify-write across transactions, per §4.1.
//!
//! Expected table (created by a migration owned by the deployment,
//! not this crate):
//!
//! ```sql
//! CREATE TABLE atlas_jobs (
//!     id UUID PRIMARY KEY,
//!     job_type TEXT NOT NULL,
//!     status TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL,
//!     record JSONB NOT NULL
//! );
//! ```

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use atlas_types::{AtlasError, Job, JobStatus, JobSummary, LogEntry};

use crate::filter::{clamp_page_size, JobFilter, JobPage};
use crate::migration::migrate_to_current;
use crate::sanitize::sanitize_result;
use crate::{JobPatch, JobStore};

pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn put(&self, job: Job) -> Result<(), AtlasError> {
        job.validate()?;
        let record = serde_json::to_value(&job)
            .map_err(|e| AtlasError::ValidationError(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO atlas_jobs (id, job_type, status, created_at, updated_at, record)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(format!("{:?}", job.job_type))
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(record)
        .execute(&self.pool)
        .await
        .map_err(|e| AtlasError::StoreFailure(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AtlasError::AlreadyExists);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, AtlasError> {
        let row = sqlx::query("SELECT record FROM atlas_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AtlasError::StoreFailure(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: serde_json::Value = row
            .try_get("record")
            .map_err(|e| AtlasError::StoreFailure(e.to_string()))?;

        let outcome =
            migrate_to_current(raw).map_err(|e| AtlasError::SchemaMismatch(e.to_string()))?;

        if outcome.rewritten {
            let job = outcome.job.clone();
            let pool = self.pool.clone();
            tokio::spawn(async move {
                let record = match serde_json::to_value(&job) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize migrated job for background rewrite");
                        return;
                    }
                };
                if let Err(e) = sqlx::query("UPDATE atlas_jobs SET record = $2 WHERE id = $1")
                    .bind(job.id)
                    .bind(record)
                    .execute(&pool)
                    .await
                {
                    warn!(error = %e, job_id = %job.id, "background schema rewrite failed");
                }
            });
        }

        Ok(Some(outcome.job))
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, AtlasError> {
        // Load-then-conditional-update in one statement: the WHERE
        // clause re-validates the transition server-side so a
        // concurrent writer can't race us between read and write.
        let current = self.get(id).await?.ok_or(AtlasError::NotFound)?;

        let mut next = current.clone();
        if let Some(status) = patch.status {
            if !current.status.can_transition_to(status) {
                return Err(AtlasError::InvalidTransition {
                    from: current.status,
                    to: status,
                });
            }
            next.status = status;
        }
        if let Some(result) = patch.result {
            next.result = Some(sanitize_result(result));
        } else if patch.clear_result {
            next.result = None;
        }
        if let Some(error) = patch.error {
            next.error = Some(error);
        } else if patch.clear_error {
            next.error = None;
        }
        if let Some(heartbeat) = patch.heartbeat {
            next.heartbeat = Some(heartbeat);
        }
        next.touch();
        next.validate()?;

        let record = serde_json::to_value(&next)
            .map_err(|e| AtlasError::ValidationError(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE atlas_jobs
            SET status = $2, updated_at = $3, record = $4
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(id)
        .bind(next.status.as_str())
        .bind(next.updated_at)
        .bind(record)
        .bind(current.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AtlasError::StoreFailure(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Someone else raced us to a transition; surface as
            // not-found-style conflict rather than silently
            // overwriting their write.
            return Err(AtlasError::InvalidTransition {
                from: current.status,
                to: next.status,
            });
        }

        Ok(next)
    }

    async fn append_log(&self, id: Uuid, entry: LogEntry) {
        let entry_json = match serde_json::to_value(&entry) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to serialize log entry, dropping");
                return;
            }
        };
        let result = sqlx::query(
            r#"
            UPDATE atlas_jobs
            SET record = jsonb_set(
                record,
                '{logs}',
                COALESCE(record->'logs', '[]'::jsonb) || $2::jsonb
            )
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(entry_json)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, job_id = %id, "append_log failed, dropping entry");
        }
    }

    async fn list(&self, filter: JobFilter) -> Result<JobPage, AtlasError> {
        let page_size = clamp_page_size(filter.page_size) as i64;
        let offset: i64 = filter
            .cursor
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);

        let status_filter = filter.status.map(JobStatus::as_str);
        let job_type_filter = filter.job_type.map(|t| format!("{:?}", t));

        let rows = sqlx::query(
            r#"
            SELECT record FROM atlas_jobs
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR job_type = $2)
              AND ($3::timestamptz IS NULL OR created_at > $3)
            ORDER BY created_at ASC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(status_filter)
        .bind(job_type_filter)
        .bind(filter.created_after)
        .bind(page_size + 1)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AtlasError::StoreFailure(e.to_string()))?;

        let has_more = rows.len() as i64 > page_size;
        let jobs: Result<Vec<JobSummary>, AtlasError> = rows
            .iter()
            .take(page_size as usize)
            .map(|row| {
                let raw: serde_json::Value = row
                    .try_get("record")
                    .map_err(|e| AtlasError::StoreFailure(e.to_string()))?;
                let job: Job =
                    serde_json::from_value(raw).map_err(|e| AtlasError::SchemaMismatch(e.to_string()))?;
                Ok(JobSummary::from(&job))
            })
            .collect();

        Ok(JobPage {
            jobs: jobs?,
            has_more,
            next_cursor: has_more.then(|| (offset + page_size).to_string()),
        })
    }

    async fn delete(&self, id: Uuid) -> Result<(), AtlasError> {
        sqlx::query("DELETE FROM atlas_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AtlasError::StoreFailure(e.to_string()))?;
        Ok(())
    }
}
