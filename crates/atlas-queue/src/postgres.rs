//! Postgres-backed queue using `FOR UPDATE SKIP LOCKED`, the same
//! atomic-pop idiom the teacher's task-result listener uses.
//!
//! ```sql
//! CREATE TABLE atlas_work_queue (
//!     id BIGSERIAL PRIMARY KEY,
//!     job_id UUID NOT NULL,
//!     payload JSONB NOT NULL,
//!     attempt INT NOT NULL DEFAULT 0,
//!     visible_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     locked_by TEXT
//! );
//! ```

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use async_trait::async_trait;
use atlas_types::{AtlasError, WorkItem};

use crate::{QueueGateway, ReceivedItem, Receipt, MAX_DELIVERY_ATTEMPTS};

pub struct PostgresQueueGateway {
    pool: PgPool,
}

impl PostgresQueueGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueGateway for PostgresQueueGateway {
    async fn enqueue(&self, item: WorkItem) -> Result<(), AtlasError> {
        let payload = serde_json::to_value(&item)
            .map_err(|e| AtlasError::QueueFailure(e.to_string()))?;
        sqlx::query(
            "INSERT INTO atlas_work_queue (job_id, payload) VALUES ($1, $2)",
        )
        .bind(item.job_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| AtlasError::QueueFailure(e.to_string()))?;
        Ok(())
    }

    async fn receive(&self, visibility_timeout_secs: u64) -> Result<Option<ReceivedItem>, AtlasError> {
        let visible_until = Utc::now() + ChronoDuration::seconds(visibility_timeout_secs as i64);

        let row = sqlx::query(
            r#"
            WITH next AS (
                SELECT id FROM atlas_work_queue
                WHERE visible_at <= now()
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE atlas_work_queue q
            SET visible_at = $1, attempt = q.attempt + 1
            FROM next
            WHERE q.id = next.id
            RETURNING q.id, q.payload, q.attempt
            "#,
        )
        .bind(visible_until)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AtlasError::QueueFailure(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row.try_get("id").map_err(|e| AtlasError::QueueFailure(e.to_string()))?;
        let payload: serde_json::Value =
            row.try_get("payload").map_err(|e| AtlasError::QueueFailure(e.to_string()))?;
        let attempt: i32 = row.try_get("attempt").map_err(|e| AtlasError::QueueFailure(e.to_string()))?;

        let item: WorkItem =
            serde_json::from_value(payload).map_err(|e| AtlasError::QueueFailure(e.to_string()))?;

        Ok(Some(ReceivedItem {
            item,
            receipt: Receipt(id.to_string()),
            delivery_attempt: attempt as u32,
        }))
    }

    async fn ack(&self, receipt: &Receipt) -> Result<(), AtlasError> {
        let id: i64 = receipt
            .0
            .parse()
            .map_err(|_| AtlasError::QueueFailure("malformed receipt".into()))?;
        sqlx::query("DELETE FROM atlas_work_queue WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AtlasError::QueueFailure(e.to_string()))?;
        Ok(())
    }

    async fn fail(&self, receipt: &Receipt) -> Result<(), AtlasError> {
        let id: i64 = receipt
            .0
            .parse()
            .map_err(|_| AtlasError::QueueFailure("malformed receipt".into()))?;

        let row = sqlx::query("SELECT attempt, job_id, payload FROM atlas_work_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AtlasError::QueueFailure(e.to_string()))?;

        let Some(row) = row else {
            return Ok(());
        };
        let attempt: i32 = row.try_get("attempt").map_err(|e| AtlasError::QueueFailure(e.to_string()))?;
        let job_id: Uuid = row.try_get("job_id").map_err(|e| AtlasError::QueueFailure(e.to_string()))?;
        let payload: serde_json::Value =
            row.try_get("payload").map_err(|e| AtlasError::QueueFailure(e.to_string()))?;

        if attempt as u32 >= MAX_DELIVERY_ATTEMPTS {
            sqlx::query(
                "INSERT INTO atlas_dead_letters (job_id, payload) VALUES ($1, $2)",
            )
            .bind(job_id)
            .bind(&payload)
            .execute(&self.pool)
            .await
            .map_err(|e| AtlasError::QueueFailure(e.to_string()))?;
            sqlx::query("DELETE FROM atlas_work_queue WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| AtlasError::QueueFailure(e.to_string()))?;
        } else {
            sqlx::query("UPDATE atlas_work_queue SET visible_at = now() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| AtlasError::QueueFailure(e.to_string()))?;
        }
        Ok(())
    }

    async fn dead_letters(&self) -> Vec<WorkItem> {
        let Ok(rows) = sqlx::query("SELECT payload FROM atlas_dead_letters")
            .fetch_all(&self.pool)
            .await
        else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| row.try_get::<serde_json::Value, _>("payload").ok())
            .filter_map(|payload| serde_json::from_value(payload).ok())
            .collect()
    }
}
