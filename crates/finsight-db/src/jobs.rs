//! Job queue repository implementation.
//!
//! Durable at-least-once queue on top of PostgreSQL. Claims use
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never hand the same
//! job to two consumers inside one visibility window. Running jobs whose
//! window has expired become claimable again (redelivery).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use finsight_core::defaults;
use finsight_core::{
    Error, Job, JobRepository, JobStatus, QueueStats, Result, SubmitJobRequest,
};

/// PostgreSQL implementation of JobRepository.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    visibility_timeout: Duration,
    max_deliveries: i32,
}

impl PgJobRepository {
    /// Create a repository with default visibility timeout and delivery budget.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            visibility_timeout: Duration::from_secs(defaults::JOB_VISIBILITY_TIMEOUT_SECS),
            max_deliveries: defaults::JOB_MAX_DELIVERIES,
        }
    }

    /// Create a repository with explicit queue tuning.
    pub fn with_config(
        pool: Pool<Postgres>,
        visibility_timeout: Duration,
        max_deliveries: i32,
    ) -> Self {
        Self {
            pool,
            visibility_timeout,
            max_deliveries,
        }
    }

    /// Convert JobStatus to string for database.
    fn job_status_to_str(status: JobStatus) -> &'static str {
        match status {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Convert string from database to JobStatus.
    fn str_to_job_status(s: &str) -> JobStatus {
        match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "done" => JobStatus::Done,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending, // fallback
        }
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Job {
        Job {
            id: row.get("id"),
            query: row.get("query"),
            document_id: row.get("document_id"),
            status: Self::str_to_job_status(row.get("status")),
            deliveries: row.get("deliveries"),
            max_deliveries: row.get("max_deliveries"),
            submitted_at: row.get("submitted_at"),
            claimed_at: row.get("claimed_at"),
            completed_at: row.get("completed_at"),
        }
    }

    /// Mark a job terminal with the given status.
    async fn finish(&self, job_id: Uuid, status: JobStatus) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE job_queue
             SET status = $1::job_status, completed_at = $2
             WHERE id = $3 AND status = 'running'::job_status",
        )
        .bind(Self::job_status_to_str(status))
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            // Either the job doesn't exist, or a redelivered copy already
            // finished it. Distinguish for the caller.
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM job_queue WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
            if exists.is_none() {
                return Err(Error::JobNotFound(job_id));
            }
            debug!(
                subsystem = "db",
                component = "queue",
                op = "finish",
                job_id = %job_id,
                "Job already terminal, finish is a no-op"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn submit(&self, req: SubmitJobRequest) -> Result<Uuid> {
        let job_id = Uuid::now_v7();
        let now = Utc::now();

        // The job and its pending result record are created in one
        // transaction: no claimable job without a pollable record, and
        // nothing enqueued when either insert fails.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::QueueUnavailable(e.to_string()))?;

        sqlx::query(
            "INSERT INTO job_queue (id, query, document_id, status, deliveries, max_deliveries, submitted_at)
             VALUES ($1, $2, $3, 'pending'::job_status, 0, $4, $5)",
        )
        .bind(job_id)
        .bind(&req.query)
        .bind(req.document_id)
        .bind(self.max_deliveries)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::QueueUnavailable(e.to_string()))?;

        sqlx::query(
            "INSERT INTO analysis_result (job_id, status, stage_outputs, created_at, updated_at)
             VALUES ($1, 'pending'::result_status, '[]'::jsonb, $2, $2)",
        )
        .bind(job_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::QueueUnavailable(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::QueueUnavailable(e.to_string()))?;

        info!(
            subsystem = "db",
            component = "queue",
            op = "submit",
            job_id = %job_id,
            document_id = %req.document_id,
            "Job submitted"
        );
        Ok(job_id)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let now = Utc::now();
        let expired_before = now
            - chrono::Duration::from_std(self.visibility_timeout)
                .map_err(|e| Error::Config(format!("visibility timeout out of range: {e}")))?;

        // Pending rows first (FIFO), then expired running rows for
        // redelivery. SKIP LOCKED keeps concurrent claimers from blocking
        // on each other.
        let row = sqlx::query(
            "UPDATE job_queue
             SET status = 'running'::job_status, claimed_at = $1, deliveries = deliveries + 1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'::job_status
                    OR (status = 'running'::job_status AND claimed_at < $2)
                 ORDER BY status ASC, submitted_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, query, document_id, status::text, deliveries, max_deliveries,
                       submitted_at, claimed_at, completed_at",
        )
        .bind(now)
        .bind(expired_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let job = row.map(Self::parse_job_row);
        if let Some(ref job) = job {
            debug!(
                subsystem = "db",
                component = "queue",
                op = "claim",
                job_id = %job.id,
                delivery = job.deliveries,
                "Job claimed"
            );
        }
        Ok(job)
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        self.finish(job_id, JobStatus::Done).await
    }

    async fn fail(&self, job_id: Uuid) -> Result<()> {
        self.finish(job_id, JobStatus::Failed).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, query, document_id, status::text, deliveries, max_deliveries,
                    submitted_at, claimed_at, completed_at
             FROM job_queue WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM job_queue WHERE status = 'pending'::job_status")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count.0)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                 COUNT(*) FILTER (WHERE status = 'pending'::job_status) AS pending,
                 COUNT(*) FILTER (WHERE status = 'running'::job_status) AS running,
                 COUNT(*) FILTER (WHERE status = 'done'::job_status
                                    AND completed_at > now() - interval '1 hour') AS done_last_hour,
                 COUNT(*) FILTER (WHERE status = 'failed'::job_status
                                    AND completed_at > now() - interval '1 hour') AS failed_last_hour,
                 COUNT(*) AS total
             FROM job_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get("pending"),
            running: row.get("running"),
            done_last_hour: row.get("done_last_hour"),
            failed_last_hour: row.get("failed_last_hour"),
            total: row.get("total"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Failed,
        ] {
            let s = PgJobRepository::job_status_to_str(status);
            assert_eq!(PgJobRepository::str_to_job_status(s), status);
        }
    }

    #[test]
    fn test_unknown_status_falls_back_to_pending() {
        assert_eq!(
            PgJobRepository::str_to_job_status("corrupted"),
            JobStatus::Pending
        );
    }
}
