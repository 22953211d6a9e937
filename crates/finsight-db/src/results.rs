//! Result record repository implementation.
//!
//! Enforces the monotonic result state machine in SQL: every transition
//! is a conditional UPDATE whose WHERE clause names the states the move
//! is legal from. A zero-row update means the record is already past that
//! point (usually a redelivered job racing its first delivery) and
//! surfaces as `Error::InvalidTransition`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use finsight_core::{
    Error, Result, ResultRecord, ResultRepository, ResultStatus, StageName, StageOutput,
};

/// PostgreSQL implementation of ResultRepository.
pub struct PgResultRepository {
    pool: Pool<Postgres>,
}

impl PgResultRepository {
    /// Create a new PgResultRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert ResultStatus to string for database.
    fn status_to_str(status: ResultStatus) -> &'static str {
        match status {
            ResultStatus::Pending => "pending",
            ResultStatus::Running => "running",
            ResultStatus::Succeeded => "succeeded",
            ResultStatus::Failed => "failed",
        }
    }

    /// Convert string from database to ResultStatus.
    fn str_to_status(s: &str) -> ResultStatus {
        match s {
            "pending" => ResultStatus::Pending,
            "running" => ResultStatus::Running,
            "succeeded" => ResultStatus::Succeeded,
            "failed" => ResultStatus::Failed,
            _ => ResultStatus::Pending, // fallback
        }
    }

    /// States a transition to `to` is legal from.
    fn allowed_from(to: ResultStatus) -> &'static [&'static str] {
        match to {
            ResultStatus::Pending => &[],
            ResultStatus::Running => &["pending"],
            ResultStatus::Succeeded => &["running"],
            ResultStatus::Failed => &["pending", "running"],
        }
    }

    fn parse_record_row(row: sqlx::postgres::PgRow) -> Result<ResultRecord> {
        let stage_outputs: serde_json::Value = row.get("stage_outputs");
        let error_stage: Option<String> = row.get("error_stage");
        Ok(ResultRecord {
            job_id: row.get("job_id"),
            status: Self::str_to_status(row.get("status")),
            stage_outputs: serde_json::from_value(stage_outputs)?,
            error_stage: error_stage
                .as_deref()
                .map(|s| {
                    serde_json::from_value::<StageName>(serde_json::Value::String(s.to_string()))
                })
                .transpose()?,
            error_detail: row.get("error_detail"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Re-read the current status after a rejected conditional update and
    /// build the precise error for the caller.
    async fn transition_rejected(&self, job_id: Uuid, to: ResultStatus) -> Error {
        let current: std::result::Result<Option<(String,)>, sqlx::Error> =
            sqlx::query_as("SELECT status::text FROM analysis_result WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(Some((status,))) => Error::InvalidTransition {
                job_id,
                from: Self::str_to_status(&status),
                to,
            },
            Ok(None) => Error::JobNotFound(job_id),
            Err(e) => Error::Database(e),
        }
    }
}

#[async_trait]
impl ResultRepository for PgResultRepository {
    async fn init(&self, job_id: Uuid) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO analysis_result (job_id, status, stage_outputs, created_at, updated_at)
             VALUES ($1, 'pending'::result_status, '[]'::jsonb, $2, $2)",
        )
        .bind(job_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn transition(&self, job_id: Uuid, to: ResultStatus) -> Result<()> {
        let allowed = Self::allowed_from(to);
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE analysis_result
             SET status = $1::result_status, updated_at = $2
             WHERE job_id = $3 AND status::text = ANY($4)",
        )
        .bind(Self::status_to_str(to))
        .bind(now)
        .bind(job_id)
        .bind(allowed)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.transition_rejected(job_id, to).await);
        }

        debug!(
            subsystem = "db",
            component = "result_store",
            op = "transition",
            job_id = %job_id,
            to = Self::status_to_str(to),
            "Result status transitioned"
        );
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, stage: Option<StageName>, detail: &str) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE analysis_result
             SET status = 'failed'::result_status, error_stage = $1, error_detail = $2,
                 updated_at = $3
             WHERE job_id = $4 AND status::text = ANY($5)",
        )
        .bind(stage.map(StageName::as_str))
        .bind(detail)
        .bind(now)
        .bind(job_id)
        .bind(Self::allowed_from(ResultStatus::Failed))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.transition_rejected(job_id, ResultStatus::Failed).await);
        }
        Ok(())
    }

    async fn append_stage_output(&self, job_id: Uuid, output: &StageOutput) -> Result<()> {
        let now = Utc::now();
        let value = serde_json::to_value(output)?;

        let result = sqlx::query(
            "UPDATE analysis_result
             SET stage_outputs = stage_outputs || jsonb_build_array($1::jsonb), updated_at = $2
             WHERE job_id = $3 AND status = 'running'::result_status",
        )
        .bind(value)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::JobNotFound(job_id));
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ResultRecord>> {
        let row = sqlx::query(
            "SELECT job_id, status::text, stage_outputs, error_stage, error_detail,
                    created_at, updated_at
             FROM analysis_result WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_record_row).transpose()
    }
}
