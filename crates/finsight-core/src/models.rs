//! Data model for jobs, results, and documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue-side lifecycle of a job.
///
/// `Pending` rows are claimable; `Running` rows become claimable again once
/// their visibility timeout expires (redelivery). `Done` and `Failed` are
/// terminal from the queue's perspective; the analytical outcome lives in
/// the result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// Progress/outcome of a job, one-to-one with the job by id.
///
/// Transitions are monotonic: Pending → Running → {Succeeded | Failed}.
/// No transition out of a terminal state is ever permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ResultStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, ResultStatus::Succeeded | ResultStatus::Failed)
    }

    /// Whether the state machine permits a transition to `next`.
    pub fn can_transition_to(self, next: ResultStatus) -> bool {
        use ResultStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Running, Succeeded) | (Running, Failed) | (Pending, Failed)
        )
    }

    /// Wire name used by the status-polling API (Celery-compatible).
    pub fn wire_name(self) -> &'static str {
        match self {
            ResultStatus::Pending => "PENDING",
            ResultStatus::Running => "STARTED",
            ResultStatus::Succeeded => "SUCCESS",
            ResultStatus::Failed => "FAILURE",
        }
    }
}

/// The four fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Verification,
    Analysis,
    Recommendation,
    Risk,
}

impl StageName {
    /// All stages in fixed execution order.
    pub const ORDER: [StageName; 4] = [
        StageName::Verification,
        StageName::Analysis,
        StageName::Recommendation,
        StageName::Risk,
    ];

    /// Stable lowercase name, used in error payloads and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Verification => "verification",
            StageName::Analysis => "analysis",
            StageName::Recommendation => "recommendation",
            StageName::Risk => "risk",
        }
    }

    /// Human-readable section title for the composed report.
    pub fn report_heading(self) -> &'static str {
        match self {
            StageName::Verification => "Document Verification",
            StageName::Analysis => "Financial Analysis",
            StageName::Recommendation => "Investment Recommendation",
            StageName::Risk => "Risk Assessment",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed stage's named output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage: StageName,
    pub output: String,
}

/// A unit of work: one user-submitted (query, document) pair.
///
/// Immutable after creation apart from queue bookkeeping; all analytical
/// progress is tracked in the associated result record keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub query: String,
    pub document_id: Uuid,
    pub status: JobStatus,
    /// Times this job has been handed to a worker (1 on first claim).
    pub deliveries: i32,
    pub max_deliveries: i32,
    pub submitted_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Persisted result record for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub job_id: Uuid,
    pub status: ResultStatus,
    /// Ordered outputs, one per completed stage. Appended only by the
    /// pipeline executor.
    pub stage_outputs: Vec<StageOutput>,
    pub error_stage: Option<StageName>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResultRecord {
    /// Compose the client-facing report from the stage outputs.
    ///
    /// One named section per completed stage, in execution order.
    pub fn composed_report(&self) -> String {
        let mut report = String::new();
        for so in &self.stage_outputs {
            if !report.is_empty() {
                report.push_str("\n\n");
            }
            report.push_str("## ");
            report.push_str(so.stage.report_heading());
            report.push_str("\n\n");
            report.push_str(so.output.trim());
        }
        report
    }
}

/// Metadata for an uploaded document. Bytes live on the filesystem under
/// `storage_path`; `extracted_text` is a lazily populated cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub extracted_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate queue counters for the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub done_last_hour: i64,
    pub failed_last_hour: i64,
    pub total: i64,
}
