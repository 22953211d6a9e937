//! Core traits for finsight abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// JOB QUEUE TRAITS
// =============================================================================

/// Request for submitting a new analysis job.
#[derive(Debug, Clone)]
pub struct SubmitJobRequest {
    pub query: String,
    pub document_id: Uuid,
}

/// Repository for durable job queue operations.
///
/// The queue is at-least-once: a claimed job that is never acked becomes
/// claimable again once its visibility timeout expires. Consumers must
/// tolerate redelivery.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Submit a new job. The job and its pending result record are durably
    /// recorded atomically before this returns; the returned id is
    /// immediately pollable.
    async fn submit(&self, req: SubmitJobRequest) -> Result<Uuid>;

    /// Claim the next available job for exclusive processing.
    ///
    /// Returns pending jobs first, then running jobs whose visibility
    /// timeout has expired (redelivery). The returned job carries its
    /// incremented `deliveries` count; callers enforce the delivery
    /// budget. Returns `None` when nothing is claimable.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Acknowledge successful processing. Terminal; the job is never
    /// redelivered afterwards.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job as permanently failed. Terminal, like `complete`.
    async fn fail(&self, job_id: Uuid) -> Result<()>;

    /// Get a job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Get pending jobs count.
    async fn pending_count(&self) -> Result<i64>;

    /// Get queue statistics.
    async fn queue_stats(&self) -> Result<QueueStats>;
}

// =============================================================================
// RESULT STORE TRAITS
// =============================================================================

/// Repository for per-job result records.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Initialize a result record in `Pending` for an existing job.
    /// `JobRepository::submit` already does this atomically with the
    /// enqueue; this is the standalone form of the same operation.
    async fn init(&self, job_id: Uuid) -> Result<()>;

    /// Transition the record's status, enforcing the monotonic state
    /// machine. Returns `Error::InvalidTransition` when the current state
    /// does not permit the move; terminal records are left untouched.
    async fn transition(&self, job_id: Uuid, to: ResultStatus) -> Result<()>;

    /// Mark the record failed, with stage attribution when the failure
    /// happened inside a pipeline stage. Same state-machine enforcement
    /// as `transition`.
    async fn fail(&self, job_id: Uuid, stage: Option<StageName>, detail: &str) -> Result<()>;

    /// Append one stage's output to the record. Outputs persist
    /// incrementally so a crash mid-pipeline loses at most one stage.
    async fn append_stage_output(&self, job_id: Uuid, output: &StageOutput) -> Result<()>;

    /// Fetch the record for a job.
    async fn get(&self, job_id: Uuid) -> Result<Option<ResultRecord>>;
}

// =============================================================================
// DOCUMENT STORE TRAITS
// =============================================================================

/// Request for storing an uploaded document.
#[derive(Debug, Clone)]
pub struct PutDocumentRequest {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Store for uploaded document bytes and their extracted text.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Durably persist document bytes and metadata, returning the new
    /// document's ID. The write is atomic: a crash mid-write leaves no
    /// partially visible document.
    async fn put(&self, req: PutDocumentRequest) -> Result<Uuid>;

    /// Get document metadata by ID.
    async fn get(&self, id: Uuid) -> Result<Document>;

    /// Get the raw stored bytes for a document.
    async fn get_bytes(&self, id: Uuid) -> Result<Vec<u8>>;

    /// Get the document's extracted text, extracting lazily on first
    /// access and caching thereafter.
    async fn get_text(&self, id: Uuid) -> Result<String>;
}

/// Extracts plain text from stored document bytes.
///
/// Injected into the document store so the storage layer stays free of
/// external tool invocation.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text from raw document data.
    ///
    /// Returns `Error::Extraction` for malformed or unreadable input.
    async fn extract_text(&self, data: &[u8], file_name: &str) -> Result<String>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// A single web-search hit folded into stage prompts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Provider for web-search grounding of analysis stages.
///
/// Optional capability: when no provider is configured, the pipeline runs
/// in degraded mode without market context.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search the web for the given query.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}
