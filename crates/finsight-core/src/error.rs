//! Error types for finsight.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{ResultStatus, StageName};

/// Result type alias using finsight's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for finsight operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    /// Client input malformed (surfaced synchronously as 4xx)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Document storage cannot durably complete a write
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Job queue backing store cannot accept writes
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Document text extraction failed (malformed/corrupt input)
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A pipeline stage failed with an unrecoverable error
    #[error("Stage '{stage}' failed: {detail}")]
    Stage { stage: StageName, detail: String },

    /// Attempted a result-store transition out of a terminal state.
    /// Signals a bug; logged by the worker, never fatal.
    #[error("Invalid transition for job {job_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        job_id: Uuid,
        from: ResultStatus,
        to: ResultStatus,
    },

    /// LLM generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Web-search capability failed
    #[error("Search error: {0}")]
    Search(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The stage name carried by pipeline-fatal errors, if any.
    ///
    /// `Extraction` errors are attributed to the analysis stage, where lazy
    /// extraction happens.
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            Error::Extraction(_) => Some(StageName::Analysis),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
