//! Centralized default constants for the finsight system.
//!
//! **This module is the single source of truth** for all shared default values.
//! All crates should reference these constants instead of defining their own
//! magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Maximum upload size in bytes (25 MB).
/// Configurable via `FINSIGHT_MAX_UPLOAD_BYTES` env var. Enforced at two
/// layers: axum `DefaultBodyLimit` on the upload route, and the size check
/// in the upload handler.
pub const MAX_UPLOAD_SIZE_BYTES: usize = 25 * 1024 * 1024;

/// Maximum filename length (ext4/NTFS compatible).
pub const FILENAME_MAX_LENGTH: usize = 255;

// =============================================================================
// ANALYSIS
// =============================================================================

/// Query used when the client omits one or submits only whitespace.
pub const DEFAULT_QUERY: &str = "Analyze this financial document for investment insights";

/// Maximum characters of extracted document text handed to a stage prompt.
/// Keeps prompts inside typical model context windows.
pub const PROMPT_DOCUMENT_MAX_CHARS: usize = 48_000;

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default job worker poll interval in milliseconds.
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Default maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Default visibility timeout in seconds. A claimed job whose worker has
/// not finished within this window becomes claimable again (redelivery).
/// Sized for a full four-stage LLM pipeline run with headroom.
pub const JOB_VISIBILITY_TIMEOUT_SECS: u64 = 600;

/// Default maximum deliveries before a job is failed as poison.
pub const JOB_MAX_DELIVERIES: i32 = 3;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default base URL for the OpenAI-compatible generation endpoint.
pub const LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default generation model name.
pub const LLM_MODEL: &str = "gpt-4o-mini";

/// Timeout for generation requests in seconds.
pub const LLM_TIMEOUT_SECS: u64 = 120;

/// Default Serper search endpoint.
pub const SEARCH_BASE_URL: &str = "https://google.serper.dev/search";

/// Timeout for web-search requests in seconds.
pub const SEARCH_TIMEOUT_SECS: u64 = 15;

/// Maximum search hits folded into a stage prompt.
pub const SEARCH_MAX_RESULTS: usize = 5;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Per-command timeout for external extraction tools (seconds).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

/// Maximum extracted text size in bytes (10 MB).
pub const TEXT_EXTRACTION_MAX_BYTES: usize = 10 * 1024 * 1024;

// =============================================================================
// DATABASE
// =============================================================================

/// Interval between connection-pool occupancy log samples (seconds).
pub const POOL_METRICS_INTERVAL_SECS: u64 = 60;

// =============================================================================
// STORAGE
// =============================================================================

/// Default data directory for document blobs.
pub const DATA_DIR: &str = "./data";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_limit_exceeds_extraction_limit_rationale() {
        // A maximal upload can still be extracted: pdftotext output is
        // bounded separately by TEXT_EXTRACTION_MAX_BYTES.
        const {
            assert!(MAX_UPLOAD_SIZE_BYTES > TEXT_EXTRACTION_MAX_BYTES);
        }
    }

    #[test]
    fn visibility_timeout_exceeds_llm_timeout() {
        // Four sequential stage calls must fit inside one visibility window,
        // otherwise healthy jobs get redelivered mid-run.
        const {
            assert!(JOB_VISIBILITY_TIMEOUT_SECS > 4 * LLM_TIMEOUT_SECS);
        }
    }

    #[test]
    fn default_query_is_nonempty() {
        assert!(!DEFAULT_QUERY.trim().is_empty());
    }
}
