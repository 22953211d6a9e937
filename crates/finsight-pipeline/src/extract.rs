//! PDF text extraction using `pdftotext` (poppler-utils).

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use finsight_core::defaults::{EXTRACTION_CMD_TIMEOUT_SECS, TEXT_EXTRACTION_MAX_BYTES};
use finsight_core::{Error, Result, TextExtractor};

/// Check whether the data starts with the PDF magic bytes (`%PDF`).
pub fn has_pdf_magic(data: &[u8]) -> bool {
    data.len() >= 4 && &data[0..4] == b"%PDF"
}

/// Run a command with a timeout, returning stdout as a string.
///
/// On timeout the output future is dropped; `kill_on_drop` ensures the
/// child is reaped instead of left running.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    cmd.kill_on_drop(true);
    let output = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| {
            Error::Extraction(format!("pdftotext timed out after {}s", timeout_secs))
        })?
        .map_err(|e| Error::Extraction(format!("Failed to execute pdftotext: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extraction(format!(
            "pdftotext failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extracts text from PDF documents via `pdftotext`.
///
/// Each invocation is guarded by a per-command timeout, and output is
/// capped at `TEXT_EXTRACTION_MAX_BYTES` (truncated at a char boundary).
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    /// Check that the `pdftotext` binary is available.
    pub async fn health_check() -> Result<bool> {
        match Command::new("pdftotext").arg("-v").output().await {
            Ok(output) => {
                // pdftotext -v prints version to stderr and exits with 0 or 99
                // depending on the version. Both indicate the binary exists.
                Ok(output.status.success() || output.status.code() == Some(99))
            }
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract_text(&self, data: &[u8], file_name: &str) -> Result<String> {
        if data.is_empty() {
            return Err(Error::Extraction(format!(
                "Document '{}' is empty",
                file_name
            )));
        }

        if !has_pdf_magic(data) {
            return Err(Error::Extraction(format!(
                "File '{}' is not a valid PDF (missing %PDF header)",
                file_name
            )));
        }

        // pdftotext reads from a file path. Uploads run to 25 MB, so the
        // temp write goes through tokio rather than blocking the executor.
        let tmpfile = NamedTempFile::new()
            .map_err(|e| Error::Extraction(format!("Failed to create temp file: {}", e)))?;
        tokio::fs::write(tmpfile.path(), data)
            .await
            .map_err(|e| Error::Extraction(format!("Failed to write temp file: {}", e)))?;
        let tmp_path = tmpfile.path().to_string_lossy().to_string();

        let mut text = run_cmd_with_timeout(
            Command::new("pdftotext").arg(&tmp_path).arg("-"),
            EXTRACTION_CMD_TIMEOUT_SECS,
        )
        .await?;

        if text.trim().is_empty() {
            return Err(Error::Extraction(format!(
                "Document '{}' contains no extractable text",
                file_name
            )));
        }

        if text.len() > TEXT_EXTRACTION_MAX_BYTES {
            let mut cut = TEXT_EXTRACTION_MAX_BYTES;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            debug!(
                subsystem = "pipeline",
                component = "pdftotext",
                size_bytes = TEXT_EXTRACTION_MAX_BYTES,
                "Extracted text truncated to size cap"
            );
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_magic_detection() {
        assert!(has_pdf_magic(b"%PDF-1.7 rest of file"));
        assert!(!has_pdf_magic(b"PK\x03\x04zip"));
        assert!(!has_pdf_magic(b"%PD"));
        assert!(!has_pdf_magic(b""));
    }

    #[tokio::test]
    async fn test_extract_rejects_empty_data() {
        let extractor = PdfTextExtractor;
        let err = extractor.extract_text(b"", "empty.pdf").await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_timed_out_command_reports_extraction_error() {
        let err = run_cmd_with_timeout(Command::new("sleep").arg("5"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_extract_rejects_non_pdf() {
        let extractor = PdfTextExtractor;
        let err = extractor
            .extract_text(b"this is plain text", "notes.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert!(err.to_string().contains("%PDF"));
    }
}
