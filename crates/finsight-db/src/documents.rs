//! Document store with filesystem-backed blobs and lazy text extraction.
//!
//! Document bytes live on disk under UUIDv7-derived paths; metadata and
//! the extracted-text cache live in PostgreSQL. Writes are atomic (temp
//! file + rename) so a crash mid-upload never leaves a partially visible
//! document.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use finsight_core::{
    Document, DocumentStore, Error, PutDocumentRequest, Result, TextExtractor,
};

/// Storage backend trait for different storage implementations.
///
/// Allows abstracting over filesystem, S3, or other storage providers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Filesystem storage backend.
///
/// Stores files in a directory hierarchy based on UUIDv7 blob IDs.
/// Path format: `{base_path}/blobs/{first-2-hex}/{next-2-hex}/{uuid}.bin`
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    /// Validate that the storage backend can write, read, and delete files.
    ///
    /// Performs a full round-trip test at startup to catch filesystem issues
    /// (overlayfs quirks, permission errors, missing directories) early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join("blobs/.health-check");
        let test_file = test_dir.join("test.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await; // Best-effort cleanup

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        debug!(storage_path = %path, full_path = %full_path.display(), size_bytes = data.len(), "document_store: write");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "document_store: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "document_store: File::create failed");
            e
        })?;
        file.write_all(data).await.map_err(|e| {
            warn!(error = %e, "document_store: write_all failed");
            e
        })?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "document_store: rename failed");
            e
        })?;

        // Set permissions to 0644 (rw-r--r--, no execute)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        Ok(fs::read(full_path).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        if tokio::fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        Ok(tokio::fs::try_exists(full_path).await?)
    }
}

/// Generate storage path from UUID.
///
/// Path format: `blobs/{first-2-hex}/{next-2-hex}/{uuid}.bin`
///
/// Example: `blobs/01/94/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.bin`
pub fn generate_storage_path(uuid: &Uuid) -> String {
    let hex = uuid.as_hyphenated().to_string().replace('-', "");
    format!(
        "blobs/{}/{}/{}.bin",
        &hex[0..2],
        &hex[2..4],
        uuid.as_hyphenated()
    )
}

/// PostgreSQL-backed document store.
///
/// Blob writes happen before the metadata insert, so an interrupted `put`
/// leaves at worst an orphaned blob, never a document row pointing at
/// missing bytes.
pub struct PgDocumentStore {
    pool: PgPool,
    backend: Box<dyn StorageBackend>,
    extractor: Arc<dyn TextExtractor>,
}

impl PgDocumentStore {
    /// Create a new document store.
    ///
    /// # Arguments
    ///
    /// * `pool` - PostgreSQL connection pool
    /// * `backend` - Storage backend (filesystem, S3, etc.)
    /// * `extractor` - Text extractor used for lazy extraction on first read
    pub fn new(
        pool: PgPool,
        backend: impl StorageBackend + 'static,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            pool,
            backend: Box::new(backend),
            extractor,
        }
    }

    fn parse_document_row(row: sqlx::postgres::PgRow) -> Document {
        Document {
            id: row.get("id"),
            file_name: row.get("file_name"),
            content_type: row.get("content_type"),
            size_bytes: row.get("size_bytes"),
            storage_path: row.get("storage_path"),
            extracted_text: row.get("extracted_text"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn put(&self, req: PutDocumentRequest) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let storage_path = generate_storage_path(&id);
        let size_bytes = req.data.len() as i64;
        let now = Utc::now();

        self.backend
            .write(&storage_path, &req.data)
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        sqlx::query(
            "INSERT INTO document (id, file_name, content_type, size_bytes, storage_path, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(&req.file_name)
        .bind(&req.content_type)
        .bind(size_bytes)
        .bind(&storage_path)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        info!(
            subsystem = "db",
            component = "document_store",
            op = "put",
            document_id = %id,
            size_bytes,
            "Document stored"
        );
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Document> {
        let row = sqlx::query(
            "SELECT id, file_name, content_type, size_bytes, storage_path, extracted_text, created_at
             FROM document WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_document_row)
            .ok_or(Error::DocumentNotFound(id))
    }

    async fn get_bytes(&self, id: Uuid) -> Result<Vec<u8>> {
        let doc = self.get(id).await?;
        self.backend.read(&doc.storage_path).await
    }

    async fn get_text(&self, id: Uuid) -> Result<String> {
        let doc = self.get(id).await?;
        if let Some(text) = doc.extracted_text {
            return Ok(text);
        }

        let data = self.backend.read(&doc.storage_path).await?;
        let text = self.extractor.extract_text(&data, &doc.file_name).await?;

        // Cache for subsequent reads (redeliveries, re-analysis).
        sqlx::query("UPDATE document SET extracted_text = $1 WHERE id = $2")
            .bind(&text)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "document_store",
            op = "extract",
            document_id = %id,
            size_bytes = text.len() as i64,
            "Extracted text cached"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_storage_path_format() {
        let uuid = Uuid::parse_str("01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f").unwrap();
        let path = generate_storage_path(&uuid);
        assert_eq!(
            path,
            "blobs/01/94/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.bin"
        );
    }

    #[tokio::test]
    async fn test_filesystem_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        let path = "blobs/ab/cd/test.bin";
        let data = b"hello world";

        backend.write(path, data).await.unwrap();
        assert!(backend.exists(path).await.unwrap());
        assert_eq!(backend.read(path).await.unwrap(), data);

        backend.delete(path).await.unwrap();
        assert!(!backend.exists(path).await.unwrap());
    }

    #[tokio::test]
    async fn test_filesystem_backend_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        let path = "blobs/00/11/doc.bin";
        backend.write(path, b"first").await.unwrap();
        backend.write(path, b"second").await.unwrap();
        assert_eq!(backend.read(path).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_filesystem_backend_delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.delete("blobs/no/pe/missing.bin").await.unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_backend_validate() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.validate().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_temp_file_left_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        let path = "blobs/aa/bb/doc.bin";
        backend.write(path, b"data").await.unwrap();

        let temp = dir.path().join("blobs/aa/bb/doc.tmp");
        assert!(!temp.exists());
    }
}
