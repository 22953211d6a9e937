//! # finsight-db
//!
//! PostgreSQL persistence layer for finsight.
//!
//! This crate provides:
//! - Connection pool management
//! - The durable job queue (`PgJobRepository`)
//! - The result record store (`PgResultRepository`)
//! - The document store with filesystem blobs (`PgDocumentStore`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use finsight_db::{create_pool, Database, DatabaseConfig, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool("postgres://localhost/finsight", PoolConfig::default()).await?;
//!     finsight_db::run_migrations(&pool).await?;
//!
//!     let db = Database::new(pool, DatabaseConfig::default(), extractor);
//!     let pending = db.jobs.pending_count().await?;
//!     println!("{pending} jobs pending");
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

pub mod documents;
pub mod jobs;
pub mod pool;
pub mod results;

// Re-export core types
pub use finsight_core::*;

pub use documents::{generate_storage_path, FilesystemBackend, PgDocumentStore, StorageBackend};
pub use jobs::PgJobRepository;
pub use pool::{create_pool, log_pool_metrics, PoolConfig};
pub use results::PgResultRepository;

/// Run embedded schema migrations against the given pool.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
    Ok(())
}

/// Tuning knobs for the persistence layer.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Base directory for document blobs.
    pub data_dir: String,
    /// Visibility timeout for claimed jobs.
    pub visibility_timeout: Duration,
    /// Delivery budget before a job is failed as poison.
    pub max_deliveries: i32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::DATA_DIR.to_string(),
            visibility_timeout: Duration::from_secs(defaults::JOB_VISIBILITY_TIMEOUT_SECS),
            max_deliveries: defaults::JOB_MAX_DELIVERIES,
        }
    }
}

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: PgPool,
    /// Durable job queue.
    pub jobs: Arc<dyn JobRepository>,
    /// Result record store.
    pub results: Arc<dyn ResultRepository>,
    /// Document store.
    pub documents: Arc<dyn DocumentStore>,
}

impl Database {
    /// Assemble all repositories over one pool.
    pub fn new(pool: PgPool, config: DatabaseConfig, extractor: Arc<dyn TextExtractor>) -> Self {
        let jobs = Arc::new(PgJobRepository::with_config(
            pool.clone(),
            config.visibility_timeout,
            config.max_deliveries,
        ));
        let results = Arc::new(PgResultRepository::new(pool.clone()));
        let documents = Arc::new(PgDocumentStore::new(
            pool.clone(),
            FilesystemBackend::new(&config.data_dir),
            extractor,
        ));

        Self {
            pool,
            jobs,
            results,
            documents,
        }
    }
}
