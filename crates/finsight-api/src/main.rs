//! finsight-api - HTTP API server for finsight

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use finsight_core::{
    defaults, DocumentStore, Error, GenerationBackend, JobRepository, PutDocumentRequest,
    ResultRepository, ResultStatus, SearchProvider, StageName, SubmitJobRequest,
};
use finsight_db::{
    create_pool, log_pool_metrics, Database, DatabaseConfig, FilesystemBackend, PoolConfig,
};
use finsight_inference::{OpenAIBackend, SerperProvider};
use finsight_pipeline::{JobWorker, PdfTextExtractor, PipelineExecutor, WorkerConfig};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically, which keeps
/// log correlation cheap when debugging production incidents.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// APP STATE
// =============================================================================

#[derive(Clone)]
struct AppState {
    db: Database,
    /// Per-request upload ceiling, enforced in the handler on top of the
    /// body-limit layers.
    max_upload_bytes: usize,
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Internal(Error),
    NotFound(String),
    BadRequest(String),
    PayloadTooLarge(String),
    Unavailable(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            Error::JobNotFound(id) => ApiError::NotFound(format!("Task not found: {id}")),
            Error::DocumentNotFound(id) => ApiError::NotFound(format!("Document not found: {id}")),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            Error::StorageUnavailable(msg) | Error::QueueUnavailable(msg) => {
                ApiError::Unavailable(msg.clone())
            }
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

// =============================================================================
// RESPONSE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    status: &'static str,
    task_id: Uuid,
    file_name: String,
}

#[derive(Debug, Serialize)]
struct TaskStatusResponse {
    task_id: Uuid,
    status: &'static str,
    /// The composed report, present only on `SUCCESS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    /// `"stage: detail"` (or bare detail when no stage is attributable),
    /// present only on `FAILURE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Flatten a failed record's stage attribution and detail into one string.
fn failure_message(stage: Option<StageName>, detail: Option<String>) -> String {
    let detail = detail.unwrap_or_default();
    match stage {
        Some(stage) => format!("{}: {}", stage.as_str(), detail),
        None => detail,
    }
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// ANALYSIS HANDLERS
// =============================================================================

/// The query to run when the client omitted one or sent only whitespace.
fn effective_query(query: Option<String>) -> String {
    match query {
        Some(q) if !q.trim().is_empty() => q.trim().to_string(),
        _ => defaults::DEFAULT_QUERY.to_string(),
    }
}

/// Strip any path components from an uploaded filename and bound its length.
fn sanitize_file_name(raw: &str) -> Result<String, ApiError> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .trim()
        .to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest(
            "Uploaded file must have a filename".to_string(),
        ));
    }
    if name.len() > defaults::FILENAME_MAX_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Filename exceeds {} characters",
            defaults::FILENAME_MAX_LENGTH
        )));
    }
    Ok(name)
}

/// Accept a document upload and queue it for analysis.
///
/// Multipart fields:
/// - `file` (required): the document bytes
/// - `query` (optional): the analysis question; defaults when blank
///
/// The task is durably queued before this returns; the `task_id` in the
/// response is immediately pollable via `GET /status/{task_id}`.
async fn analyze_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut data: Option<Vec<u8>> = None;
    let mut query: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?
    {
        match field.name() {
            Some("file") => {
                file_name = field.file_name().map(|s| s.to_string());
                content_type = field.content_type().map(|s| s.to_string());
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| {
                            ApiError::BadRequest(format!("Failed to read file data: {e}"))
                        })?
                        .to_vec(),
                );
            }
            Some("query") => {
                query = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read query field: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let data =
        data.ok_or_else(|| ApiError::BadRequest("No file uploaded. Use field 'file'.".to_string()))?;
    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    if data.len() > state.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Upload exceeds {} bytes",
            state.max_upload_bytes
        )));
    }

    let file_name = sanitize_file_name(file_name.as_deref().unwrap_or(""))?;
    let content_type = content_type.unwrap_or_else(|| "application/pdf".to_string());
    let query = effective_query(query);

    let document_id = state
        .db
        .documents
        .put(PutDocumentRequest {
            file_name: file_name.clone(),
            content_type,
            data,
        })
        .await?;

    let task_id = state
        .db
        .jobs
        .submit(SubmitJobRequest {
            query,
            document_id,
        })
        .await?;

    info!(
        task_id = %task_id,
        document_id = %document_id,
        file_name = %file_name,
        "Analysis task queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            status: "queued",
            task_id,
            file_name,
        }),
    ))
}

/// Poll the status of an analysis task.
///
/// Statuses on the wire: `PENDING`, `STARTED`, `SUCCESS`, `FAILURE`.
/// `SUCCESS` responses carry the composed report in `result`; `FAILURE`
/// responses carry `"stage: detail"` in `error`.
async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .db
        .results
        .get(task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Task not found: {task_id}")))?;

    let mut response = TaskStatusResponse {
        task_id,
        status: record.status.wire_name(),
        result: None,
        error: None,
    };

    match record.status {
        ResultStatus::Succeeded => {
            response.result = Some(record.composed_report());
        }
        ResultStatus::Failed => {
            response.error = Some(failure_message(record.error_stage, record.error_detail));
        }
        _ => {}
    }

    Ok(Json(response))
}

/// Aggregate queue counters.
async fn queue_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.db.jobs.queue_stats().await?;
    Ok(Json(stats))
}

// =============================================================================
// CORS
// =============================================================================

/// Allowed origins from `CORS_ALLOWED_ORIGINS` (comma-separated), or any
/// origin when unset.
fn cors_allow_origin() -> AllowOrigin {
    match std::env::var("CORS_ALLOWED_ORIGINS") {
        Ok(origins) => {
            let list: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            AllowOrigin::list(list)
        }
        Err(_) => AllowOrigin::any(),
    }
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "finsight_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "finsight_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        let mut layer = tracing_subscriber::fmt::layer();
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
    }

    info!(log_format = %log_format, "Logging initialized");

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/finsight".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("FINSIGHT_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::SERVER_PORT);
    let max_upload_bytes: usize = std::env::var("FINSIGHT_MAX_UPLOAD_BYTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::MAX_UPLOAD_SIZE_BYTES);

    let mut db_config = DatabaseConfig::default();
    if let Ok(dir) = std::env::var("FINSIGHT_DATA_DIR") {
        db_config.data_dir = dir;
    }
    if let Some(secs) = std::env::var("JOB_VISIBILITY_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        db_config.visibility_timeout = std::time::Duration::from_secs(secs);
    }
    if let Some(n) = std::env::var("JOB_MAX_DELIVERIES")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        db_config.max_deliveries = n;
    }

    // Connect to database
    info!("Connecting to database...");
    let pool = create_pool(&database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    finsight_db::run_migrations(&pool).await?;
    info!("Database migrations complete");

    // Validate document blob storage before accepting uploads
    FilesystemBackend::new(&db_config.data_dir)
        .validate()
        .await
        .map_err(|e| anyhow::anyhow!("Document storage validation failed: {e}"))?;
    info!(data_dir = %db_config.data_dir, "Document storage initialized");

    // Verify the extraction tool is present; degraded but not fatal, since
    // queued tasks will fail at the analysis stage with a clear error.
    match PdfTextExtractor::health_check().await {
        Ok(true) => info!("pdftotext available"),
        _ => warn!("pdftotext not found on PATH; text extraction will fail"),
    }

    let db = Database::new(pool, db_config, Arc::new(PdfTextExtractor));

    // Sample pool occupancy on a fixed interval so saturation shows up in
    // the logs before acquires start timing out.
    let metrics_pool = db.pool.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            defaults::POOL_METRICS_INTERVAL_SECS,
        ));
        loop {
            interval.tick().await;
            log_pool_metrics(&metrics_pool);
        }
    });

    // Generation backend is required: fail fast on missing credentials
    // rather than queue tasks that can never succeed.
    let llm = OpenAIBackend::from_env()?;
    info!(model = llm.model_name(), "Generation backend initialized");

    // Web search is optional; without it stages run with no market context.
    let search: Option<Arc<dyn SearchProvider>> = match SerperProvider::from_env()? {
        Some(provider) => Some(Arc::new(provider)),
        None => {
            info!("SEARCH_API_KEY not set; running without web-search context");
            None
        }
    };

    // Create and start job worker
    let worker_config = WorkerConfig::from_env();
    let _worker_handle = if worker_config.enabled {
        info!("Starting job worker...");
        let executor = PipelineExecutor::new(
            db.documents.clone(),
            db.results.clone(),
            Arc::new(llm),
            search,
        );
        let handle = JobWorker::new(db.clone(), worker_config, executor).start();
        info!("Job worker started");
        Some(handle)
    } else {
        info!("Job worker disabled");
        None
    };

    // Create app state
    let state = AppState {
        db,
        max_upload_bytes,
    };

    // Build router
    let app = Router::new()
        .route("/", get(health_check))
        .route("/analyze", post(analyze_document))
        .route("/status/:task_id", get(task_status))
        .route("/queue/stats", get(queue_stats))
        // Middleware
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(cors_allow_origin())
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT]),
        )
        // Body limit applies on top of the handler's own size check
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
