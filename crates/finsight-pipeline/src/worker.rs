//! Job worker: claims analysis jobs and runs the pipeline over them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use finsight_core::defaults;
use finsight_core::{Error, Job, Result, ResultStatus};
use finsight_db::Database;

use crate::pipeline::PipelineExecutor;

/// Worker event broadcast channel capacity.
const EVENT_BUS_CAPACITY: usize = 256;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was started.
    JobStarted { job_id: Uuid },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid },
    /// A job failed.
    JobFailed { job_id: Uuid, error: String },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Job worker that processes jobs from the queue.
pub struct JobWorker {
    db: Database,
    config: WorkerConfig,
    executor: Arc<PipelineExecutor>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(db: Database, config: WorkerConfig, executor: PipelineExecutor) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            db,
            config,
            executor: Arc::new(executor),
            event_tx,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop with concurrent job processing.
    ///
    /// Claims up to `max_concurrent_jobs` at a time and processes them
    /// concurrently. Only sleeps when the queue is empty.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            "Job worker started"
        );

        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let max_concurrent = self.config.max_concurrent_jobs;

        loop {
            // Check for shutdown before claiming jobs
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            // Claim up to max_concurrent jobs
            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..max_concurrent {
                match self.claim_job().await {
                    Some(job) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                // Queue empty: sleep before polling again
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent job batch");
                // Wait for all claimed jobs to complete
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
                // No sleep: immediately try to claim more jobs
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    /// Claim the next available job without processing it.
    async fn claim_job(&self) -> Option<Job> {
        match self.db.jobs.claim_next().await {
            Ok(Some(job)) => Some(job),
            Ok(None) => None,
            Err(e) => {
                error!(error = ?e, "Failed to claim job");
                None
            }
        }
    }

    /// Clone references needed for spawned job tasks.
    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            db: self.db.clone(),
            executor: self.executor.clone(),
            event_tx: self.event_tx.clone(),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Get the pending job count.
    pub async fn pending_count(&self) -> Result<i64> {
        self.db.jobs.pending_count().await
    }
}

/// Lightweight reference bundle for executing a single job in a spawned task.
struct JobWorkerRef {
    db: Database,
    executor: Arc<PipelineExecutor>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorkerRef {
    /// Execute a single claimed job.
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;

        info!(job_id = %job_id, delivery = job.deliveries, "Processing job");
        let _ = self.event_tx.send(WorkerEvent::JobStarted { job_id });

        // Poison guard: a job redelivered past its budget never reaches the
        // pipeline again.
        if job.deliveries > job.max_deliveries {
            let detail = format!(
                "delivery budget exhausted after {} deliveries",
                job.deliveries
            );
            warn!(job_id = %job_id, delivery = job.deliveries, "Failing poison job");
            self.settle_failed(job_id, None, &detail).await;
            return;
        }

        // Move the result record to Running. A redelivered job finds the
        // record already Running (the earlier delivery crashed mid-run);
        // a record already terminal means a racing delivery finished the
        // work, so only the queue needs settling.
        match self
            .db
            .results
            .transition(job_id, ResultStatus::Running)
            .await
        {
            Ok(()) => {}
            Err(Error::InvalidTransition {
                from: ResultStatus::Running,
                ..
            }) => {
                debug!(job_id = %job_id, "Result already running, resuming");
            }
            Err(Error::InvalidTransition { from, .. }) if from.is_terminal() => {
                info!(job_id = %job_id, ?from, "Result already terminal, settling queue");
                let settle = match from {
                    ResultStatus::Succeeded => self.db.jobs.complete(job_id).await,
                    _ => self.db.jobs.fail(job_id).await,
                };
                if let Err(e) = settle {
                    error!(error = ?e, job_id = %job_id, "Failed to settle queue for terminal result");
                }
                return;
            }
            Err(e) => {
                // Leave the job claimed; the visibility timeout will
                // redeliver it once the store recovers.
                error!(error = ?e, job_id = %job_id, "Failed to mark result running");
                return;
            }
        }

        match self.executor.execute(&job).await {
            Ok(()) => {
                if let Err(e) = self
                    .db
                    .results
                    .transition(job_id, ResultStatus::Succeeded)
                    .await
                {
                    error!(error = ?e, job_id = %job_id, "Failed to mark result succeeded");
                }
                if let Err(e) = self.db.jobs.complete(job_id).await {
                    error!(error = ?e, job_id = %job_id, "Failed to ack job");
                } else {
                    info!(
                        job_id = %job_id,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job completed successfully"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobCompleted { job_id });
                }
            }
            Err(e) => {
                let stage = e.stage();
                let detail = e.to_string();
                warn!(
                    job_id = %job_id,
                    stage = stage.map(|s| s.as_str()).unwrap_or("-"),
                    error = %detail,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job failed"
                );
                self.settle_failed(job_id, stage, &detail).await;
            }
        }
    }

    /// Record a failure in the result store and settle the queue.
    async fn settle_failed(
        &self,
        job_id: Uuid,
        stage: Option<finsight_core::StageName>,
        detail: &str,
    ) {
        match self.db.results.fail(job_id, stage, detail).await {
            Ok(()) => {}
            Err(Error::InvalidTransition { .. }) => {
                // A racing delivery already terminalized the record.
                debug!(job_id = %job_id, "Result already terminal, skipping fail");
            }
            Err(e) => {
                error!(error = ?e, job_id = %job_id, "Failed to record result failure");
            }
        }
        if let Err(e) = self.db.jobs.fail(job_id).await {
            error!(error = ?e, job_id = %job_id, "Failed to mark job as failed");
        } else {
            let _ = self.event_tx.send(WorkerEvent::JobFailed {
                job_id,
                error: detail.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, defaults::JOB_POLL_INTERVAL_MS);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(1000)
            .with_max_concurrent(8)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.max_concurrent_jobs, 8);
        assert!(!config.enabled);
    }

    #[test]
    fn test_worker_config_chaining_order_independence() {
        let config1 = WorkerConfig::default()
            .with_enabled(false)
            .with_max_concurrent(10)
            .with_poll_interval(3000);

        let config2 = WorkerConfig::default()
            .with_poll_interval(3000)
            .with_enabled(false)
            .with_max_concurrent(10);

        assert_eq!(config1.poll_interval_ms, config2.poll_interval_ms);
        assert_eq!(config1.max_concurrent_jobs, config2.max_concurrent_jobs);
        assert_eq!(config1.enabled, config2.enabled);
    }

    #[test]
    fn test_worker_event_clone_and_debug() {
        let job_id = Uuid::new_v4();
        let event = WorkerEvent::JobFailed {
            job_id,
            error: "stage 'analysis' failed".to_string(),
        };
        let cloned = event.clone();
        let debug_str = format!("{:?}", cloned);
        assert!(debug_str.contains("JobFailed"));
        assert!(debug_str.contains("analysis"));
    }
}
