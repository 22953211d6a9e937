//! The four-stage analysis pipeline executor.
//!
//! Stages run strictly in order: verification, analysis, recommendation,
//! risk. Each stage's output persists as soon as it completes, and a
//! redelivered job resumes after the last persisted stage instead of
//! re-running the whole chain.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use finsight_core::defaults::SEARCH_MAX_RESULTS;
use finsight_core::{
    DocumentStore, Error, GenerationBackend, Job, Result, ResultRepository, SearchHit,
    SearchProvider, StageName, StageOutput,
};

use crate::extract::has_pdf_magic;
use crate::stages::{build_prompt, system_prompt, StageContext};

/// Executes the fixed stage chain for one job.
pub struct PipelineExecutor {
    documents: Arc<dyn DocumentStore>,
    results: Arc<dyn ResultRepository>,
    llm: Arc<dyn GenerationBackend>,
    search: Option<Arc<dyn SearchProvider>>,
}

impl PipelineExecutor {
    /// Create a new executor. A `None` search provider puts the pipeline
    /// in degraded mode: stages run without market context.
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        results: Arc<dyn ResultRepository>,
        llm: Arc<dyn GenerationBackend>,
        search: Option<Arc<dyn SearchProvider>>,
    ) -> Self {
        Self {
            documents,
            results,
            llm,
            search,
        }
    }

    /// Run all stages for the job that are not already persisted.
    ///
    /// Returns `Err` with stage attribution when a stage fails; the caller
    /// is responsible for recording the failure and settling the queue.
    pub async fn execute(&self, job: &Job) -> Result<()> {
        let record = self
            .results
            .get(job.id)
            .await?
            .ok_or(Error::JobNotFound(job.id))?;

        let mut prior: Vec<StageOutput> = record.stage_outputs;
        let done: Vec<StageName> = prior.iter().map(|o| o.stage).collect();
        if !done.is_empty() {
            info!(
                subsystem = "pipeline",
                op = "resume",
                job_id = %job.id,
                completed_stages = done.len(),
                "Resuming pipeline after redelivery"
            );
        }

        let document = self.documents.get(job.document_id).await?;

        // Advisory header check for the verification stage. A mismatch is
        // reported, not fatal; extraction settles the question later.
        let looks_like_pdf = if done.contains(&StageName::Verification) {
            true
        } else {
            let bytes = self.documents.get_bytes(job.document_id).await?;
            has_pdf_magic(&bytes)
        };

        let search_hits = self.fetch_search_context(&job.query).await;

        for stage in StageName::ORDER {
            if done.contains(&stage) {
                continue;
            }

            // Lazy extraction: only the analysis stage reads the text, so a
            // corrupt document still gets its verification output.
            let document_text = if stage == StageName::Analysis {
                Some(self.documents.get_text(job.document_id).await?)
            } else {
                None
            };

            let ctx = StageContext {
                query: &job.query,
                file_name: &document.file_name,
                size_bytes: document.size_bytes,
                looks_like_pdf,
                document_text: document_text.as_deref(),
                search_hits: &search_hits,
                prior: &prior,
            };

            let start = Instant::now();
            let output = self
                .llm
                .generate_with_system(system_prompt(stage), &build_prompt(stage, &ctx))
                .await
                .map_err(|e| Error::Stage {
                    stage,
                    detail: e.to_string(),
                })?;

            let stage_output = StageOutput {
                stage,
                output,
            };
            self.results
                .append_stage_output(job.id, &stage_output)
                .await?;

            info!(
                subsystem = "pipeline",
                op = "stage",
                job_id = %job.id,
                stage = stage.as_str(),
                duration_ms = start.elapsed().as_millis() as u64,
                response_len = stage_output.output.len(),
                "Stage complete"
            );
            prior.push(stage_output);
        }

        Ok(())
    }

    /// Fetch web-search context, degrading to no context on any failure.
    async fn fetch_search_context(&self, query: &str) -> Vec<SearchHit> {
        let Some(ref search) = self.search else {
            return Vec::new();
        };
        match search.search(query, SEARCH_MAX_RESULTS).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "search",
                    error = %e,
                    "Web search failed, continuing without market context"
                );
                Vec::new()
            }
        }
    }
}
