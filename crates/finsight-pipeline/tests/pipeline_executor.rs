//! Pipeline executor behavior against in-memory stores.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use finsight_core::{
    Document, DocumentStore, Error, Job, JobStatus, PutDocumentRequest, Result, ResultRecord,
    ResultRepository, ResultStatus, StageName, StageOutput,
};
use finsight_inference::{MockGenerationBackend, MockSearchProvider};
use finsight_pipeline::PipelineExecutor;

struct MemDocumentStore {
    docs: Mutex<HashMap<Uuid, (Document, Vec<u8>)>>,
    text: Mutex<HashMap<Uuid, Result<String>>>,
}

impl MemDocumentStore {
    fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            text: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, data: &[u8], text: Result<String>) -> Uuid {
        let id = Uuid::now_v7();
        let doc = Document {
            id,
            file_name: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: data.len() as i64,
            storage_path: format!("blobs/xx/yy/{id}.bin"),
            extracted_text: None,
            created_at: Utc::now(),
        };
        self.docs.lock().unwrap().insert(id, (doc, data.to_vec()));
        self.text.lock().unwrap().insert(id, text);
        id
    }
}

#[async_trait]
impl DocumentStore for MemDocumentStore {
    async fn put(&self, _req: PutDocumentRequest) -> Result<Uuid> {
        unimplemented!("not used by the executor")
    }

    async fn get(&self, id: Uuid) -> Result<Document> {
        self.docs
            .lock()
            .unwrap()
            .get(&id)
            .map(|(d, _)| d.clone())
            .ok_or(Error::DocumentNotFound(id))
    }

    async fn get_bytes(&self, id: Uuid) -> Result<Vec<u8>> {
        self.docs
            .lock()
            .unwrap()
            .get(&id)
            .map(|(_, b)| b.clone())
            .ok_or(Error::DocumentNotFound(id))
    }

    async fn get_text(&self, id: Uuid) -> Result<String> {
        match self.text.lock().unwrap().get(&id) {
            Some(Ok(t)) => Ok(t.clone()),
            Some(Err(e)) => Err(Error::Extraction(e.to_string())),
            None => Err(Error::DocumentNotFound(id)),
        }
    }
}

#[derive(Default)]
struct MemResultRepository {
    records: Mutex<HashMap<Uuid, ResultRecord>>,
}

impl MemResultRepository {
    fn record(&self, job_id: Uuid) -> ResultRecord {
        self.records.lock().unwrap().get(&job_id).unwrap().clone()
    }
}

#[async_trait]
impl ResultRepository for MemResultRepository {
    async fn init(&self, job_id: Uuid) -> Result<()> {
        self.records.lock().unwrap().insert(
            job_id,
            ResultRecord {
                job_id,
                status: ResultStatus::Pending,
                stage_outputs: vec![],
                error_stage: None,
                error_detail: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn transition(&self, job_id: Uuid, to: ResultStatus) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        if !record.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                job_id,
                from: record.status,
                to,
            });
        }
        record.status = to;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, stage: Option<StageName>, detail: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        if !record.status.can_transition_to(ResultStatus::Failed) {
            return Err(Error::InvalidTransition {
                job_id,
                from: record.status,
                to: ResultStatus::Failed,
            });
        }
        record.status = ResultStatus::Failed;
        record.error_stage = stage;
        record.error_detail = Some(detail.to_string());
        Ok(())
    }

    async fn append_stage_output(&self, job_id: Uuid, output: &StageOutput) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        record.stage_outputs.push(output.clone());
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ResultRecord>> {
        Ok(self.records.lock().unwrap().get(&job_id).cloned())
    }
}

fn make_job(document_id: Uuid) -> Job {
    Job {
        id: Uuid::now_v7(),
        query: "Analyze this financial document for investment insights".to_string(),
        document_id,
        status: JobStatus::Running,
        deliveries: 1,
        max_deliveries: 3,
        submitted_at: Utc::now(),
        claimed_at: Some(Utc::now()),
        completed_at: None,
    }
}

fn executor(
    docs: Arc<MemDocumentStore>,
    results: Arc<MemResultRepository>,
    llm: MockGenerationBackend,
) -> PipelineExecutor {
    PipelineExecutor::new(
        docs,
        results,
        Arc::new(llm),
        Some(Arc::new(MockSearchProvider::new())),
    )
}

#[tokio::test]
async fn runs_all_four_stages_in_order() {
    let docs = Arc::new(MemDocumentStore::new());
    let results = Arc::new(MemResultRepository::default());
    let doc_id = docs.insert(b"%PDF-1.7 data", Ok("Revenue: $10M".to_string()));

    let job = make_job(doc_id);
    results.init(job.id).await.unwrap();
    results
        .transition(job.id, ResultStatus::Running)
        .await
        .unwrap();

    let llm = MockGenerationBackend::new().with_fixed_response("stage output");
    executor(docs, results.clone(), llm.clone())
        .execute(&job)
        .await
        .unwrap();

    let record = results.record(job.id);
    let stages: Vec<StageName> = record.stage_outputs.iter().map(|o| o.stage).collect();
    assert_eq!(stages, StageName::ORDER.to_vec());
    assert_eq!(llm.call_count(), 4);
}

#[tokio::test]
async fn extraction_failure_is_fatal_at_analysis() {
    let docs = Arc::new(MemDocumentStore::new());
    let results = Arc::new(MemResultRepository::default());
    let doc_id = docs.insert(
        b"%PDF-1.7 corrupt",
        Err(Error::Extraction("pdftotext failed".to_string())),
    );

    let job = make_job(doc_id);
    results.init(job.id).await.unwrap();
    results
        .transition(job.id, ResultStatus::Running)
        .await
        .unwrap();

    let llm = MockGenerationBackend::new();
    let err = executor(docs, results.clone(), llm)
        .execute(&job)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(StageName::Analysis));

    // Verification ran and persisted before the failure
    let record = results.record(job.id);
    assert_eq!(record.stage_outputs.len(), 1);
    assert_eq!(record.stage_outputs[0].stage, StageName::Verification);
}

#[tokio::test]
async fn stage_failure_carries_stage_attribution() {
    let docs = Arc::new(MemDocumentStore::new());
    let results = Arc::new(MemResultRepository::default());
    let doc_id = docs.insert(b"%PDF-1.7 data", Ok("text".to_string()));

    let job = make_job(doc_id);
    results.init(job.id).await.unwrap();
    results
        .transition(job.id, ResultStatus::Running)
        .await
        .unwrap();

    // The recommendation prompt is the first to contain the completed
    // analysis heading marker; fail there.
    let llm = MockGenerationBackend::new().failing_on("recommendation");
    let err = executor(docs, results.clone(), llm)
        .execute(&job)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(StageName::Recommendation));

    let record = results.record(job.id);
    assert_eq!(record.stage_outputs.len(), 2);
}

#[tokio::test]
async fn redelivery_resumes_after_persisted_stages() {
    let docs = Arc::new(MemDocumentStore::new());
    let results = Arc::new(MemResultRepository::default());
    let doc_id = docs.insert(b"%PDF-1.7 data", Ok("text".to_string()));

    let job = make_job(doc_id);
    results.init(job.id).await.unwrap();
    results
        .transition(job.id, ResultStatus::Running)
        .await
        .unwrap();
    // Simulate a first delivery that persisted two stages and crashed
    for stage in [StageName::Verification, StageName::Analysis] {
        results
            .append_stage_output(
                job.id,
                &StageOutput {
                    stage,
                    output: "persisted".to_string(),
                },
            )
            .await
            .unwrap();
    }

    let llm = MockGenerationBackend::new().with_fixed_response("fresh output");
    executor(docs, results.clone(), llm.clone())
        .execute(&job)
        .await
        .unwrap();

    // Only the two remaining stages ran
    assert_eq!(llm.call_count(), 2);
    let record = results.record(job.id);
    assert_eq!(record.stage_outputs.len(), 4);
    assert_eq!(record.stage_outputs[0].output, "persisted");
    assert_eq!(record.stage_outputs[3].output, "fresh output");
}

#[tokio::test]
async fn runs_without_search_provider() {
    let docs = Arc::new(MemDocumentStore::new());
    let results = Arc::new(MemResultRepository::default());
    let doc_id = docs.insert(b"%PDF-1.7 data", Ok("text".to_string()));

    let job = make_job(doc_id);
    results.init(job.id).await.unwrap();
    results
        .transition(job.id, ResultStatus::Running)
        .await
        .unwrap();

    let llm = MockGenerationBackend::new().with_fixed_response("no market context");
    let executor = PipelineExecutor::new(docs, results.clone(), Arc::new(llm), None);
    executor.execute(&job).await.unwrap();

    let record = results.record(job.id);
    assert_eq!(record.stage_outputs.len(), 4);
}

#[tokio::test]
async fn non_pdf_header_does_not_fail_verification() {
    let docs = Arc::new(MemDocumentStore::new());
    let results = Arc::new(MemResultRepository::default());
    // Header check is advisory; extraction still succeeds here.
    let doc_id = docs.insert(b"not a pdf at all", Ok("plain text".to_string()));

    let job = make_job(doc_id);
    results.init(job.id).await.unwrap();
    results
        .transition(job.id, ResultStatus::Running)
        .await
        .unwrap();

    let llm = MockGenerationBackend::new().with_fixed_response("noted");
    executor(docs, results.clone(), llm)
        .execute(&job)
        .await
        .unwrap();

    let record = results.record(job.id);
    assert_eq!(record.stage_outputs.len(), 4);
}
