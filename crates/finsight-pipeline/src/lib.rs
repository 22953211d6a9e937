//! # finsight-pipeline
//!
//! The analysis pipeline and background job worker for finsight.
//!
//! This crate ties the persistence layer to the inference backends: the
//! worker claims jobs from the durable queue and runs each one through
//! the fixed four-stage pipeline (verification, analysis, recommendation,
//! risk), persisting stage outputs incrementally.

pub mod extract;
pub mod pipeline;
pub mod stages;
pub mod worker;

pub use extract::{has_pdf_magic, PdfTextExtractor};
pub use pipeline::PipelineExecutor;
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
