//! # finsight-inference
//!
//! LLM generation and web-search backends for finsight.
//!
//! Provides an OpenAI-compatible `GenerationBackend`, a Serper-backed
//! `SearchProvider`, and mock implementations of both for tests.

pub mod config;
pub mod mock;
pub mod openai;
pub mod search;

pub use config::{LlmConfig, SearchConfig};
pub use mock::{MockGenerationBackend, MockSearchProvider};
pub use openai::OpenAIBackend;
pub use search::SerperProvider;
