//! # finsight-core
//!
//! Core types, traits, and abstractions for the finsight analysis service.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other finsight crates depend on: the job/result/document data
//! model, the error taxonomy, the repository and capability traits, and the
//! shared default constants.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
