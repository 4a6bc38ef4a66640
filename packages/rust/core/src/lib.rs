//! Core pipeline orchestration and domain logic for GrantScout.
//!
//! This crate ties together crawling, LLM extraction, feed ingestion,
//! scope filtering, de-duplication and export into an end-to-end run, and
//! hosts the post-export analysis (deadlines, funding, tags).

pub mod analysis;
pub mod dedupe;
pub mod extraction;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod scope;

pub use dedupe::{DedupeKey, dedupe};
pub use extraction::{Extractor, decode_grants};
pub use llm::{CompletionModel, CompletionRequest, LLM_TIMEOUT, OpenRouterModel};
pub use pipeline::{Pipeline, ProgressReporter, RunConfig, RunResult, SilentProgress};
pub use scope::ScopeFilter;
