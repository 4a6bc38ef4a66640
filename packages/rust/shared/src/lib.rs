//! Shared types, error model, and configuration for GrantScout.
//!
//! This crate is the foundation depended on by all other GrantScout crates.
//! It provides:
//! - [`GrantScoutError`]: the unified error type
//! - Domain types ([`GrantRecord`], [`GrantField`], [`Complexity`], [`PageRecord`], [`SeedConfig`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)
//! - [`retry`]: exponential backoff shared by fetches, feeds and LLM calls

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, DefaultsConfig, FeedConfig, FeedKind, LlmConfig, RenderConfig,
    ScopeConfig, ValidationPolicy, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_api_key,
};
pub use error::{GrantScoutError, Result};
pub use retry::{RetryPolicy, is_retryable, retry};
pub use types::{
    Complexity, GrantField, GrantRecord, NOT_FOUND, PageRecord, SeedConfig, load_seed_file,
    parse_seed_list, run_timestamp,
};
