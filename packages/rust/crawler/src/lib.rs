//! Seed crawling for GrantScout.
//!
//! This crate provides:
//! - [`fetcher`]: the [`Fetcher`] trait and its `reqwest` implementation
//! - [`engine`]: the per-seed, host-confined BFS [`Crawler`]
//! - [`render`]: thin-page detection and the optional headless re-render stage

pub mod engine;
pub mod fetcher;
pub mod render;

pub use engine::{CrawlOutput, CrawlReport, Crawler, Pacer, normalize_url};
pub use fetcher::{FETCH_TIMEOUT, FetchedBody, Fetcher, HttpFetcher, USER_AGENT, build_client};
pub use render::{ChromeRenderer, RenderDetector, Renderer, rerender_flagged};
