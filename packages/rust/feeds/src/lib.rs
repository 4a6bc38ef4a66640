//! Structured feed ingestion for GrantScout.
//!
//! Feeds skip crawling and extraction: entries map straight onto
//! [`GrantRecord`]s through a per-feed [`FieldMap`]. Three wire shapes are
//! supported:
//! - [`RestFeed`]: paginated GET returning JSON
//! - [`SearchFeed`]: paginated POST with a JSON filter body
//! - [`RssFeed`]: RSS 2.0 / Atom XML
//!
//! Every raw response is snapshotted through [`SnapshotWriter`]. Requests
//! that fail transiently are retried under [`FeedContext::retry`].

pub mod map;
pub mod rest;
pub mod rss;
pub mod search;
pub mod snapshot;

use std::future::Future;

use reqwest::Client;
use tracing::{info, instrument, warn};

use grantscout_shared::{FeedConfig, FeedKind, GrantRecord, GrantScoutError, Result, RetryPolicy};

pub use map::{FieldMap, passes_allow, value_text};
pub use rest::RestFeed;
pub use rss::RssFeed;
pub use search::SearchFeed;
pub use snapshot::SnapshotWriter;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Shared resources for one run's feed ingestion.
#[derive(Debug, Clone)]
pub struct FeedContext {
    pub client: Client,
    pub snapshots: SnapshotWriter,
    /// Backoff for each page request.
    pub retry: RetryPolicy,
}

/// What one feed produced.
#[derive(Debug, Clone, Default)]
pub struct FeedOutput {
    pub feed: String,
    pub grants: Vec<GrantRecord>,
    /// Pages (requests) that returned a usable body.
    pub pages_fetched: u32,
    /// Entries seen before the allow-list.
    pub entries_seen: usize,
    /// Entries dropped by the allow-list.
    pub entries_filtered: usize,
}

impl FeedOutput {
    pub(crate) fn new(feed: &str) -> Self {
        Self {
            feed: feed.to_string(),
            ..Default::default()
        }
    }
}

/// A source of grant records that needs no LLM.
pub trait FeedIngester: Send + Sync {
    fn name(&self) -> &str;
    fn ingest(&self, ctx: &FeedContext) -> impl Future<Output = Result<FeedOutput>> + Send;
}

// ---------------------------------------------------------------------------
// FeedSource
// ---------------------------------------------------------------------------

/// A configured feed of any kind.
#[derive(Debug, Clone)]
pub enum FeedSource {
    Rest(RestFeed),
    Search(SearchFeed),
    Rss(RssFeed),
}

impl FeedSource {
    /// Build a feed from its `[[feeds]]` entry.
    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        let url = url::Url::parse(&config.url).map_err(|e| {
            GrantScoutError::config(format!("feed '{}': invalid url: {e}", config.name))
        })?;
        let map = FieldMap::from_config(&config.field_map, config.default_body.clone())
            .map_err(|e| GrantScoutError::config(format!("feed '{}': {e}", config.name)))?;

        Ok(match config.kind {
            FeedKind::Rest => Self::Rest(RestFeed {
                name: config.name.clone(),
                url,
                page_size: config.page_size,
                max_pages: config.max_pages,
                items_key: config.items_key.clone(),
                filter_field: config.filter_field.clone(),
                allow: config.allow.clone(),
                map,
            }),
            FeedKind::Search => Self::Search(SearchFeed {
                name: config.name.clone(),
                url,
                page_size: config.page_size,
                max_pages: config.max_pages,
                items_key: config.items_key.clone(),
                filter_field: config.filter_field.clone(),
                codes: config.allow.clone(),
                map,
            }),
            FeedKind::Rss => Self::Rss(RssFeed {
                name: config.name.clone(),
                url,
                filter_field: config.filter_field.clone(),
                allow: config.allow.clone(),
                map,
            }),
        })
    }

    /// Build every configured feed, failing on the first bad entry.
    pub fn all_from_config(configs: &[FeedConfig]) -> Result<Vec<Self>> {
        configs.iter().map(Self::from_config).collect()
    }
}

impl FeedIngester for FeedSource {
    fn name(&self) -> &str {
        match self {
            Self::Rest(feed) => feed.name(),
            Self::Search(feed) => feed.name(),
            Self::Rss(feed) => feed.name(),
        }
    }

    async fn ingest(&self, ctx: &FeedContext) -> Result<FeedOutput> {
        match self {
            Self::Rest(feed) => feed.ingest(ctx).await,
            Self::Search(feed) => feed.ingest(ctx).await,
            Self::Rss(feed) => feed.ingest(ctx).await,
        }
    }
}

/// Run every feed in order. A failing feed is logged and reported but does
/// not stop the others.
#[instrument(skip_all, fields(feeds = sources.len()))]
pub async fn ingest_all<I: FeedIngester>(
    sources: &[I],
    ctx: &FeedContext,
) -> Vec<(String, Result<FeedOutput>)> {
    let mut results = Vec::with_capacity(sources.len());

    for source in sources {
        let result = source.ingest(ctx).await;
        match &result {
            Ok(output) => info!(
                feed = source.name(),
                grants = output.grants.len(),
                pages = output.pages_fetched,
                filtered = output.entries_filtered,
                "feed ingested"
            ),
            Err(e) => warn!(feed = source.name(), error = %e, "feed failed, skipping"),
        }
        results.push((source.name().to_string(), result));
    }

    results
}

#[cfg(test)]
pub(crate) fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: std::time::Duration::from_millis(1),
        factor: 2.0,
        max_delay: std::time::Duration::from_millis(2),
    }
}
