//! Bounded, host-confined breadth-first crawler.
//!
//! Each seed is crawled independently: its own visited set, its own page
//! budget, its own [`CrawlReport`]. Fetches are strictly sequential, paced
//! by a fixed politeness delay, and retried with backoff on transient
//! failures.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use grantscout_shared::{CrawlConfig, PageRecord, Result, SeedConfig, is_retryable, retry};

use crate::fetcher::{Fetcher, HttpFetcher};
use crate::render::RenderDetector;

/// Anchor-text or URL fragments that mark pagination links.
const PAGINATION_MARKERS: [&str; 8] = [
    "next", "page=", "load-more", "load more", "/page/", "more", "older", "»",
];

/// Extensions never worth fetching as pages.
const SKIP_EXTENSIONS: [&str; 12] = [
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".jpg", ".jpeg", ".png",
    ".gif",
];

// ---------------------------------------------------------------------------
// CrawlReport
// ---------------------------------------------------------------------------

/// Summary of one seed's crawl.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub seed: String,
    /// Pages fetched and cleaned successfully.
    pub pages_fetched: usize,
    /// Responses that were not HTML or could not be cleaned.
    pub pages_skipped: usize,
    /// Failed fetches (URL, error message).
    pub errors: Vec<(String, String)>,
    pub duration: Duration,
}

impl CrawlReport {
    /// A seed whose own page could not be fetched produced nothing usable.
    pub fn failed(&self) -> bool {
        self.pages_fetched == 0
    }
}

/// Pages from every seed plus one report per seed.
///
/// Pages are stored seed by seed in report order; report `i` owns the next
/// `pages_fetched` pages.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutput {
    pub pages: Vec<PageRecord>,
    pub reports: Vec<CrawlReport>,
}

impl CrawlOutput {
    /// Each report with the pages its seed produced.
    pub fn pages_by_seed(&self) -> impl Iterator<Item = (&CrawlReport, &[PageRecord])> {
        let mut start = 0;
        self.reports.iter().map(move |report| {
            let end = (start + report.pages_fetched).min(self.pages.len());
            let pages = &self.pages[start.min(end)..end];
            start = end;
            (report, pages)
        })
    }
}

// ---------------------------------------------------------------------------
// Pacer
// ---------------------------------------------------------------------------

/// Enforces the politeness delay between consecutive fetches.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, last: None }
    }

    /// Wait until `delay` has passed since the previous fetch. The first
    /// call returns immediately.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Sequential BFS crawler, generic over how pages are fetched.
pub struct Crawler<F: Fetcher = HttpFetcher> {
    config: CrawlConfig,
    fetcher: F,
    detector: RenderDetector,
}

impl Crawler<HttpFetcher> {
    /// Create a crawler that fetches over HTTP.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        Ok(Self::with_fetcher(config, HttpFetcher::new()?))
    }
}

impl<F: Fetcher> Crawler<F> {
    pub fn with_fetcher(config: CrawlConfig, fetcher: F) -> Self {
        let detector = RenderDetector::new(config.min_text_chars);
        Self {
            config,
            fetcher,
            detector,
        }
    }

    /// Crawl every seed in order, applying the seed config's overrides.
    #[instrument(skip_all, fields(seeds = seeds.seeds.len()))]
    pub async fn crawl(&self, seeds: &SeedConfig) -> CrawlOutput {
        let max_depth = seeds.max_depth.unwrap_or(self.config.max_depth);
        let max_pages = seeds
            .max_pages_per_seed
            .unwrap_or(self.config.max_pages_per_seed);

        info!(
            max_depth,
            max_pages,
            politeness_ms = self.config.politeness_ms,
            "starting crawl"
        );

        let mut pacer = Pacer::new(Duration::from_millis(self.config.politeness_ms));
        let mut output = CrawlOutput::default();

        for seed in &seeds.seeds {
            let (pages, report) = self.crawl_seed(seed, max_depth, max_pages, &mut pacer).await;
            output.pages.extend(pages);
            output.reports.push(report);
        }

        info!(
            pages = output.pages.len(),
            flagged = output.pages.iter().filter(|p| p.needs_richer_render).count(),
            "crawl completed"
        );
        output
    }

    /// Crawl a single seed to `max_depth`, fetching at most `max_pages` pages.
    ///
    /// Levels are processed in order; within the next level, pagination
    /// links are queued ahead of ordinary links.
    #[instrument(skip(self, seed, pacer), fields(seed = %seed))]
    pub async fn crawl_seed(
        &self,
        seed: &Url,
        max_depth: u32,
        max_pages: usize,
        pacer: &mut Pacer,
    ) -> (Vec<PageRecord>, CrawlReport) {
        let start = Instant::now();
        let seed = normalize_url(seed);
        let scope = HostScope::new(&seed);

        let mut visited: HashSet<String> = HashSet::from([seed.to_string()]);
        let mut frontier: Vec<Url> = vec![seed.clone()];
        let mut pages: Vec<PageRecord> = Vec::new();
        let mut errors: Vec<(String, String)> = Vec::new();
        let mut skipped = 0usize;

        'levels: for depth in 0..=max_depth {
            let mut next_paged: Vec<Url> = Vec::new();
            let mut next_plain: Vec<Url> = Vec::new();

            for url in frontier {
                if pages.len() >= max_pages {
                    debug!(max_pages, "page budget reached");
                    break 'levels;
                }

                pacer.wait().await;
                let fetched = match retry(&self.config.retry, is_retryable, |_| {
                    self.fetcher.fetch(&url)
                })
                .await
                {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        warn!(%url, error = %e, "fetch failed, skipping");
                        errors.push((url.to_string(), e.to_string()));
                        continue;
                    }
                };

                if !fetched.is_html() {
                    debug!(%url, content_type = ?fetched.content_type, "not HTML, skipping");
                    skipped += 1;
                    continue;
                }

                // Links and the record follow the post-redirect URL.
                let final_url = normalize_url(&fetched.final_url);
                let url = if final_url == url {
                    url
                } else if !scope.allows(&final_url) {
                    debug!(%url, %final_url, "redirected off the seed host, skipping");
                    skipped += 1;
                    continue;
                } else if !visited.insert(final_url.to_string()) {
                    debug!(%url, %final_url, "redirected to a visited page, skipping");
                    skipped += 1;
                    continue;
                } else {
                    final_url
                };

                let cleaned = match grantscout_text::clean_html(&fetched.body, url.as_str()) {
                    Ok(cleaned) => cleaned,
                    Err(e) => {
                        warn!(%url, error = %e, "cleaning failed, skipping");
                        skipped += 1;
                        continue;
                    }
                };

                if depth < max_depth {
                    let doc = Html::parse_document(&fetched.body);
                    for link in extract_links(&doc, &url) {
                        if !scope.allows(&link.url) {
                            continue;
                        }
                        if !visited.insert(link.url.to_string()) {
                            continue;
                        }
                        if link.is_pagination() {
                            next_paged.push(link.url);
                        } else {
                            next_plain.push(link.url);
                        }
                    }
                }

                let needs_richer_render = self.detector.needs_richer_render(&cleaned.text);
                debug!(%url, depth, words = cleaned.word_count, needs_richer_render, "page fetched");

                pages.push(PageRecord {
                    url: url.to_string(),
                    depth,
                    title: cleaned.title,
                    text: cleaned.text,
                    needs_richer_render,
                });
            }

            next_paged.append(&mut next_plain);
            if next_paged.is_empty() {
                break;
            }
            frontier = next_paged;
        }

        let report = CrawlReport {
            seed: seed.to_string(),
            pages_fetched: pages.len(),
            pages_skipped: skipped,
            errors,
            duration: start.elapsed(),
        };

        info!(
            pages_fetched = report.pages_fetched,
            pages_skipped = report.pages_skipped,
            errors = report.errors.len(),
            duration_ms = report.duration.as_millis(),
            "seed crawled"
        );

        (pages, report)
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Confines a crawl to the seed's host.
struct HostScope {
    host: String,
}

impl HostScope {
    fn new(seed: &Url) -> Self {
        Self {
            host: bare_host(seed),
        }
    }

    fn allows(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        if bare_host(url) != self.host {
            return false;
        }
        let path = url.path().to_ascii_lowercase();
        !SKIP_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }
}

/// Host (with port) minus a leading `www.`.
fn bare_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    let host = host.strip_prefix("www.").unwrap_or(host);
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// An outgoing link with its anchor text.
#[derive(Debug, Clone)]
struct Link {
    url: Url,
    text: String,
}

impl Link {
    fn is_pagination(&self) -> bool {
        let text = self.text.to_lowercase();
        let url = self.url.as_str().to_lowercase();
        PAGINATION_MARKERS
            .iter()
            .any(|m| text.contains(m) || url.contains(m))
    }
}

/// Extract links from a document, resolved and normalised.
fn extract_links(doc: &Html, base_url: &Url) -> Vec<Link> {
    static LINK_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

    let mut links = Vec::new();
    for el in doc.select(&LINK_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        if let Ok(resolved) = base_url.join(href) {
            links.push(Link {
                url: normalize_url(&resolved),
                text: el.text().collect::<String>().trim().to_string(),
            });
        }
    }
    links
}

/// Normalise a URL for identity: drop the fragment and any trailing slash
/// on a non-root path. The query string is kept.
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        normalized.set_path(if trimmed.is_empty() { "/" } else { trimmed });
    }
    normalized
}
