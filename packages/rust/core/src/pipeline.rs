//! End-to-end run: seeds → crawl → (re-render) → chunk → extract, plus
//! feeds → merge → scope → dedupe → export.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use tracing::{info, instrument, warn};

use grantscout_artifacts::{ExportCounts, ExportMeta, ExportPaths, export};
use grantscout_crawler::{
    ChromeRenderer, CrawlOutput, Crawler, Fetcher, HttpFetcher, RenderDetector, Renderer,
    rerender_flagged,
};
use grantscout_feeds::{FeedContext, FeedIngester, FeedSource, SnapshotWriter, ingest_all};
use grantscout_shared::{
    AppConfig, CrawlConfig, FeedConfig, GrantRecord, GrantScoutError, PageRecord, Result,
    ScopeConfig, SeedConfig, run_timestamp,
};
use grantscout_text::chunk_text;

use crate::dedupe::dedupe;
use crate::extraction::Extractor;
use crate::llm::CompletionModel;
use crate::scope::ScopeFilter;

/// What one run covers.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub seeds: SeedConfig,
    pub crawl: CrawlConfig,
    /// Maximum characters per extraction chunk.
    pub chunk_chars: usize,
    pub output_dir: PathBuf,
    /// Root for raw feed snapshots.
    pub raw_dir: PathBuf,
    pub scope: ScopeConfig,
    pub feeds: Vec<FeedConfig>,
    pub include_crawl: bool,
    pub include_feeds: bool,
    /// Re-render flagged pages before extraction.
    pub render: bool,
}

impl RunConfig {
    /// Defaults from the loaded config file; CLI flags override fields after.
    pub fn from_app(config: &AppConfig, seeds: SeedConfig) -> Self {
        Self {
            seeds,
            crawl: CrawlConfig::from(config),
            chunk_chars: config.defaults.chunk_chars,
            output_dir: PathBuf::from(&config.defaults.output_dir),
            raw_dir: PathBuf::from(&config.defaults.raw_dir),
            scope: config.scope.clone(),
            feeds: config.feeds.clone(),
            include_crawl: true,
            include_feeds: true,
            render: config.render.enabled,
        }
    }

    fn crawls(&self) -> bool {
        self.include_crawl && !self.seeds.seeds.is_empty()
    }

    fn ingests_feeds(&self) -> bool {
        self.include_feeds && !self.feeds.is_empty()
    }
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunResult {
    pub paths: ExportPaths,
    pub counts: ExportCounts,
    /// Sources that produced nothing: (seed URL or feed name, reason).
    pub failed_sources: Vec<(String, String)>,
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each chunk, whether or not extraction succeeded.
    fn chunk_processed(&self, url: &str, current: usize, total: usize);
    /// Called after each feed.
    fn feed_ingested(&self, feed: &str, grants: usize);
    /// Called when the run completes.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn chunk_processed(&self, _url: &str, _current: usize, _total: usize) {}
    fn feed_ingested(&self, _feed: &str, _grants: usize) {}
    fn done(&self, _result: &RunResult) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A configured run with its collaborators.
///
/// The extractor is only needed when seeds are crawled; the renderer only
/// when re-rendering is enabled.
pub struct Pipeline<M, F: Fetcher = HttpFetcher, R = ChromeRenderer> {
    config: RunConfig,
    crawler: Crawler<F>,
    extractor: Option<Extractor<M>>,
    renderer: Option<R>,
    scope: ScopeFilter,
    client: Client,
}

impl<M, F, R> Pipeline<M, F, R>
where
    M: CompletionModel,
    F: Fetcher,
    R: Renderer,
{
    pub fn new(
        config: RunConfig,
        crawler: Crawler<F>,
        extractor: Option<Extractor<M>>,
        renderer: Option<R>,
        client: Client,
    ) -> Self {
        let scope = ScopeFilter::from_config(&config.scope);
        Self {
            config,
            crawler,
            extractor,
            renderer,
            scope,
            client,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Crawl every seed and, when enabled, re-render flagged pages.
    pub async fn crawl_pages(&self) -> CrawlOutput {
        let mut output = self.crawler.crawl(&self.config.seeds).await;

        let flagged = output.pages.iter().filter(|p| p.needs_richer_render).count();
        match (&self.renderer, self.config.render) {
            (Some(renderer), true) => {
                let detector = RenderDetector::new(self.config.crawl.min_text_chars);
                output.pages = rerender_flagged(renderer, &detector, output.pages).await;
            }
            _ if flagged > 0 => {
                info!(flagged, "pages look script-gated; enable rendering to re-fetch them");
            }
            _ => {}
        }
        output
    }

    /// Run every enabled source and export the merged, filtered grants.
    ///
    /// Fails with [`GrantScoutError::AllSourcesFailed`] (and writes nothing)
    /// when every attempted seed and feed failed.
    #[instrument(skip_all, fields(seeds = self.config.seeds.seeds.len(), feeds = self.config.feeds.len()))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<RunResult> {
        let start = Instant::now();
        let now = Utc::now();
        let ts = run_timestamp(&now);
        let config = &self.config;

        if !config.crawls() && !config.ingests_feeds() {
            return Err(GrantScoutError::config(
                "nothing to run: no seeds to crawl and no feeds enabled",
            ));
        }
        // Fail fast on bad feed config before any network work.
        let feed_sources = if config.ingests_feeds() {
            FeedSource::all_from_config(&config.feeds)?
        } else {
            Vec::new()
        };
        let extractor = match (&self.extractor, config.crawls()) {
            (Some(extractor), true) => Some(extractor),
            (None, true) => {
                return Err(GrantScoutError::config(
                    "crawling seeds requires an LLM extractor",
                ));
            }
            _ => None,
        };

        info!(run = %ts, "starting run");
        let mut counts = ExportCounts::default();
        let mut failed_sources = Vec::new();
        let mut succeeded = 0usize;
        let mut grants: Vec<GrantRecord> = Vec::new();

        // --- Phase 1: Crawl + extract ---
        if let Some(extractor) = extractor {
            progress.phase("Crawling seeds");
            let crawl = self.crawl_pages().await;
            counts.pages_crawled = crawl.pages.len();

            progress.phase("Extracting grants");
            let extractions = self.extract_seeds(extractor, &crawl, &mut counts, progress).await;
            for ((report, _), seed) in crawl.pages_by_seed().zip(extractions) {
                counts.records_extracted += seed.grants.len();
                grants.extend(seed.grants);

                if report.failed() {
                    let reason = report
                        .errors
                        .first()
                        .map(|(_, e)| e.clone())
                        .unwrap_or_else(|| "no pages fetched".to_string());
                    failed_sources.push((report.seed.clone(), reason));
                } else if seed.chunks_extracted == 0 {
                    let reason = seed.last_error.unwrap_or_else(|| "no text to extract".to_string());
                    warn!(seed = %report.seed, %reason, "no chunks extracted for seed");
                    failed_sources.push((report.seed.clone(), format!("no chunks extracted: {reason}")));
                } else {
                    succeeded += 1;
                }
            }
        }

        // --- Phase 2: Feeds ---
        if !feed_sources.is_empty() {
            progress.phase("Ingesting feeds");
            let ctx = FeedContext {
                client: self.client.clone(),
                snapshots: SnapshotWriter::new(&config.raw_dir, &ts),
                retry: config.crawl.retry,
            };
            for (name, result) in ingest_all(&feed_sources, &ctx).await {
                match result {
                    Ok(output) => {
                        succeeded += 1;
                        progress.feed_ingested(&name, output.grants.len());
                        counts.records_from_feeds += output.grants.len();
                        grants.extend(output.grants);
                    }
                    Err(e) => failed_sources.push((name, e.to_string())),
                }
            }
        }

        if succeeded == 0 {
            let detail = failed_sources
                .iter()
                .map(|(source, reason)| format!("{source}: {reason}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GrantScoutError::AllSourcesFailed(detail));
        }

        // --- Phase 3: Scope + dedupe ---
        progress.phase("Filtering and de-duplicating");
        let in_scope = self.scope.filter(grants);
        counts.records_in_scope = in_scope.len();
        let unique = dedupe(in_scope);
        counts.duplicates_dropped = counts.records_in_scope - unique.len();
        counts.records_exported = unique.len();

        // --- Phase 4: Export ---
        progress.phase("Writing export");
        let meta = ExportMeta {
            run_timestamp: ts,
            extraction_timestamp: now,
            seeds: if config.crawls() {
                config.seeds.seeds.iter().map(|u| u.to_string()).collect()
            } else {
                Vec::new()
            },
            feeds: feed_sources.iter().map(|f| f.name().to_string()).collect(),
            model: extractor.map(|e| e.model().model_id().to_string()),
            counts: counts.clone(),
        };
        let paths = export(&unique, &config.output_dir, &meta)?;

        let result = RunResult {
            paths,
            counts,
            failed_sources,
            elapsed: start.elapsed(),
        };
        info!(
            exported = result.counts.records_exported,
            failed_sources = result.failed_sources.len(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "run completed"
        );
        progress.done(&result);
        Ok(result)
    }

    /// Chunk and extract every seed's pages in crawl order. Failed chunks
    /// are logged and counted, never fatal. One entry per crawl report.
    async fn extract_seeds(
        &self,
        extractor: &Extractor<M>,
        crawl: &CrawlOutput,
        counts: &mut ExportCounts,
        progress: &dyn ProgressReporter,
    ) -> Vec<SeedExtraction> {
        let chunk_chars = self.config.chunk_chars;
        let work: Vec<(usize, &PageRecord, String)> = crawl
            .pages_by_seed()
            .enumerate()
            .flat_map(|(seed, (_, pages))| {
                pages.iter().flat_map(move |page| {
                    chunk_text(&page.text, chunk_chars)
                        .into_iter()
                        .map(move |chunk| (seed, page, chunk))
                })
            })
            .collect();
        let total = work.len();
        let mut seeds: Vec<SeedExtraction> = crawl.reports.iter().map(|_| SeedExtraction::default()).collect();

        for (i, (seed, page, chunk)) in work.iter().enumerate() {
            let entry = &mut seeds[*seed];
            match extractor.extract(chunk, &page.url).await {
                Ok(found) => {
                    counts.chunks_extracted += 1;
                    entry.chunks_extracted += 1;
                    entry.grants.extend(found);
                }
                Err(e) => {
                    counts.chunks_failed += 1;
                    warn!(url = %page.url, chunk = i, error = %e, "chunk extraction failed, skipping");
                    entry.last_error = Some(e.to_string());
                }
            }
            progress.chunk_processed(&page.url, i + 1, total);
        }
        seeds
    }
}

/// Extraction outcome for one seed.
#[derive(Debug, Default)]
struct SeedExtraction {
    grants: Vec<GrantRecord>,
    chunks_extracted: usize,
    last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::tests::{StubModel, quick_retry};
    use grantscout_shared::{FeedKind, NOT_FOUND, ValidationPolicy};
    use std::collections::BTreeMap;
    use url::Url;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><head><title>Health grants</title></head><body><main>
        <h1>Open grant opportunities</h1>
        <p>The Health Grant supports digital health research projects across
        regional Australia. Applications close 31 Mar 2025. Funding of up to
        $500,000 is available to eligible organisations.</p>
        <p>Eligible applicants include universities, medical research institutes
        and not-for-profit health services operating in Australia.</p>
    </main></body></html>"#;

    fn grant_json(purpose: &str, co_contribution: &str) -> String {
        serde_json::json!({
            "grants": [{
                "grant_name": "Health Grant",
                "administering_body": "Dept of Health",
                "grant_purpose": purpose,
                "application_deadline": "31 Mar 2025",
                "funding_amount": "Up to $500,000",
                "co_contribution": co_contribution,
                "eligibility_criteria": "Universities and research institutes",
                "assessment_criteria": "not found",
                "application_complexity": "Moderate",
                "web_link": "not found",
                "level_of_complexity": "Moderate"
            }]
        })
        .to_string()
    }

    fn run_config(server: &MockServer, out: &std::path::Path) -> RunConfig {
        let seed = Url::parse(&format!("{}/grants", server.uri())).unwrap();
        RunConfig {
            seeds: SeedConfig {
                seeds: vec![seed],
                max_depth: Some(0),
                max_pages_per_seed: Some(5),
            },
            crawl: CrawlConfig {
                max_depth: 2,
                max_pages_per_seed: 50,
                politeness_ms: 0,
                min_text_chars: 50,
                retry: quick_retry(),
            },
            chunk_chars: 3500,
            output_dir: out.join("output"),
            raw_dir: out.join("raw"),
            scope: ScopeConfig::default(),
            feeds: Vec::new(),
            include_crawl: true,
            include_feeds: true,
            render: false,
        }
    }

    fn feed_config(server: &MockServer) -> FeedConfig {
        FeedConfig {
            name: "grantconnect".into(),
            kind: FeedKind::Rest,
            url: format!("{}/api/grants", server.uri()),
            page_size: 50,
            max_pages: 1,
            filter_field: None,
            allow: Vec::new(),
            field_map: BTreeMap::from([("administering_body".to_string(), "agency".to_string())]),
            default_body: None,
            items_key: None,
        }
    }

    fn pipeline(config: RunConfig, replies: Vec<Result<String>>) -> Pipeline<StubModel> {
        let crawler = Crawler::new(config.crawl.clone()).unwrap();
        let extractor = Extractor::new(StubModel::new(replies), quick_retry(), ValidationPolicy::Coerce);
        Pipeline::new(config, crawler, Some(extractor), None, Client::new())
    }

    async fn mount_page(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/grants"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(PAGE, "text/html; charset=utf-8"),
            )
            .mount(server)
            .await;
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gs-run-{}", Uuid::now_v7()))
    }

    #[tokio::test]
    async fn not_found_field_reaches_csv() {
        let server = MockServer::start().await;
        mount_page(&server).await;
        let dir = temp_dir();

        let pipeline = pipeline(
            run_config(&server, &dir),
            vec![Ok(grant_json("Digital health research", "not found"))],
        );
        let result = pipeline.run(&SilentProgress).await.unwrap();

        assert_eq!(result.counts.pages_crawled, 1);
        assert_eq!(result.counts.chunks_extracted, 1);
        assert_eq!(result.counts.records_exported, 1);

        let exported = grantscout_artifacts::read_grants_csv(&result.paths.csv).unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].co_contribution, NOT_FOUND);
        assert_eq!(exported[0].web_link, format!("{}/grants", server.uri()));

        let csv = std::fs::read_to_string(&result.paths.csv).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains(",not found,"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&result.paths.json).unwrap()).unwrap();
        assert_eq!(json["sources"]["model"], "stub/model");
        let grant = json["grants"][0].as_object().unwrap();
        assert_eq!(grant.len(), 11);
        assert!(grant.values().all(|v| v.is_string()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn duplicate_grants_keep_first() {
        let server = MockServer::start().await;
        mount_page(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/grants"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "title": "Health Grant",
                    "agency": "Dept of Health",
                    "description": "A different purpose from the feed",
                    "close_date": "31 Mar 2025"
                }]
            })))
            .mount(&server)
            .await;
        let dir = temp_dir();

        let mut config = run_config(&server, &dir);
        config.feeds = vec![feed_config(&server)];
        let pipeline = pipeline(config, vec![Ok(grant_json("Digital health research", "Matched funding"))]);
        let result = pipeline.run(&SilentProgress).await.unwrap();

        assert_eq!(result.counts.records_extracted, 1);
        assert_eq!(result.counts.records_from_feeds, 1);
        assert_eq!(result.counts.duplicates_dropped, 1);

        let exported = grantscout_artifacts::read_grants_csv(&result.paths.csv).unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].grant_purpose, "Digital health research");

        // Feed snapshot landed under the run timestamp.
        let raw = dir.join("raw");
        let run_dirs: Vec<_> = std::fs::read_dir(&raw).unwrap().collect();
        assert_eq!(run_dirs.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn every_source_failing_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let dir = temp_dir();

        let mut config = run_config(&server, &dir);
        config.feeds = vec![feed_config(&server)];
        let err = pipeline(config, Vec::new())
            .run(&SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, GrantScoutError::AllSourcesFailed(_)));
        assert!(err.to_string().contains("grantconnect"));
        assert!(!dir.join("output").exists());
    }

    #[tokio::test]
    async fn seed_without_extracted_chunks_fails_the_run() {
        let server = MockServer::start().await;
        mount_page(&server).await;
        let dir = temp_dir();

        let replies = vec![Err(GrantScoutError::Http {
            url: "https://llm.example.com/v1/chat/completions".into(),
            status: 401,
        })];
        let err = pipeline(run_config(&server, &dir), replies)
            .run(&SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, GrantScoutError::AllSourcesFailed(_)));
        assert!(err.to_string().contains("no chunks extracted"));
        assert!(err.to_string().contains("401"));
        assert!(!dir.join("output").exists());
    }

    #[tokio::test]
    async fn failed_chunks_do_not_stop_other_sources() {
        let server = MockServer::start().await;
        mount_page(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/grants"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "title": "Feed Grant", "agency": "Dept of Industry" }]
            })))
            .mount(&server)
            .await;
        let dir = temp_dir();

        let mut config = run_config(&server, &dir);
        config.feeds = vec![feed_config(&server)];
        let replies = vec![
            Err(GrantScoutError::Network("reset".into())),
            Err(GrantScoutError::Network("reset".into())),
            Err(GrantScoutError::Network("reset".into())),
        ];
        let result = pipeline(config, replies).run(&SilentProgress).await.unwrap();

        assert_eq!(result.counts.chunks_failed, 1);
        assert_eq!(result.counts.records_exported, 1);
        assert_eq!(result.failed_sources.len(), 1);
        assert_eq!(result.failed_sources[0].0, format!("{}/grants", server.uri()));
        assert!(result.failed_sources[0].1.contains("reset"));
        assert!(result.paths.csv.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn crawl_without_extractor_is_config_error() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        let config = run_config(&server, &dir);
        let crawler = Crawler::new(config.crawl.clone()).unwrap();
        let pipeline: Pipeline<StubModel> = Pipeline::new(config, crawler, None, None, Client::new());

        let err = pipeline.run(&SilentProgress).await.unwrap_err();
        assert!(matches!(err, GrantScoutError::Config { .. }));
    }
}
