//! Detecting script-gated pages and re-rendering them in a headless browser.
//!
//! Rendering is a separate stage: the crawler only sets
//! `needs_richer_render`, and [`rerender_flagged`] later hands just those
//! records to a [`Renderer`].

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use url::Url;

use grantscout_shared::{GrantScoutError, PageRecord, RenderConfig, Result, RetryPolicy, retry};

/// Phrases that mark a page whose content needs JavaScript.
const JS_PHRASES: [&str; 5] = [
    "enable javascript",
    "javascript is required",
    "javascript is disabled",
    "please turn on javascript",
    "loading...",
];

/// Attempts per page before a render failure is reported.
const CHROME_MAX_ATTEMPTS: u32 = 3;
/// First backoff between Chrome attempts; later waits triple.
const CHROME_RETRY_BASE: Duration = Duration::from_secs(3);

/// Decides whether a cleaned page is too thin to trust.
#[derive(Debug, Clone, Copy)]
pub struct RenderDetector {
    min_text_chars: usize,
}

impl Default for RenderDetector {
    fn default() -> Self {
        Self { min_text_chars: 200 }
    }
}

impl RenderDetector {
    pub fn new(min_text_chars: usize) -> Self {
        Self { min_text_chars }
    }

    /// True when the text is shorter than the minimum or contains a
    /// known "needs JavaScript" phrase.
    pub fn needs_richer_render(&self, text: &str) -> bool {
        if text.trim().chars().count() < self.min_text_chars {
            return true;
        }
        let lower = text.to_lowercase();
        JS_PHRASES.iter().any(|p| lower.contains(p))
    }
}

/// Produces the DOM of a page after scripts have run.
pub trait Renderer: Send + Sync {
    fn render(&self, url: &Url) -> impl Future<Output = Result<String>> + Send;
}

/// [`Renderer`] that shells out to headless Chrome `--dump-dom`.
///
/// Empty DOMs, timeouts and non-zero exits are retried with backoff. A
/// binary that cannot be launched fails at once.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    chrome_path: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ChromeRenderer {
    pub fn new(chrome_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            chrome_path: chrome_path.into(),
            timeout,
            retry: RetryPolicy {
                max_attempts: CHROME_MAX_ATTEMPTS,
                base_delay: CHROME_RETRY_BASE,
                factor: 3.0,
                max_delay: CHROME_RETRY_BASE * 9,
            },
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(
            config.chrome_path.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One Chrome invocation. Launch failures come back as I/O errors so
    /// they are not retried.
    async fn dump_dom(&self, url: &Url) -> Result<String> {
        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.chrome_path)
                .args([
                    "--headless",
                    "--no-sandbox",
                    "--disable-gpu",
                    "--disable-dev-shm-usage",
                    "--dump-dom",
                    url.as_str(),
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| GrantScoutError::Render(format!("{url}: timed out after {:?}", self.timeout)))?
        .map_err(|e| GrantScoutError::io(&self.chrome_path, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GrantScoutError::Render(format!(
                "{url}: chrome exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(GrantScoutError::Render(format!("{url}: empty DOM")));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Renderer for ChromeRenderer {
    async fn render(&self, url: &Url) -> Result<String> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(GrantScoutError::Render(format!(
                "refusing to render {} URL",
                url.scheme()
            )));
        }

        let retryable = |e: &GrantScoutError| matches!(e, GrantScoutError::Render(_));
        retry(&self.retry, retryable, |_| self.dump_dom(url))
            .await
            .map_err(|e| match e {
                GrantScoutError::Io { .. } => {
                    GrantScoutError::Render(format!("{url}: failed to launch {}: {e}", self.chrome_path))
                }
                other => other,
            })
    }
}

/// Re-render flagged pages and replace their title and text.
///
/// Unflagged pages pass through untouched. A render failure keeps the
/// original record. A page still flagged after re-rendering keeps its flag.
#[instrument(skip_all, fields(pages = pages.len()))]
pub async fn rerender_flagged<R: Renderer>(
    renderer: &R,
    detector: &RenderDetector,
    pages: Vec<PageRecord>,
) -> Vec<PageRecord> {
    let flagged = pages.iter().filter(|p| p.needs_richer_render).count();
    if flagged == 0 {
        return pages;
    }
    info!(flagged, "re-rendering script-gated pages");

    let mut out = Vec::with_capacity(pages.len());
    for page in pages {
        if !page.needs_richer_render {
            out.push(page);
            continue;
        }
        out.push(rerender_one(renderer, detector, page).await);
    }
    out
}

async fn rerender_one<R: Renderer>(
    renderer: &R,
    detector: &RenderDetector,
    page: PageRecord,
) -> PageRecord {
    let url = match Url::parse(&page.url) {
        Ok(url) => url,
        Err(e) => {
            warn!(url = %page.url, error = %e, "unparseable page url, keeping original");
            return page;
        }
    };

    let dom = match renderer.render(&url).await {
        Ok(dom) => dom,
        Err(e) => {
            warn!(url = %page.url, error = %e, "render failed, keeping original");
            return page;
        }
    };

    match grantscout_text::clean_html(&dom, &page.url) {
        Ok(cleaned) => {
            debug!(url = %page.url, words = cleaned.word_count, "re-rendered");
            PageRecord {
                needs_richer_render: detector.needs_richer_render(&cleaned.text),
                title: cleaned.title,
                text: cleaned.text,
                ..page
            }
        }
        Err(e) => {
            warn!(url = %page.url, error = %e, "re-rendered DOM failed to clean, keeping original");
            page
        }
    }
}
