//! Page fetching over HTTP.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use grantscout_shared::{GrantScoutError, Result};

/// User-Agent string for every outbound request.
pub const USER_AGENT: &str = concat!("GrantScout/", env!("CARGO_PKG_VERSION"));

/// Timeout for page and feed requests.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A successfully fetched response body.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    /// URL after redirects.
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedBody {
    /// Whether the body should be treated as an HTML page.
    ///
    /// A missing content type is assumed to be HTML.
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            None => true,
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            }
        }
    }
}

/// Retrieves a URL's body. Implemented over `reqwest` in production and
/// stubbed in tests.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<FetchedBody>> + Send;
}

/// Build the HTTP client shared by the crawler and feed ingesters.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| GrantScoutError::Network(format!("failed to build HTTP client: {e}")))
}

/// [`Fetcher`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default 30 s timeout.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client(FETCH_TIMEOUT)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedBody> {
        debug!(%url, "fetching");

        let response = self
            .client
            .get(url.as_str())
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-AU,en;q=0.5")
            .send()
            .await
            .map_err(|e| GrantScoutError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GrantScoutError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .text()
            .await
            .map_err(|e| GrantScoutError::Network(format!("{url}: body read failed: {e}")))?;

        Ok(FetchedBody {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}
