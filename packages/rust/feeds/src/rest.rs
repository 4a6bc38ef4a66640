//! Paginated JSON REST feeds.
//!
//! `GET {url}?page=N&per_page=S`, entries under `data`, `items`, `results`
//! or `grants` (or the configured key). Paging stops on an empty page, an
//! explicit end marker, or the page ceiling.

use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use grantscout_shared::{GrantScoutError, Result, is_retryable, retry};

use crate::map::{FieldMap, passes_allow};
use crate::{FeedContext, FeedIngester, FeedOutput};

/// Keys searched for the entry array when none is configured.
const ITEM_KEYS: [&str; 4] = ["data", "items", "results", "grants"];

/// A paginated GET-JSON feed.
#[derive(Debug, Clone)]
pub struct RestFeed {
    pub name: String,
    pub url: Url,
    pub page_size: u32,
    pub max_pages: u32,
    pub items_key: Option<String>,
    pub filter_field: Option<String>,
    pub allow: Vec<String>,
    pub map: FieldMap,
}

impl RestFeed {
    fn page_url(&self, page: u32) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &self.page_size.to_string());
        url
    }
}

impl FeedIngester for RestFeed {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(feed = %self.name))]
    async fn ingest(&self, ctx: &FeedContext) -> Result<FeedOutput> {
        let mut output = FeedOutput::new(&self.name);

        for page in 1..=self.max_pages.max(1) {
            let url = self.page_url(page);
            let request = || ctx.client.get(url.as_str());
            let (body, doc) = match fetch_with(ctx, &self.name, &url, request, parse_json).await {
                Ok(fetched) => fetched,
                // Keep what earlier pages produced.
                Err(e) if page > 1 => {
                    warn!(page, error = %e, "page failed, stopping early");
                    break;
                }
                Err(e) => return Err(e),
            };
            ctx.snapshots.record(&self.name, page, "json", &body);

            let items = extract_items(&self.name, &doc, self.items_key.as_deref())?;
            output.pages_fetched += 1;

            if items.is_empty() {
                debug!(page, "empty page, done");
                break;
            }
            collect(&mut output, &self.map, items, self.filter_field.as_deref(), &self.allow);

            match page_hint(&doc, page) {
                PageHint::Done => {
                    debug!(page, "feed reports last page");
                    break;
                }
                PageHint::More | PageHint::Unknown => {}
            }
            if page == self.max_pages {
                warn!(max_pages = self.max_pages, "page ceiling reached");
            }
        }

        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Shared JSON paging helpers
// ---------------------------------------------------------------------------

/// Whether the response says more pages follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageHint {
    More,
    Done,
    Unknown,
}

/// Send a request and parse its body, retrying transient failures
/// (transport errors, 408/429/5xx, unparseable bodies) under the
/// context's policy. Returns the raw body alongside the parsed value.
///
/// Whatever still fails afterwards is reported as a feed error.
pub(crate) async fn fetch_with<T, B, P>(
    ctx: &FeedContext,
    feed: &str,
    url: &Url,
    request: B,
    parse: P,
) -> Result<(String, T)>
where
    B: Fn() -> reqwest::RequestBuilder,
    P: Fn(&str) -> Result<T>,
{
    let (request, parse) = (&request, &parse);
    retry(&ctx.retry, is_retryable, move |_| {
        let pending = request().send();
        async move {
            let response = pending
                .await
                .map_err(|e| GrantScoutError::Network(format!("{url}: {e}")))?;
            let body = read_body(url, response).await?;
            let value = parse(&body)?;
            Ok::<_, GrantScoutError>((body, value))
        }
    })
    .await
    .map_err(|e| GrantScoutError::feed(feed, e.to_string()))
}

async fn read_body(url: &Url, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(GrantScoutError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    response
        .text()
        .await
        .map_err(|e| GrantScoutError::Network(format!("{url}: body read failed: {e}")))
}

pub(crate) fn parse_json(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| GrantScoutError::parse(format!("malformed JSON: {e}")))
}

/// Pull the entry array out of a page.
///
/// A configured key must be present. Otherwise a top-level array is the
/// entry list, or the first of the common keys holding an array.
pub(crate) fn extract_items(feed: &str, doc: &Value, items_key: Option<&str>) -> Result<Vec<Value>> {
    if let Some(key) = items_key {
        let found = if key.starts_with('/') {
            doc.pointer(key)
        } else {
            doc.get(key)
        };
        return match found {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(GrantScoutError::feed(
                feed,
                format!("response has no '{key}' array"),
            )),
        };
    }

    if let Value::Array(items) = doc {
        return Ok(items.clone());
    }
    ITEM_KEYS
        .iter()
        .find_map(|key| doc.get(*key).and_then(Value::as_array))
        .cloned()
        .ok_or_else(|| {
            GrantScoutError::feed(feed, "response has no data/items/results/grants array")
        })
}

/// Read `has_more`, `next` and `total_pages`, at top level or under
/// `meta` / `pagination`.
pub(crate) fn page_hint(doc: &Value, page: u32) -> PageHint {
    let scopes = [Some(doc), doc.get("meta"), doc.get("pagination")];

    for scope in scopes.into_iter().flatten() {
        if let Some(more) = scope.get("has_more").and_then(Value::as_bool) {
            return if more { PageHint::More } else { PageHint::Done };
        }
        if let Some(next) = scope.get("next") {
            return match next {
                Value::Null | Value::Bool(false) => PageHint::Done,
                Value::String(s) if s.is_empty() => PageHint::Done,
                _ => PageHint::More,
            };
        }
        if let Some(total) = scope.get("total_pages").and_then(Value::as_u64) {
            return if u64::from(page) >= total {
                PageHint::Done
            } else {
                PageHint::More
            };
        }
    }
    PageHint::Unknown
}

/// Filter and map a page of entries into the output.
pub(crate) fn collect(
    output: &mut FeedOutput,
    map: &FieldMap,
    items: Vec<Value>,
    filter_field: Option<&str>,
    allow: &[String],
) {
    for item in items {
        output.entries_seen += 1;
        if !passes_allow(&item, filter_field, allow) {
            output.entries_filtered += 1;
            continue;
        }
        output.grants.push(map.apply(&item));
    }
}
