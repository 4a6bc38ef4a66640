//! Filtered search APIs queried by POST.
//!
//! Body: `{"filters": {field: [codes]}, "page": N, "page_size": S}`.
//! The API applies the filter, and the codes are re-checked against each
//! entry before mapping. Paging stops on a short page.

use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};
use url::Url;

use grantscout_shared::Result;

use crate::map::FieldMap;
use crate::rest::{PageHint, collect, extract_items, fetch_with, page_hint, parse_json};
use crate::{FeedContext, FeedIngester, FeedOutput};

/// A paginated POST-JSON search feed.
#[derive(Debug, Clone)]
pub struct SearchFeed {
    pub name: String,
    pub url: Url,
    pub page_size: u32,
    pub max_pages: u32,
    pub items_key: Option<String>,
    /// Filter name sent in the request body.
    pub filter_field: Option<String>,
    /// Category codes sent for `filter_field`.
    pub codes: Vec<String>,
    pub map: FieldMap,
}

impl SearchFeed {
    /// Request body for one page.
    pub fn request_body(&self, page: u32) -> Value {
        let mut filters = Map::new();
        if let Some(field) = &self.filter_field {
            if !self.codes.is_empty() {
                filters.insert(field.clone(), json!(self.codes));
            }
        }
        json!({
            "filters": filters,
            "page": page,
            "page_size": self.page_size,
        })
    }
}

impl FeedIngester for SearchFeed {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(feed = %self.name))]
    async fn ingest(&self, ctx: &FeedContext) -> Result<FeedOutput> {
        let mut output = FeedOutput::new(&self.name);

        for page in 1..=self.max_pages.max(1) {
            let body_json = self.request_body(page);
            let request = || ctx.client.post(self.url.as_str()).json(&body_json);
            let (body, doc) = match fetch_with(ctx, &self.name, &self.url, request, parse_json).await {
                Ok(fetched) => fetched,
                Err(e) if page > 1 => {
                    warn!(page, error = %e, "page failed, stopping early");
                    break;
                }
                Err(e) => return Err(e),
            };
            ctx.snapshots.record(&self.name, page, "json", &body);

            let items = extract_items(&self.name, &doc, self.items_key.as_deref())?;
            output.pages_fetched += 1;

            let count = items.len();
            collect(&mut output, &self.map, items, self.filter_field.as_deref(), &self.codes);

            if count < self.page_size as usize || page_hint(&doc, page) == PageHint::Done {
                debug!(page, count, "last page");
                break;
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SnapshotWriter;
    use crate::quick_retry;
    use grantscout_shared::GrantScoutError;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed(server: &MockServer) -> SearchFeed {
        SearchFeed {
            name: "business-grants".into(),
            url: Url::parse(&format!("{}/search", server.uri())).unwrap(),
            page_size: 2,
            max_pages: 10,
            items_key: Some("grants".into()),
            filter_field: Some("category".into()),
            codes: vec!["HEALTH".into(), "RESEARCH".into()],
            map: FieldMap::default(),
        }
    }

    #[test]
    fn request_body_shape() {
        let feed = SearchFeed {
            name: "s".into(),
            url: Url::parse("https://api.example.gov.au/search").unwrap(),
            page_size: 25,
            max_pages: 1,
            items_key: None,
            filter_field: Some("category".into()),
            codes: vec!["HLTH".into()],
            map: FieldMap::default(),
        };
        assert_eq!(
            feed.request_body(3),
            json!({ "filters": { "category": ["HLTH"] }, "page": 3, "page_size": 25 })
        );
    }

    #[tokio::test]
    async fn posts_filters_and_stops_on_short_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({ "page": 1, "filters": { "category": ["HEALTH", "RESEARCH"] } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "grants": [
                    { "title": "Mental Health Research", "agency": "NHMRC", "category": "HEALTH" },
                    { "title": "Clinical Trials Activity", "agency": "Department of Health", "category": "RESEARCH" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({ "page": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "grants": [{ "title": "Workforce Incentive", "agency": "Department of Health", "category": "health" }]
            })))
            .mount(&server)
            .await;

        let ctx = FeedContext {
            client: reqwest::Client::new(),
            snapshots: SnapshotWriter::disabled(),
            retry: quick_retry(),
        };
        let output = feed(&server).ingest(&ctx).await.unwrap();

        assert_eq!(output.pages_fetched, 2);
        assert_eq!(output.grants.len(), 3);
        assert_eq!(output.grants[0].administering_body, "NHMRC");
        assert_eq!(output.grants[2].grant_name, "Workforce Incentive");
    }

    #[tokio::test]
    async fn missing_items_key_is_feed_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": [] })))
            .mount(&server)
            .await;

        let ctx = FeedContext {
            client: reqwest::Client::new(),
            snapshots: SnapshotWriter::disabled(),
            retry: quick_retry(),
        };
        let err = feed(&server).ingest(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("no 'grants' array"));
    }

    #[tokio::test]
    async fn entries_outside_codes_are_filtered_client_side() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "grants": [
                    { "title": "Open", "category": "HEALTH" },
                    { "title": "Mining", "category": "MINING" }
                ]
            })))
            .mount(&server)
            .await;

        let mut feed = feed(&server);
        feed.codes = vec!["HEALTH".into()];
        let ctx = FeedContext {
            client: reqwest::Client::new(),
            snapshots: SnapshotWriter::disabled(),
            retry: quick_retry(),
        };
        let output = feed.ingest(&ctx).await.unwrap();

        assert_eq!(output.entries_seen, 2);
        assert_eq!(output.entries_filtered, 1);
        let names: Vec<&str> = output.grants.iter().map(|g| g.grant_name.as_str()).collect();
        assert_eq!(names, vec!["Open"]);
    }

    #[tokio::test]
    async fn rate_limited_page_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "page": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "grants": [{ "title": "Patient", "category": "RESEARCH" }]
            })))
            .mount(&server)
            .await;

        let ctx = FeedContext {
            client: reqwest::Client::new(),
            snapshots: SnapshotWriter::disabled(),
            retry: quick_retry(),
        };
        let output = feed(&server).ingest(&ctx).await.unwrap();
        assert_eq!(output.grants.len(), 1);
        assert_eq!(output.grants[0].grant_name, "Patient");
    }

    #[tokio::test]
    async fn exhausted_retries_fail_feed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let ctx = FeedContext {
            client: reqwest::Client::new(),
            snapshots: SnapshotWriter::disabled(),
            retry: quick_retry(),
        };
        let err = feed(&server).ingest(&ctx).await.unwrap_err();
        assert!(matches!(err, GrantScoutError::Feed { .. }));
        assert!(err.to_string().contains("503"));
    }
}
