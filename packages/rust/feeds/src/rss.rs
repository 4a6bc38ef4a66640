//! RSS 2.0 and Atom feeds.
//!
//! Each `<item>` / `<entry>` becomes a JSON object (`title`, `link`,
//! `description`, `pubDate`, `category`, ...) so the usual [`FieldMap`]
//! applies.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;

use grantscout_shared::{GrantScoutError, Result};

use crate::map::FieldMap;
use crate::rest::{collect, fetch_with};
use crate::{FeedContext, FeedIngester, FeedOutput};

/// An RSS or Atom feed with an optional category allow-list.
#[derive(Debug, Clone)]
pub struct RssFeed {
    pub name: String,
    pub url: Url,
    /// Entry key checked against `allow`; defaults to `category`.
    pub filter_field: Option<String>,
    pub allow: Vec<String>,
    pub map: FieldMap,
}

impl FeedIngester for RssFeed {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(feed = %self.name))]
    async fn ingest(&self, ctx: &FeedContext) -> Result<FeedOutput> {
        let mut output = FeedOutput::new(&self.name);

        let request = || ctx.client.get(self.url.as_str());
        let parse = |body: &str| {
            parse_items(body).map_err(|e| GrantScoutError::parse(format!("malformed XML: {e}")))
        };
        let (body, items) = fetch_with(ctx, &self.name, &self.url, request, parse).await?;
        ctx.snapshots.record(&self.name, 1, "xml", &body);
        output.pages_fetched = 1;

        debug!(items = items.len(), "feed parsed");

        let filter_field = self.filter_field.as_deref().unwrap_or("category");
        collect(&mut output, &self.map, items, Some(filter_field), &self.allow);
        Ok(output)
    }
}

/// Parse RSS `<item>` or Atom `<entry>` elements into JSON objects.
///
/// Namespace prefixes are dropped (`dc:date` → `date`). Repeated
/// `category` elements collect into an array; other repeats keep the
/// first value. Atom `<link href>` and `<category term>` attributes are read.
pub fn parse_items(xml: &str) -> std::result::Result<Vec<Value>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<Map<String, Value>> = None;
    let mut field: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let tag = local_name(&e);
                if tag == "item" || tag == "entry" {
                    current = Some(Map::new());
                } else if let Some(item) = current.as_mut() {
                    read_attributes(item, &tag, &e);
                    field = Some(tag);
                    text.clear();
                }
            }
            Event::Empty(e) => {
                if let Some(item) = current.as_mut() {
                    let tag = local_name(&e);
                    read_attributes(item, &tag, &e);
                }
            }
            Event::Text(e) => {
                if field.is_some() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(e) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if tag == "item" || tag == "entry" {
                    if let Some(item) = current.take() {
                        items.push(Value::Object(item));
                    }
                    field = None;
                } else if field.as_deref() == Some(tag.as_str()) {
                    if let Some(item) = current.as_mut() {
                        store(item, &tag, text.trim());
                    }
                    field = None;
                    text.clear();
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn read_attributes(item: &mut Map<String, Value>, tag: &str, e: &BytesStart) {
    let attr = match tag {
        "link" => "href",
        "category" => "term",
        _ => return,
    };
    if let Ok(Some(value)) = e.try_get_attribute(attr) {
        if let Ok(value) = value.unescape_value() {
            store(item, tag, value.trim());
        }
    }
}

fn store(item: &mut Map<String, Value>, tag: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let key = match tag {
        "summary" | "content" | "encoded" => {
            if item.contains_key("description") {
                return;
            }
            "description"
        }
        other => other,
    };

    if key == "category" {
        let entry = item
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = entry {
            values.push(Value::String(value.to_string()));
        }
        return;
    }

    item.entry(key)
        .or_insert_with(|| Value::String(value.to_string()));
}
