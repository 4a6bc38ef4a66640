//! HTML page cleaning and chunking for extraction.
//!
//! [`clean_html`] turns a raw page into readable text: page chrome is
//! dropped, tables keep their row/column shape, relative links are made
//! absolute. [`chunk_text`] then splits that text into model-sized pieces.

mod chunk;
mod cleanup;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use grantscout_shared::{GrantScoutError, Result};

pub use chunk::chunk_text;

/// Elements whose content never carries grant information.
const CHROME_TAGS: [&str; 9] = [
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe", "svg",
];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A page reduced to its title and readable text.
#[derive(Debug, Clone)]
pub struct CleanedPage {
    /// `<title>`, else the first heading, else "Untitled".
    pub title: String,
    /// Cleaned, Markdown-flavoured text.
    pub text: String,
    pub word_count: usize,
}

// ---------------------------------------------------------------------------
// Cleaner
// ---------------------------------------------------------------------------

/// Clean an HTML page into text.
///
/// `source_url` is used to resolve relative links so the extractor can
/// report absolute web links.
#[instrument(skip(html), fields(url = %source_url))]
pub fn clean_html(html: &str, source_url: &str) -> Result<CleanedPage> {
    let doc_title = extract_document_title(html);

    let content_html = extract_content_html(html);
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(CHROME_TAGS.to_vec())
        .build();

    let raw = converter
        .convert(&content_html)
        .map_err(|e| GrantScoutError::Conversion(format!("htmd conversion failed: {e}")))?;

    let base_url = Url::parse(source_url).ok();
    let text = cleanup::run_pipeline(&raw, base_url.as_ref());

    let title = doc_title
        .or_else(|| first_heading(&text))
        .unwrap_or_else(|| "Untitled".to_string());
    let word_count = text.split_whitespace().count();

    debug!(title = %title, word_count, text_len = text.len(), "page cleaned");

    Ok(CleanedPage {
        title,
        text,
        word_count,
    })
}

// ---------------------------------------------------------------------------
// Table pre-processing
// ---------------------------------------------------------------------------

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static TR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));
static TH_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th").expect("valid selector"));

/// Replace `<table>` elements with pipe tables before conversion.
///
/// Grant calendars are often tables; keeping one row per line keeps each
/// grant's name, deadline and amount together in the same chunk.
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);

    if doc.select(&TABLE_SEL).next().is_none() {
        return html.to_string();
    }

    let mut result = html.to_string();
    for table in doc.select(&TABLE_SEL) {
        let table_md = html_table_to_text(&table);
        result = result.replacen(&table.html(), &table_md, 1);
    }
    result
}

fn html_table_to_text(table: &ElementRef) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut header_first = false;

    for (idx, tr) in table.select(&TR_SEL).enumerate() {
        let cells: Vec<String> = tr
            .select(&CELL_SEL)
            .map(|cell| collapse_ws(&cell.text().collect::<String>()))
            .collect();
        if cells.is_empty() {
            continue;
        }
        if idx == 0 && tr.select(&TH_SEL).next().is_some() {
            header_first = true;
        }
        rows.push(cells);
    }

    let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    if cols == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(cols, String::new());
    }

    let mut out = String::from("\n\n");
    for (idx, row) in rows.iter().enumerate() {
        out.push_str("| ");
        out.push_str(&row.join(" | "));
        out.push_str(" |\n");
        if idx == 0 && header_first {
            out.push_str("| ");
            out.push_str(&vec!["---"; cols].join(" | "));
            out.push_str(" |\n");
        }
    }
    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pick the main content container, falling back to `<body>`.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    let selectors = ["main", "[role=\"main\"]", "#main-content", "#content", "body"];
    for sel_str in &selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    html.to_string()
}

/// Text content of an HTML fragment with whitespace collapsed.
///
/// Plain text passes through unchanged apart from whitespace.
pub fn plain_text(fragment: &str) -> String {
    if !fragment.contains('<') {
        return collapse_ws(fragment);
    }
    let doc = Html::parse_fragment(fragment);
    collapse_ws(&doc.root_element().text().collect::<Vec<_>>().join(" "))
}

fn extract_document_title(html: &str) -> Option<String> {
    static TITLE_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("title").expect("valid selector"));

    let doc = Html::parse_document(html);
    doc.select(&TITLE_SEL)
        .next()
        .map(|el| collapse_ws(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn first_heading(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix('#'))
        .map(|rest| rest.trim_start_matches('#').trim().to_string())
        .filter(|t| !t.is_empty())
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
