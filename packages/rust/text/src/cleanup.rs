//! Post-conversion cleanup passes.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Run every cleanup pass on converted page text.
pub(crate) fn run_pipeline(text: &str, base_url: Option<&Url>) -> String {
    let mut result = drop_images(text);
    result = strip_leftover_html(&result);
    result = resolve_links(&result, base_url);
    result = normalize_whitespace(&result);
    result = collapse_blank_lines(&result);

    result.trim().to_string()
}

/// Remove `![alt](src)` image syntax; images carry nothing extractable.
fn drop_images(text: &str) -> String {
    static IMG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    IMG_RE.replace_all(text, "").to_string()
}

/// Remove stray container tags that survived conversion, keeping their text.
fn strip_leftover_html(text: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|figure|figcaption|details|summary|form|label|button|input|select|option)(?:\s[^>]*)?/?>",
        )
        .expect("valid regex")
    });

    HTML_TAG_RE.replace_all(text, "").to_string()
}

/// Resolve relative URLs in `[text](url)` links against the page URL.
fn resolve_links(text: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return text.to_string();
    };

    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

    LINK_RE
        .replace_all(text, |caps: &regex::Captures| {
            let label = &caps[1];
            let href = &caps[2];

            if href.starts_with("http://")
                || href.starts_with("https://")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                return caps[0].to_string();
            }
            // In-page anchors are useless once the page is flattened.
            if href.starts_with('#') || href.starts_with("javascript:") {
                return label.to_string();
            }

            match base.join(href) {
                Ok(resolved) => format!("[{label}]({resolved})"),
                Err(_) => caps[0].to_string(),
            }
        })
        .to_string()
}

/// Trim line ends and collapse runs of inline spaces.
fn normalize_whitespace(text: &str) -> String {
    static INLINE_WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\u{a0}]{2,}").expect("valid regex"));

    text.lines()
        .map(|line| INLINE_WS_RE.replace_all(line.trim_end(), " ").to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse any run of blank lines into a single blank line.
fn collapse_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_images_removes_markup() {
        let result = drop_images("Logo ![Department logo](/img/logo.png) text");
        assert_eq!(result, "Logo  text");
    }

    #[test]
    fn strip_leftover_html_keeps_content() {
        let result = strip_leftover_html("<div class=\"card\">Closes <span>1 May</span></div>");
        assert_eq!(result, "Closes 1 May");
    }

    #[test]
    fn resolve_links_relative_resolved() {
        let base = Url::parse("https://www.arc.gov.au/funding/schemes").unwrap();
        let result = resolve_links("[Discovery](/funding/discovery)", Some(&base));
        assert_eq!(result, "[Discovery](https://www.arc.gov.au/funding/discovery)");
    }

    #[test]
    fn resolve_links_absolute_untouched() {
        let base = Url::parse("https://www.arc.gov.au/").unwrap();
        let input = "[GrantConnect](https://www.grants.gov.au/)";
        assert_eq!(resolve_links(input, Some(&base)), input);
    }

    #[test]
    fn resolve_links_anchor_flattened() {
        let base = Url::parse("https://www.arc.gov.au/").unwrap();
        assert_eq!(resolve_links("[Top](#top)", Some(&base)), "Top");
    }

    #[test]
    fn collapse_blank_lines_leaves_one() {
        assert_eq!(collapse_blank_lines("A\n\n\n\n\nB"), "A\n\nB");
        assert_eq!(collapse_blank_lines("A\n\nB"), "A\n\nB");
    }

    #[test]
    fn normalize_whitespace_collapses_inline_runs() {
        assert_eq!(normalize_whitespace("Funding:    $50,000   \nNext"), "Funding: $50,000\nNext");
    }

    #[test]
    fn full_pipeline() {
        let base = Url::parse("https://example.gov.au/grants").unwrap();
        let input = "# Grants\n\n\n\n<div>Round 3 ![x](a.png)</div>\n\n[Apply](apply)   \n\n\n";
        let result = run_pipeline(input, Some(&base));

        assert!(!result.contains("\n\n\n"));
        assert!(!result.contains("<div>"));
        assert!(result.contains("Round 3"));
        assert!(result.contains("[Apply](https://example.gov.au/apply)"));
        assert!(!result.ends_with('\n'));
    }
}
