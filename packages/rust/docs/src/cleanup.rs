//! Snippet cleanup passes and page link resolution.
//!
//! Each pass is a function `&str -> String` applied in sequence by
//! [`clean_body`]: markup is stripped, line breaks collapse to spaces, and the
//! result is bounded to [`MAX_SNIPPET_CHARS`].

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use url::Url;

/// Upper bound on snippet body length, in characters.
pub const MAX_SNIPPET_CHARS: usize = 1_000;

/// Suffix of REST API base URLs that the web UI does not share.
const REST_API_SUFFIX: &str = "/rest/api";

/// Run the full cleanup pipeline on a stored page body.
pub(crate) fn clean_body(html: &str) -> String {
    let text = strip_markup(html);
    let text = collapse_line_breaks(&text);
    truncate_chars(text.trim(), MAX_SNIPPET_CHARS)
}

// ---------------------------------------------------------------------------
// Pass 1: Strip markup
// ---------------------------------------------------------------------------

/// Keep only text nodes; entities are decoded by the HTML parser.
fn strip_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment.root_element().text().collect()
}

// ---------------------------------------------------------------------------
// Pass 2: Collapse line breaks
// ---------------------------------------------------------------------------

/// Replace every run of line breaks with a single space.
fn collapse_line_breaks(text: &str) -> String {
    static LINE_BREAKS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[\r\n]+").expect("valid regex"));

    LINE_BREAKS_RE.replace_all(text, " ").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 3: Bound length
// ---------------------------------------------------------------------------

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ---------------------------------------------------------------------------
// Link resolution
// ---------------------------------------------------------------------------

/// Strip a trailing REST API path (and anything after it) from a base URL.
pub(crate) fn web_base(rest_url: &str) -> &str {
    let trimmed = match rest_url.find(REST_API_SUFFIX) {
        Some(idx) => &rest_url[..idx],
        None => rest_url,
    };
    trimmed.trim_end_matches('/')
}

/// Combine a web base with a page's relative web path into an absolute link.
///
/// Returns `None` when the result is not a valid absolute URL.
pub(crate) fn resolve_page_link(base: &str, webui: &str) -> Option<String> {
    if let Ok(absolute) = Url::parse(webui) {
        return Some(absolute.into());
    }
    let joined = format!("{}/{}", web_base(base), webui.trim_start_matches('/'));
    Url::parse(&joined).ok().map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_decodes_entities() {
        let html = "<h2>Parser</h2><p>Check the <strong>payload</strong> &amp; retry.</p>";
        assert_eq!(clean_body(html), "ParserCheck the payload & retry.");
    }

    #[test]
    fn collapses_line_breaks_into_single_spaces() {
        let html = "<p>Step 1: drain the queue</p>\n\n<p>Step 2: restart</p>\r\n";
        assert_eq!(clean_body(html), "Step 1: drain the queue Step 2: restart");
    }

    #[test]
    fn keeps_text_of_storage_format_macros() {
        let html = r#"<ac:structured-macro ac:name="info"><ac:rich-text-body><p>Page the on-call.</p></ac:rich-text-body></ac:structured-macro>"#;
        assert_eq!(clean_body(html), "Page the on-call.");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let html = format!("<p>{}</p>", "x".repeat(5_000));
        let cleaned = clean_body(&html);
        assert_eq!(cleaned.chars().count(), MAX_SNIPPET_CHARS);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let html = "é".repeat(1_500);
        let cleaned = clean_body(&html);
        assert_eq!(cleaned.chars().count(), MAX_SNIPPET_CHARS);
        assert!(cleaned.len() > MAX_SNIPPET_CHARS);
    }

    #[test]
    fn web_base_trims_rest_suffix() {
        assert_eq!(
            web_base("https://acme.atlassian.net/wiki/rest/api"),
            "https://acme.atlassian.net/wiki"
        );
        assert_eq!(
            web_base("https://acme.atlassian.net/wiki/rest/api/content/123"),
            "https://acme.atlassian.net/wiki"
        );
        assert_eq!(web_base("https://wiki.internal/"), "https://wiki.internal");
    }

    #[test]
    fn resolves_relative_and_absolute_links() {
        assert_eq!(
            resolve_page_link(
                "https://acme.atlassian.net/wiki/rest/api",
                "/spaces/OPS/pages/42/Parser+Runbook"
            )
            .as_deref(),
            Some("https://acme.atlassian.net/wiki/spaces/OPS/pages/42/Parser+Runbook")
        );
        assert_eq!(
            resolve_page_link("https://ignored", "https://other.example/page").as_deref(),
            Some("https://other.example/page")
        );
        assert_eq!(resolve_page_link("not a base", "/x"), None);
    }
}
