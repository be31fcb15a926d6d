//! Search expression construction and raw log record parsing.

use std::sync::LazyLock;

use regex::Regex;

use incidentqa_shared::{ExtractedIntent, JoinMode, LogMatch};

/// Severity filter appended to every search.
const SEVERITY_FILTER: &str = "level=ERROR";

/// Build the backend search expression for `intent`.
///
/// Returns `None` when the intent carries no terms, since an empty
/// conjunction would match every error in the window.
pub(crate) fn build_search_expression(
    intent: &ExtractedIntent,
    sourcetype: &str,
    join_mode: JoinMode,
    result_cap: usize,
) -> Option<String> {
    let terms: Vec<String> = intent
        .terms()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(quote_term)
        .collect();

    if terms.is_empty() {
        return None;
    }

    let joined = terms.join(&format!(" {} ", join_mode.operator()));
    Some(format!(
        "search sourcetype=\"{sourcetype}\" ({joined}) {SEVERITY_FILTER} | sort -_time | head {result_cap}"
    ))
}

/// Boolean operators of the search language; a bare term equal to one of
/// these would change the expression instead of matching the word.
const SEARCH_OPERATORS: [&str; 3] = ["AND", "OR", "NOT"];

/// Quote a term when it would otherwise break the expression.
fn quote_term(term: &str) -> String {
    let needs_quotes = SEARCH_OPERATORS
        .iter()
        .any(|op| term.eq_ignore_ascii_case(op))
        || term.chars().any(|c| {
            c.is_whitespace() || matches!(c, '"' | '(' | ')' | '[' | ']' | '|' | '\\' | '=' | '!')
        });
    if !needs_quotes {
        return term.to_string();
    }
    let escaped = term.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

static SERVICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bservice="?([\w-]+)"#).expect("valid regex"));

static ERROR_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\berror_code="?([\w-]+)"#).expect("valid regex"));

/// Parse one raw record. Each field is extracted independently; a missing
/// pattern leaves that field `None`.
pub(crate) fn parse_log_line(raw: &str) -> LogMatch {
    LogMatch {
        raw: raw.to_string(),
        service: capture(&SERVICE_RE, raw),
        error_code: capture(&ERROR_CODE_RE, raw),
    }
}

fn capture(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
