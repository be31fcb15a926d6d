//! Documentation retrieval against the Confluence REST API.
//!
//! Turns log matches (or plain keywords) into bounded, markup-free
//! [`DocSnippet`]s with resolvable page links. Each keyword is queried
//! independently; a failing keyword is logged and skipped so the rest of the
//! retrieval still contributes context.

mod cleanup;

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use incidentqa_shared::{ConfluenceConfig, DocSnippet, IncidentQaError, LogMatch, Result, Secret};

pub use cleanup::MAX_SNIPPET_CHARS;

/// User-Agent string for documentation requests.
const USER_AGENT: &str = concat!("incidentqa/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Page>,
    #[serde(default, rename = "_links")]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<Body>,
    #[serde(default, rename = "_links")]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(default)]
    storage: Option<Storage>,
}

#[derive(Debug, Deserialize)]
struct Storage {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    base: Option<String>,
    #[serde(default, rename = "self")]
    self_link: Option<String>,
    #[serde(default)]
    webui: Option<String>,
}

// ---------------------------------------------------------------------------
// Keyword derivation
// ---------------------------------------------------------------------------

/// Flatten the non-empty `service` and `error_code` fields of `matches` into a
/// de-duplicated keyword list. First occurrence wins, order is preserved.
pub fn lookup_keywords(matches: &[LogMatch]) -> Vec<String> {
    let mut seen = HashSet::new();
    matches
        .iter()
        .flat_map(|m| [m.service.as_deref(), m.error_code.as_deref()])
        .flatten()
        .map(str::trim)
        .filter(|kw| !kw.is_empty())
        .filter(|kw| seen.insert(kw.to_string()))
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Retriever
// ---------------------------------------------------------------------------

/// Client for the documentation backend.
#[derive(Debug, Clone)]
pub struct DocRetriever {
    client: Client,
    base_url: String,
    email: String,
    token: Secret,
    page_limit: u32,
}

impl DocRetriever {
    /// Build a retriever from the `[confluence]` config section and a resolved token.
    pub fn new(config: &ConfluenceConfig, token: Secret) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IncidentQaError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            token,
            page_limit: config.page_limit,
        })
    }

    /// Retrieve snippets for every keyword derived from `matches`.
    pub async fn retrieve(&self, matches: &[LogMatch]) -> Vec<DocSnippet> {
        let keywords = lookup_keywords(matches);
        self.retrieve_keywords(&keywords).await
    }

    /// Retrieve snippets for `keywords`, in keyword order.
    ///
    /// Per-keyword failures are absorbed; an empty result is not an error.
    #[instrument(skip_all, fields(keywords = keywords.len()))]
    pub async fn retrieve_keywords(&self, keywords: &[String]) -> Vec<DocSnippet> {
        let mut snippets = Vec::new();
        let mut failed = 0usize;

        for keyword in keywords {
            match self.search_keyword(keyword).await {
                Ok(found) => {
                    debug!(%keyword, pages = found.len(), "documentation pages found");
                    snippets.extend(found);
                }
                Err(e) => {
                    failed += 1;
                    warn!(%keyword, error = %e, "documentation lookup failed, skipping keyword");
                }
            }
        }

        info!(snippets = snippets.len(), failed, "documentation retrieval complete");
        snippets
    }

    /// Query the backend for one keyword and turn every result page into a snippet.
    pub async fn search_keyword(&self, keyword: &str) -> Result<Vec<DocSnippet>> {
        let url = format!("{}/content/search", self.base_url);
        let cql = format!("text~\"{}\"", keyword.replace('\\', "\\\\").replace('"', "\\\""));
        let limit = self.page_limit.to_string();

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.email, Some(self.token.expose()))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("cql", cql.as_str()),
                ("expand", "body.storage"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| IncidentQaError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IncidentQaError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| IncidentQaError::parse(format!("{url}: invalid JSON body: {e}")))?;

        Ok(self.to_snippets(keyword, parsed))
    }

    fn to_snippets(&self, keyword: &str, response: SearchResponse) -> Vec<DocSnippet> {
        let response_base = response.links.base;

        response
            .results
            .into_iter()
            .map(|page| {
                let html = page
                    .body
                    .and_then(|b| b.storage)
                    .map(|s| s.value)
                    .unwrap_or_default();

                let base = response_base
                    .as_deref()
                    .or(page.links.base.as_deref())
                    .or(page.links.self_link.as_deref())
                    .unwrap_or(&self.base_url);

                let source_url = page
                    .links
                    .webui
                    .as_deref()
                    .and_then(|webui| cleanup::resolve_page_link(base, webui));

                DocSnippet {
                    keyword: keyword.to_string(),
                    title: page.title.trim().to_string(),
                    body_text: cleanup::clean_body(&html),
                    source_url,
                }
            })
            .collect()
    }

    /// Readiness probe: list a single space.
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/space", self.base_url);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.email, Some(self.token.expose()))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("limit", "1")])
            .send()
            .await
            .map_err(|e| IncidentQaError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(IncidentQaError::Http {
                status: status.as_u16(),
                url,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn retriever_for(server: &MockServer) -> DocRetriever {
        let config = ConfluenceConfig {
            base_url: format!("{}/wiki/rest/api", server.uri()),
            email: "oncall@example.com".into(),
            ..Default::default()
        };
        DocRetriever::new(&config, Secret::new("conf-token")).expect("build retriever")
    }

    fn fixture(name: &str) -> serde_json::Value {
        let path = format!("../../../fixtures/confluence/{name}");
        let content = std::fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("missing fixture: {path}"));
        serde_json::from_str(&content).expect("parse fixture")
    }

    async fn mount_keyword(server: &MockServer, keyword: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/search"))
            .and(query_param("cql", format!("text~\"{keyword}\"")))
            .and(query_param("expand", "body.storage"))
            .and(basic_auth("oncall@example.com", "conf-token"))
            .respond_with(response)
            .expect(1)
            .mount(server)
            .await;
    }

    fn log_match(service: Option<&str>, error_code: Option<&str>) -> LogMatch {
        LogMatch {
            raw: String::new(),
            service: service.map(String::from),
            error_code: error_code.map(String::from),
        }
    }

    #[test]
    fn keywords_are_flattened_and_deduplicated() {
        let matches = vec![
            log_match(Some("parser"), Some("JSON_SYNTAX_ERROR")),
            log_match(None, Some("TIMEOUT")),
            log_match(Some("parser"), Some("")),
            log_match(Some("checkout"), Some("TIMEOUT")),
        ];
        assert_eq!(
            lookup_keywords(&matches),
            ["parser", "JSON_SYNTAX_ERROR", "TIMEOUT", "checkout"]
        );
        assert!(lookup_keywords(&[log_match(None, None)]).is_empty());
    }

    #[tokio::test]
    async fn snippets_are_cleaned_and_linked() {
        let server = MockServer::start().await;
        mount_keyword(
            &server,
            "parser",
            ResponseTemplate::new(200).set_body_json(fixture("search_parser.json")),
        )
        .await;

        let snippets = retriever_for(&server).search_keyword("parser").await.unwrap();

        assert_eq!(snippets.len(), 2);
        let first = &snippets[0];
        assert_eq!(first.keyword, "parser");
        assert_eq!(first.title, "Parser Service Runbook");
        assert!(first.body_text.starts_with("JSON_SYNTAX_ERROR"));
        assert!(!first.body_text.contains('<'));
        assert!(!first.body_text.contains('\n'));
        assert_eq!(
            first.source_url.as_deref(),
            Some("https://acme.atlassian.net/wiki/spaces/OPS/pages/101/Parser+Service+Runbook")
        );

        // Second page has a 5,000 character body and no web link.
        assert_eq!(snippets[1].body_text.chars().count(), MAX_SNIPPET_CHARS);
        assert_eq!(snippets[1].source_url, None);
    }

    #[tokio::test]
    async fn link_falls_back_to_configured_base() {
        let server = MockServer::start().await;
        mount_keyword(
            &server,
            "gateway",
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "title": "Gateway",
                    "body": {"storage": {"value": "<p>Scale up.</p>"}},
                    "_links": {"webui": "/spaces/OPS/pages/7"}
                }]
            })),
        )
        .await;

        let snippets = retriever_for(&server).search_keyword("gateway").await.unwrap();
        assert_eq!(
            snippets[0].source_url,
            Some(format!("{}/wiki/spaces/OPS/pages/7", server.uri()))
        );
    }

    #[tokio::test]
    async fn failing_keyword_is_skipped() {
        let server = MockServer::start().await;
        mount_keyword(
            &server,
            "parser",
            ResponseTemplate::new(200).set_body_json(fixture("search_parser.json")),
        )
        .await;
        mount_keyword(&server, "JSON_SYNTAX_ERROR", ResponseTemplate::new(404)).await;
        mount_keyword(
            &server,
            "checkout",
            ResponseTemplate::new(200).set_body_json(fixture("search_checkout.json")),
        )
        .await;

        let keywords = vec![
            "parser".to_string(),
            "JSON_SYNTAX_ERROR".to_string(),
            "checkout".to_string(),
        ];
        let snippets = retriever_for(&server).retrieve_keywords(&keywords).await;

        let order: Vec<&str> = snippets.iter().map(|s| s.keyword.as_str()).collect();
        assert_eq!(order, ["parser", "parser", "checkout"]);
    }

    #[tokio::test]
    async fn empty_results_are_not_an_error() {
        let server = MockServer::start().await;
        mount_keyword(
            &server,
            "unknown",
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
        )
        .await;

        let snippets = retriever_for(&server)
            .retrieve(&[log_match(Some("unknown"), None)])
            .await;
        assert!(snippets.is_empty());
    }

    #[tokio::test]
    async fn health_lists_one_space() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/space"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = retriever_for(&server).health().await.unwrap_err();
        assert!(matches!(err, IncidentQaError::Http { status: 401, .. }));
    }
}
