//! Job-based log search against the Splunk REST API.
//!
//! A search runs as a backend job: the expression built from an
//! [`ExtractedIntent`] is submitted, the job status is polled at a fixed
//! interval until the backend reports completion or failure (bounded by
//! `max_poll_attempts`), and the results are fetched and parsed into
//! [`LogMatch`]es.
//!
//! [`LogSearchClient::search`] absorbs every failure: the outcome then carries
//! a `Failed` job and no matches, and the caller continues without log context.

mod parser;

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use incidentqa_shared::{
    ExtractedIntent, IncidentQaError, JobStatus, LogMatch, Result, SearchJob, Secret,
    SplunkConfig,
};

/// User-Agent string for log backend requests.
const USER_AGENT: &str = concat!("incidentqa/", env!("CARGO_PKG_VERSION"));

/// Path of the search jobs collection under the management base URL.
const JOBS_PATH: &str = "/services/search/jobs";

/// Path of the server info endpoint used as readiness probe.
const SERVER_INFO_PATH: &str = "/services/server/info";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    entry: Vec<StatusEntry>,
}

#[derive(Debug, Deserialize)]
struct StatusEntry {
    content: StatusContent,
}

#[derive(Debug, Default, Deserialize)]
struct StatusContent {
    #[serde(default, rename = "isDone")]
    is_done: bool,
    #[serde(default, rename = "isFailed")]
    is_failed: bool,
    #[serde(default, rename = "dispatchState")]
    dispatch_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    #[serde(default)]
    results: Vec<serde_json::Map<String, serde_json::Value>>,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of a complete search run. Never an error.
#[derive(Debug, Clone, Default)]
pub struct LogSearchOutcome {
    /// The job, if submission got far enough to create one.
    pub job: Option<SearchJob>,
    /// Parsed matches; empty when the search failed.
    pub matches: Vec<LogMatch>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the log backend. Holds read-only configuration and credentials,
/// so one instance can serve concurrent questions.
#[derive(Debug, Clone)]
pub struct LogSearchClient {
    client: Client,
    base_url: String,
    username: String,
    password: Secret,
    config: SplunkConfig,
}

impl LogSearchClient {
    /// Build a client from the `[splunk]` config section and resolved credentials.
    pub fn new(config: &SplunkConfig, username: impl Into<String>, password: Secret) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| IncidentQaError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: username.into(),
            password,
            config: config.clone(),
        })
    }

    /// Run submit → await completion → fetch, absorbing every failure.
    #[instrument(skip_all)]
    pub async fn search(&self, intent: &ExtractedIntent) -> LogSearchOutcome {
        let mut job = match self.submit(intent).await {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "log search submission failed, continuing without log context");
                return LogSearchOutcome::default();
            }
        };

        match self.await_completion(&mut job).await {
            Ok(JobStatus::Done) => {}
            Ok(_) => {
                warn!(sid = %job.id, reason = job.failure.as_deref().unwrap_or("unknown"), "log search job failed");
                return LogSearchOutcome {
                    job: Some(job),
                    matches: Vec::new(),
                };
            }
            Err(e) => {
                warn!(sid = %job.id, error = %e, "log search did not complete");
                return LogSearchOutcome {
                    job: Some(job),
                    matches: Vec::new(),
                };
            }
        }

        let matches = match self.fetch_results(&job).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(sid = %job.id, error = %e, "fetching log search results failed");
                Vec::new()
            }
        };

        info!(sid = %job.id, matches = matches.len(), polls = job.polls, "log search complete");

        LogSearchOutcome {
            job: Some(job),
            matches,
        }
    }

    /// Submit a search job for `intent`. The returned job is `Running`.
    #[instrument(skip_all)]
    pub async fn submit(&self, intent: &ExtractedIntent) -> Result<SearchJob> {
        let expression = parser::build_search_expression(
            intent,
            &self.config.sourcetype,
            self.config.join_mode,
            self.config.result_cap,
        )
        .ok_or_else(|| IncidentQaError::validation("intent has no search terms"))?;

        info!(%expression, "submitting log search");

        let url = format!("{}{JOBS_PATH}", self.base_url);
        let form = [
            ("search", expression.as_str()),
            ("output_mode", "json"),
            ("exec_mode", "normal"),
            ("earliest_time", self.config.earliest_time.as_str()),
            ("latest_time", self.config.latest_time.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .form(&form)
            .send()
            .await
            .map_err(|e| IncidentQaError::Network(format!("{url}: {e}")))?;

        let submitted: SubmitResponse = read_json(response, &url).await?;
        if submitted.sid.trim().is_empty() {
            return Err(IncidentQaError::parse("backend returned an empty search id"));
        }

        debug!(sid = %submitted.sid, "search job created");
        Ok(SearchJob::submitted(submitted.sid))
    }

    /// Poll until the job is `Done` or `Failed`.
    ///
    /// On return the job is always in a terminal state. Backend-reported
    /// outcomes come back as `Ok(status)`; transport errors and exhausting
    /// `max_poll_attempts` mark the job `Failed` and return the error.
    #[instrument(skip_all, fields(sid = %job.id))]
    pub async fn await_completion(&self, job: &mut SearchJob) -> Result<JobStatus> {
        if job.status.is_terminal() {
            return Ok(job.status);
        }

        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let url = match self.job_url(job, None) {
            Ok(url) => url,
            Err(e) => {
                job.mark_failed(e.to_string())?;
                return Err(e);
            }
        };

        while job.polls < self.config.max_poll_attempts {
            if job.polls > 0 {
                tokio::time::sleep(interval).await;
            }
            job.polls += 1;

            let status = match self.poll_status(&url).await {
                Ok(status) => status,
                Err(e) => {
                    job.mark_failed(e.to_string())?;
                    return Err(e);
                }
            };

            if status.is_failed || status.dispatch_state.as_deref() == Some("FAILED") {
                job.mark_failed("backend reported the search job as failed")?;
                return Ok(JobStatus::Failed);
            }
            if status.is_done {
                job.mark_done()?;
                debug!(polls = job.polls, "search job done");
                return Ok(JobStatus::Done);
            }

            debug!(poll = job.polls, state = ?status.dispatch_state, "search job still running");
        }

        let reason = format!(
            "search job not done after {} status polls",
            self.config.max_poll_attempts
        );
        job.mark_failed(reason.clone())?;
        if let Err(e) = self.cancel(job).await {
            debug!(error = %e, "best-effort job cancellation failed");
        }
        Err(IncidentQaError::Timeout(reason))
    }

    async fn poll_status(&self, url: &str) -> Result<StatusContent> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .query(&[("output_mode", "json")])
            .send()
            .await
            .map_err(|e| IncidentQaError::Network(format!("{url}: {e}")))?;

        let status: StatusResponse = read_json(response, url).await?;
        status
            .entry
            .into_iter()
            .next()
            .map(|entry| entry.content)
            .ok_or_else(|| IncidentQaError::parse(format!("{url}: status response has no entry")))
    }

    /// Fetch and parse up to `result_cap` records of a finished job.
    #[instrument(skip_all, fields(sid = %job.id))]
    pub async fn fetch_results(&self, job: &SearchJob) -> Result<Vec<LogMatch>> {
        if job.status != JobStatus::Done {
            return Err(IncidentQaError::validation(format!(
                "search job {} is {:?}, results are only available once done",
                job.id, job.status
            )));
        }

        let url = self.job_url(job, Some("results"))?;
        let count = self.config.result_cap.to_string();

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .query(&[("output_mode", "json"), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| IncidentQaError::Network(format!("{url}: {e}")))?;

        let results: ResultsResponse = read_json(response, &url).await?;

        let matches: Vec<LogMatch> = results
            .results
            .iter()
            .filter_map(|record| record.get("_raw").and_then(|raw| raw.as_str()))
            .take(self.config.result_cap)
            .map(parser::parse_log_line)
            .collect();

        debug!(records = results.results.len(), matches = matches.len(), "results parsed");
        Ok(matches)
    }

    /// Ask the backend to cancel a job. Best effort, used when polling gives up.
    pub async fn cancel(&self, job: &SearchJob) -> Result<()> {
        let url = self.job_url(job, Some("control"))?;
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .form(&[("action", "cancel"), ("output_mode", "json")])
            .send()
            .await
            .map_err(|e| IncidentQaError::Network(format!("{url}: {e}")))?;

        ensure_success(response.status(), &url)
    }

    /// Readiness probe against the server info endpoint.
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}{SERVER_INFO_PATH}", self.base_url);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .query(&[("output_mode", "json")])
            .send()
            .await
            .map_err(|e| IncidentQaError::Network(format!("{url}: {e}")))?;

        ensure_success(response.status(), &url)
    }

    /// URL of a job resource. The sid is percent-encoded as a single path segment.
    fn job_url(&self, job: &SearchJob, resource: Option<&str>) -> Result<String> {
        let mut url = Url::parse(&format!("{}{JOBS_PATH}", self.base_url))
            .map_err(|e| IncidentQaError::config(format!("splunk.base_url is invalid: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| IncidentQaError::config("splunk.base_url cannot carry a path"))?;
            segments.push(&job.id.0);
            if let Some(resource) = resource {
                segments.push(resource);
            }
        }
        Ok(url.into())
    }

    /// Web UI link to the job's results, when a web URL is configured.
    pub fn search_link(&self, job: &SearchJob) -> Option<String> {
        let web = self.config.web_url.as_deref()?;
        let mut url = Url::parse(&format!(
            "{}/en-US/app/search/search",
            web.trim_end_matches('/')
        ))
        .ok()?;
        url.query_pairs_mut().append_pair("sid", &job.id.0);
        Some(url.into())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ensure_success(status: reqwest::StatusCode, url: &str) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(IncidentQaError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    url: &str,
) -> Result<T> {
    ensure_success(response.status(), url)?;
    response
        .json()
        .await
        .map_err(|e| IncidentQaError::parse(format!("{url}: invalid JSON body: {e}")))
}
