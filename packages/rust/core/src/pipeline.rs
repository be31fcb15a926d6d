//! End-to-end question pipeline: question → intent → logs → docs → answer.

use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use incidentqa_completion::CompletionClient;
use incidentqa_docs::DocRetriever;
use incidentqa_logsearch::LogSearchClient;
use incidentqa_shared::{
    AppConfig, Answer, AnswerKind, Credentials, DocSnippet, ExtractedIntent, IncidentQaError,
    LogMatch, Query, QueryId, Result, SearchJob, resolve_credentials,
};

use crate::extractor::KeywordExtractor;
use crate::synthesizer::{self, ResponseSynthesizer};

/// Reply when a question carries no usable signal.
pub const CLARIFICATION_TEXT: &str = "I couldn't find any service names, error types, \
correlation ids or endpoints in your question. Could you share more detail, such as the \
affected service or the error you are seeing?";

/// Reply when the run fails fatally.
pub const FAILURE_TEXT: &str = "Sorry, I couldn't process your question right now. \
Please try again later.";

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline produced an answer.
    fn done(&self, answer: &Answer);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _answer: &Answer) {}
}

/// Everything one run produced, for callers that want more than the answer.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub query_id: QueryId,
    pub intent: ExtractedIntent,
    /// The log search job, if one was submitted.
    pub job: Option<SearchJob>,
    pub matches: Vec<LogMatch>,
    pub snippets: Vec<DocSnippet>,
    pub answer: Answer,
    pub elapsed: Duration,
}

/// Reachability of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHealth {
    pub name: &'static str,
    pub healthy: bool,
    /// Error description when unhealthy.
    pub detail: Option<String>,
}

impl BackendHealth {
    fn from_result(name: &'static str, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                name,
                healthy: true,
                detail: None,
            },
            Err(e) => Self {
                name,
                healthy: false,
                detail: Some(e.to_string()),
            },
        }
    }
}

/// The question-answering pipeline.
///
/// Holds only read-only clients, so one instance can serve concurrent
/// questions.
#[derive(Debug, Clone)]
pub struct Pipeline {
    extractor: KeywordExtractor,
    log_search: LogSearchClient,
    docs: DocRetriever,
    synthesizer: ResponseSynthesizer,
    question_timeout: Option<Duration>,
}

impl Pipeline {
    /// Build the pipeline from configuration and resolved credentials.
    pub fn new(config: &AppConfig, credentials: &Credentials) -> Result<Self> {
        let completion = CompletionClient::new(&config.openai, credentials.openai_api_key.clone())?;
        let log_search = LogSearchClient::new(
            &config.splunk,
            credentials.splunk_username.clone(),
            credentials.splunk_password.clone(),
        )?;
        let docs = DocRetriever::new(&config.confluence, credentials.confluence_token.clone())?;

        Ok(Self {
            extractor: KeywordExtractor::new(completion.clone()),
            log_search,
            docs,
            synthesizer: ResponseSynthesizer::new(completion),
            question_timeout: config.pipeline.question_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Build the pipeline, resolving credentials from the process environment.
    pub fn from_env(config: &AppConfig) -> Result<Self> {
        let credentials = resolve_credentials(config)?;
        Self::new(config, &credentials)
    }

    /// Answer a question. Fatal errors and timeouts become the failure answer.
    pub async fn answer(&self, question: &str, progress: &dyn ProgressReporter) -> Answer {
        let answer = match self.try_answer(question, progress).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "question failed");
                Answer::plain(AnswerKind::Failure, FAILURE_TEXT)
            }
        };
        progress.done(&answer);
        answer
    }

    /// Answer a question, returning fatal errors to the caller.
    pub async fn try_answer(
        &self,
        question: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<Answer> {
        let query = Query::new(question);
        let run = self.run(&query, progress);

        let report = match self.question_timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                IncidentQaError::Timeout(format!(
                    "question not answered within {}s",
                    limit.as_secs()
                ))
            })??,
            None => run.await?,
        };
        Ok(report.answer)
    }

    /// Run every stage for `query` and report all intermediate results.
    ///
    /// 1. Extract intent (fatal on failure)
    /// 2. Search logs (recoverable)
    /// 3. Retrieve docs (recoverable)
    /// 4. Synthesize (fatal on failure)
    #[instrument(skip_all, fields(query_id = %query.id))]
    pub async fn run(&self, query: &Query, progress: &dyn ProgressReporter) -> Result<PipelineReport> {
        let start = Instant::now();
        info!("starting question pipeline");

        // --- Phase 1: Extraction ---
        progress.phase("Extracting keywords");
        let intent = self.extractor.extract(&query.text).await?;

        if intent.is_empty() {
            info!("no usable signal in question, asking for clarification");
            return Ok(PipelineReport {
                query_id: query.id.clone(),
                intent,
                job: None,
                matches: Vec::new(),
                snippets: Vec::new(),
                answer: Answer::plain(AnswerKind::Clarification, CLARIFICATION_TEXT),
                elapsed: start.elapsed(),
            });
        }

        // --- Phase 2: Log search ---
        progress.phase("Searching logs");
        let outcome = self.log_search.search(&intent).await;
        let search_link = outcome
            .job
            .as_ref()
            .and_then(|job| self.log_search.search_link(job));

        // --- Phase 3: Documentation ---
        progress.phase("Retrieving documentation");
        let snippets = self.docs.retrieve(&outcome.matches).await;
        if snippets.is_empty() {
            warn!("no documentation context found");
        }

        // --- Phase 4: Synthesis ---
        progress.phase("Synthesizing answer");
        let doc_links = synthesizer::doc_links(&snippets);
        let answer = self
            .synthesizer
            .synthesize(&query.text, &snippets, search_link.as_deref(), &doc_links)
            .await?;

        let elapsed = start.elapsed();
        info!(
            matches = outcome.matches.len(),
            snippets = snippets.len(),
            kind = ?answer.kind,
            elapsed_ms = elapsed.as_millis() as u64,
            "question pipeline complete"
        );

        Ok(PipelineReport {
            query_id: query.id.clone(),
            intent,
            job: outcome.job,
            matches: outcome.matches,
            snippets,
            answer,
            elapsed,
        })
    }

    /// Probe both retrieval backends concurrently.
    #[instrument(skip_all)]
    pub async fn check_readiness(&self) -> Vec<BackendHealth> {
        let (logs, docs) = tokio::join!(self.log_search.health(), self.docs.health());
        vec![
            BackendHealth::from_result("splunk", logs),
            BackendHealth::from_result("confluence", docs),
        ]
    }
}
