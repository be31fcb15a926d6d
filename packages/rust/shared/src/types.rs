//! Core domain types for the question-to-answer pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IncidentQaError, Result};

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one question for tracing (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub Uuid);

impl QueryId {
    /// Generate a new time-sortable query identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raw user question. Immutable for the duration of one pipeline run.
#[derive(Debug, Clone)]
pub struct Query {
    pub id: QueryId,
    pub text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: QueryId::new(),
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExtractedIntent
// ---------------------------------------------------------------------------

/// Structured signal parsed from a question.
///
/// Each sequence keeps the extractor's order; duplicates are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedIntent {
    pub services: Vec<String>,
    pub errors: Vec<String>,
    pub correlation_ids: Vec<String>,
    pub endpoints: Vec<String>,
}

impl ExtractedIntent {
    /// True when no field carries any term.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
            && self.errors.is_empty()
            && self.correlation_ids.is_empty()
            && self.endpoints.is_empty()
    }

    /// All terms in search order: services, errors, correlation ids, endpoints.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .chain(&self.errors)
            .chain(&self.correlation_ids)
            .chain(&self.endpoints)
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// SearchJob
// ---------------------------------------------------------------------------

/// Opaque backend-assigned search job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a submitted search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// A submitted, possibly still running, log search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchJob {
    pub id: JobId,
    pub submitted_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Status polls issued so far.
    pub polls: u32,
    /// Why the job failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl SearchJob {
    /// A freshly submitted job, in the `Running` state.
    pub fn submitted(id: impl Into<String>) -> Self {
        Self {
            id: JobId(id.into()),
            submitted_at: Utc::now(),
            status: JobStatus::Running,
            polls: 0,
            failure: None,
        }
    }

    /// `Running → Done`.
    pub fn mark_done(&mut self) -> Result<()> {
        self.transition(JobStatus::Done)
    }

    /// `Running → Failed`, recording the reason.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(IncidentQaError::validation(format!(
                "search job {} is already {:?}, cannot move to {next:?}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LogMatch / DocSnippet
// ---------------------------------------------------------------------------

/// One parsed log record. Absent fields mean the record lacked the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMatch {
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Condensed documentation content relevant to one lookup keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocSnippet {
    /// Keyword whose query produced this snippet.
    pub keyword: String,
    pub title: String,
    /// Markup-stripped, length-bounded page text.
    pub body_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl DocSnippet {
    /// The `title: body` line embedded in synthesis prompts.
    pub fn context_line(&self) -> String {
        format!("{}: {}", self.title, self.body_text)
    }
}

// ---------------------------------------------------------------------------
// Answer
// ---------------------------------------------------------------------------

/// Which of the possible pipeline outcomes an [`Answer`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// The question carried no usable signal; the user is asked for more.
    Clarification,
    /// A grounded answer was produced.
    Synthesized,
    /// The completion service reported the context does not support an answer.
    NoRelevantInformation,
    /// A fatal error occurred; the text is a uniform failure message.
    Failure,
}

/// A cited source attached to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub label: String,
    pub url: String,
}

/// Final response to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub kind: AnswerKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceLink>,
}

impl Answer {
    /// An answer without cited sources.
    pub fn plain(kind: AnswerKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_intent_detection() {
        assert!(ExtractedIntent::default().is_empty());

        let intent = ExtractedIntent {
            endpoints: vec!["/v1/payments".into()],
            ..Default::default()
        };
        assert!(!intent.is_empty());
    }

    #[test]
    fn intent_terms_follow_field_order() {
        let intent = ExtractedIntent {
            services: vec!["checkout".into()],
            errors: vec!["NullPointerException".into()],
            correlation_ids: vec!["err001".into()],
            endpoints: vec!["/pay".into()],
        };
        let terms: Vec<&str> = intent.terms().collect();
        assert_eq!(terms, ["checkout", "NullPointerException", "err001", "/pay"]);
    }

    #[test]
    fn job_reaches_a_terminal_state_once() {
        let mut job = SearchJob::submitted("1700000000.42");
        assert_eq!(job.status, JobStatus::Running);

        job.mark_done().expect("running -> done");
        assert_eq!(job.status, JobStatus::Done);

        assert!(job.mark_failed("late failure").is_err());
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.failure.is_none());
    }

    #[test]
    fn failed_job_records_reason() {
        let mut job = SearchJob::submitted("sid-7");
        job.mark_failed("poll limit reached").expect("running -> failed");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure.as_deref(), Some("poll limit reached"));
        assert!(job.mark_done().is_err());
    }

    #[test]
    fn snippet_context_line() {
        let snippet = DocSnippet {
            keyword: "parser".into(),
            title: "Parser runbook".into(),
            body_text: "Restart the parser pod.".into(),
            source_url: None,
        };
        assert_eq!(snippet.context_line(), "Parser runbook: Restart the parser pod.");
    }

    #[test]
    fn answer_serialization_skips_empty_sources() {
        let answer = Answer::plain(AnswerKind::Clarification, "Which service?");
        let json = serde_json::to_string(&answer).expect("serialize");
        assert_eq!(json, r#"{"kind":"clarification","text":"Which service?"}"#);
    }
}
