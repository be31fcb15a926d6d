//! Keyword extraction: free-text question → [`ExtractedIntent`].
//!
//! The completion output is treated as untrusted. The JSON object is located
//! (code fences and surrounding prose are tolerated), validated against the
//! four-field schema, and anything else is a parse error.

use serde::Deserialize;
use tracing::{debug, instrument};

use incidentqa_completion::{ChatMessage, CompletionClient};
use incidentqa_shared::{ExtractedIntent, IncidentQaError, Result};

/// System message for the extraction call.
const SYSTEM_PROMPT: &str = "You are a helpful assistant that extracts structured \
incident signals from questions. Reply with a single JSON object and nothing else.";

/// Raw completion payload. Absent or `null` fields mean "none found".
#[derive(Debug, Deserialize)]
struct RawIntent {
    #[serde(default)]
    services: Option<Vec<String>>,
    #[serde(default)]
    errors: Option<Vec<String>>,
    #[serde(default)]
    correlation_ids: Option<Vec<String>>,
    /// Singular spelling some replies use, alone or next to the plural key.
    #[serde(default)]
    correlation_id: Option<Vec<String>>,
    #[serde(default)]
    endpoints: Option<Vec<String>>,
}

impl From<RawIntent> for ExtractedIntent {
    fn from(raw: RawIntent) -> Self {
        Self {
            services: clean_terms(raw.services),
            errors: clean_terms(raw.errors),
            correlation_ids: clean_terms(
                raw.correlation_ids
                    .into_iter()
                    .chain(raw.correlation_id)
                    .reduce(|mut ids, more| {
                        ids.extend(more);
                        ids
                    }),
            ),
            endpoints: clean_terms(raw.endpoints),
        }
    }
}

fn clean_terms(terms: Option<Vec<String>>) -> Vec<String> {
    terms
        .unwrap_or_default()
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Build the user prompt for one question.
pub(crate) fn extraction_prompt(question: &str) -> String {
    format!(
        r#"Extract the following structured information from the user's query:

- service names (like checkout-service, mandate, parser)
- error types or exceptions (like NullPointerException or HTTP errors only)
- correlation ids, which always contain the string 'err'
- relevant API endpoints or identifiers

Return your answer as JSON in exactly this format, using empty lists when nothing is found:
{{
  "services": [...],
  "errors": [...],
  "correlation_ids": [...],
  "endpoints": [...]
}}

User query: "{question}""#
    )
}

/// Parse and validate a completion payload into an intent.
///
/// Decoding starts at the first `{` and stops after the first complete
/// value, so anything the model writes after the object is ignored.
pub fn parse_intent(raw: &str) -> Result<ExtractedIntent> {
    let Some(start) = raw.find('{') else {
        return Err(IncidentQaError::parse(
            "extraction output contains no JSON object",
        ));
    };

    let parsed: RawIntent = serde_json::Deserializer::from_str(&raw[start..])
        .into_iter::<RawIntent>()
        .next()
        .ok_or_else(|| IncidentQaError::parse("extraction output contains no JSON object"))?
        .map_err(|e| IncidentQaError::parse(format!("extraction output does not match schema: {e}")))?;

    Ok(parsed.into())
}

/// Turns questions into intents through one completion call each.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    completion: CompletionClient,
}

impl KeywordExtractor {
    pub fn new(completion: CompletionClient) -> Self {
        Self { completion }
    }

    /// Extract the intent of `question`. Call and parse failures are returned as-is.
    #[instrument(skip_all)]
    pub async fn extract(&self, question: &str) -> Result<ExtractedIntent> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(extraction_prompt(question)),
        ];
        let completion = self.completion.complete(&messages).await?;
        let intent = parse_intent(&completion.text)?;

        debug!(
            services = intent.services.len(),
            errors = intent.errors.len(),
            correlation_ids = intent.correlation_ids.len(),
            endpoints = intent.endpoints.len(),
            "intent extracted"
        );
        Ok(intent)
    }
}
