//! Chat-completion client for OpenAI-compatible APIs.
//!
//! Sends a role-tagged message sequence plus a model identifier to
//! `<base_url>/chat/completions` and returns the generated text. Every
//! failure (transport, non-success status, missing content) surfaces as
//! [`IncidentQaError::Completion`]; callers decide whether it is fatal.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use incidentqa_shared::{IncidentQaError, OpenAiConfig, Result, Secret};

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("incidentqa/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body echoed into error messages.
const ERROR_BODY_PREVIEW: usize = 200;

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Generated text plus accounting for one completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the completion service. Cheap to share across tasks.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: Client,
    endpoint: String,
    api_key: Secret,
    model: String,
    temperature: f32,
}

impl CompletionClient {
    /// Build a client from the `[openai]` config section and a resolved key.
    pub fn new(config: &OpenAiConfig, api_key: Secret) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                IncidentQaError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `messages` and return the first choice's text.
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let started = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IncidentQaError::Completion(format!("request timed out: {e}"))
                } else {
                    IncidentQaError::Completion(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IncidentQaError::Completion(format!(
                "HTTP {status}: {}",
                &text[..floor_char_boundary(&text, ERROR_BODY_PREVIEW)]
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            IncidentQaError::Completion(format!("invalid completion response: {e}"))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| IncidentQaError::Completion("empty completion response".into()))?;

        let (tokens_in, tokens_out) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        debug!(tokens_in, tokens_out, latency_ms, "completion received");

        Ok(Completion {
            text,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            tokens_in,
            tokens_out,
            latency_ms,
        })
    }
}

/// Largest index `<= max` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CompletionClient {
        let config = OpenAiConfig {
            base_url: format!("{}/v1", server.uri()),
            ..Default::default()
        };
        CompletionClient::new(&config, Secret::new("sk-test")).expect("build client")
    }

    #[test]
    fn request_serializes_roles() {
        let messages = [ChatMessage::system("sys"), ChatMessage::user("hi")];
        let body = ChatRequest {
            model: "gpt-test",
            messages: &messages,
            temperature: 0.0,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains(r#""role":"system""#));
        assert!(json.contains(r#""role":"user""#));
        assert!(json.contains(r#""model":"gpt-test""#));
    }

    #[test]
    fn boundary_helper_respects_multibyte_chars() {
        let s = "ééé";
        assert_eq!(floor_char_boundary(s, 3), 2);
        assert_eq!(floor_char_boundary(s, 100), s.len());
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-3.5-turbo"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-3.5-turbo-0125",
                "choices": [{"message": {"role": "assistant", "content": "Restart the pod."}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = client_for(&server)
            .complete(&[ChatMessage::user("How do I fix it?")])
            .await
            .unwrap();

        assert_eq!(completion.text, "Restart the pod.");
        assert_eq!(completion.model, "gpt-3.5-turbo-0125");
        assert_eq!(completion.tokens_in, 12);
        assert_eq!(completion.tokens_out, 4);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&[ChatMessage::user("q")])
            .await
            .unwrap_err();

        assert!(matches!(err, IncidentQaError::Completion(_)));
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&[ChatMessage::user("q")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty completion response"));
    }

    #[tokio::test]
    async fn unreachable_service_is_an_error() {
        let config = OpenAiConfig {
            base_url: "http://127.0.0.1:9/v1".into(),
            timeout_secs: 2,
            ..Default::default()
        };
        let client = CompletionClient::new(&config, Secret::new("k")).unwrap();
        let err = client.complete(&[ChatMessage::user("q")]).await.unwrap_err();
        assert!(matches!(err, IncidentQaError::Completion(_)));
    }
}
