//! Chat-completions client for OpenAI-compatible endpoints (OpenRouter by
//! default).
//!
//! [`CompletionModel`] is the seam the extractor talks to; tests swap in a
//! stub.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use grantscout_shared::{GrantScoutError, LlmConfig, Result};

/// Per-request timeout for LLM calls.
pub const LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// One structured-output request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// JSON schema the reply must follow.
    pub schema: Value,
    pub schema_name: String,
    pub temperature: f32,
}

/// Something that turns a prompt into raw JSON text.
pub trait CompletionModel: Send + Sync {
    /// Model identifier recorded in export metadata.
    fn model_id(&self) -> &str;

    /// Return the message content of the first choice.
    fn complete(&self, request: &CompletionRequest) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    response_format: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenRouterModel
// ---------------------------------------------------------------------------

/// A hosted model behind `{base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenRouterModel {
    http: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenRouterModel {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(LLM_TIMEOUT)
            .user_agent(concat!("GrantScout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GrantScoutError::Network(format!("failed to build LLM client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    /// Build from `[llm]` config and the resolved API key.
    pub fn from_config(config: &LlmConfig, api_key: &str) -> Result<Self> {
        Self::new(api_key, &config.base_url, &config.model)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| GrantScoutError::config("LLM API key contains invalid header characters"))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("X-Title", HeaderValue::from_static("GrantScout"));
        Ok(headers)
    }
}

impl CompletionModel for OpenRouterModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "strict": true,
                    "schema": request.schema,
                }
            }),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| GrantScoutError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %detail, "completion request rejected");
            return Err(GrantScoutError::Http {
                url: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GrantScoutError::parse(format!("completion body: {e}")))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GrantScoutError::parse("completion has no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "extract grants".into(),
            user: "page text".into(),
            schema: json!({ "type": "object" }),
            schema_name: "grant_extraction".into(),
            temperature: 0.1,
        }
    }

    #[tokio::test]
    async fn sends_structured_request_and_reads_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "openai/gpt-4o-mini",
                "response_format": { "type": "json_schema", "json_schema": { "strict": true } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"grants\": []}" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let model = OpenRouterModel::new(
            "sk-test",
            &format!("{}/api/v1/", server.uri()),
            "openai/gpt-4o-mini",
        )
        .unwrap();
        let content = model.complete(&request()).await.unwrap();
        assert_eq!(content, "{\"grants\": []}");
    }

    #[tokio::test]
    async fn status_errors_keep_the_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let model = OpenRouterModel::new("k", &server.uri(), "m").unwrap();
        let err = model.complete(&request()).await.unwrap_err();
        assert!(matches!(err, GrantScoutError::Http { status: 429, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn empty_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let model = OpenRouterModel::new("k", &server.uri(), "m").unwrap();
        let err = model.complete(&request()).await.unwrap_err();
        assert!(matches!(err, GrantScoutError::Parse { .. }));
    }
}
