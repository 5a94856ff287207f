use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletionBackend, CompletionRequest};
use crate::error::GeneratorError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SYLLABUS_MODEL: &str = "gpt-4o";
pub const DEFAULT_CONTENT_MODEL: &str = "gpt-4o-mini";

/// Where completions come from and which models to ask.
#[derive(Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub syllabus_model: String,
    pub content_model: String,
    pub timeout: Option<Duration>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            syllabus_model: DEFAULT_SYLLABUS_MODEL.into(),
            content_model: DEFAULT_CONTENT_MODEL.into(),
            timeout: None,
        }
    }
}

impl GeneratorConfig {
    /// Reads `CAMPUS_OPENAI_API_KEY`, `CAMPUS_AI_BASE_URL`,
    /// `CAMPUS_SYLLABUS_MODEL` and `CAMPUS_CONTENT_MODEL`.
    ///
    /// A missing key is not an error here; generation fails with
    /// `GeneratorError::MissingApiKey` when it is attempted.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_key = env::var("CAMPUS_OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self {
            base_url: env::var("CAMPUS_AI_BASE_URL").unwrap_or(defaults.base_url),
            api_key,
            syllabus_model: env::var("CAMPUS_SYLLABUS_MODEL").unwrap_or(defaults.syllabus_model),
            content_model: env::var("CAMPUS_CONTENT_MODEL").unwrap_or(defaults.content_model),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .field("syllabus_model", &self.syllabus_model)
            .field("content_model", &self.content_model)
            .finish_non_exhaustive()
    }
}

/// Chat-completions client.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    #[must_use]
    pub fn new(config: &GeneratorConfig) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            client: builder.build().unwrap_or_default(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GeneratorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GeneratorError::MissingApiKey)?;

        let payload = ChatRequest {
            model: &request.model,
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
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(model = %request.model, max_tokens = request.max_tokens, "requesting completion");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&body)
                    .unwrap_or_else(|| format!("request failed with status {status}")),
            });
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GeneratorError::EmptyResponse)?;

        Ok(content.trim().to_string())
    }
}

/// `error.message` of an OpenAI-style error body.
fn upstream_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error.message)
        .filter(|m| !m.trim().is_empty())
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}
