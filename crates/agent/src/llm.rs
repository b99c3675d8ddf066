//! Chat-completion client shared by every LLM-backed collaborator.
//!
//! OpenAI, Azure OpenAI and Ollama all speak the same `chat/completions`
//! dialect; they differ only in the endpoint layout and the auth header.

use std::time::Duration;

use async_trait::async_trait;
use pickwise_core::config::{LlmConfig, LlmProvider};
use pickwise_core::errors::CollaboratorError;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

const COLLABORATOR: &str = "llm";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const RETRY_BASE_DELAY_MS: u64 = 250;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionOptions {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self { temperature, max_tokens }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
    ) -> Result<String, CollaboratorError>;
}

#[derive(Clone)]
enum Credentials {
    Bearer(SecretString),
    AzureKey(SecretString),
    Anonymous,
}

impl Credentials {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Bearer(key) => {
                request.header("Authorization", format!("Bearer {}", key.expose_secret()))
            }
            Self::AzureKey(key) => request.header("api-key", key.expose_secret()),
            Self::Anonymous => request,
        }
    }
}

pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    credentials: Credentials,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| CollaboratorError::Unavailable {
                collaborator: COLLABORATOR.to_string(),
                message: format!("failed to build HTTP client: {error}"),
            })?;

        let credentials = match (config.provider, config.api_key.clone()) {
            (LlmProvider::AzureOpenAi, Some(key)) => Credentials::AzureKey(key),
            (_, Some(key)) => Credentials::Bearer(key),
            (_, None) => Credentials::Anonymous,
        };

        Ok(Self {
            client,
            endpoint: completions_endpoint(config),
            credentials,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<String, CollaboratorError> {
        let request = self.credentials.apply(self.client.post(&self.endpoint)).json(body);
        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                CollaboratorError::Timeout {
                    collaborator: COLLABORATOR.to_string(),
                    seconds: self.timeout_secs,
                }
            } else {
                CollaboratorError::Transport {
                    collaborator: COLLABORATOR.to_string(),
                    message: error.to_string(),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|error| CollaboratorError::Transport {
            collaborator: COLLABORATOR.to_string(),
            message: format!("failed to read response body: {error}"),
        })?;

        if !status.is_success() {
            return Err(status_error(status, &text));
        }
        parse_completion(&text)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
    ) -> Result<String, CollaboratorError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(content) => {
                    debug!(
                        event_name = "llm.completion_received",
                        attempt,
                        response_length = content.len(),
                        "llm completion received"
                    );
                    return Ok(content);
                }
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.retrying",
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "llm request failed; retrying"
                    );
                    sleep(Duration::from_millis(RETRY_BASE_DELAY_MS << attempt.min(6))).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn completions_endpoint(config: &LlmConfig) -> String {
    let base = config
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.trim_end_matches('/').to_string());

    match config.provider {
        LlmProvider::OpenAi => {
            format!("{}/chat/completions", base.as_deref().unwrap_or(OPENAI_BASE_URL))
        }
        LlmProvider::AzureOpenAi => format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            base.unwrap_or_default(),
            config.model,
            config.api_version.as_deref().unwrap_or_default()
        ),
        LlmProvider::Ollama => {
            let base = base.unwrap_or_default();
            if base.ends_with("/v1") {
                format!("{base}/chat/completions")
            } else {
                format!("{base}/v1/chat/completions")
            }
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> CollaboratorError {
    let message = format!("status {status}: {}", truncate(body, 200));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        CollaboratorError::Transport { collaborator: COLLABORATOR.to_string(), message }
    } else {
        CollaboratorError::Unavailable { collaborator: COLLABORATOR.to_string(), message }
    }
}

fn parse_completion(body: &str) -> Result<String, CollaboratorError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|error| CollaboratorError::InvalidResponse {
            collaborator: COLLABORATOR.to_string(),
            message: format!("malformed completion payload: {error}"),
        })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CollaboratorError::InvalidResponse {
            collaborator: COLLABORATOR.to_string(),
            message: "completion carried no message content".to_string(),
        })
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
