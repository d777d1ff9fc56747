use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use ledgerchat_core::config::{LlmConfig, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("model endpoint is unreachable: {0}")]
    Unreachable(String),
    #[error("model request timed out")]
    Timeout,
    #[error("model endpoint rejected credentials (status {status})")]
    Unauthorized { status: u16 },
    #[error("model or endpoint not found: {0}")]
    NotFound(String),
    #[error("model endpoint returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("model response could not be decoded: {0}")]
    InvalidResponse(String),
    #[error("model client is misconfigured: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Errors that mean the endpoint cannot serve us at all, as opposed to a
    /// single bad request.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_)
                | Self::Unauthorized { .. }
                | Self::NotFound(_)
                | Self::Configuration(_)
        )
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;

    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Configuration(format!("http client: {error}")))?;

        let base_url = config
            .base_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            client,
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let Some(api_key) = &self.api_key else {
            return request;
        };
        match self.provider {
            LlmProvider::OpenAi => request.bearer_auth(api_key.expose_secret()),
            LlmProvider::Anthropic => request
                .header("x-api-key", api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
            LlmProvider::Ollama => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, LlmError> {
        let response = self.authorize(request).send().await.map_err(map_transport_error)?;
        check_status(response).await
    }

    async fn complete_ollama(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let body = OllamaChatRequest {
            model: &self.model,
            messages: chat_messages(system, prompt),
            stream: false,
            options: OllamaOptions { temperature: TEMPERATURE },
        };
        let response = self.send(self.client.post(self.url("/api/chat")).json(&body)).await?;
        let payload: OllamaChatResponse = decode(response).await?;
        Ok(payload.message.content)
    }

    async fn complete_openai(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let body = OpenAiChatRequest {
            model: &self.model,
            messages: chat_messages(system, prompt),
            temperature: TEMPERATURE,
        };
        let response =
            self.send(self.client.post(self.url("/v1/chat/completions")).json(&body)).await?;
        let payload: OpenAiChatResponse = decode(response).await?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))
    }

    async fn complete_anthropic(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let body = AnthropicRequest {
            model: &self.model,
            system,
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };
        let response = self.send(self.client.post(self.url("/v1/messages")).json(&body)).await?;
        let payload: AnthropicResponse = decode(response).await?;
        let text = payload
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("response contained no text".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        debug!(
            event_name = "agent.llm.request",
            provider = ?self.provider,
            model = %self.model,
            prompt_chars = prompt.len(),
            "sending model request"
        );
        match self.provider {
            LlmProvider::Ollama => self.complete_ollama(system, prompt).await,
            LlmProvider::OpenAi => self.complete_openai(system, prompt).await,
            LlmProvider::Anthropic => self.complete_anthropic(system, prompt).await,
        }
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let path = match self.provider {
            LlmProvider::Ollama => "/api/tags",
            LlmProvider::OpenAi | LlmProvider::Anthropic => "/v1/models",
        };
        self.send(self.client.get(self.url(path))).await.map(|_| ())
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

fn chat_messages<'a>(system: &'a str, prompt: &'a str) -> Vec<ChatMessage<'a>> {
    vec![
        ChatMessage { role: "system", content: system },
        ChatMessage { role: "user", content: prompt },
    ]
}

fn map_transport_error(error: reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout
    } else if error.is_builder() {
        LlmError::Configuration(error.to_string())
    } else if error.is_connect() || error.is_request() {
        LlmError::Unreachable(error.to_string())
    } else {
        LlmError::Api { status: 0, body: error.to_string() }
    }
}

async fn check_status(response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::Unauthorized { status: status.as_u16() }
        }
        StatusCode::NOT_FOUND => LlmError::NotFound(body),
        _ => LlmError::Api { status: status.as_u16(), body },
    })
}

async fn decode<T>(response: Response) -> Result<T, LlmError>
where
    T: for<'de> Deserialize<'de>,
{
    response.json::<T>().await.map_err(|error| LlmError::InvalidResponse(error.to_string()))
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}
