//! Chat-completion backend for the batch classifier.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::client::{HttpClient, RetryMode};
use crate::config::{ClassifierConfig, HttpConfig, api};
use crate::error::{ClientError, ClientResult, ConfigError, RelevanceError};

/// Sampling temperature for classification requests.
pub const TEMPERATURE: f64 = 0.2;

/// One classification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// System instructions.
    pub system: String,
    /// User message holding the abstracts.
    pub user: String,
    /// Completion token budget.
    pub max_tokens: u32,
}

/// Something that answers a chat request with the assistant's text.
///
/// Rate-limit and payload-size signals must surface as
/// [`ClientError::RateLimited`] and [`ClientError::PayloadTooLarge`].
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync + std::fmt::Debug {
    /// Send `request` and return the message content.
    async fn complete(&self, request: &ChatRequest) -> ClientResult<String>;
}

/// Backend for an OpenAI-compatible `/chat/completions` endpoint (Groq by default).
#[derive(Debug)]
pub struct ChatClient {
    client: HttpClient,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    /// Create a client for `config.model`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] without an API key, or a
    /// client error if the HTTP client cannot be created.
    pub fn new(
        config: &ClassifierConfig,
        http: &HttpConfig,
        api_key: Option<&str>,
    ) -> Result<Self, RelevanceError> {
        let key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredential { env_var: api::GROQ_API_KEY_ENV })?;
        let client = HttpClient::new(http, RetryMode::Never, Some(key))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Model id sent with every request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl ChatBackend for ChatClient {
    async fn complete(&self, request: &ChatRequest) -> ClientResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": TEMPERATURE,
            "max_tokens": request.max_tokens,
            "response_format": { "type": "json_object" },
        });

        debug!(model = %self.model, max_tokens = request.max_tokens, "Chat completion request");
        let response: ChatResponse = self.client.post_json(&url, &body).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ClientError::shape("response missing message content"))
    }
}
