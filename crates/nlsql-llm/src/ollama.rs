//! Chat completion through the Ollama HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use nlsql_core::{ChatMessage, Completer, LlmConfig, NlSqlError, Result};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a str>,
}

#[derive(Serialize)]
struct ChatOptions {
    num_ctx: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

/// Client for a local Ollama server.
pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
    model: String,
    num_ctx: u32,
    temperature: Option<f32>,
    keep_alive: Option<String>,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NlSqlError::llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: normalize_model_name(&config.model),
            num_ctx: config.num_ctx,
            temperature: config.temperature,
            keep_alive: config.keep_alive.clone(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Names of the models available on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .send()
            .await
            .map_err(|e| NlSqlError::llm(format!("Failed to reach {}: {}", self.host, e)))?;

        let tags: TagsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| NlSqlError::llm(format!("Failed to parse model list: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Download the configured model.
    pub async fn pull_model(&self) -> Result<()> {
        info!("Pulling model {}", self.model);

        let response = self
            .client
            .post(format!("{}/api/pull", self.host))
            .json(&PullRequest {
                name: &self.model,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| NlSqlError::llm(format!("Failed to reach {}: {}", self.host, e)))?;

        check_status(response).await?;
        Ok(())
    }

    /// Pull the configured model unless the server already has it.
    /// Returns whether a pull happened.
    pub async fn ensure_model(&self) -> Result<bool> {
        let models = self.list_models().await?;
        if models.iter().any(|m| *m == self.model) {
            debug!("Model {} already present", self.model);
            return Ok(false);
        }

        self.pull_model().await?;
        Ok(true)
    }
}

#[async_trait]
impl Completer for OllamaClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!("Sending {} messages to {}", messages.len(), self.model);

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                num_ctx: self.num_ctx,
                temperature: self.temperature,
            },
            keep_alive: self.keep_alive.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await
            .map_err(|e| NlSqlError::llm(format!("Failed to reach {}: {}", self.host, e)))?;

        let chat: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| NlSqlError::llm(format!("Failed to parse chat response: {}", e)))?;

        debug!("Model replied with {} chars", chat.message.content.len());
        Ok(chat.message.content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(NlSqlError::llm(format!("Ollama returned {}: {}", status, body)))
}

/// Append the `:latest` tag when the name has none.
pub fn normalize_model_name(model: &str) -> String {
    if model.contains(':') {
        model.to_string()
    } else {
        format!("{}:latest", model)
    }
}
