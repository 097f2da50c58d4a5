//! Embeddings served by an Ollama instance.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nlsql_core::{Embedder, NlSqlError, Result};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedder calling `POST {host}/api/embeddings`, one text per request.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    host: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    /// `dimension` is the size the model produces; responses of any other
    /// size are rejected.
    pub fn new(host: &str, model: &str, dimension: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NlSqlError::embedding(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        })
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.host))
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| NlSqlError::embedding(format!("Embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NlSqlError::embedding(format!(
                "Embedding API error ({}): {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| NlSqlError::embedding(format!("Failed to parse embedding response: {}", e)))?;

        if parsed.embedding.len() != self.dimension {
            return Err(NlSqlError::embedding(format!(
                "Model {} returned {} dimensions, expected {}",
                self.model,
                parsed.embedding.len(),
                self.dimension
            )));
        }

        Ok(parsed.embedding)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        debug!("Embedding {} documents with {}", texts.len(), self.model);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
