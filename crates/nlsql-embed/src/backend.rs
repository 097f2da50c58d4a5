//! Embedder selected from configuration.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use nlsql_core::{Embedder, EmbeddingBackendKind, NlSqlConfig, Result};

use crate::ollama::OllamaEmbedder;
use crate::onnx::{MockEmbedder, OnnxEmbedder, EMBEDDING_DIM};

/// Dimension assumed for Ollama embedding models (nomic-embed-text).
pub const OLLAMA_EMBEDDING_DIM: usize = 768;

/// One of the available embedders, chosen at startup.
pub enum EmbedderBackend {
    Onnx(OnnxEmbedder),
    Ollama(OllamaEmbedder),
    Mock(MockEmbedder),
}

impl EmbedderBackend {
    /// Build the embedder named by `config.embedding.backend`.
    ///
    /// Fails when the ONNX model files cannot be loaded; callers decide
    /// whether to continue with keyword-only retrieval.
    pub fn from_config(config: &NlSqlConfig) -> Result<Self> {
        let embedding = &config.embedding;
        let backend = match embedding.backend {
            EmbeddingBackendKind::Onnx => {
                Self::Onnx(OnnxEmbedder::from_dir(&embedding.model_path, embedding.num_threads)?)
            }
            EmbeddingBackendKind::Ollama => Self::Ollama(OllamaEmbedder::new(
                &config.llm.host,
                &embedding.ollama_model,
                OLLAMA_EMBEDDING_DIM,
                Duration::from_secs(config.llm.timeout_secs),
            )?),
            EmbeddingBackendKind::Mock => Self::Mock(MockEmbedder::with_dimension(EMBEDDING_DIM)),
        };

        info!("Using {} embedder", backend.name());
        Ok(backend)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Onnx(_) => "onnx",
            Self::Ollama(_) => "ollama",
            Self::Mock(_) => "mock",
        }
    }

    fn inner(&self) -> &dyn Embedder {
        match self {
            Self::Onnx(e) => e,
            Self::Ollama(e) => e,
            Self::Mock(e) => e,
        }
    }
}

#[async_trait]
impl Embedder for EmbedderBackend {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.inner().embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.inner().embed_query(text).await
    }

    fn dimension(&self) -> usize {
        self.inner().dimension()
    }
}
