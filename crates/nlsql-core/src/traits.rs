//! Core traits defining the interfaces between components.
//!
//! Retrieval (embeddings + training store) and generation (chat completion)
//! are independent capabilities; the agent composes them.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatMessage, TrainingItem, TrainingKind, TrainingStats};

/// Storage for training data and its embeddings.
#[async_trait]
pub trait TrainingStore: Send + Sync {
    /// Insert or replace an item. Items without an embedding are only
    /// reachable through keyword search.
    async fn upsert(&self, item: TrainingItem, embedding: Option<Vec<f32>>) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<TrainingItem>>;

    /// List items, oldest first, optionally filtered by kind.
    async fn list(&self, kind: Option<TrainingKind>) -> Result<Vec<TrainingItem>>;

    /// Remove an item. Fails with `TrainingNotFound` when absent.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Items of `kind` most similar to `embedding`, best first.
    async fn vector_search(
        &self,
        embedding: &[f32],
        k: u32,
        kind: TrainingKind,
    ) -> Result<Vec<(String, f32)>>;

    /// Items of `kind` matching any term of `query`, best first.
    async fn keyword_search(&self, query: &str, k: u32, kind: TrainingKind)
        -> Result<Vec<(String, f32)>>;

    async fn stats(&self) -> Result<TrainingStats>;
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of training texts.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single question.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Chat completion trait.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Send the conversation and return the assistant reply.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}
