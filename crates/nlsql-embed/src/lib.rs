//! nlsql-embed - text embeddings for training-data retrieval
//!
//! Backends:
//!
//! - [`OnnxEmbedder`]: all-MiniLM-L6-v2 through ONNX Runtime, mean pooled and
//!   L2-normalized (384 dimensions)
//! - [`OllamaEmbedder`]: the `/api/embeddings` endpoint of an Ollama server
//! - [`MockEmbedder`]: deterministic vectors for tests
//!
//! [`EmbedderBackend`] picks one from configuration.

mod backend;
mod ollama;
mod onnx;

pub use backend::{EmbedderBackend, OLLAMA_EMBEDDING_DIM};
pub use ollama::OllamaEmbedder;
pub use onnx::{MockEmbedder, OnnxEmbedder, EMBEDDING_DIM, MAX_TOKENS, MODEL_FILE, TOKENIZER_FILE};

pub use nlsql_core::Embedder;
