//! ONNX sentence-transformer embedder.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use nlsql_core::{Embedder, NlSqlError, Result};

/// all-MiniLM-L6-v2 configuration.
pub const EMBEDDING_DIM: usize = 384;
pub const MAX_TOKENS: usize = 256;

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Embedder running an all-MiniLM-L6-v2 style model through ONNX Runtime.
///
/// The model directory holds `model.onnx` and `tokenizer.json`. Documents and
/// queries are embedded the same way (symmetric retrieval).
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    max_tokens: usize,
}

impl OnnxEmbedder {
    /// Load the model and tokenizer from `model_dir`.
    pub fn from_dir(model_dir: impl AsRef<Path>, num_threads: usize) -> Result<Self> {
        let dir = model_dir.as_ref();
        Self::new(dir.join(MODEL_FILE), dir.join(TOKENIZER_FILE), num_threads)
    }

    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        num_threads: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        if !model_path.is_file() {
            return Err(NlSqlError::embedding(format!(
                "Model not found: {}",
                model_path.display()
            )));
        }

        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| NlSqlError::embedding(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| NlSqlError::embedding(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(num_threads.max(1))
            .map_err(|e| NlSqlError::embedding(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| NlSqlError::embedding(format!("Failed to load model: {}", e)))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| NlSqlError::embedding(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            "Embedder initialized: dim={}, max_tokens={}",
            EMBEDDING_DIM, MAX_TOKENS
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: EMBEDDING_DIM,
            max_tokens: MAX_TOKENS,
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| NlSqlError::embedding(format!("Tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens);
        let batch_size = encodings.len();

        debug!("Embedding batch: size={}, max_len={}", batch_size, max_len);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            let offset = i * max_len;

            for j in 0..ids.len().min(max_len) {
                input_ids[offset + j] = ids[j] as i64;
                attention_mask[offset + j] = mask[j] as i64;
                token_type_ids[offset + j] = types[j] as i64;
            }
        }

        let shape = vec![batch_size, max_len];
        let input_ids = Tensor::from_array((shape.clone(), input_ids))
            .map_err(|e| NlSqlError::embedding(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask = Tensor::from_array((shape.clone(), attention_mask))
            .map_err(|e| NlSqlError::embedding(format!("Failed to create mask tensor: {}", e)))?;
        let token_type_ids = Tensor::from_array((shape, token_type_ids))
            .map_err(|e| NlSqlError::embedding(format!("Failed to create type tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| NlSqlError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids
            ])
            .map_err(|e| NlSqlError::embedding(format!("Inference failed: {}", e)))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| NlSqlError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| NlSqlError::embedding(format!("Failed to extract tensor: {}", e)))?;

        match view.ndim() {
            // last_hidden_state: (batch, seq, hidden)
            3 => Ok(mean_pool(&view, &encodings, max_len)),
            // sentence_embedding: (batch, hidden)
            2 => {
                let hidden = view.shape()[1];
                Ok((0..batch_size)
                    .map(|i| l2_normalize((0..hidden).map(|j| view[[i, j]]).collect()))
                    .collect())
            }
            _ => Err(NlSqlError::embedding(format!(
                "Unexpected output shape: {:?}",
                view.shape()
            ))),
        }
    }
}

/// Mean of the token vectors under the attention mask, L2-normalized.
fn mean_pool(tensor: &ArrayViewD<'_, f32>, encodings: &[Encoding], max_len: usize) -> Vec<Vec<f32>> {
    let seq_len = tensor.shape()[1].min(max_len);
    let hidden = tensor.shape()[2];

    encodings
        .iter()
        .enumerate()
        .map(|(i, encoding)| {
            let mask = encoding.get_attention_mask();
            let mut sum = vec![0.0f32; hidden];
            let mut count = 0usize;

            for (j, &m) in mask.iter().take(seq_len).enumerate() {
                if m == 1 {
                    count += 1;
                    for (k, s) in sum.iter_mut().enumerate() {
                        *s += tensor[[i, j, k]];
                    }
                }
            }

            if count == 0 {
                return sum;
            }
            l2_normalize(sum.into_iter().map(|s| s / count as f32).collect())
        })
        .collect()
}

pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| NlSqlError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic embedder for tests; needs no model files.
///
/// Vectors are bags of hashed lowercase words, so texts sharing words are
/// closer than texts that do not.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let slot = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimension;
            v[slot] += 1.0;
        }
        l2_normalize(v)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_one(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new();
        assert_eq!(embedder.dimension(), 384);

        let embeddings = embedder
            .embed_documents(&["professor Ronaldo", "turma 101"])
            .await
            .unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 384);

        let norm: f32 = embeddings[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new();
        let e1 = embedder.embed_query("Quais turmas?").await.unwrap();
        let e2 = embedder.embed_query("quais TURMAS").await.unwrap();
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_embedder_shared_words_are_closer() {
        let embedder = MockEmbedder::with_dimension(1024);
        let q = embedder.embed_query("turmas do professor Ronaldo").await.unwrap();
        let near = embedder.embed_query("professor Ronaldo ministra turmas").await.unwrap();
        let far = embedder.embed_query("alunos matriculados").await.unwrap();
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[tokio::test]
    async fn test_mock_embedder_empty_text() {
        let embedder = MockEmbedder::with_dimension(8);
        let e = embedder.embed_query("  ").await.unwrap();
        assert_eq!(e, vec![0.0; 8]);
    }

    #[test]
    fn test_missing_model_is_embedding_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxEmbedder::from_dir(dir.path(), 1).err().unwrap();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
    }

    #[test]
    fn test_l2_normalize() {
        assert_eq!(l2_normalize(vec![3.0, 4.0]), vec![0.6, 0.8]);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
