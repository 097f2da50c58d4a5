//! Configuration types for nlsql.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Question used both as the seeded training example and the default CLI question.
pub const EXAMPLE_QUESTION: &str = "Quais são as turmas que o professor Ronaldo ministra?";

/// Known-good answer to [`EXAMPLE_QUESTION`].
pub const EXAMPLE_SQL: &str = "SELECT t.numero\n\
FROM turma t\n\
JOIN professor_turma pt ON pt.turma_numero = t.numero\n\
JOIN professor p ON p.id = pt.professor_id\n\
WHERE p.nome = 'Ronaldo'\n\
ORDER BY t.numero;";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NlSqlConfig {
    /// Target database and bootstrap script.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Training store configuration.
    #[serde(default)]
    pub training: TrainingConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Model server configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Prompt construction.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Supervised example added on every training run.
    #[serde(default)]
    pub seed: SeedConfig,

    /// Hardcoded query used when generation fails.
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Web form configuration.
    #[serde(default)]
    pub web: WebConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database queried by the agent.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// SQL script used to create the database when it is missing.
    #[serde(default = "default_script_path")]
    pub script: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            script: default_script_path(),
        }
    }
}

/// Training store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Path to the SQLite file holding training data and embeddings.
    #[serde(default = "default_training_path")]
    pub path: PathBuf,

    /// Items retrieved per kind when building a prompt.
    #[serde(default = "default_n_results")]
    pub n_results: u32,

    /// Fuse vector and keyword retrieval.
    #[serde(default = "default_true")]
    pub hybrid: bool,

    /// RRF constant k.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            path: default_training_path(),
            n_results: 10,
            hybrid: true,
            rrf_k: 60,
        }
    }
}

/// Which embedding implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    Onnx,
    Ollama,
    Mock,
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub backend: EmbeddingBackendKind,

    /// Directory containing `model.onnx` and `tokenizer.json`.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Embedding model served by Ollama.
    #[serde(default = "default_ollama_embedding_model")]
    pub ollama_model: String,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::Onnx,
            model_path: default_model_path(),
            ollama_model: default_ollama_embedding_model(),
            num_threads: 4,
        }
    }
}

/// Model server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the Ollama server.
    #[serde(default = "default_llm_host")]
    pub host: String,

    /// Chat model name; `:latest` is appended when no tag is given.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub temperature: Option<f32>,

    /// Context window passed as `options.num_ctx`.
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,

    /// How long the server keeps the model loaded (e.g. "5m").
    #[serde(default)]
    pub keep_alive: Option<String>,

    /// Pull the model on startup when the server does not have it.
    #[serde(default)]
    pub pull_on_start: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: default_llm_host(),
            model: default_llm_model(),
            timeout_secs: 240,
            temperature: None,
            num_ctx: 2048,
            keep_alive: None,
            pull_on_start: false,
        }
    }
}

/// Prompt configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// SQL dialect named in the system prompt.
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Approximate token budget for the system prompt (4 chars per token).
    #[serde(default = "default_prompt_max_tokens")]
    pub max_tokens: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            max_tokens: 14000,
        }
    }
}

/// Seed training example.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default = "default_example_question")]
    pub question: String,

    #[serde(default = "default_example_sql")]
    pub sql: String,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            question: default_example_question(),
            sql: default_example_sql(),
        }
    }
}

/// Fallback query configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_example_sql")]
    pub sql: String,

    /// Only questions containing this text get the fallback; `None` means all.
    #[serde(default = "default_fallback_keyword")]
    pub keyword: Option<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            sql: default_example_sql(),
            keyword: default_fallback_keyword(),
        }
    }
}

/// Web form configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("escola.db")
}

fn default_script_path() -> PathBuf {
    PathBuf::from("escola.sql")
}

fn default_training_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nlsql")
        .join("training.db")
}

fn default_n_results() -> u32 {
    10
}

fn default_rrf_k() -> u32 {
    60
}

fn default_embedding_backend() -> EmbeddingBackendKind {
    EmbeddingBackendKind::Onnx
}

fn default_model_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nlsql")
        .join("models")
        .join("all-MiniLM-L6-v2")
}

fn default_ollama_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_num_threads() -> usize {
    4
}

fn default_llm_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "mistral".to_string()
}

fn default_timeout_secs() -> u64 {
    240
}

fn default_num_ctx() -> u32 {
    2048
}

fn default_dialect() -> String {
    "SQLite".to_string()
}

fn default_prompt_max_tokens() -> usize {
    14000
}

fn default_example_question() -> String {
    EXAMPLE_QUESTION.to_string()
}

fn default_example_sql() -> String {
    EXAMPLE_SQL.to_string()
}

fn default_fallback_keyword() -> Option<String> {
    Some("Ronaldo".to_string())
}

fn default_bind_address() -> String {
    "0.0.0.0:8084".to_string()
}

impl NlSqlConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::NlSqlError::config(format!("Failed to parse config: {}", e))
        })?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("nlsql").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("nlsql.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}
