//! Error types for nlsql.

use thiserror::Error;

/// Result type alias using NlSqlError.
pub type Result<T> = std::result::Result<T, NlSqlError>;

/// Errors that can occur in nlsql.
#[derive(Error, Debug)]
pub enum NlSqlError {
    /// A statement of the bootstrap script failed.
    #[error("Script execution failed: {message}")]
    ScriptExecution { message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Embedding model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Language model / model server error.
    #[error("LLM error: {message}")]
    Llm { message: String },

    /// The model reply did not contain anything usable as SQL.
    #[error("No SQL found in model response: {response}")]
    SqlExtraction { response: String },

    /// Generated SQL is not a query that may be run.
    #[error("Refusing to run non-query SQL: {sql}")]
    InvalidSql { sql: String },

    /// Training item not found.
    #[error("Training data not found: {id}")]
    TrainingNotFound { id: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl NlSqlError {
    /// Create a script execution error.
    pub fn script(message: impl Into<String>) -> Self {
        Self::ScriptExecution {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a model server error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable error code, used in CLI and web output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ScriptExecution { .. } => "SCRIPT_EXECUTION_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Llm { .. } => "LLM_ERROR",
            Self::SqlExtraction { .. } => "SQL_EXTRACTION_ERROR",
            Self::InvalidSql { .. } => "INVALID_SQL",
            Self::TrainingNotFound { .. } => "TRAINING_NOT_FOUND",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NlSqlError::TrainingNotFound {
            id: "abc123-ddl".to_string(),
        };
        assert!(err.to_string().contains("abc123-ddl"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(NlSqlError::script("near \"BOGUS\"").error_code(), "SCRIPT_EXECUTION_ERROR");
        assert_eq!(NlSqlError::database("test").error_code(), "DATABASE_ERROR");
        assert_eq!(NlSqlError::llm("connection refused").error_code(), "LLM_ERROR");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "escola.sql");
        let err: NlSqlError = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
