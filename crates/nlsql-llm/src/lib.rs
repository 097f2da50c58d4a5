//! nlsql-llm - model client and SQL extraction
//!
//! [`OllamaClient`] talks to a local Ollama server (`/api/chat`, `/api/tags`,
//! `/api/pull`). [`extract_sql`] turns the model reply into a statement.

mod extract;
mod mock;
mod ollama;

pub use extract::{extract_sql, is_sql_valid};
pub use mock::MockCompleter;
pub use ollama::{normalize_model_name, OllamaClient};

pub use nlsql_core::Completer;
