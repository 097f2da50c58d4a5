//! nlsql-query - question answering over the training store
//!
//! This crate turns a natural-language question into SQL and rows:
//!
//! - hybrid retrieval of training data (vector + keyword, fused with RRF)
//! - chat prompt construction with a token budget
//! - SQL generation, execution, and a hardcoded fallback query
//!
//! # Example
//!
//! ```rust,ignore
//! use nlsql_query::{AgentConfig, SqlAgent};
//! use std::sync::Arc;
//!
//! let agent = SqlAgent::new(Arc::new(store), Some(Arc::new(embedder)), Arc::new(llm), db, AgentConfig::default());
//! let outcome = agent.ask("Quais são as turmas que o professor Ronaldo ministra?").await;
//! ```

mod agent;
mod fallback;
mod fusion;
mod prompt;

pub use agent::{AgentConfig, AskOutcome, SqlAgent, TrainingRequest};
pub use fallback::FallbackQuery;
pub use fusion::reciprocal_rank_fusion;
pub use prompt::{approx_token_count, build_question_prompt, build_sql_prompt};
