//! nlsql-core - Core types and traits for nlsql
//!
//! This crate provides the foundational types, traits, configuration and
//! error handling shared by the storage, embedding, model and agent crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{NlSqlError, Result};
pub use traits::*;
pub use types::*;
