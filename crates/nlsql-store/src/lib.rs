//! nlsql-store - SQLite storage for nlsql
//!
//! This crate owns everything that touches SQLite files:
//!
//! - [`ensure_database`]: create the queried database from its script, once
//! - [`extract_ddl_only`]: isolate the `CREATE TABLE` blocks of that script
//! - [`SqliteDatabase`]: run generated SQL and collect rows
//! - [`SqliteTrainingStore`]: training data with embeddings and an FTS5 index

mod bootstrap;
mod database;
mod ddl;
mod schema;
mod sqlite;

pub use bootstrap::{ensure_database, list_tables, load_script, BootstrapStatus};
pub use database::SqliteDatabase;
pub use ddl::extract_ddl_only;
pub use sqlite::SqliteTrainingStore;

// Re-export schema for testing/migrations
pub use schema::SCHEMA;
