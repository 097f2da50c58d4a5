//! Training store schema.

/// Schema SQL for the training database.
pub const SCHEMA: &str = r#"
-- Training items: DDL, documentation and question/SQL pairs
CREATE TABLE IF NOT EXISTS training_data (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    question TEXT,
    content TEXT NOT NULL,
    search_text TEXT NOT NULL,
    embedding BLOB,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_training_data_kind ON training_data(kind);

-- FTS5 virtual table for keyword retrieval
CREATE VIRTUAL TABLE IF NOT EXISTS training_fts USING fts5(
    search_text,
    content=training_data,
    content_rowid=rowid
);

CREATE TRIGGER IF NOT EXISTS training_ai AFTER INSERT ON training_data BEGIN
    INSERT INTO training_fts(rowid, search_text) VALUES (NEW.rowid, NEW.search_text);
END;

CREATE TRIGGER IF NOT EXISTS training_ad AFTER DELETE ON training_data BEGIN
    INSERT INTO training_fts(training_fts, rowid, search_text) VALUES ('delete', OLD.rowid, OLD.search_text);
END;

CREATE TRIGGER IF NOT EXISTS training_au AFTER UPDATE ON training_data BEGIN
    INSERT INTO training_fts(training_fts, rowid, search_text) VALUES ('delete', OLD.rowid, OLD.search_text);
    INSERT INTO training_fts(rowid, search_text) VALUES (NEW.rowid, NEW.search_text);
END;
"#;

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
