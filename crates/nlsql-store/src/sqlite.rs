//! SQLite-based training store.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use nlsql_core::{NlSqlError, Result, TrainingItem, TrainingKind, TrainingStats, TrainingStore};

use crate::schema::{SCHEMA, SCHEMA_VERSION};

/// Training data kept in its own SQLite file, apart from the queried database.
///
/// Embeddings are stored as little-endian f32 BLOBs and compared by brute-force
/// cosine similarity; keyword retrieval uses an FTS5 index maintained by triggers.
pub struct SqliteTrainingStore {
    conn: Mutex<Connection>,
}

impl SqliteTrainingStore {
    /// Open or create a training store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| NlSqlError::database(format!("Failed to open training store: {}", e)))?;

        let store = Self::init(conn)?;
        info!("Training store opened at {:?}", path);
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            NlSqlError::database(format!("Failed to open in-memory training store: {}", e))
        })?;

        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .map_err(|e| NlSqlError::database(format!("Failed to configure connection: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| NlSqlError::database(format!("Failed to initialize schema: {}", e)))?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| NlSqlError::database(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| NlSqlError::database(e.to_string()))?;
        f(&conn)
    }
}

#[async_trait]
impl TrainingStore for SqliteTrainingStore {
    async fn upsert(&self, item: TrainingItem, embedding: Option<Vec<f32>>) -> Result<()> {
        let embedding_bytes = embedding.as_deref().map(vec_to_bytes);

        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO training_data (id, kind, question, content, search_text, embedding, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    question = excluded.question,
                    content = excluded.content,
                    search_text = excluded.search_text,
                    embedding = excluded.embedding
                "#,
                params![
                    item.id,
                    item.kind.as_str(),
                    item.question,
                    item.content,
                    item.search_text(),
                    embedding_bytes,
                    item.created_at as i64,
                ],
            )
            .map_err(|e| NlSqlError::database(format!("Failed to store training data: {}", e)))?;

            debug!("Stored training item: {}", item.id);
            Ok(())
        })
    }

    async fn get(&self, id: &str) -> Result<Option<TrainingItem>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, kind, question, content, created_at FROM training_data WHERE id = ?1",
                params![id],
                row_to_item,
            )
            .optional()
            .map_err(|e| NlSqlError::database(e.to_string()))
        })
    }

    async fn list(&self, kind: Option<TrainingKind>) -> Result<Vec<TrainingItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, kind, question, content, created_at
                    FROM training_data
                    WHERE ?1 IS NULL OR kind = ?1
                    ORDER BY created_at, rowid
                    "#,
                )
                .map_err(|e| NlSqlError::database(e.to_string()))?;

            let items = stmt
                .query_map(params![kind.map(|k| k.as_str())], row_to_item)
                .map_err(|e| NlSqlError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| NlSqlError::database(e.to_string()))?;

            Ok(items)
        })
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM training_data WHERE id = ?1", params![id])
                .map_err(|e| NlSqlError::database(e.to_string()))?;

            if deleted == 0 {
                return Err(NlSqlError::TrainingNotFound { id: id.to_string() });
            }

            debug!("Removed training item: {}", id);
            Ok(())
        })
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        k: u32,
        kind: TrainingKind,
    ) -> Result<Vec<(String, f32)>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, embedding FROM training_data WHERE kind = ?1 AND embedding IS NOT NULL",
                )
                .map_err(|e| NlSqlError::database(e.to_string()))?;

            let rows = stmt
                .query_map(params![kind.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                })
                .map_err(|e| NlSqlError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| NlSqlError::database(e.to_string()))?;

            let mut scored: Vec<(String, f32)> = rows
                .into_iter()
                .filter_map(|(id, bytes)| {
                    let stored = bytes_to_vec(&bytes);
                    if stored.len() != embedding.len() {
                        debug!("Skipping {}: dimension {} != {}", id, stored.len(), embedding.len());
                        return None;
                    }
                    Some((id, cosine_similarity(embedding, &stored)))
                })
                .collect();

            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(k as usize);
            Ok(scored)
        })
    }

    async fn keyword_search(
        &self,
        query: &str,
        k: u32,
        kind: TrainingKind,
    ) -> Result<Vec<(String, f32)>> {
        let fts_query = match build_fts5_query(query) {
            Some(q) => q,
            None => return Ok(Vec::new()),
        };

        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT t.id, bm25(training_fts) AS score
                    FROM training_fts f
                    JOIN training_data t ON t.rowid = f.rowid
                    WHERE training_fts MATCH ?1
                    AND t.kind = ?2
                    ORDER BY score
                    LIMIT ?3
                    "#,
                )
                .map_err(|e| NlSqlError::database(e.to_string()))?;

            let results = stmt
                .query_map(params![fts_query, kind.as_str(), k], |row| {
                    let score: f64 = row.get(1)?;
                    Ok((row.get::<_, String>(0)?, (-score) as f32))
                })
                .map_err(|e| NlSqlError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| NlSqlError::database(e.to_string()))?;

            Ok(results)
        })
    }

    async fn stats(&self) -> Result<TrainingStats> {
        self.with_conn(|conn| {
            let mut stats = TrainingStats::default();

            let mut stmt = conn
                .prepare("SELECT kind, COUNT(*), COUNT(embedding) FROM training_data GROUP BY kind")
                .map_err(|e| NlSqlError::database(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                    ))
                })
                .map_err(|e| NlSqlError::database(e.to_string()))?;

            for row in rows {
                let (kind, count, embedded) = row.map_err(|e| NlSqlError::database(e.to_string()))?;
                match kind.parse::<TrainingKind>() {
                    Ok(TrainingKind::Ddl) => stats.ddl = count,
                    Ok(TrainingKind::Documentation) => stats.documentation = count,
                    Ok(TrainingKind::QuestionSql) => stats.question_sql = count,
                    Err(_) => continue,
                }
                stats.embedded += embedded;
            }

            Ok(stats)
        })
    }
}

/// Convert a row to a TrainingItem.
fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrainingItem> {
    let kind_str: String = row.get(1)?;
    let kind = kind_str.parse::<TrainingKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(TrainingItem {
        id: row.get(0)?,
        kind,
        question: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
    })
}

/// Convert f32 vector to bytes (little-endian).
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Build an FTS5 query matching any word of `text`. Each term is quoted so
/// punctuation and FTS5 operators in questions are taken literally.
fn build_fts5_query(text: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if word.is_empty() {
            continue;
        }
        let term = word.to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }

    if terms.is_empty() {
        return None;
    }

    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFESSOR_DDL: &str = "CREATE TABLE professor (\n    id INTEGER PRIMARY KEY,\n    nome TEXT NOT NULL\n);";
    const TURMA_DDL: &str = "CREATE TABLE turma (\n    numero INTEGER PRIMARY KEY,\n    sala TEXT\n);";

    #[tokio::test]
    async fn test_open_memory() {
        let store = SqliteTrainingStore::open_memory().unwrap();
        assert!(store.list(None).await.unwrap().is_empty());
        assert_eq!(store.stats().await.unwrap(), TrainingStats::default());
    }

    #[tokio::test]
    async fn test_open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("training.db");

        let store = SqliteTrainingStore::open(&path).unwrap();
        store.upsert(TrainingItem::ddl(PROFESSOR_DDL), None).await.unwrap();
        drop(store);

        let reopened = SqliteTrainingStore::open(&path).unwrap();
        assert_eq!(reopened.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = SqliteTrainingStore::open_memory().unwrap();

        let item = TrainingItem::ddl(PROFESSOR_DDL);
        let id = item.id.clone();
        store.upsert(item.clone(), None).await.unwrap();
        store.upsert(item, Some(vec![1.0, 0.0])).await.unwrap();

        let all = store.list(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].content, PROFESSOR_DDL);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.ddl, 1);
        assert_eq!(stats.embedded, 1);
    }

    #[tokio::test]
    async fn test_get_list_remove() {
        let store = SqliteTrainingStore::open_memory().unwrap();

        let ddl = TrainingItem::ddl(TURMA_DDL);
        let pair = TrainingItem::question_sql("Quantas turmas existem?", "SELECT COUNT(*) FROM turma;");
        let pair_id = pair.id.clone();
        store.upsert(ddl, None).await.unwrap();
        store.upsert(pair, None).await.unwrap();

        let fetched = store.get(&pair_id).await.unwrap().unwrap();
        assert_eq!(fetched.kind, TrainingKind::QuestionSql);
        assert_eq!(fetched.question.as_deref(), Some("Quantas turmas existem?"));

        assert_eq!(store.list(Some(TrainingKind::Ddl)).await.unwrap().len(), 1);
        assert_eq!(store.list(Some(TrainingKind::Documentation)).await.unwrap().len(), 0);

        store.remove(&pair_id).await.unwrap();
        assert!(store.get(&pair_id).await.unwrap().is_none());

        let err = store.remove(&pair_id).await.unwrap_err();
        assert!(matches!(err, NlSqlError::TrainingNotFound { .. }));
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_similarity() {
        let store = SqliteTrainingStore::open_memory().unwrap();

        let near = TrainingItem::ddl(PROFESSOR_DDL);
        let far = TrainingItem::ddl(TURMA_DDL);
        let near_id = near.id.clone();
        store.upsert(near, Some(vec![1.0, 0.1, 0.0])).await.unwrap();
        store.upsert(far, Some(vec![0.0, 1.0, 0.0])).await.unwrap();
        store
            .upsert(TrainingItem::documentation("sem embedding"), None)
            .await
            .unwrap();

        let results = store
            .vector_search(&[1.0, 0.0, 0.0], 10, TrainingKind::Ddl)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, near_id);
        assert!(results[0].1 > results[1].1);

        let limited = store
            .vector_search(&[1.0, 0.0, 0.0], 1, TrainingKind::Ddl)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let wrong_dim = store
            .vector_search(&[1.0, 0.0], 10, TrainingKind::Ddl)
            .await
            .unwrap();
        assert!(wrong_dim.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_search_matches_any_term() {
        let store = SqliteTrainingStore::open_memory().unwrap();

        let pair = TrainingItem::question_sql(
            "Quais são as turmas que o professor Ronaldo ministra?",
            "SELECT 1;",
        );
        let pair_id = pair.id.clone();
        store.upsert(pair, None).await.unwrap();
        store.upsert(TrainingItem::ddl(TURMA_DDL), None).await.unwrap();

        let results = store
            .keyword_search("Que turmas a professora Ana tem?", 10, TrainingKind::QuestionSql)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, pair_id);

        let ddl = store
            .keyword_search("turma", 10, TrainingKind::Ddl)
            .await
            .unwrap();
        assert_eq!(ddl.len(), 1);

        let none = store
            .keyword_search("?!", 10, TrainingKind::Ddl)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_index_follows_updates_and_deletes() {
        let store = SqliteTrainingStore::open_memory().unwrap();

        let item = TrainingItem::documentation("alunos com matricula ativa");
        let id = item.id.clone();
        store.upsert(item, None).await.unwrap();
        assert_eq!(
            store.keyword_search("matricula", 5, TrainingKind::Documentation).await.unwrap().len(),
            1
        );

        store.remove(&id).await.unwrap();
        assert!(store
            .keyword_search("matricula", 5, TrainingKind::Documentation)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_build_fts5_query() {
        assert_eq!(
            build_fts5_query("Quais turmas? \"OR\" turmas").unwrap(),
            "\"quais\" OR \"turmas\" OR \"or\""
        );
        assert!(build_fts5_query("  ?? ").is_none());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(bytes_to_vec(&vec_to_bytes(&v)), v);
    }
}
