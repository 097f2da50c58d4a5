//! Creation of the target database from its SQL script.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use nlsql_core::{NlSqlError, Result};

/// What [`ensure_database`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStatus {
    /// The database file was missing and the script was executed.
    Created,
    /// A file already existed at the path; nothing was touched.
    AlreadyPresent,
}

/// Create the database at `db_path` from `script_path` if no file exists there.
///
/// Presence of any file at `db_path` is enough to skip initialization: its
/// contents and schema are not checked, so an empty or unrelated file is
/// left as is.
///
/// The script is executed statement by statement without a surrounding
/// transaction. On failure the remaining statements are skipped, the ones
/// already executed stay applied, and the (partial) database file remains.
pub fn ensure_database(
    script_path: impl AsRef<Path>,
    db_path: impl AsRef<Path>,
) -> Result<BootstrapStatus> {
    let db_path = db_path.as_ref();
    if db_path.exists() {
        return Ok(BootstrapStatus::AlreadyPresent);
    }

    // Read before opening so an unreadable script leaves no database behind.
    let script = std::fs::read_to_string(script_path.as_ref())?;
    execute_script(&script, db_path)?;
    Ok(BootstrapStatus::Created)
}

/// Execute `script_path` against `db_path` unconditionally, creating the
/// database if needed.
pub fn load_script(script_path: impl AsRef<Path>, db_path: impl AsRef<Path>) -> Result<()> {
    let script = std::fs::read_to_string(script_path.as_ref())?;
    execute_script(&script, db_path.as_ref())
}

/// Names of the tables in an existing database, sorted.
pub fn list_tables(db_path: impl AsRef<Path>) -> Result<Vec<String>> {
    let conn = open_existing(db_path.as_ref())?;

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .map_err(|e| NlSqlError::database(e.to_string()))?;

    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| NlSqlError::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NlSqlError::database(e.to_string()))?;

    Ok(names)
}

/// Open a database that must already exist.
pub(crate) fn open_existing(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| NlSqlError::database(format!("Failed to open {}: {}", path.display(), e)))
}

fn execute_script(script: &str, db_path: &Path) -> Result<()> {
    let conn = Connection::open(db_path)
        .map_err(|e| NlSqlError::database(format!("Failed to open database: {}", e)))?;

    // The connection is closed when it goes out of scope, on both paths.
    conn.execute_batch(script)
        .map_err(|e| NlSqlError::script(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SCRIPT: &str = "\
PRAGMA foreign_keys = ON;
CREATE TABLE professor (
    id INTEGER PRIMARY KEY,
    nome TEXT NOT NULL
);
INSERT INTO professor (id, nome) VALUES (1, 'Ronaldo');
";

    fn count_rows(db: &Path, table: &str) -> i64 {
        let conn = Connection::open(db).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_creates_database_from_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("escola.sql");
        let db = dir.path().join("escola.db");
        fs::write(&script, SCRIPT).unwrap();

        let status = ensure_database(&script, &db).unwrap();
        assert_eq!(status, BootstrapStatus::Created);
        assert!(db.exists());
        assert_eq!(count_rows(&db, "professor"), 1);
    }

    #[test]
    fn test_second_call_does_not_execute_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("escola.sql");
        let db = dir.path().join("escola.db");
        fs::write(&script, SCRIPT).unwrap();

        ensure_database(&script, &db).unwrap();

        // A re-execution would fail on the existing table, and the script is gone anyway.
        fs::remove_file(&script).unwrap();
        let status = ensure_database(&script, &db).unwrap();
        assert_eq!(status, BootstrapStatus::AlreadyPresent);
        assert_eq!(count_rows(&db, "professor"), 1);
    }

    #[test]
    fn test_existing_file_is_trusted_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("escola.sql");
        let db = dir.path().join("escola.db");
        fs::write(&script, SCRIPT).unwrap();
        fs::write(&db, b"").unwrap();

        let status = ensure_database(&script, &db).unwrap();
        assert_eq!(status, BootstrapStatus::AlreadyPresent);
        assert!(list_tables(&db).unwrap().is_empty());
    }

    #[test]
    fn test_missing_script_is_io_error_and_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("missing.sql");
        let db = dir.path().join("escola.db");

        let err = ensure_database(&script, &db).unwrap_err();
        assert!(matches!(err, NlSqlError::Io(_)));
        assert!(!db.exists());
    }

    #[test]
    fn test_invalid_statement_keeps_preceding_ones() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("broken.sql");
        let db = dir.path().join("broken.db");
        fs::write(
            &script,
            "CREATE TABLE a (x INT);\nINSERT INTO a VALUES (1);\nTHIS IS NOT SQL;\nINSERT INTO a VALUES (2);\n",
        )
        .unwrap();

        let err = ensure_database(&script, &db).unwrap_err();
        assert_eq!(err.error_code(), "SCRIPT_EXECUTION_ERROR");
        assert!(db.exists());
        assert_eq!(count_rows(&db, "a"), 1);

        // The partial database now counts as present.
        assert_eq!(
            ensure_database(&script, &db).unwrap(),
            BootstrapStatus::AlreadyPresent
        );
    }

    #[test]
    fn test_load_script_runs_unconditionally() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("extra.sql");
        let db = dir.path().join("escola.db");
        fs::write(&script, "CREATE TABLE IF NOT EXISTS t (x INT);\nINSERT INTO t VALUES (1);\n").unwrap();

        load_script(&script, &db).unwrap();
        load_script(&script, &db).unwrap();
        assert_eq!(count_rows(&db, "t"), 2);
    }

    #[test]
    fn test_list_tables() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("escola.sql");
        let db = dir.path().join("escola.db");
        fs::write(&script, "CREATE TABLE turma (numero INT);\nCREATE TABLE aluno (id INT);\n").unwrap();
        ensure_database(&script, &db).unwrap();

        assert_eq!(list_tables(&db).unwrap(), vec!["aluno", "turma"]);
    }

    #[test]
    fn test_list_tables_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nowhere.db");

        assert!(list_tables(&db).is_err());
        assert!(!db.exists());
    }
}
