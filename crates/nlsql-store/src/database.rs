//! Query execution against the target database.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use tracing::debug;

use nlsql_core::{CellValue, NlSqlError, ResultTable, Result};

use crate::bootstrap::open_existing;

/// Handle on the SQLite database that questions are answered from.
///
/// Each query opens its own connection, closed before returning.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    path: PathBuf,
}

impl SqliteDatabase {
    /// Connect to an existing database file.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(NlSqlError::database(format!(
                "Database file not found: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a statement and collect its rows.
    ///
    /// Statements that return no columns are executed and yield an empty table.
    pub fn run_sql(&self, sql: &str) -> Result<ResultTable> {
        let conn = open_existing(&self.path)?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| NlSqlError::database(format!("Failed to prepare query: {}", e)))?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        if columns.is_empty() {
            stmt.execute([])
                .map_err(|e| NlSqlError::database(format!("Failed to execute: {}", e)))?;
            return Ok(ResultTable::default());
        }

        let width = columns.len();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(to_cell))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(|e| NlSqlError::database(format!("Failed to run query: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| NlSqlError::database(format!("Failed to read row: {}", e)))?;

        debug!("Query returned {} rows", rows.len());

        Ok(ResultTable { columns, rows })
    }
}

fn to_cell(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Integer(i),
        ValueRef::Real(r) => CellValue::Real(r),
        ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
    }
}
