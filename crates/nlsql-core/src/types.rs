//! Core domain types for nlsql.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::NlSqlError;

/// Kind of training data, determines how an item is used in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingKind {
    /// `CREATE TABLE` statements describing the schema.
    Ddl,
    /// Free-form business context.
    Documentation,
    /// A question paired with the SQL that answers it.
    QuestionSql,
}

impl TrainingKind {
    /// All kinds, in prompt order.
    pub const ALL: [TrainingKind; 3] = [Self::Ddl, Self::Documentation, Self::QuestionSql];

    /// Suffix appended to item ids of this kind.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Ddl => "ddl",
            Self::Documentation => "doc",
            Self::QuestionSql => "sql",
        }
    }

    /// Name stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ddl => "ddl",
            Self::Documentation => "documentation",
            Self::QuestionSql => "question_sql",
        }
    }

    /// Kind encoded in a training item id, if any.
    pub fn from_id(id: &str) -> Option<Self> {
        let (_, suffix) = id.rsplit_once('-')?;
        Self::ALL.into_iter().find(|k| k.suffix() == suffix)
    }
}

impl std::fmt::Display for TrainingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainingKind {
    type Err = NlSqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ddl" => Ok(Self::Ddl),
            "doc" | "documentation" => Ok(Self::Documentation),
            "sql" | "question_sql" => Ok(Self::QuestionSql),
            other => Err(NlSqlError::invalid_argument(format!(
                "unknown training kind: {}",
                other
            ))),
        }
    }
}

/// A unit of training data used as prompt context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingItem {
    /// Deterministic id: content hash plus kind suffix.
    pub id: String,

    pub kind: TrainingKind,

    /// Question, for `QuestionSql` items only.
    pub question: Option<String>,

    /// DDL, documentation text, or SQL.
    pub content: String,

    /// Creation timestamp (Unix millis).
    pub created_at: u64,
}

impl TrainingItem {
    /// Create a DDL item.
    pub fn ddl(ddl: &str) -> Self {
        Self::build(TrainingKind::Ddl, None, ddl)
    }

    /// Create a documentation item.
    pub fn documentation(text: &str) -> Self {
        Self::build(TrainingKind::Documentation, None, text)
    }

    /// Create a question/SQL pair.
    pub fn question_sql(question: &str, sql: &str) -> Self {
        Self::build(TrainingKind::QuestionSql, Some(question), sql)
    }

    fn build(kind: TrainingKind, question: Option<&str>, content: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        if let Some(q) = question {
            hasher.update(q.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(content.as_bytes());
        let hash = hasher.finalize();

        Self {
            id: format!("{}-{}", hex::encode(&hash.as_bytes()[..16]), kind.suffix()),
            kind,
            question: question.map(String::from),
            content: content.to_string(),
            created_at: now_millis(),
        }
    }

    /// Text indexed for retrieval: the question for pairs, the content otherwise.
    pub fn search_text(&self) -> &str {
        match (&self.kind, &self.question) {
            (TrainingKind::QuestionSql, Some(q)) => q,
            _ => &self.content,
        }
    }
}

/// A question paired with its SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSql {
    pub question: String,
    pub sql: String,
}

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    /// Python-literal style rendering, as used in tuple lists.
    fn repr(&self) -> String {
        match self {
            Self::Null => "None".to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Real(r) => format!("{:?}", r),
            Self::Text(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::Blob(b) => {
                let mut out = String::from("b'");
                for byte in b {
                    let _ = write!(out, "\\x{:02x}", byte);
                }
                out.push('\'');
                out
            }
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Real(r) => write!(f, "{}", r),
            Self::Text(s) => f.write_str(s),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Rows returned by a query, with their column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as an aligned plain-text table.
    pub fn to_text(&self) -> String {
        if self.columns.is_empty() {
            return "Empty result".to_string();
        }

        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                cells
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|c| c.chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(cells.len() + 1);
        let header: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        lines.push(pad_row(&header, &widths));
        for row in &cells {
            let values: Vec<&str> = row.iter().map(String::as_str).collect();
            lines.push(pad_row(&values, &widths));
        }
        lines.join("\n")
    }

    /// Render as an HTML table. Header and cells are escaped.
    pub fn to_html(&self) -> String {
        let mut html = String::from("<table class=\"dataframe\">\n  <thead>\n    <tr>\n");
        for column in &self.columns {
            let _ = writeln!(html, "      <th>{}</th>", escape_html(column));
        }
        html.push_str("    </tr>\n  </thead>\n  <tbody>\n");
        for row in &self.rows {
            html.push_str("    <tr>\n");
            for cell in row {
                let _ = writeln!(html, "      <td>{}</td>", escape_html(&cell.to_string()));
            }
            html.push_str("    </tr>\n");
        }
        html.push_str("  </tbody>\n</table>");
        html
    }

    /// Render rows as a list of tuples, e.g. `[(101,), (202,)]`.
    pub fn rows_repr(&self) -> String {
        let rows: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                let values: Vec<String> = row.iter().map(CellValue::repr).collect();
                if values.len() == 1 {
                    format!("({},)", values[0])
                } else {
                    format!("({})", values.join(", "))
                }
            })
            .collect();
        format!("[{}]", rows.join(", "))
    }
}

fn pad_row(values: &[&str], widths: &[usize]) -> String {
    values
        .iter()
        .zip(widths)
        .map(|(v, w)| format!("{:<width$}", v, width = *w))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Counts of stored training data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingStats {
    pub ddl: u64,
    pub documentation: u64,
    pub question_sql: u64,

    /// Items that carry an embedding.
    pub embedded: u64,
}

impl TrainingStats {
    pub fn total(&self) -> u64 {
        self.ddl + self.documentation + self.question_sql
    }
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
