use nlsql_core::FallbackConfig;

/// A known-good query run directly against the database when SQL generation
/// or execution fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackQuery {
    pub sql: String,

    /// Questions must contain this text (case-sensitive) for the fallback to
    /// run. `None` applies it to every question.
    pub keyword: Option<String>,
}

impl FallbackQuery {
    pub fn from_config(config: &FallbackConfig) -> Self {
        Self {
            sql: config.sql.clone(),
            keyword: config.keyword.clone(),
        }
    }

    /// A fallback that applies to any question.
    pub fn always(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            keyword: None,
        }
    }

    pub fn applies_to(&self, question: &str) -> bool {
        match &self.keyword {
            Some(keyword) => question.contains(keyword.as_str()),
            None => true,
        }
    }
}
