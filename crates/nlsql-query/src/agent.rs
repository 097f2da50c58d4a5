//! The question-answering agent.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use nlsql_core::{
    Completer, Embedder, NlSqlConfig, NlSqlError, PromptConfig, QuestionSql, Result, ResultTable,
    TrainingItem, TrainingKind, TrainingStats, TrainingStore,
};
use nlsql_llm::{extract_sql, is_sql_valid};
use nlsql_store::{extract_ddl_only, SqliteDatabase};

use crate::fallback::FallbackQuery;
use crate::fusion::reciprocal_rank_fusion;
use crate::prompt::{build_question_prompt, build_sql_prompt};

/// Agent settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Items retrieved per kind of training data.
    pub n_results: u32,

    /// Combine vector and keyword retrieval when an embedder is present.
    pub hybrid: bool,

    /// RRF constant.
    pub rrf_k: u32,

    pub prompt: PromptConfig,

    pub fallback: FallbackQuery,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_config(&NlSqlConfig::default())
    }
}

impl AgentConfig {
    pub fn from_config(config: &NlSqlConfig) -> Self {
        Self {
            n_results: config.training.n_results,
            hybrid: config.training.hybrid,
            rrf_k: config.training.rrf_k,
            prompt: config.prompt.clone(),
            fallback: FallbackQuery::from_config(&config.fallback),
        }
    }
}

/// Training input. Every field is optional; blank strings count as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub question: Option<String>,
    pub sql: Option<String>,
    pub ddl: Option<String>,
    pub documentation: Option<String>,
}

/// Everything that happened while answering one question.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AskOutcome {
    pub question: String,

    /// Generated SQL, when generation succeeded.
    pub sql: Option<String>,

    /// Rows of the generated SQL.
    pub table: Option<ResultTable>,

    /// Rows of the fallback query, when it ran.
    pub fallback_rows: Option<ResultTable>,

    /// First failure, plus the fallback failure if that failed too.
    pub error: Option<String>,
}

impl AskOutcome {
    pub fn used_fallback(&self) -> bool {
        self.fallback_rows.is_some()
    }
}

/// Answers natural-language questions with SQL.
///
/// Retrieval (store plus optional embedder) and generation (completer) are
/// composed here. Without an embedder, retrieval is keyword-only.
pub struct SqlAgent<S, E, C> {
    store: Arc<S>,
    embedder: Option<Arc<E>>,
    completer: Arc<C>,
    database: SqliteDatabase,
    config: AgentConfig,
}

impl<S, E, C> SqlAgent<S, E, C>
where
    S: TrainingStore,
    E: Embedder,
    C: Completer,
{
    pub fn new(
        store: Arc<S>,
        embedder: Option<Arc<E>>,
        completer: Arc<C>,
        database: SqliteDatabase,
        config: AgentConfig,
    ) -> Self {
        if embedder.is_none() {
            info!("No embedder configured, using keyword retrieval only");
        }

        Self {
            store,
            embedder,
            completer,
            database,
            config,
        }
    }

    /// Replace the fallback query.
    pub fn with_fallback(mut self, fallback: FallbackQuery) -> Self {
        self.config.fallback = fallback;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn database(&self) -> &SqliteDatabase {
        &self.database
    }

    // ---- training ----

    pub async fn add_ddl(&self, ddl: &str) -> Result<String> {
        self.add_item(TrainingItem::ddl(ddl)).await
    }

    pub async fn add_documentation(&self, documentation: &str) -> Result<String> {
        self.add_item(TrainingItem::documentation(documentation)).await
    }

    pub async fn add_question_sql(&self, question: &str, sql: &str) -> Result<String> {
        self.add_item(TrainingItem::question_sql(question, sql)).await
    }

    async fn add_item(&self, item: TrainingItem) -> Result<String> {
        let embedding = match &self.embedder {
            Some(embedder) => match embedder.embed_documents(&[item.search_text()]).await {
                Ok(mut vectors) => vectors.pop(),
                Err(e) => {
                    warn!("Storing {} without embedding: {}", item.id, e);
                    None
                }
            },
            None => None,
        };

        let id = item.id.clone();
        self.store.upsert(item, embedding).await?;
        Ok(id)
    }

    /// Add whatever the request carries and return the new ids.
    ///
    /// A question needs its SQL. SQL without a question gets one generated
    /// by the model.
    pub async fn train(&self, request: TrainingRequest) -> Result<Vec<String>> {
        let question = non_blank(request.question);
        let sql = non_blank(request.sql);
        let ddl = non_blank(request.ddl);
        let documentation = non_blank(request.documentation);

        if question.is_some() && sql.is_none() {
            return Err(NlSqlError::invalid_argument(
                "a question must be accompanied by its SQL",
            ));
        }

        let mut ids = Vec::new();

        if let Some(documentation) = documentation {
            ids.push(self.add_documentation(&documentation).await?);
        }

        if let Some(sql) = sql {
            let question = match question {
                Some(q) => q,
                None => self.generate_question(&sql).await?,
            };
            ids.push(self.add_question_sql(&question, &sql).await?);
        }

        if let Some(ddl) = ddl {
            ids.push(self.add_ddl(&ddl).await?);
        }

        if ids.is_empty() {
            debug!("Empty training request");
        }
        Ok(ids)
    }

    /// Train on the `CREATE TABLE` blocks of a SQL script, plus an optional
    /// seed question/SQL pair.
    pub async fn train_from_script(
        &self,
        script_path: impl AsRef<Path>,
        seed: Option<&QuestionSql>,
    ) -> Result<Vec<String>> {
        let script = std::fs::read_to_string(script_path.as_ref())?;
        let ddl = extract_ddl_only(&script);

        let mut ids = Vec::new();
        if !ddl.is_empty() {
            ids.push(self.add_ddl(&ddl).await?);
        } else {
            warn!("No CREATE TABLE blocks in {:?}", script_path.as_ref());
        }

        if let Some(seed) = seed {
            ids.push(self.add_question_sql(&seed.question, &seed.sql).await?);
        }

        info!("Trained {} items from {:?}", ids.len(), script_path.as_ref());
        Ok(ids)
    }

    pub async fn training_data(&self, kind: Option<TrainingKind>) -> Result<Vec<TrainingItem>> {
        self.store.list(kind).await
    }

    pub async fn remove_training_data(&self, id: &str) -> Result<()> {
        self.store.remove(id).await
    }

    pub async fn training_stats(&self) -> Result<TrainingStats> {
        self.store.stats().await
    }

    // ---- generation ----

    /// Generate SQL for `question` from retrieved training data.
    pub async fn generate_sql(&self, question: &str) -> Result<String> {
        let start = Instant::now();

        let embedding = self.embed_question(question).await;
        let embedding = embedding.as_deref();

        let (examples, ddl, documentation) = tokio::join!(
            self.retrieve(question, embedding, TrainingKind::QuestionSql),
            self.retrieve(question, embedding, TrainingKind::Ddl),
            self.retrieve(question, embedding, TrainingKind::Documentation)
        );

        let examples: Vec<QuestionSql> = examples?
            .into_iter()
            .filter_map(|item| {
                item.question.map(|question| QuestionSql {
                    question,
                    sql: item.content,
                })
            })
            .collect();
        let ddl: Vec<String> = ddl?.into_iter().map(|item| item.content).collect();
        let documentation: Vec<String> =
            documentation?.into_iter().map(|item| item.content).collect();

        debug!(
            "Prompt context: {} examples, {} ddl, {} documentation",
            examples.len(),
            ddl.len(),
            documentation.len()
        );

        let messages = build_sql_prompt(&self.config.prompt, question, &ddl, &documentation, &examples);
        let reply = self.completer.complete(&messages).await?;

        let sql = extract_sql(&reply);
        if sql.trim().is_empty() {
            return Err(NlSqlError::SqlExtraction { response: reply });
        }

        info!(
            "Generated SQL with {} in {}ms",
            self.completer.model(),
            start.elapsed().as_millis()
        );
        Ok(sql)
    }

    /// Ask the model which question `sql` answers.
    pub async fn generate_question(&self, sql: &str) -> Result<String> {
        let reply = self.completer.complete(&build_question_prompt(sql)).await?;
        Ok(reply.trim().to_string())
    }

    /// Run a statement on the connected database.
    pub async fn run_sql(&self, sql: &str) -> Result<ResultTable> {
        let database = self.database.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || database.run_sql(&sql))
            .await
            .map_err(|e| NlSqlError::internal(format!("Query task failed: {}", e)))?
    }

    /// Generate and run SQL for `question`, falling back to the configured
    /// query on failure. Never fails; problems are reported in the outcome.
    ///
    /// Only `SELECT` and `WITH` statements are executed. Any other generated
    /// SQL is refused as [`NlSqlError::InvalidSql`] without touching the
    /// database, and the fallback applies as for any other failure.
    pub async fn ask(&self, question: &str) -> AskOutcome {
        let mut outcome = AskOutcome {
            question: question.to_string(),
            ..AskOutcome::default()
        };

        if let Err(e) = self.answer(question, &mut outcome).await {
            warn!("Could not answer {:?}: {}", question, e);
            outcome.error = Some(e.to_string());

            let fallback = &self.config.fallback;
            if fallback.applies_to(question) {
                info!("Running fallback query");
                match self.run_sql(&fallback.sql).await {
                    Ok(rows) => outcome.fallback_rows = Some(rows),
                    Err(fe) => {
                        warn!("Fallback query failed: {}", fe);
                        outcome.error = Some(format!("{}; fallback failed: {}", e, fe));
                    }
                }
            }
        }

        outcome
    }

    async fn answer(&self, question: &str, outcome: &mut AskOutcome) -> Result<()> {
        let sql = self.generate_sql(question).await?;
        outcome.sql = Some(sql.clone());

        if !is_sql_valid(&sql) {
            return Err(NlSqlError::InvalidSql { sql });
        }

        outcome.table = Some(self.run_sql(&sql).await?);
        Ok(())
    }

    // ---- retrieval ----

    async fn embed_question(&self, question: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed_query(question).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Falling back to keyword retrieval: {}", e);
                None
            }
        }
    }

    /// Up to `n_results` items of `kind` for `question`, best first.
    async fn retrieve(
        &self,
        question: &str,
        embedding: Option<&[f32]>,
        kind: TrainingKind,
    ) -> Result<Vec<TrainingItem>> {
        let n = self.config.n_results;
        let fetch_k = fetch_limit(n);

        let (vector_results, keyword_results) = tokio::join!(
            async {
                match embedding {
                    Some(e) => self.store.vector_search(e, fetch_k, kind).await,
                    None => Ok(Vec::new()),
                }
            },
            async {
                if embedding.is_none() || self.config.hybrid {
                    self.store.keyword_search(question, fetch_k, kind).await
                } else {
                    Ok(Vec::new())
                }
            }
        );

        let fused = reciprocal_rank_fusion(
            vec![vector_results?, keyword_results?],
            self.config.rrf_k as f32,
            n as usize,
        );

        let mut items = Vec::with_capacity(fused.len());
        let mut seen: HashSet<String> = HashSet::new();
        for (id, _) in fused {
            if let Some(item) = self.store.get(&id).await? {
                seen.insert(id);
                items.push(item);
            }
        }

        // Keyword-only results are padded with the newest items.
        if embedding.is_none() && items.len() < n as usize {
            let mut rest = self.store.list(Some(kind)).await?;
            rest.reverse();
            for item in rest {
                if items.len() >= n as usize {
                    break;
                }
                if seen.insert(item.id.clone()) {
                    items.push(item);
                }
            }
        }

        Ok(items)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Candidates fetched per search before fusion: twice `n_results`, at least 20.
fn fetch_limit(n_results: u32) -> u32 {
    n_results.saturating_mul(2).max(20)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlsql_core::{CellValue, Role, EXAMPLE_QUESTION, EXAMPLE_SQL};
    use nlsql_embed::MockEmbedder;
    use nlsql_llm::MockCompleter;
    use nlsql_store::{ensure_database, SqliteTrainingStore};
    use tempfile::TempDir;

    const SCRIPT: &str = "\
PRAGMA foreign_keys = ON;
CREATE TABLE professor (
    id INTEGER PRIMARY KEY,
    nome TEXT NOT NULL
);
CREATE TABLE turma (
    numero INTEGER PRIMARY KEY
);
CREATE TABLE professor_turma (
    professor_id INTEGER NOT NULL,
    turma_numero INTEGER NOT NULL
);
INSERT INTO professor VALUES (1, 'Ronaldo'), (2, 'Ana');
INSERT INTO turma VALUES (101), (202), (303);
INSERT INTO professor_turma VALUES (1, 101), (1, 202), (2, 303);
";

    type TestAgent = SqlAgent<SqliteTrainingStore, MockEmbedder, MockCompleter>;

    struct Fixture {
        dir: TempDir,
        completer: Arc<MockCompleter>,
        agent: TestAgent,
    }

    impl Fixture {
        fn script_path(&self) -> std::path::PathBuf {
            self.dir.path().join("escola.sql")
        }
    }

    fn fixture(completer: MockCompleter, with_embedder: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("escola.sql");
        let db = dir.path().join("escola.db");
        std::fs::write(&script, SCRIPT).unwrap();
        ensure_database(&script, &db).unwrap();

        let completer = Arc::new(completer);
        let embedder = with_embedder.then(|| Arc::new(MockEmbedder::new()));
        let agent = SqlAgent::new(
            Arc::new(SqliteTrainingStore::open_memory().unwrap()),
            embedder,
            completer.clone(),
            SqliteDatabase::connect(&db).unwrap(),
            AgentConfig::default(),
        );

        Fixture {
            dir,
            completer,
            agent,
        }
    }

    fn seed() -> QuestionSql {
        QuestionSql {
            question: EXAMPLE_QUESTION.to_string(),
            sql: EXAMPLE_SQL.to_string(),
        }
    }

    fn turmas(numbers: &[i64]) -> Vec<Vec<CellValue>> {
        numbers.iter().map(|n| vec![CellValue::Integer(*n)]).collect()
    }

    #[tokio::test]
    async fn test_train_from_script_adds_ddl_and_seed() {
        let f = fixture(MockCompleter::replying(""), true);

        let ids = f.agent.train_from_script(f.script_path(), Some(&seed())).await.unwrap();
        assert_eq!(ids.len(), 2);

        let ddl = f.agent.training_data(Some(TrainingKind::Ddl)).await.unwrap();
        assert_eq!(ddl.len(), 1);
        assert!(ddl[0].content.starts_with("CREATE TABLE professor ("));
        assert!(!ddl[0].content.contains("INSERT"));

        let stats = f.agent.training_stats().await.unwrap();
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.embedded, 2);

        // Training twice does not duplicate anything.
        f.agent.train_from_script(f.script_path(), Some(&seed())).await.unwrap();
        assert_eq!(f.agent.training_stats().await.unwrap().total(), 2);
    }

    #[tokio::test]
    async fn test_generate_sql_builds_prompt_from_training() {
        let f = fixture(
            MockCompleter::replying("Claro!\n```sql\nSELECT numero FROM turma;\n```"),
            true,
        );
        f.agent.train_from_script(f.script_path(), Some(&seed())).await.unwrap();
        f.agent.add_documentation("A tabela turma guarda as turmas da escola.").await.unwrap();

        let sql = f.agent.generate_sql("Quais turmas o professor Ronaldo ministra?").await.unwrap();
        assert_eq!(sql, "SELECT numero FROM turma");

        let calls = f.completer.calls();
        assert_eq!(calls.len(), 1);
        let messages = &calls[0];
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("CREATE TABLE professor_turma"));
        assert!(messages[0].content.contains("guarda as turmas"));
        assert_eq!(messages[1], nlsql_core::ChatMessage::user(EXAMPLE_QUESTION));
        assert_eq!(messages[2], nlsql_core::ChatMessage::assistant(EXAMPLE_SQL));
        assert_eq!(
            messages.last().unwrap().content,
            "Quais turmas o professor Ronaldo ministra?"
        );
    }

    #[tokio::test]
    async fn test_keyword_only_retrieval_still_includes_schema() {
        let f = fixture(MockCompleter::replying("SELECT 1;"), false);
        f.agent.train_from_script(f.script_path(), Some(&seed())).await.unwrap();

        f.agent.generate_sql("xyz?").await.unwrap();

        let calls = f.completer.calls();
        assert!(calls[0][0].content.contains("CREATE TABLE turma"));
        assert_eq!(calls[0].len(), 4);
    }

    #[tokio::test]
    async fn test_empty_reply_is_extraction_error() {
        let f = fixture(MockCompleter::replying("   "), true);
        let err = f.agent.generate_sql("pergunta").await.unwrap_err();
        assert_eq!(err.error_code(), "SQL_EXTRACTION_ERROR");
    }

    #[tokio::test]
    async fn test_ask_runs_generated_sql() {
        let f = fixture(MockCompleter::replying(&format!("```sql\n{}\n```", EXAMPLE_SQL)), true);
        f.agent.train_from_script(f.script_path(), Some(&seed())).await.unwrap();

        let outcome = f.agent.ask(EXAMPLE_QUESTION).await;
        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        assert!(!outcome.used_fallback());
        let table = outcome.table.unwrap();
        assert_eq!(table.columns, vec!["numero"]);
        assert_eq!(table.rows, turmas(&[101, 202]));
    }

    #[tokio::test]
    async fn test_ask_falls_back_when_model_is_down() {
        let f = fixture(MockCompleter::failing("connection refused"), true);
        f.agent.train_from_script(f.script_path(), Some(&seed())).await.unwrap();

        let outcome = f.agent.ask(EXAMPLE_QUESTION).await;
        assert!(outcome.sql.is_none());
        assert!(outcome.table.is_none());
        assert!(outcome.error.unwrap().contains("connection refused"));
        assert_eq!(outcome.fallback_rows.unwrap().rows, turmas(&[101, 202]));
    }

    #[tokio::test]
    async fn test_ask_without_keyword_skips_fallback() {
        let f = fixture(MockCompleter::failing("connection refused"), true);

        let outcome = f.agent.ask("Quantos alunos existem?").await;
        assert!(outcome.error.is_some());
        assert!(!outcome.used_fallback());
    }

    #[tokio::test]
    async fn test_ask_with_always_fallback() {
        let f = fixture(MockCompleter::failing("timeout"), true);
        let agent = f.agent.with_fallback(FallbackQuery::always("SELECT numero FROM turma ORDER BY numero"));

        let outcome = agent.ask("Quantos alunos existem?").await;
        assert_eq!(outcome.fallback_rows.unwrap().rows, turmas(&[101, 202, 303]));
    }

    #[tokio::test]
    async fn test_ask_rejects_non_query_sql() {
        let f = fixture(MockCompleter::replying("DELETE FROM turma;"), true);

        let outcome = f.agent.ask(EXAMPLE_QUESTION).await;
        assert_eq!(outcome.sql.as_deref(), Some("DELETE FROM turma;"));
        assert!(outcome.error.as_ref().unwrap().contains("Refusing"));
        assert!(outcome.used_fallback());

        let remaining = f.agent.run_sql("SELECT COUNT(*) FROM turma").await.unwrap();
        assert_eq!(remaining.rows, vec![vec![CellValue::Integer(3)]]);
    }

    #[tokio::test]
    async fn test_ask_reports_failing_sql_and_fallback() {
        let f = fixture(MockCompleter::replying("SELECT * FROM nao_existe;"), true);
        let agent = f.agent.with_fallback(FallbackQuery::always("SELECT * FROM tambem_nao;"));

        let outcome = agent.ask("pergunta").await;
        assert_eq!(outcome.sql.as_deref(), Some("SELECT * FROM nao_existe"));
        let error = outcome.error.unwrap();
        assert!(error.contains("nao_existe"));
        assert!(error.contains("fallback failed"));
        assert!(outcome.fallback_rows.is_none());
    }

    #[tokio::test]
    async fn test_train_request_rules() {
        let f = fixture(MockCompleter::replying("Quantas turmas existem?"), true);

        let err = f
            .agent
            .train(TrainingRequest {
                question: Some("Quantas turmas?".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");

        let none = f
            .agent
            .train(TrainingRequest {
                ddl: Some("  ".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());

        let ids = f
            .agent
            .train(TrainingRequest {
                sql: Some("SELECT COUNT(*) FROM turma".into()),
                documentation: Some("Turmas são identificadas pelo número.".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let pairs = f.agent.training_data(Some(TrainingKind::QuestionSql)).await.unwrap();
        assert_eq!(pairs[0].question.as_deref(), Some("Quantas turmas existem?"));
    }

    #[tokio::test]
    async fn test_remove_training_data() {
        let f = fixture(MockCompleter::replying(""), false);
        let id = f.agent.add_ddl("CREATE TABLE x (a INT);").await.unwrap();

        f.agent.remove_training_data(&id).await.unwrap();
        assert!(f.agent.training_data(None).await.unwrap().is_empty());
        assert!(f.agent.remove_training_data(&id).await.is_err());
    }

    #[test]
    fn test_agent_config_from_config() {
        let mut config = NlSqlConfig::default();
        config.training.n_results = 3;
        config.fallback.keyword = None;

        let agent_config = AgentConfig::from_config(&config);
        assert_eq!(agent_config.n_results, 3);
        assert!(agent_config.fallback.applies_to("anything"));
    }

    #[test]
    fn test_fetch_limit() {
        assert_eq!(fetch_limit(0), 20);
        assert_eq!(fetch_limit(10), 20);
        assert_eq!(fetch_limit(15), 30);
        assert_eq!(fetch_limit(u32::MAX / 2 + 1), u32::MAX);
        assert_eq!(fetch_limit(u32::MAX), u32::MAX);
    }
}
