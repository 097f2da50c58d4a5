//! nlsql CLI - ask questions about the school database in Portuguese.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use nlsql_core::{Completer, NlSqlConfig, QuestionSql, TrainingKind, TrainingStore};
use nlsql_embed::EmbedderBackend;
use nlsql_llm::OllamaClient;
use nlsql_query::{AgentConfig, FallbackQuery, SqlAgent};
use nlsql_store::{
    ensure_database, extract_ddl_only, list_tables, load_script, BootstrapStatus, SqliteDatabase,
    SqliteTrainingStore,
};
use nlsql_web::AppState;

type Agent = SqlAgent<SqliteTrainingStore, EmbedderBackend, OllamaClient>;
type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const SEPARATOR: &str = "--------------------------------";

/// nlsql - natural-language questions over a SQLite database
#[derive(Parser)]
#[command(name = "nlsql")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/nlsql/config.toml, then ./nlsql.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// SQL script that creates the database
    #[arg(short, long, global = true)]
    script: Option<PathBuf>,

    /// Training store path
    #[arg(short, long, global = true)]
    training: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question (defaults to the example question)
    Ask {
        /// Question in natural language
        question: Option<String>,
    },

    /// Create the database from the script if it does not exist
    Init,

    /// Show whether the database exists and its tables
    Check,

    /// Print the CREATE TABLE blocks of the script
    Ddl,

    /// Execute the script against the database unconditionally
    Load,

    /// Train on the script schema and the seed example
    Train,

    /// Inspect or edit training data
    Training {
        #[command(subcommand)]
        action: TrainingAction,
    },

    /// Download the chat model if the server does not have it
    Pull,

    /// Start the web form
    Serve {
        /// Address to bind (default from config: 0.0.0.0:8084)
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum TrainingAction {
    /// List training items
    List {
        /// Only items of this kind (ddl, documentation, sql)
        #[arg(short, long)]
        kind: Option<TrainingKind>,
    },

    /// Remove a training item
    Remove {
        /// Item id
        id: String,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(cli: &Cli) -> CliResult<NlSqlConfig> {
    let mut config = match &cli.config {
        Some(path) => NlSqlConfig::load(path)?,
        None => NlSqlConfig::load_default()?,
    };

    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    if let Some(path) = &cli.script {
        config.database.script = path.clone();
    }
    if let Some(path) = &cli.training {
        config.training.path = path.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ask { question } => {
            let question = question.unwrap_or_else(|| config.seed.question.clone());
            ask(&config, &question).await?;
        }
        Commands::Init => init(&config)?,
        Commands::Check => check(&config)?,
        Commands::Ddl => {
            let script = std::fs::read_to_string(&config.database.script)?;
            println!("{}", extract_ddl_only(&script));
        }
        Commands::Load => {
            load_script(&config.database.script, &config.database.path)?;
            println!(
                "Executed {} on {}",
                config.database.script.display(),
                config.database.path.display()
            );
        }
        Commands::Train => {
            let agent = prepare(&config).await?;
            let stats = agent.training_stats().await?;
            println!(
                "Training data: {} ddl, {} documentation, {} question/sql ({} embedded)",
                stats.ddl, stats.documentation, stats.question_sql, stats.embedded
            );
        }
        Commands::Training { action } => {
            let store = SqliteTrainingStore::open(&config.training.path)?;
            training(&store, action).await?;
        }
        Commands::Pull => {
            let client = OllamaClient::new(&config.llm)?;
            if client.ensure_model().await? {
                println!("Pulled {}", client.model());
            } else {
                println!("{} already available", client.model());
            }
        }
        Commands::Serve { bind } => {
            let agent = prepare(&config).await?;
            let bind = bind.unwrap_or_else(|| config.web.bind_address.clone());
            println!("Serving on http://{}", bind);
            nlsql_web::serve(&bind, AppState::new(agent)).await?;
        }
    }

    Ok(())
}

fn bootstrap(config: &NlSqlConfig) -> CliResult<BootstrapStatus> {
    let status = ensure_database(&config.database.script, &config.database.path)?;
    if status == BootstrapStatus::Created {
        info!(
            "Created {} from {}",
            config.database.path.display(),
            config.database.script.display()
        );
    }
    Ok(status)
}

async fn build_agent(config: &NlSqlConfig) -> CliResult<Agent> {
    let store = SqliteTrainingStore::open(&config.training.path)?;

    let embedder = match EmbedderBackend::from_config(config) {
        Ok(embedder) => Some(Arc::new(embedder)),
        Err(e) => {
            warn!("Embeddings unavailable, using keyword retrieval: {}", e);
            None
        }
    };

    let llm = OllamaClient::new(&config.llm)?;
    if config.llm.pull_on_start {
        if let Err(e) = llm.ensure_model().await {
            warn!("Could not check model {}: {}", config.llm.model, e);
        }
    }

    let database = SqliteDatabase::connect(&config.database.path)?;

    Ok(SqlAgent::new(
        Arc::new(store),
        embedder,
        Arc::new(llm),
        database,
        AgentConfig::from_config(config),
    ))
}

/// Bootstrap the database, build the agent, and train it on the script.
async fn prepare(config: &NlSqlConfig) -> CliResult<Agent> {
    bootstrap(config)?;
    let agent = build_agent(config).await?;

    let seed = QuestionSql {
        question: config.seed.question.clone(),
        sql: config.seed.sql.clone(),
    };
    agent
        .train_from_script(&config.database.script, Some(&seed))
        .await?;

    Ok(agent)
}

async fn ask(config: &NlSqlConfig, question: &str) -> CliResult<()> {
    // The command line always falls back, whatever the question.
    let agent = prepare(config)
        .await?
        .with_fallback(FallbackQuery::always(config.fallback.sql.clone()));

    println!("Consultando o banco de dados...");
    println!("{}", SEPARATOR);

    let outcome = agent.ask(question).await;

    if let Some(sql) = &outcome.sql {
        println!("SQL gerado:\n {}", sql);
    }

    if let Some(table) = &outcome.table {
        println!("{}", table.to_text());
    } else if let Some(rows) = &outcome.fallback_rows {
        println!("Aviso: não foi possível usar o LLM (Ollama). Usando SQL de fallback.");
        println!("{}", rows.rows_repr());
    }

    println!("{}", SEPARATOR);

    match (&outcome.table, &outcome.fallback_rows, &outcome.error) {
        (None, None, Some(error)) => Err(error.clone().into()),
        _ => Ok(()),
    }
}

fn init(config: &NlSqlConfig) -> CliResult<()> {
    match bootstrap(config)? {
        BootstrapStatus::Created => {
            println!("Created {}", config.database.path.display())
        }
        BootstrapStatus::AlreadyPresent => {
            println!("{} already exists", config.database.path.display())
        }
    }
    Ok(())
}

fn check(config: &NlSqlConfig) -> CliResult<()> {
    let path = &config.database.path;
    let exists = path.exists();
    println!("DB exists: {}", exists);

    let tables = if exists { list_tables(path)? } else { Vec::new() };
    println!("Tables: {:?}", tables);
    Ok(())
}

async fn training(store: &SqliteTrainingStore, action: TrainingAction) -> CliResult<()> {
    match action {
        TrainingAction::List { kind } => {
            let items = store.list(kind).await?;
            if items.is_empty() {
                println!("No training data.");
                return Ok(());
            }

            for item in items {
                println!("{}  [{}]", item.id, item.kind);
                if let Some(question) = &item.question {
                    println!("  Q: {}", question);
                }
                for line in item.content.lines() {
                    println!("  {}", line);
                }
            }
        }
        TrainingAction::Remove { id } => {
            store.remove(&id).await?;
            println!("Removed {}", id);
        }
    }
    Ok(())
}
