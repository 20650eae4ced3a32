/// Journal Insight API server
///
/// Usage:
///   journal-server [--addr <host:port>] [--db-path <path>]
///
/// Everything else comes from the environment: JOURNAL_* for the server and
/// context windows, LLM_PROVIDER / OPENAI_* / OLLAMA_* for the model.

use anyhow::{Context, Result};
use clap::Parser;
use journal_analysis::{connect, Analyzer, LlmConfig};
use journal_server::{build_router, AppState, ServerConfig};
use journal_storage::Database;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "journal-server")]
#[command(about = "Journal API with AI-assisted priority and context extraction")]
struct Args {
    /// Address to listen on (overrides JOURNAL_BIND_ADDR)
    #[arg(long)]
    addr: Option<String>,

    /// Path to SQLite database file (overrides JOURNAL_DB_PATH)
    #[arg(long, short)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Journal Insight API v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(addr) = args.addr {
        config.bind_addr = addr;
    }
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }

    // Create directory if it doesn't exist
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let db = Database::new(&config.db_path)?;
    info!("Database initialized at: {}", config.db_path.display());

    let llm_config = LlmConfig::from_env()?;
    let model = connect(&llm_config)?;
    info!("Using model {}", model.describe());

    let db = Arc::new(Mutex::new(db));
    let analyzer = Analyzer::new(db.clone(), model, config.limits);

    let state = AppState {
        db,
        analyzer: Arc::new(analyzer),
    };
    let app = build_router(state, config.cors_origin.as_deref());

    info!("Starting HTTP server on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
