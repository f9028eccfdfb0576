use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use fpl_rag_qa::config::QaConfig;
use fpl_rag_qa::document;
use fpl_rag_qa::embeddings::OpenAiEmbedder;
use fpl_rag_qa::generation::OpenAiGenerator;
use fpl_rag_qa::qa::QaSystem;
use fpl_rag_qa::retriever::Retriever;
use fpl_rag_qa::server;

fn get_log_dir() -> String {
    std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string())
}

fn get_log_level() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn get_log_max_mb() -> u64 {
    std::env::var("LOG_MAX_MB")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5)
}

fn setup_logging() -> Result<()> {
    let log_dir = get_log_dir();
    let log_level = get_log_level();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    let is_development = std::env::var("DEVELOPMENT").is_ok() || std::env::var("DEV").is_ok();
    let force_console = std::env::var("CONSOLE_LOGS").is_ok();

    if is_development || force_console {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .compact()
            .init();
        tracing::info!("Development mode: logging to console");
    } else {
        std::fs::create_dir_all(&log_dir)?;
        let log_file = format!("{log_dir}/fpl-rag-qa.log");
        let file_appender = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(file_appender)
            .json()
            .init();
    }

    tracing::info!("Logging initialized");
    tracing::info!("Log level: {}", log_level);
    Ok(())
}

/// Truncates the log file whenever it outgrows the configured cap.
async fn start_log_cleanup_task(log_dir: String, max_mb: u64) {
    let max_bytes = max_mb * 1024 * 1024;
    let log_file = format!("{log_dir}/fpl-rag-qa.log");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Ok(metadata) = std::fs::metadata(&log_file) {
                if metadata.len() > max_bytes {
                    if let Err(e) = std::fs::write(
                        &log_file,
                        format!("[LOG TRUNCATED - Size exceeded {max_mb}MB]\n"),
                    ) {
                        eprintln!("Failed to truncate log file: {e}");
                    }
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("Warning: could not load .env file: {e}");
    }
    setup_logging()?;

    let config = QaConfig::from_env()?;
    tracing::info!(season = %config.season, "configuration loaded");

    start_log_cleanup_task(get_log_dir(), get_log_max_mb()).await;

    let pdf_path = document::find_season_pdf(Path::new(&config.documents_dir))?;
    tracing::info!(path = %pdf_path.display(), "season document located");

    let text = document::extract_text(&pdf_path).await?;

    let embedder = Arc::new(OpenAiEmbedder::new(&config)?);
    let generator = Arc::new(OpenAiGenerator::new(&config)?);
    tracing::info!(
        embedding_model = embedder.model_name(),
        chat_model = generator.model_name(),
        "remote clients ready"
    );

    let retriever = Arc::new(Retriever::new(embedder, &config)?);

    // Build the index before accepting traffic: a failed build halts the
    // process rather than serving a degraded corpus.
    tracing::info!("indexing season document...");
    retriever.initialize(&text).await?;

    let qa = Arc::new(QaSystem::new(retriever, generator, &config));
    server::serve(qa, &config.bind_addr).await
}
