//! Service configuration.
//!
//! Centralizes environment variable reading into a single struct with
//! explicit fields for every recognized option. Construction validates the
//! whole combination up front so a bad chunking geometry or context budget
//! fails at startup instead of surfacing mid-pipeline.

use std::time::Duration;

use crate::chunker::ChunkingConfig;
use crate::error::{QaError, Result};

#[derive(Debug, Clone)]
pub struct QaConfig {
    /// OpenAI-compatible API base URL, without a trailing slash.
    pub api_base_url: String,
    /// Bearer token for the embedding and generation endpoints.
    pub api_key: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// Sampling temperature for answer generation.
    pub temperature: f32,
    /// Embedding dimensionality shared by the index-build and query calls.
    /// Vectors of any other length are rejected, never truncated.
    pub embedding_dim: usize,
    /// Window size of a chunk, in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// How far before the window end a cut may be pulled back to land on a
    /// paragraph or sentence boundary.
    pub breakpoint_tolerance: usize,
    /// Number of chunks surfaced per question.
    pub top_k: usize,
    /// Character budget for the context section of the prompt.
    pub max_context_chars: usize,
    /// Per-request timeout for remote calls.
    pub request_timeout: Duration,
    /// Bounded retry count applied at the remote-call boundary.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay: Duration,
    /// Label of the season the document covers, e.g. "2019-20".
    pub season: String,
    pub documents_dir: String,
    pub bind_addr: String,
}

impl QaConfig {
    /// Loads configuration from environment variables with defaults. Fails
    /// fast on a missing API key or an invalid combination of values.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| QaError::Configuration("OPENAI_API_KEY is not set".to_string()))?;

        let config = Self {
            api_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            chat_model: env_or("CHAT_MODEL", "gpt-3.5-turbo"),
            temperature: env_parse("CHAT_TEMPERATURE").unwrap_or(0.1),
            embedding_dim: env_parse("EMBEDDING_DIM").unwrap_or(1536),
            chunk_size: env_parse("CHUNK_SIZE").unwrap_or(1000),
            chunk_overlap: env_parse("CHUNK_OVERLAP").unwrap_or(200),
            breakpoint_tolerance: env_parse("CHUNK_BREAKPOINT_TOLERANCE").unwrap_or(120),
            top_k: env_parse("RETRIEVAL_TOP_K").unwrap_or(3),
            max_context_chars: env_parse("MAX_CONTEXT_CHARS").unwrap_or(6000),
            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(60)),
            max_retries: env_parse("REMOTE_MAX_RETRIES").unwrap_or(3),
            retry_base_delay: Duration::from_millis(env_parse("REMOTE_RETRY_BASE_MS").unwrap_or(500)),
            season: env_or("DATA_SEASON", "2019-20"),
            documents_dir: env_or("DOCUMENTS_DIR", "./documents"),
            bind_addr: env_or("HTTP_BIND", "127.0.0.1:3046"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Chunking geometry has its own invariants; reuse that check.
        self.chunking()?;

        if self.embedding_dim == 0 {
            return Err(QaError::Configuration(
                "embedding dimensionality must be positive".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(QaError::Configuration(
                "retrieval top-k must be positive".to_string(),
            ));
        }
        if self.max_context_chars < self.chunk_size {
            return Err(QaError::Configuration(format!(
                "max context chars ({}) must fit at least one chunk ({})",
                self.max_context_chars, self.chunk_size
            )));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(QaError::Configuration(format!(
                "temperature {} is outside the valid range 0.0-2.0",
                self.temperature
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(QaError::Configuration(
                "request timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Validated chunking geometry derived from this configuration.
    pub fn chunking(&self) -> Result<ChunkingConfig> {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap, self.breakpoint_tolerance)
    }

    /// Final calendar year of the configured season. "2019-20" and
    /// "2019-2020" both resolve to 2020; an unparseable label yields None
    /// and disables year-based scope warnings.
    pub fn season_end_year(&self) -> Option<i32> {
        let tail = self.season.rsplit('-').next()?;
        let n: i32 = tail.trim().parse().ok()?;
        match tail.trim().len() {
            2 => Some(2000 + n),
            4 => Some(n),
            _ => None,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
