//! Remote embedding client.
//!
//! Speaks the OpenAI `/embeddings` wire format. The batch call happens once
//! at index build; single calls serve per-question queries and go through a
//! small LRU cache so a repeated question costs one request.

use std::num::NonZeroUsize;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::QaConfig;
use crate::retry::{RetryPolicy, post_json_with_retries};

/// Boundary to the embedding service.
///
/// Both calls may fail (network, auth, rate limits). Implementations must
/// return exactly one vector per input text, all of the configured
/// dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

const QUERY_CACHE_SIZE: usize = 256;

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dim: usize,
    request_timeout: Duration,
    retry: RetryPolicy,
    query_cache: RwLock<LruCache<String, Vec<f32>>>,
}

impl OpenAiEmbedder {
    pub fn new(config: &QaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", config.api_base_url),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
            dim: config.embedding_dim,
            request_timeout: config.request_timeout,
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay),
            query_cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is nonzero"),
            )),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    async fn request(&self, input: EmbeddingInput<'_>, expected: usize) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input,
        };

        let response = post_json_with_retries(
            &self.client,
            &self.url,
            &self.api_key,
            &body,
            self.request_timeout,
            &self.retry,
            "embedding request",
        )
        .await?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("invalid embedding response body")?;

        self.collect_vectors(parsed, expected)
    }

    /// Restores input order via the per-row index and enforces the
    /// count-per-input and dimensionality contracts. A mismatch is an error,
    /// never re-aligned silently.
    fn collect_vectors(
        &self,
        response: EmbeddingResponse,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>> {
        if response.data.len() != expected {
            bail!(
                "received {} embeddings for {} inputs",
                response.data.len(),
                expected
            );
        }

        let mut rows = response.data;
        rows.sort_by_key(|row| row.index);

        for row in &rows {
            if row.embedding.len() != self.dim {
                bail!(
                    "embedding has dimension {}, expected {}",
                    row.embedding.len(),
                    self.dim
                );
            }
        }

        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::info!(texts = texts.len(), model = %self.model, "embedding chunk batch");
        self.request(EmbeddingInput::Batch(texts), texts.len()).await
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.query_cache.write().await.get(text) {
            return Ok(cached.clone());
        }

        let mut vectors = self.request(EmbeddingInput::Single(text), 1).await?;
        let vector = vectors.pop().context("empty embedding response")?;

        self.query_cache
            .write()
            .await
            .put(text.to_string(), vector.clone());
        Ok(vector)
    }
}
