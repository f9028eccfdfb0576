//! One-time index construction and repeatable retrieval.
//!
//! The retriever owns the lifecycle of the vector index behind an explicit
//! state enum. Building happens under the write lock, so a second
//! `initialize` is a no-op, a concurrent one blocks and then observes the
//! built index, and questions arriving mid-build wait instead of seeing a
//! half-populated index.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::chunker::{ChunkingConfig, chunk_text};
use crate::config::QaConfig;
use crate::embeddings::Embedder;
use crate::error::{QaError, Result};
use crate::index::{ScoredChunk, VectorIndex};

/// Externally visible lifecycle of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Empty,
    Ready { chunks: usize },
    Failed,
}

enum IndexState {
    Empty,
    Ready(VectorIndex),
    Failed,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    top_k: usize,
    embedding_dim: usize,
    state: RwLock<IndexState>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, config: &QaConfig) -> Result<Self> {
        Ok(Self {
            embedder,
            chunking: config.chunking()?,
            top_k: config.top_k,
            embedding_dim: config.embedding_dim,
            state: RwLock::new(IndexState::Empty),
        })
    }

    /// Chunks the document and builds the vector index, exactly once per
    /// process lifetime. Calling again after a successful build skips the
    /// work entirely, so chunks are never re-embedded or duplicated. A
    /// failed build leaves the retriever in a state where every retrieval
    /// reports `NotReady` instead of serving stale data.
    pub async fn initialize(&self, document_text: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let IndexState::Ready(index) = &*state {
            tracing::info!(chunks = index.len(), "index already built, skipping rebuild");
            return Ok(());
        }

        let chunks = chunk_text(document_text, &self.chunking);
        tracing::info!(chunks = chunks.len(), "season document chunked");

        match VectorIndex::build(chunks, self.embedder.as_ref(), self.embedding_dim).await {
            Ok(index) => {
                *state = IndexState::Ready(index);
                Ok(())
            }
            Err(e) => {
                *state = IndexState::Failed;
                Err(e)
            }
        }
    }

    /// Retrieves the configured top-k chunks for a question.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        self.retrieve_top(question, self.top_k).await
    }

    /// Retrieval with an explicit result count.
    pub async fn retrieve_top(&self, question: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let state = self.state.read().await;
        let index = match &*state {
            IndexState::Ready(index) => index,
            IndexState::Empty | IndexState::Failed => return Err(QaError::NotReady),
        };

        let query = self
            .embedder
            .embed_one(question)
            .await
            .map_err(|e| QaError::Retrieval(format!("{e:#}")))?;

        index.search(&query, k)
    }

    pub async fn status(&self) -> IndexStatus {
        match &*self.state.read().await {
            IndexState::Empty => IndexStatus::Empty,
            IndexState::Ready(index) => IndexStatus::Ready {
                chunks: index.len(),
            },
            IndexState::Failed => IndexStatus::Failed,
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(self.status().await, IndexStatus::Ready { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Embeds by counting marker words, so similarity is predictable from
    /// the text alone.
    struct KeywordEmbedder {
        batch_calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                batch_calls: AtomicUsize::new(0),
            }
        }
    }

    fn keyword_embedding(text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        ["alpha", "beta", "gamma"]
            .iter()
            .map(|kw| lowered.matches(kw).count() as f32)
            .collect()
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| keyword_embedding(t)).collect())
        }

        async fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(keyword_embedding(text))
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding backend unavailable")
        }

        async fn embed_one(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("embedding backend unavailable")
        }
    }

    fn test_config() -> QaConfig {
        QaConfig {
            api_base_url: "http://localhost:9".to_string(),
            api_key: "test-key".to_string(),
            embedding_model: "test-embed".to_string(),
            chat_model: "test-chat".to_string(),
            temperature: 0.1,
            embedding_dim: 3,
            chunk_size: 24,
            chunk_overlap: 6,
            breakpoint_tolerance: 0,
            top_k: 2,
            max_context_chars: 200,
            request_timeout: Duration::from_secs(1),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(1),
            season: "2019-20".to_string(),
            documents_dir: ".".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }

    const DOCUMENT: &str =
        "alpha alpha alpha words. beta beta beta words. gamma gamma gamma words here.";

    #[tokio::test]
    async fn retrieve_before_initialize_reports_not_ready() {
        let retriever =
            Retriever::new(Arc::new(KeywordEmbedder::new()), &test_config()).unwrap();

        let err = retriever.retrieve("anything").await.unwrap_err();
        assert!(matches!(err, QaError::NotReady));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let retriever = Retriever::new(embedder.clone(), &test_config()).unwrap();

        retriever.initialize(DOCUMENT).await.unwrap();
        let first = retriever.status().await;

        retriever.initialize(DOCUMENT).await.unwrap();
        let second = retriever.status().await;

        assert_eq!(first, second);
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retrieve_surfaces_the_matching_chunk_first() {
        let retriever =
            Retriever::new(Arc::new(KeywordEmbedder::new()), &test_config()).unwrap();
        retriever.initialize(DOCUMENT).await.unwrap();

        let results = retriever.retrieve_top("beta beta", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk.text.contains("beta"));
    }

    #[tokio::test]
    async fn failed_build_leaves_index_unbuilt() {
        let retriever = Retriever::new(Arc::new(FailingEmbedder), &test_config()).unwrap();

        let err = retriever.initialize(DOCUMENT).await.unwrap_err();
        assert!(matches!(err, QaError::EmbeddingService(_)));
        assert_eq!(retriever.status().await, IndexStatus::Failed);

        let err = retriever.retrieve("anything").await.unwrap_err();
        assert!(matches!(err, QaError::NotReady));
    }

    #[tokio::test]
    async fn empty_document_builds_an_empty_index() {
        let retriever =
            Retriever::new(Arc::new(KeywordEmbedder::new()), &test_config()).unwrap();
        retriever.initialize("").await.unwrap();

        assert_eq!(retriever.status().await, IndexStatus::Ready { chunks: 0 });
        assert!(retriever.retrieve("anything").await.unwrap().is_empty());
    }
}
