//! End-to-end pipeline tests with mock remote backends.
//!
//! The embedder maps marker words onto vector axes so similarity is
//! predictable from the text alone; the generator records its calls and
//! returns a canned answer. No network involved.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use fpl_rag_qa::config::QaConfig;
use fpl_rag_qa::embeddings::Embedder;
use fpl_rag_qa::error::QaError;
use fpl_rag_qa::generation::Generator;
use fpl_rag_qa::qa::QaSystem;
use fpl_rag_qa::retriever::{IndexStatus, Retriever};

const KEYWORDS: [&str; 4] = ["goalkeeper", "defender", "midfielder", "forward"];

fn keyword_embedding(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    KEYWORDS
        .iter()
        .map(|kw| lowered.matches(kw).count() as f32)
        .collect()
}

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
        anyhow::bail!("embedding service down")
    }

    async fn embed_one(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding service down")
    }
}

struct CannedGenerator {
    calls: AtomicUsize,
    reply: &'static str,
}

impl CannedGenerator {
    fn new(reply: &'static str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply,
        }
    }
}

#[async_trait]
impl Generator for CannedGenerator {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.to_string())
    }
}

fn test_config() -> QaConfig {
    QaConfig {
        api_base_url: "http://localhost:9".to_string(),
        api_key: "test-key".to_string(),
        embedding_model: "test-embed".to_string(),
        chat_model: "test-chat".to_string(),
        temperature: 0.1,
        embedding_dim: 4,
        chunk_size: 60,
        chunk_overlap: 12,
        breakpoint_tolerance: 10,
        top_k: 2,
        max_context_chars: 400,
        request_timeout: Duration::from_secs(1),
        max_retries: 0,
        retry_base_delay: Duration::from_millis(1),
        season: "2019-20".to_string(),
        documents_dir: ".".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

const DOCUMENT: &str = "The goalkeeper list starts with Alisson, a goalkeeper costing 6.0 \
                        with 176 points. Ederson, goalkeeper, cost 6.0 as well.\n\n\
                        Among defenders, the defender Alexander-Arnold cost 7.0 and led \
                        every defender with 210 points that year.\n\n\
                        The midfielder group was led by Salah; no midfielder out-scored \
                        him, and the midfielder De Bruyne came close.\n\n\
                        Up front, the forward Vardy was the cheapest premium forward, and \
                        no forward matched his total.";

#[tokio::test]
async fn document_is_embedded_exactly_once_across_initializations() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let retriever = Arc::new(Retriever::new(embedder.clone(), &test_config()).unwrap());

    retriever.initialize(DOCUMENT).await.unwrap();
    let after_first = retriever.status().await;

    retriever.initialize(DOCUMENT).await.unwrap();
    let after_second = retriever.status().await;

    assert_eq!(after_first, after_second);
    assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 1);
    assert!(matches!(after_first, IndexStatus::Ready { chunks } if chunks > 0));
}

#[tokio::test]
async fn retrieval_surfaces_topically_matching_chunks() {
    let retriever = Arc::new(
        Retriever::new(Arc::new(KeywordEmbedder::new()), &test_config()).unwrap(),
    );
    retriever.initialize(DOCUMENT).await.unwrap();

    let results = retriever
        .retrieve_top("which goalkeeper was best", 1)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].chunk.text.to_lowercase().contains("goalkeeper"));

    let results = retriever.retrieve("tell me about a forward").await.unwrap();
    assert!(!results.is_empty());
    assert!(results[0].chunk.text.to_lowercase().contains("forward"));
}

#[tokio::test]
async fn answer_uses_generator_output_and_reports_support() {
    let config = test_config();
    let retriever = Arc::new(
        Retriever::new(Arc::new(KeywordEmbedder::new()), &config).unwrap(),
    );
    retriever.initialize(DOCUMENT).await.unwrap();

    let generator = Arc::new(CannedGenerator::new("Alisson, at 6.0, scored 176 points."));
    let qa = QaSystem::new(retriever, generator.clone(), &config);

    let answer = qa.answer("Who was the best goalkeeper?").await.unwrap();
    assert_eq!(answer.text, "Alisson, at 6.0, scored 176 points.");
    assert!(answer.supporting_chunks > 0);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_index_answers_out_of_scope_without_generating() {
    let config = test_config();
    let retriever = Arc::new(
        Retriever::new(Arc::new(KeywordEmbedder::new()), &config).unwrap(),
    );
    retriever.initialize("").await.unwrap();

    let generator = Arc::new(CannedGenerator::new("should never be used"));
    let qa = QaSystem::new(retriever, generator.clone(), &config);

    let answer = qa.answer("What is the capital of France?").await.unwrap();
    assert_eq!(answer.text, qa.out_of_scope_message());
    assert_eq!(answer.supporting_chunks, 0);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_build_rejects_questions_with_not_ready() {
    let config = test_config();
    let retriever = Arc::new(Retriever::new(Arc::new(FailingEmbedder), &config).unwrap());

    let err = retriever.initialize(DOCUMENT).await.unwrap_err();
    assert!(matches!(err, QaError::EmbeddingService(_)));

    let generator = Arc::new(CannedGenerator::new("should never be used"));
    let qa = QaSystem::new(retriever, generator.clone(), &config);

    let err = qa.answer("Who was the best goalkeeper?").await.unwrap_err();
    assert!(matches!(err, QaError::NotReady));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn questions_are_isolated_from_each_other() {
    struct FlakyGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for FlakyGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            // First call fails, later calls succeed.
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("model overloaded");
            }
            Ok("A fine answer.".to_string())
        }
    }

    let config = test_config();
    let retriever = Arc::new(
        Retriever::new(Arc::new(KeywordEmbedder::new()), &config).unwrap(),
    );
    retriever.initialize(DOCUMENT).await.unwrap();

    let qa = QaSystem::new(
        retriever,
        Arc::new(FlakyGenerator {
            calls: AtomicUsize::new(0),
        }),
        &config,
    );

    let err = qa.answer("Who was the best goalkeeper?").await.unwrap_err();
    assert!(matches!(err, QaError::Generation(_)));

    // The failed question must not have corrupted the shared index.
    let answer = qa.answer("Who was the best defender?").await.unwrap();
    assert_eq!(answer.text, "A fine answer.");
}

#[tokio::test]
async fn whitespace_question_never_reaches_retrieval() {
    let config = test_config();
    // Uninitialized retriever: any retrieval attempt would error NotReady.
    let retriever = Arc::new(
        Retriever::new(Arc::new(KeywordEmbedder::new()), &config).unwrap(),
    );

    let generator = Arc::new(CannedGenerator::new("should never be used"));
    let qa = QaSystem::new(retriever, generator.clone(), &config);

    let answer = qa.answer(" \t\n ").await.unwrap();
    assert!(!answer.text.is_empty());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}
