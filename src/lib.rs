//! Retrieval-augmented question answering over one Fantasy Premier League
//! season PDF.
//!
//! The document is chunked, embedded, and indexed in memory once per process
//! lifetime; each question then embeds once, pulls the top-k most similar
//! chunks, and hands a budgeted prompt to the generation model. Everything
//! remote (embeddings, generation) sits behind a trait boundary.

pub mod chunker;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod index;
pub mod qa;
pub mod retriever;
mod retry;
pub mod server;

pub use chunker::{Chunk, ChunkingConfig, chunk_text};
pub use config::QaConfig;
pub use embeddings::{Embedder, OpenAiEmbedder};
pub use error::QaError;
pub use generation::{Generator, OpenAiGenerator};
pub use index::{ScoredChunk, VectorIndex};
pub use qa::{Answer, QaSystem};
pub use retriever::{IndexStatus, Retriever};
