//! In-memory vector index over the season document.
//!
//! Built exactly once from the full chunk set and read-only afterwards.
//! Search is a brute-force scan over every stored vector; the corpus is one
//! document, so linear time per query beats the bookkeeping of an
//! approximate structure, and nothing in the interface would stop one from
//! being swapped in later. Vectors are unit-normalized at insert, which
//! turns cosine similarity into a plain dot product.

use serde::Serialize;

use crate::chunker::Chunk;
use crate::embeddings::Embedder;
use crate::error::{QaError, Result};

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

#[derive(Debug)]
pub struct VectorIndex {
    dim: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embeds every chunk in one batch call and stores the vectors zipped
    /// 1:1 with the chunks in input order. An embedder failure, a count
    /// mismatch, or a wrong dimensionality aborts the build.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder, dim: usize) -> Result<Self> {
        if chunks.is_empty() {
            tracing::warn!("building index over zero chunks; every search will come back empty");
            return Ok(Self {
                dim,
                entries: Vec::new(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| QaError::EmbeddingService(format!("{e:#}")))?;

        if embeddings.len() != chunks.len() {
            return Err(QaError::EmbeddingService(format!(
                "received {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, mut embedding) in chunks.into_iter().zip(embeddings) {
            if embedding.len() != dim {
                return Err(QaError::EmbeddingService(format!(
                    "chunk {} embedding has dimension {}, expected {}",
                    chunk.id,
                    embedding.len(),
                    dim
                )));
            }
            normalize(&mut embedding);
            entries.push(IndexEntry { chunk, embedding });
        }

        tracing::info!(chunks = entries.len(), dim, "vector index built");
        Ok(Self { dim, entries })
    }

    /// Returns the `k` most similar chunks, best first. Equal scores are
    /// ordered by ascending chunk id so results are reproducible. An empty
    /// index yields an empty result rather than an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(QaError::Retrieval(format!(
                "query vector has dimension {}, index expects {}",
                query.len(),
                self.dim
            )));
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: dot_product(&query, &entry.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

/// Normalize a vector to unit length in place. A vector with a near-zero
/// norm is left unchanged.
fn normalize(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 1e-20 {
        let norm = norm_sq.sqrt();
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[inline(always)]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
