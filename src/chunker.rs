//! Splits the extracted season document into overlapping, source-ordered
//! chunks.
//!
//! The window slides in character units and advances by
//! `chunk_size - chunk_overlap` per step. When a paragraph break, sentence
//! end, or whitespace falls within the breakpoint tolerance of the window
//! end, the cut lands there instead of severing a row of player data
//! mid-sentence; otherwise the cut is hard.

use std::ops::Range;

use serde::Serialize;

use crate::error::{QaError, Result};

/// A contiguous segment of the source document.
///
/// Ids are assigned by source position and never change afterwards. The span
/// is the byte range of the segment within the extracted text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: usize,
    pub text: String,
    pub span: Range<usize>,
}

/// Validated chunking geometry.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    chunk_size: usize,
    chunk_overlap: usize,
    breakpoint_tolerance: usize,
}

impl ChunkingConfig {
    /// Checks the geometry before any chunking work begins: both sizes must
    /// be positive, the overlap strictly smaller than the window, and the
    /// tolerance small enough that a pulled-back cut still advances the
    /// window past the overlap region.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        breakpoint_tolerance: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(QaError::Configuration(
                "chunk size must be positive".to_string(),
            ));
        }
        if chunk_overlap == 0 {
            return Err(QaError::Configuration(
                "chunk overlap must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(QaError::Configuration(format!(
                "chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        if breakpoint_tolerance >= chunk_size - chunk_overlap {
            return Err(QaError::Configuration(format!(
                "breakpoint tolerance ({breakpoint_tolerance}) must be smaller than the window advance ({})",
                chunk_size - chunk_overlap
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            breakpoint_tolerance,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

/// Chunks the full document text. Pure function of its inputs; empty input
/// yields an empty sequence, which downstream components treat as an empty
/// index rather than an error.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let total = chars.len();
    if total == 0 {
        return Vec::new();
    }

    let byte_at = |pos: usize| {
        if pos < total {
            chars[pos].0
        } else {
            text.len()
        }
    };

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = (start + config.chunk_size).min(total);
        let end = if hard_end < total {
            pick_breakpoint(&chars, start, hard_end, config)
        } else {
            hard_end
        };

        let span = byte_at(start)..byte_at(end);
        chunks.push(Chunk {
            id: chunks.len(),
            text: text[span.clone()].to_string(),
            span,
        });

        if end == total {
            break;
        }
        start = end - config.chunk_overlap;
    }

    chunks
}

/// Best cut position in `(floor, hard_end]`, preferring a paragraph break,
/// then a sentence end, then any whitespace. Falls back to `hard_end` when
/// nothing suitable is close enough. The floor keeps the cut past the
/// previous chunk's overlap region so the window always advances.
fn pick_breakpoint(
    chars: &[(usize, char)],
    start: usize,
    hard_end: usize,
    config: &ChunkingConfig,
) -> usize {
    let floor = hard_end
        .saturating_sub(config.breakpoint_tolerance)
        .max(start + config.chunk_overlap);

    let mut sentence = None;
    let mut whitespace = None;

    let mut pos = hard_end;
    while pos > floor {
        let c = chars[pos - 1].1;

        if c == '\n' && pos >= 2 && chars[pos - 2].1 == '\n' {
            return pos;
        }
        if sentence.is_none()
            && matches!(c, '.' | '!' | '?')
            && chars.get(pos).map_or(true, |&(_, next)| next.is_whitespace())
        {
            sentence = Some(pos);
        }
        if whitespace.is_none() && c.is_whitespace() {
            whitespace = Some(pos);
        }

        pos -= 1;
    }

    sentence.or(whitespace).unwrap_or(hard_end)
}
