//! Question answering over the retrieved context.
//!
//! Stateless per-call pipeline: retrieve, assemble the prompt under the
//! context budget, call the generation model. The only cross-call state is
//! the once-built index owned by the retriever.
//!
//! The out-of-scope policy has two layers. The prompt instructs the model to
//! refuse questions the context cannot answer (a soft, model-enforced
//! constraint), and an empty retrieval short-circuits to the refusal message
//! without spending a generation call at all.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::QaConfig;
use crate::error::{QaError, Result};
use crate::generation::Generator;
use crate::index::ScoredChunk;
use crate::retriever::{IndexStatus, Retriever};

pub const EMPTY_QUESTION_MESSAGE: &str =
    "Please enter a question about the season's player data.";

/// Separator placed between chunk texts in the prompt context.
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Players who entered the league after the covered season; mentioning one
/// is a strong sign the question is out of scope.
const POST_SEASON_PLAYERS: &[&str] = &["haaland", "nunez", "antony", "casemiro", "tchouameni"];

/// The answer to one question, with the advisory scope warnings that fired
/// and how many document chunks backed it.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub warnings: Vec<String>,
    pub supporting_chunks: usize,
}

pub struct QaSystem {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
    season: String,
    season_end_year: Option<i32>,
    max_context_chars: usize,
}

impl QaSystem {
    pub fn new(retriever: Arc<Retriever>, generator: Arc<dyn Generator>, config: &QaConfig) -> Self {
        Self {
            retriever,
            generator,
            season: config.season.clone(),
            season_end_year: config.season_end_year(),
            max_context_chars: config.max_context_chars,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answers one question end to end.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(Answer {
                text: EMPTY_QUESTION_MESSAGE.to_string(),
                warnings: Vec::new(),
                supporting_chunks: 0,
            });
        }

        let warnings = self.scope_warnings(question);
        for warning in &warnings {
            tracing::info!(warning = %warning, "question scope warning");
        }

        let retrieved = self.retriever.retrieve(question).await?;
        if retrieved.is_empty() {
            tracing::info!("no relevant context retrieved, skipping generation");
            return Ok(Answer {
                text: self.out_of_scope_message(),
                warnings,
                supporting_chunks: 0,
            });
        }

        let kept = fit_context(retrieved, self.max_context_chars);
        let context = kept
            .iter()
            .map(|result| result.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let prompt = self.build_prompt(&context, question);
        let text = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| QaError::Generation(format!("{e:#}")))?;

        Ok(Answer {
            text,
            warnings,
            supporting_chunks: kept.len(),
        })
    }

    /// The fixed refusal returned when the document has nothing relevant.
    pub fn out_of_scope_message(&self) -> String {
        format!(
            "I can only answer questions about the {} FPL season, and the document \
             does not contain information relevant to this question.",
            self.season
        )
    }

    /// Advisory screen for questions that look like they reach outside the
    /// covered season: later years, current-data phrasing, or players who
    /// joined the league afterwards. Warnings never block the question.
    pub fn scope_warnings(&self, question: &str) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(end_year) = self.season_end_year {
            for caps in year_regex().captures_iter(question) {
                if let Ok(year) = caps[1].parse::<i32>() {
                    if year > end_year {
                        warnings.push(format!(
                            "the question mentions {year}, but the data covers the {} season",
                            self.season
                        ));
                    }
                }
            }
        }

        if recency_regex().is_match(question) {
            warnings.push(format!(
                "the question asks about current or recent data, but the data covers the {} season",
                self.season
            ));
        }

        let lowered = question.to_lowercase();
        for player in POST_SEASON_PLAYERS {
            if lowered.contains(player) {
                let mut display = player.to_string();
                display[..1].make_ascii_uppercase();
                warnings.push(format!(
                    "{display} was not in the league during the {} season",
                    self.season
                ));
            }
        }

        warnings
    }

    pub async fn stats(&self) -> serde_json::Value {
        let (status, chunks) = match self.retriever.status().await {
            IndexStatus::Empty => ("not_ready", 0),
            IndexStatus::Ready { chunks } => ("ready", chunks),
            IndexStatus::Failed => ("failed", 0),
        };

        serde_json::json!({
            "status": status,
            "chunks": chunks,
            "season": self.season,
        })
    }

    fn build_prompt(&self, context: &str, question: &str) -> String {
        format!(
            "You are a Fantasy Premier League (FPL) expert assistant. Use the pieces of \
             context below to answer the question about player data, teams, positions, \
             costs, and points.\n\
             \n\
             IMPORTANT: the data you have is from the {season} FPL season only. If the \
             context does not contain the information needed to answer, or the question \
             asks about another season or current data, reply with exactly: \"{refusal}\"\n\
             \n\
             Context:\n\
             {context}\n\
             \n\
             Question: {question}\n\
             \n\
             Provide a helpful and accurate answer based on the FPL data above. Include \
             specific player names, costs, and points when relevant.",
            season = self.season,
            refusal = self.out_of_scope_message(),
        )
    }
}

/// Drops whole chunks, lowest score first, until the concatenated context
/// fits the budget. A chunk is never truncated mid-text; the configuration
/// guarantees the budget fits at least one chunk, so the best result always
/// survives.
fn fit_context(mut results: Vec<ScoredChunk>, budget: usize) -> Vec<ScoredChunk> {
    let total = |results: &[ScoredChunk]| -> usize {
        results
            .iter()
            .map(|r| r.chunk.text.chars().count())
            .sum::<usize>()
            + results.len().saturating_sub(1) * CONTEXT_SEPARATOR.len()
    };

    while results.len() > 1 && total(&results) > budget {
        // Results arrive best-first, so the tail is the cheapest to lose.
        if let Some(dropped) = results.pop() {
            tracing::debug!(
                chunk = dropped.chunk.id,
                score = dropped.score,
                "dropped chunk to fit context budget"
            );
        }
    }

    results
}

fn year_regex() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"\b(20\d{2})\b").expect("valid year pattern"))
}

fn recency_regex() -> &'static Regex {
    static RECENCY: OnceLock<Regex> = OnceLock::new();
    RECENCY.get_or_init(|| {
        Regex::new(r"(?i)\b(current(ly)?|now|today|latest|recent|this season)\b")
            .expect("valid recency pattern")
    })
}
