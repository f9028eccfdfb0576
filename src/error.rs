use thiserror::Error;

/// Failure taxonomy for the QA pipeline.
///
/// Startup-phase failures (configuration, document load, build-time
/// embedding) are fatal: no partial or degraded index is ever served.
/// Per-question failures (retrieval, generation) are isolated to the question
/// that triggered them and never invalidate the shared index.
#[derive(Debug, Error)]
pub enum QaError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to load season document: {0}")]
    DocumentLoad(String),

    #[error("embedding service failed during index build: {0}")]
    EmbeddingService(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("answer generation failed: {0}")]
    Generation(String),

    #[error("the document index is not ready yet")]
    NotReady,
}

impl QaError {
    /// Message suitable for showing to an end user, one per error kind so
    /// a failed question is diagnosable without reading server logs.
    pub fn user_message(&self) -> String {
        match self {
            QaError::Configuration(detail) => {
                format!("The service is misconfigured: {detail}")
            }
            QaError::DocumentLoad(_) => {
                "The season document could not be loaded.".to_string()
            }
            QaError::EmbeddingService(_) => {
                "The embedding service failed while indexing the season document.".to_string()
            }
            QaError::Retrieval(_) => {
                "Could not search the season document right now. Please try again.".to_string()
            }
            QaError::Generation(_) => {
                "The answer could not be generated. Please try again.".to_string()
            }
            QaError::NotReady => {
                "The document index is still being built. Please retry shortly.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, QaError>;
