//! Error types for Bastion.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! the two external collaborators (search and dialogue) and prompt assembly.
//! Policy violations are not errors: the pipeline turns them into flagged
//! answers.

use thiserror::Error;

/// Unified error type for Bastion.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The search collaborator does not know the requested corpus
    #[error("Corpus not found: {corpus_id}")]
    CorpusNotFound { corpus_id: String },

    /// Search collaborator unreachable or timed out
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Search collaborator answered with something we cannot use
    #[error("Retrieval protocol error: {0}")]
    RetrievalProtocol(String),

    /// Dialogue collaborator unreachable or timed out
    #[error("Dialogue unavailable: {0}")]
    DialogueUnavailable(String),

    /// Dialogue collaborator answered with something we cannot use
    #[error("Dialogue protocol error: {0}")]
    DialogueProtocol(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether a single bounded retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::RetrievalUnavailable(_) | AppError::DialogueUnavailable(_)
        )
    }

    /// Whether the caller can fix the request and resubmit it.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, AppError::CorpusNotFound { .. })
    }

    /// Caller-facing guidance for this error.
    pub fn user_message(&self) -> String {
        match self {
            AppError::CorpusNotFound { corpus_id } => format!(
                "Corpus '{}' does not exist. Choose a valid corpus (for example 'common_dataset') and ask again.",
                corpus_id
            ),
            AppError::RetrievalUnavailable(_) => {
                "The document search service is temporarily unavailable. Please retry later."
                    .to_string()
            }
            AppError::DialogueUnavailable(_) => {
                "The dialogue service is temporarily unavailable. Please retry later.".to_string()
            }
            AppError::RetrievalProtocol(_) | AppError::DialogueProtocol(_) => {
                "An upstream service returned an invalid response. The failure has been logged."
                    .to_string()
            }
            other => format!("The request could not be completed: {}", other),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
