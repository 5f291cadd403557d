//! Error types for the triage_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for triage_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog validation error
    #[error("Catalog validation error: {0}")]
    CatalogValidation(String),

    /// No live session under the given id; recoverable and surfaced to
    /// the user as guidance
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Problem was identified but the catalog has no question list for it
    #[error("No questions available for '{0}'")]
    NoQuestions(String),

    /// Answer index outside the current question's options
    #[error("Answer index {index} out of range (question has {options} options)")]
    InvalidIndex { index: usize, options: usize },

    /// Every question has already been answered
    #[error("Session '{0}' has no questions left to answer")]
    SessionComplete(String),

    /// A submission was based on a stale view of the session
    #[error("Session '{session_id}' moved on: expected question {expected}, now at {actual}")]
    ConcurrentModification {
        session_id: String,
        expected: usize,
        actual: usize,
    },

    /// State management error
    #[error("State error: {0}")]
    State(String),
}

impl Error {
    /// True when the session id has no live session behind it
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::SessionNotFound(_))
    }
}
