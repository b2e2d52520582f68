//! Error types for algoquest-progress

use thiserror::Error;

/// Result type for progress operations
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Progress engine error types
#[derive(Error, Debug)]
pub enum ProgressError {
    /// Mutation referenced a problem with no record
    #[error("Unknown problem: {0}")]
    UnknownProblem(String),

    /// Achievement id not in the catalogue
    #[error("Unknown achievement: {0}")]
    UnknownAchievement(String),

    /// Energy score outside 1..=10
    #[error("Energy score must be between 1 and 10, got {0}")]
    InvalidEnergyScore(u8),

    /// Any other rejected input at the mutation boundary
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Local cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Remote store error
    #[error("Remote error: {0}")]
    Remote(String),

    /// Remote store answered with a non-success status
    #[error("Remote returned HTTP {status}: {message}")]
    Server { status: u16, message: String },

    /// Remote operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Service loop is gone
    #[error("Progress service has shut down")]
    Shutdown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ProgressError {
    fn from(err: serde_json::Error) -> Self {
        ProgressError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for ProgressError {
    fn from(err: rusqlite::Error) -> Self {
        ProgressError::Cache(err.to_string())
    }
}

impl From<reqwest::Error> for ProgressError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProgressError::Timeout(err.to_string())
        } else {
            ProgressError::Remote(err.to_string())
        }
    }
}
