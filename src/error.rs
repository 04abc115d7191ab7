// src/error.rs
// FOCUS PANEL - ERROR TYPES

use thiserror::Error;

/// Failures at the text-generation boundary.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("provider '{provider}' returned status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("rate limited by '{provider}' after {attempts} attempts")]
    RateLimited { provider: String, attempts: usize },
    #[error("circuit open for '{provider}', retry in {retry_in_secs:.1}s")]
    CircuitOpen { provider: String, retry_in_secs: f64 },
    #[error("invalid completion payload: {0}")]
    InvalidResponse(String),
    #[error("missing API key: set {0}")]
    MissingApiKey(String),
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Http(err.to_string())
    }
}

/// Errors raised by persona generation and discussion simulation.
#[derive(Debug, Error)]
pub enum FocusGroupError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("unsatisfiable demographic constraints: {0}")]
    UnsatisfiableConstraints(String),
    #[error("diversity repair failed: {}", .0.join("; "))]
    DiversityRepair(Vec<String>),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T, E = FocusGroupError> = std::result::Result<T, E>;
