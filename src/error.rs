//! Error types shared across the storage, AI and core layers.

use thiserror::Error;

/// Storage collaborator failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("seed file error: {0}")]
    Seed(String),
}

/// LLM collaborator failures. All of them surface as upstream errors to callers.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("ANTHROPIC_API_KEY not set")]
    MissingApiKey,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Errors returned across the core boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        CoreError::Upstream(e.to_string())
    }
}

impl From<AiError> for CoreError {
    fn from(e: AiError) -> Self {
        CoreError::Upstream(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
