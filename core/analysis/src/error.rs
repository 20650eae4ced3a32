use thiserror::Error;

/// Failure kinds of the analysis pipeline
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidTransition(String),

    /// Model call failed or replied with something unusable
    #[error("model request failed: {0:#}")]
    Upstream(anyhow::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
