//! Error taxonomy for the summarization pipeline

use crate::llm::LlmError;
use crate::retrieval::RetrieverError;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced to callers of the pipeline.
///
/// Budgeting never produces an error: a zero or negative budget is a valid
/// input that yields an empty context.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unknown provider/model, missing window sizes or an unusable encoding
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The retrieval collaborator failed
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrieverError),

    /// The model-call collaborator failed
    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),
}

impl PipelineError {
    /// Shorthand for building a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::configuration("unknown model: foo");
        assert_eq!(err.to_string(), "Configuration error: unknown model: foo");

        let err: PipelineError = RetrieverError::Backend("connection refused".to_string()).into();
        assert!(matches!(err, PipelineError::Retrieval(_)));
        assert!(err.to_string().contains("connection refused"));

        let err: PipelineError = LlmError::Api("HTTP 500".to_string()).into();
        assert!(matches!(err, PipelineError::Generation(_)));
    }
}
