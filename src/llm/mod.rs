//! Model invocation
//!
//! The pipeline only needs `(context, query) -> text`; prompt rendering and
//! transport belong to the [`ChatModel`] implementation.

pub mod openai;
pub mod prompt;

pub use openai::{ChatModelConfig, OpenAiChatModel};
pub use prompt::{PromptTemplate, DEFAULT_CHAT_PROMPT};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token usage reported for a single call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A model answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Not every backend reports usage
    pub usage: Option<TokenUsage>,
}

/// Language model behind the summarizer
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Template used to turn `(context, query)` into the prompt
    fn prompt_template(&self) -> &PromptTemplate;

    /// Answer `query` grounded in `context`
    async fn invoke(&self, context: &str, query: &str) -> Result<Completion, LlmError>;
}

/// Model call errors
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
