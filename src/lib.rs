//! Retrieval-augmented documentation summarizer
//!
//! Retrieves ranked passages for a query, fits them into the model's context
//! window with a greedy token budgeter, and asks the model for a grounded
//! answer together with the list of source documents that were used.

pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod retrieval;
pub mod summarizer;

pub use config::{Config, ModelLimits, ModelLimitsProvider, SharedConfig};
pub use context::{
    BudgetedContext, BudgetedPassage, ContextBudgeter, RetrievedPassage, TiktokenTokenizer,
    TokenBudget, Tokenizer, WhitespaceTokenizer,
};
pub use error::{PipelineError, Result};
pub use llm::{ChatModel, Completion, LlmError, OpenAiChatModel, PromptTemplate, TokenUsage};
pub use metrics::{Metrics, TokenUsageRecorder, METRICS};
pub use retrieval::{
    Embedder, HttpEmbedder, QdrantRetriever, Retriever, RetrieverError, StaticRetriever,
};
pub use summarizer::{DocsSummarizer, SummarizeOptions, SummaryResult, NO_REFERENCE_DISCLAIMER};
