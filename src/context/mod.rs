//! Context assembly with token budget enforcement
//!
//! Fits ranked retrieval results into whatever part of the model's context
//! window is left after the prompt and the reserved response tokens.

pub mod budgeter;
pub mod models;
pub mod tokenizer;

pub use budgeter::{ContextBudgeter, DEFAULT_MINIMUM_CONTEXT_LIMIT};
pub use models::{BudgetedContext, BudgetedPassage, RetrievedPassage, TokenBudget};
pub use tokenizer::{TiktokenTokenizer, Tokenizer, WhitespaceTokenizer, DEFAULT_ENCODING};
