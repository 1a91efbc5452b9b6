//! Data models for context budgeting

use serde::{Deserialize, Serialize};

/// One retrieval hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    /// Higher is more relevant
    pub relevance_score: f32,
    /// Originating document, e.g. a URL
    pub source_id: String,
}

impl RetrievedPassage {
    pub fn new(
        text: impl Into<String>,
        relevance_score: f32,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            relevance_score,
            source_id: source_id.into(),
        }
    }
}

/// A passage admitted into the context, possibly cut on a word boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetedPassage {
    pub text: String,
    pub source_id: String,
}

impl From<&RetrievedPassage> for BudgetedPassage {
    fn from(passage: &RetrievedPassage) -> Self {
        Self {
            text: passage.text.clone(),
            source_id: passage.source_id.clone(),
        }
    }
}

/// Tokens available for retrieved content.
///
/// Signed: a prompt that already overflows the window leaves a negative budget,
/// which budgets to an empty context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenBudget(i64);

impl TokenBudget {
    pub fn new(tokens: i64) -> Self {
        Self(tokens)
    }

    /// `context_window_size - response_token_limit - prompt_overhead_tokens`
    pub fn compute(
        context_window_size: usize,
        response_token_limit: usize,
        prompt_overhead_tokens: usize,
    ) -> Self {
        Self(
            context_window_size as i64
                - response_token_limit as i64
                - prompt_overhead_tokens as i64,
        )
    }

    pub fn tokens(&self) -> i64 {
        self.0
    }

    /// Budget clamped at zero
    pub fn available(&self) -> usize {
        self.0.max(0) as usize
    }

    pub fn is_exhausted(&self) -> bool {
        self.0 <= 0
    }
}

impl From<i64> for TokenBudget {
    fn from(tokens: i64) -> Self {
        Self(tokens)
    }
}

/// Outcome of fitting passages into a budget
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetedContext {
    pub passages: Vec<BudgetedPassage>,
    pub tokens_used: usize,
    pub remaining: usize,
    /// Whether the last emitted passage was cut
    pub truncated: bool,
    /// Input passages that were not emitted
    pub skipped: usize,
}

impl BudgetedContext {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Join passage texts with a blank line, collecting sources in order
    pub fn format(&self) -> (String, Vec<String>) {
        let texts: Vec<&str> = self.passages.iter().map(|p| p.text.as_str()).collect();
        let sources = self.passages.iter().map(|p| p.source_id.clone()).collect();
        (texts.join("\n\n"), sources)
    }
}
