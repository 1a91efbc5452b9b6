//! Retrieval of ranked passages from a vector index

pub mod embedder;
pub mod qdrant;

pub use embedder::{Embedder, HttpEmbedder};
pub use qdrant::QdrantRetriever;

use crate::context::RetrievedPassage;
use async_trait::async_trait;
use tracing::debug;

/// Retrieval errors
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    #[error("Vector store error: {0}")]
    Backend(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Source of ranked passages for a query
#[async_trait]
pub trait Retriever: Send + Sync {
    /// At most `top_k` passages, most relevant first
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrieverError>;
}

/// Fixed set of passages, ranked once at construction.
///
/// Ranking is a stable sort on descending score, so ties keep their
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    passages: Vec<RetrievedPassage>,
}

impl StaticRetriever {
    pub fn new(mut passages: Vec<RetrievedPassage>) -> Self {
        passages.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        Self { passages }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrieverError> {
        debug!(
            "Static retrieval for {:?}: top {} of {}",
            query,
            top_k,
            self.passages.len()
        );
        Ok(self.passages.iter().take(top_k).cloned().collect())
    }
}
