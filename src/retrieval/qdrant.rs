//! Passage retrieval from a Qdrant collection

use super::{Embedder, Retriever, RetrieverError};
use crate::config::VectorDbConfig;
use crate::context::RetrievedPassage;
use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{point_id::PointIdOptions, value::Kind, PointId, ScoredPoint, SearchPoints, Value},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Retriever over a collection of embedded document chunks
pub struct QdrantRetriever {
    client: QdrantClient,
    embedder: Arc<dyn Embedder>,
    config: VectorDbConfig,
}

impl QdrantRetriever {
    pub fn new(
        config: VectorDbConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RetrieverError> {
        let client = QdrantClient::from_url(&config.url).build().map_err(|e| {
            RetrieverError::Backend(format!("Failed to create Qdrant client: {}", e))
        })?;

        Ok(Self {
            client,
            embedder,
            config,
        })
    }

    pub fn config(&self) -> &VectorDbConfig {
        &self.config
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrieverError> {
        if query.trim().is_empty() {
            return Err(RetrieverError::InvalidQuery("query is empty".to_string()));
        }

        let vector = self.embedder.embed(query).await?;
        debug!(
            "Searching {} with a {}-dimensional query vector",
            self.config.collection_name,
            vector.len()
        );

        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.config.collection_name.clone(),
                vector,
                limit: top_k as u64,
                with_payload: Some(true.into()),
                score_threshold: self.config.score_threshold,
                ..Default::default()
            })
            .await
            .map_err(|e| RetrieverError::Backend(format!("Failed to search points: {}", e)))?;

        let passages: Vec<RetrievedPassage> = search_result
            .result
            .iter()
            .filter_map(|point| to_passage(point, &self.config))
            .collect();

        info!(
            "Retrieved {} of {} points from {}",
            passages.len(),
            search_result.result.len(),
            self.config.collection_name
        );

        Ok(passages)
    }
}

/// Points without text are dropped; a missing source falls back to the point id
fn to_passage(point: &ScoredPoint, config: &VectorDbConfig) -> Option<RetrievedPassage> {
    let text = match payload_str(&point.payload, &config.text_field) {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            warn!("Skipping point without {:?} payload", config.text_field);
            return None;
        }
    };

    let source_id = payload_str(&point.payload, &config.source_field)
        .or_else(|| point.id.as_ref().and_then(point_id_string))
        .unwrap_or_default();

    Some(RetrievedPassage {
        text,
        relevance_score: point.score,
        source_id,
    })
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn point_id_string(id: &PointId) -> Option<String> {
    match id.point_id_options.as_ref()? {
        PointIdOptions::Num(n) => Some(n.to_string()),
        PointIdOptions::Uuid(u) => Some(u.clone()),
    }
}
