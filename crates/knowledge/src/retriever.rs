//! Corpus retrieval with bounded retry.

use crate::provider::{SearchProvider, SearchRequest};
use bastion_core::{AppError, AppResult, RawHit, RetryPolicy};
use std::sync::Arc;

/// Fetches raw hits for a query from one corpus.
#[derive(Debug, Clone)]
pub struct Retriever {
    provider: Arc<dyn SearchProvider>,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(provider: Arc<dyn SearchProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// Search `corpus_id` for up to `top_k` hits.
    ///
    /// Transient failures are retried once; a second failure surfaces as
    /// `RetrievalUnavailable`. Protocol errors and unknown corpora are
    /// returned immediately.
    pub async fn search(
        &self,
        query: &str,
        corpus_id: &str,
        top_k: usize,
    ) -> AppResult<Vec<RawHit>> {
        let corpus_id = corpus_id.trim();
        if corpus_id.is_empty() {
            return Err(AppError::CorpusNotFound {
                corpus_id: String::new(),
            });
        }

        if top_k == 0 {
            return Err(AppError::Other("top_k must be at least 1".to_string()));
        }

        let request = SearchRequest {
            corpus_id: corpus_id.to_string(),
            query: query.to_string(),
            top_k,
        };

        tracing::debug!(
            "Searching corpus '{}' via {} (top_k={}, query_chars={})",
            corpus_id,
            self.provider.provider_name(),
            top_k,
            query.chars().count()
        );

        let result = self
            .retry
            .run("search", || self.provider.search(&request))
            .await;

        match &result {
            Ok(hits) => {
                tracing::info!("Retrieved {} hits from corpus '{}'", hits.len(), corpus_id);
            }
            Err(e @ AppError::RetrievalProtocol(_)) => {
                tracing::error!("Search protocol fault for corpus '{}': {}", corpus_id, e);
            }
            Err(e) => {
                tracing::warn!("Search failed for corpus '{}': {}", corpus_id, e);
            }
        }

        result
    }
}
