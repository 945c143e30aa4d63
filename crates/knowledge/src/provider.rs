//! Search provider trait.

use bastion_core::{AppResult, RawHit};
use serde::Serialize;

/// One search against one corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub corpus_id: String,
    pub query: String,
    pub top_k: usize,
}

/// Trait for search backends.
///
/// `search` performs a single round trip; retrying is the caller's concern.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "http")
    fn provider_name(&self) -> &str;

    /// Run one search and return the hits as reported, tagged with the corpus.
    async fn search(&self, request: &SearchRequest) -> AppResult<Vec<RawHit>>;
}
