use async_trait::async_trait;

use super::Embedding;
use crate::error::IncidentResult;

/// Source of description embeddings
///
/// Implementations map transport failures to
/// [`IncidentError::EmbeddingUnavailable`](crate::error::IncidentError::EmbeddingUnavailable)
/// and malformed responses to `Internal`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier sent to the provider
    fn model_name(&self) -> String;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Embed a single text
    async fn embed(&self, text: &str) -> IncidentResult<Embedding>;
}
