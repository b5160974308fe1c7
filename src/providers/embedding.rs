//! Embedding provider trait

use async_trait::async_trait;

use crate::error::Result;

/// Trait for converting text into fixed-length vectors
///
/// Implementations must be order-preserving: the nth output vector embeds
/// the nth input text. Callers are responsible for caching.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, order-preserving.
    ///
    /// Implementations batch internally to bound memory and backend load;
    /// the default calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Embedding dimensionality, fixed per model
    fn dimensions(&self) -> usize;

    /// Stable model identifier recorded alongside stored vectors
    fn model_id(&self) -> &str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool>;
}
