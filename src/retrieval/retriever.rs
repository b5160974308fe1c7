//! Query embedding, ranking, and filtering policy
//!
//! The retriever embeds a query, asks the index for nearest chunks, drops
//! low-relevance matches, and collapses near-duplicate neighbors that come
//! from overlapping chunks of the same document. An empty result is a
//! legitimate outcome, not an error: callers decide what "no context"
//! means for them.

use std::sync::Arc;
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::index::{IndexHit, VectorIndex};
use crate::providers::EmbeddingProvider;
use crate::types::RetrievalResult;

/// Retriever combining the embedder and the vector index
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Retrieve up to `top_k` relevant chunks for a query
    pub async fn retrieve(
        &self,
        query_text: &str,
        top_k: usize,
        filter: Option<&[Uuid]>,
    ) -> Result<Vec<RetrievalResult>> {
        let query_vector = self.embedder.embed(query_text).await?;

        // Overfetch so threshold and dedup filtering can still fill top_k.
        let fetch_k = top_k.saturating_mul(2).max(top_k);
        let hits = self.index.query(&query_vector, fetch_k, filter)?;

        let total = hits.len();
        let kept = self.apply_policy(hits, top_k);
        tracing::debug!(
            query = query_text,
            candidates = total,
            kept = kept.len(),
            "retrieval complete"
        );

        Ok(kept
            .into_iter()
            .map(|hit| RetrievalResult {
                chunk_id: hit.chunk_id,
                document_id: hit.document_id,
                text: hit.text,
                score: hit.score,
            })
            .collect())
    }

    /// Drop sub-threshold matches, then collapse near-duplicates: a hit is
    /// redundant when an already-kept hit comes from an adjacent chunk of
    /// the same document and their scores differ by at most the configured
    /// epsilon. Hits arrive sorted best-first, so the higher-scoring (or on
    /// an exact tie, earlier-id) chunk of each adjacent pair survives.
    fn apply_policy(&self, hits: Vec<IndexHit>, top_k: usize) -> Vec<IndexHit> {
        let mut kept: Vec<IndexHit> = Vec::new();

        for hit in hits {
            if hit.score < self.config.min_score {
                continue;
            }

            let redundant = kept.iter().any(|prev| {
                prev.document_id == hit.document_id
                    && prev.sequence_index.abs_diff(hit.sequence_index) == 1
                    && (prev.score - hit.score).abs() <= self.config.dedup_epsilon
            });
            if redundant {
                continue;
            }

            kept.push(hit);
            if kept.len() == top_k {
                break;
            }
        }

        kept
    }
}
