//! Retrieval and generation request types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A retrieved chunk with its similarity score. Ephemeral, produced per
/// query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Matched chunk ID
    pub chunk_id: Uuid,
    /// Owning document ID
    pub document_id: Uuid,
    /// Chunk text
    pub text: String,
    /// Cosine similarity (higher is better)
    pub score: f32,
}

/// Request for question generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Number of questions to produce
    pub count: usize,

    /// Retrieval query scoping which content the questions cover. When
    /// absent, a generic coverage query is used to sample the corpus.
    #[serde(default)]
    pub query: Option<String>,

    /// Number of chunks to retrieve (defaults to the configured top_k)
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Restrict retrieval to specific documents
    #[serde(default)]
    pub document_filter: Option<Vec<Uuid>>,
}

impl GenerateRequest {
    /// Create a request for `count` questions over the whole corpus
    pub fn new(count: usize) -> Self {
        Self {
            count,
            query: None,
            top_k: None,
            document_filter: None,
        }
    }

    /// Scope retrieval with a query
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Override the number of chunks retrieved
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Restrict retrieval to the given documents
    pub fn with_documents(mut self, doc_ids: Vec<Uuid>) -> Self {
        self.document_filter = Some(doc_ids);
        self
    }
}
