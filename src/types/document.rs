//! Document and chunk types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Lifecycle state of a document as it moves through ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Accepted from the upload collaborator, not yet processed
    Uploaded,
    /// Being split into chunks
    Chunking,
    /// Chunks are being embedded
    Embedding,
    /// All chunks and vectors are visible in the index
    Indexed,
    /// A step failed; the index holds the pre-ingest state for this id
    Failed { reason: String },
}

/// Input supplied by the upload collaborator. Text extraction happens
/// upstream; this carries plain text only.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Stable document identity; re-ingesting the same id replaces it
    pub id: Uuid,
    /// Where the text came from (path, URL, upload name)
    pub source_uri: String,
    /// Extracted plain text
    pub raw_text: String,
}

impl NewDocument {
    pub fn new(id: Uuid, source_uri: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id,
            source_uri: source_uri.into(),
            raw_text: raw_text.into(),
        }
    }
}

/// A document tracked by the pipeline's registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Source URI as supplied on upload
    pub source_uri: String,
    /// Content hash, used to detect unchanged re-ingests
    pub content_hash: String,
    /// Number of chunks currently indexed for this document
    pub total_chunks: usize,
    /// Ingestion timestamp
    pub ingested_at: DateTime<Utc>,
    /// Lifecycle state
    pub status: DocumentStatus,
}

impl Document {
    /// Create a registry entry for a freshly uploaded document
    pub fn new(source: &NewDocument) -> Self {
        Self {
            id: source.id,
            source_uri: source.source_uri.clone(),
            content_hash: content_hash(&source.raw_text),
            total_chunks: 0,
            ingested_at: Utc::now(),
            status: DocumentStatus::Uploaded,
        }
    }
}

/// SHA-256 hex digest of document text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// A bounded contiguous slice of a document's text, the unit of embedding
/// and retrieval. Derived deterministically by the chunker and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Position within the parent document
    pub sequence_index: usize,
    /// Text content
    pub text: String,
    /// Offsets into the original document text. Consecutive chunks overlap
    /// by exactly the configured chunk overlap except at document
    /// boundaries, so de-overlapping by offset reconstructs the original.
    pub char_start: usize,
    pub char_end: usize,
}

impl Chunk {
    pub fn new(
        document_id: Uuid,
        sequence_index: usize,
        text: String,
        char_start: usize,
        char_end: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            sequence_index,
            text,
            char_start,
            char_end,
        }
    }
}
