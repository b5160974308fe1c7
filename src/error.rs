//! Error types for the RAG pipeline

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid tunables, fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller misuse, rejected before any mutation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Vector dimensionality does not match the index
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding backend unavailable or returned a malformed response
    #[error("Embedding backend error: {0}")]
    Embedding(String),

    /// Language model timed out or is unreachable
    #[error("Language model unavailable: {0}")]
    ModelUnavailable(String),

    /// Model output never conformed to the question schema within the
    /// retry budget. Carries the violations seen on the final attempt and
    /// the last raw output for diagnosis.
    #[error("Generation failed validation after {attempts} attempts: {}", .violations.join("; "))]
    GenerationValidation {
        attempts: u32,
        violations: Vec<String>,
        last_output: String,
    },

    /// Retrieval produced no usable context for generation
    #[error("No relevant context retrieved for generation")]
    InsufficientContext,

    /// An ingest step failed; the document is marked failed and the index
    /// keeps its pre-ingest state for that document id
    #[error("Ingest failed for document {document_id} at {stage}: {message}")]
    Ingest {
        document_id: Uuid,
        stage: &'static str,
        message: String,
    },

    /// Vector index storage error
    #[error("Vector index error: {0}")]
    Index(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
