//! quiz-rag: RAG pipeline for multiple-choice question generation
//!
//! This crate ingests free-text documents, indexes them for semantic
//! retrieval, and uses a retrieval-augmented pipeline to synthesize
//! structured multiple-choice questions via a locally hosted language model.
//!
//! The pipeline is built from narrow, swappable pieces: a deterministic
//! [`ingestion::TextChunker`], provider traits for embeddings and LLM
//! completion (with Ollama implementations), a SQLite-backed
//! [`index::VectorIndex`] with per-document atomic replacement, a
//! threshold-and-dedup [`retrieval::Retriever`], and a
//! [`generation::QuestionGenerator`] that coerces free-form model output
//! into a strict question schema with a bounded retry budget.
//! [`pipeline::RagPipeline`] wires them together.

pub mod config;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use pipeline::RagPipeline;
pub use types::{
    document::{Chunk, Document, DocumentStatus, NewDocument},
    query::{GenerateRequest, RetrievalResult},
    question::QuestionSpec,
};
