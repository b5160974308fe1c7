//! Domain types for documents, retrieval, and generated questions

pub mod document;
pub mod query;
pub mod question;

pub use document::{Chunk, Document, DocumentStatus, NewDocument};
pub use query::{GenerateRequest, RetrievalResult};
pub use question::{QuestionSpec, SchemaViolation};
