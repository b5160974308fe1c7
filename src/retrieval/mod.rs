//! Semantic retrieval over the vector index

pub mod retriever;

pub use retriever::Retriever;
