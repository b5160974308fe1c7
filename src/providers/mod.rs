//! Provider abstractions for embeddings and LLM completion
//!
//! Narrow trait seams let the pipeline swap backends (local Ollama daemon,
//! remote API, test fixtures) via dependency injection.

pub mod embedding;
pub mod llm;
pub mod ollama;

pub use embedding::EmbeddingProvider;
pub use llm::LlmProvider;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLlm};
