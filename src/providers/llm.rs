//! LLM completion provider trait

use async_trait::async_trait;

use crate::error::Result;

/// Trait for raw text completion against a language model
///
/// The generator treats the returned text as untrusted and parses it into
/// the question schema itself; implementations only move bytes.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a prompt, returning the raw model output
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Model identifier used for generation
    fn model(&self) -> &str;
}
