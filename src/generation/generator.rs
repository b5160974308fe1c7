//! Question generation with a bounded parse-and-validate retry loop

use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::types::question::{QuestionSpec, SchemaViolation};
use crate::types::RetrievalResult;

use super::parser;
use super::prompt::PromptBuilder;

/// Generates validated multiple-choice questions from retrieved context.
///
/// Parsing and validation retries are local to this component: callers see
/// either a full set of valid specs or, once the attempt budget is spent,
/// a `GenerationValidation` error carrying the final attempt's violations
/// and raw output. Transport failures are not retried here; the provider
/// owns its own bounded transport retry.
pub struct QuestionGenerator {
    llm: Arc<dyn LlmProvider>,
    config: GenerationConfig,
}

impl QuestionGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: GenerationConfig) -> Self {
        Self { llm, config }
    }

    /// Generate exactly `count` valid questions from the given context
    pub async fn generate_questions(
        &self,
        context: &[RetrievalResult],
        count: usize,
    ) -> Result<Vec<QuestionSpec>> {
        if count == 0 {
            return Err(Error::InvalidArgument(
                "question count must be positive".to_string(),
            ));
        }
        if context.is_empty() {
            return Err(Error::InsufficientContext);
        }

        let window = PromptBuilder::build_context(context, self.config.max_context_chars);

        let mut accepted: Vec<QuestionSpec> = Vec::new();
        let mut last_violations: Vec<String> = Vec::new();
        let mut last_output = String::new();

        for attempt in 1..=self.config.max_attempts {
            let remaining = count - accepted.len();
            let prompt = if attempt == 1 {
                PromptBuilder::build_question_prompt(&window.text, remaining)
            } else {
                PromptBuilder::build_corrective_prompt(&window.text, remaining, &last_violations)
            };

            tracing::debug!(
                attempt,
                remaining,
                model = self.llm.model(),
                "requesting questions"
            );
            let raw = self.llm.complete(&prompt).await?;

            let outcome = parser::parse_questions(&raw);
            let mut violations: Vec<String> =
                outcome.violations.iter().map(ToString::to_string).collect();

            for mut spec in outcome.specs {
                let spec_violations = spec.violations();
                if !spec_violations.is_empty() {
                    violations.extend(spec_violations.iter().map(ToString::to_string));
                    continue;
                }
                if accepted
                    .iter()
                    .any(|q| q.question_text == spec.question_text)
                {
                    violations.push(
                        SchemaViolation::DuplicateQuestion {
                            text: spec.question_text.clone(),
                        }
                        .to_string(),
                    );
                    continue;
                }
                spec.source_chunk_ids = window.chunk_ids.clone();
                accepted.push(spec);
            }

            if accepted.len() >= count {
                accepted.truncate(count);
                tracing::info!(count, attempts = attempt, "question generation complete");
                return Ok(accepted);
            }

            if violations.is_empty() {
                violations.push(format!(
                    "model produced {} of {} requested questions",
                    accepted.len(),
                    count
                ));
            }
            tracing::warn!(
                attempt,
                valid = accepted.len(),
                needed = count,
                "model output failed validation"
            );
            last_violations = violations;
            last_output = raw;
        }

        Err(Error::GenerationValidation {
            attempts: self.config.max_attempts,
            violations: last_violations,
            last_output,
        })
    }
}
