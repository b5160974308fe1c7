//! Prompt templates and context packing for question generation

use uuid::Uuid;

use crate::types::RetrievalResult;

/// Retrieved context packed into the model's budget
#[derive(Debug, Clone)]
pub struct ContextWindow {
    /// Concatenated chunk texts, highest-scoring first
    pub text: String,
    /// Chunks that contributed, for traceability
    pub chunk_ids: Vec<Uuid>,
}

/// Prompt builder for question generation
pub struct PromptBuilder;

impl PromptBuilder {
    /// Pack retrieved chunks into a bounded context window.
    ///
    /// Chunks are taken highest-score first until the budget is spent. When
    /// even the best chunk exceeds the budget it is truncated rather than
    /// dropped, so generation always has something to work with.
    pub fn build_context(results: &[RetrievalResult], max_chars: usize) -> ContextWindow {
        let mut ranked: Vec<&RetrievalResult> = results.iter().collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        let mut text = String::new();
        let mut chunk_ids = Vec::new();

        for result in ranked {
            let separator = if text.is_empty() { 0 } else { 2 };
            if text.len() + separator + result.text.len() > max_chars {
                if text.is_empty() {
                    let cut = floor_char_boundary(&result.text, max_chars);
                    text.push_str(&result.text[..cut]);
                    chunk_ids.push(result.chunk_id);
                }
                break;
            }
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&result.text);
            chunk_ids.push(result.chunk_id);
        }

        ContextWindow { text, chunk_ids }
    }

    /// Build the question-generation prompt
    pub fn build_question_prompt(context: &str, count: usize) -> String {
        format!(
            r#"Create {count} multiple-choice questions from the document text below.

Document text:
"""
{context}
"""

For each question:
1. Ask something meaningful that tests understanding of the text
2. Write 4 options (A, B, C, D), similar in length and plausibility - only one may be correct
3. State which option is the correct answer
4. Add a brief explanation for the correct answer

Answer in exactly this format:

1. Question: [Clear, specific question]
A) [Option A]
B) [Option B]
C) [Option C]
D) [Option D]
Correct Answer: [Letter only: A, B, C, or D]
Explanation: [Why this answer is correct]

Create exactly {count} question(s) in this format, numbering each question clearly."#,
            count = count,
            context = context
        )
    }

    /// Build a corrective re-prompt that names the specific violations in
    /// the previous reply
    pub fn build_corrective_prompt(context: &str, count: usize, violations: &[String]) -> String {
        let problems = violations
            .iter()
            .map(|v| format!("- {}", v))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Your previous reply did not follow the required format. Problems found:
{problems}

Try again. {base}"#,
            problems = problems,
            base = Self::build_question_prompt(context, count)
        )
    }
}

fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}
