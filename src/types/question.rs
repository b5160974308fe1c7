//! Structured multiple-choice question types and schema validation

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of answer options every question must carry
pub const OPTION_COUNT: usize = 4;

/// A validated multiple-choice question produced by the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    /// Unique question ID
    pub id: Uuid,
    /// The question text
    pub question_text: String,
    /// Exactly four distinct, non-empty answer options in display order
    pub options: Vec<String>,
    /// Index of the correct option, in [0, 4)
    pub correct_option_index: usize,
    /// Brief explanation of the correct answer, when the model supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Retrieved chunks that contributed context, for traceability
    pub source_chunk_ids: Vec<Uuid>,
}

impl QuestionSpec {
    /// Check the schema invariants, returning every violation found.
    /// An empty vector means the spec is valid.
    pub fn violations(&self) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();

        if self.question_text.trim().is_empty() {
            violations.push(SchemaViolation::EmptyQuestion);
        }
        if self.options.len() != OPTION_COUNT {
            violations.push(SchemaViolation::WrongOptionCount {
                found: self.options.len(),
            });
        }
        for (i, option) in self.options.iter().enumerate() {
            if option.trim().is_empty() {
                violations.push(SchemaViolation::EmptyOption { index: i });
            }
        }
        for i in 0..self.options.len() {
            for j in (i + 1)..self.options.len() {
                if self.options[i].trim() == self.options[j].trim() {
                    violations.push(SchemaViolation::DuplicateOptions { first: i, second: j });
                }
            }
        }
        if self.correct_option_index >= OPTION_COUNT {
            violations.push(SchemaViolation::AnswerOutOfRange {
                index: self.correct_option_index,
            });
        }

        violations
    }

    /// True when the spec satisfies every invariant
    pub fn is_valid(&self) -> bool {
        self.violations().is_empty()
    }
}

/// A specific way in which parsed model output failed the question schema.
/// Fed back into the corrective re-prompt and reported on retry exhaustion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// No question blocks could be recognized in the output at all
    NoQuestionsFound,
    /// A block had no recognizable question text
    MissingQuestionText { block: usize },
    /// A block did not carry exactly four options
    WrongOptionCount { found: usize },
    /// An option was blank
    EmptyOption { index: usize },
    /// Two options were identical
    DuplicateOptions { first: usize, second: usize },
    /// No correct-answer letter was stated
    MissingCorrectAnswer { block: usize },
    /// The stated correct answer did not map into [0, 4)
    AnswerOutOfRange { index: usize },
    /// The question text was blank
    EmptyQuestion,
    /// A question duplicated one already accepted
    DuplicateQuestion { text: String },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoQuestionsFound => write!(f, "no questions found in output"),
            Self::MissingQuestionText { block } => {
                write!(f, "block {} has no question text", block)
            }
            Self::WrongOptionCount { found } => {
                write!(f, "exactly {} options required, found {}", OPTION_COUNT, found)
            }
            Self::EmptyOption { index } => {
                write!(f, "option {} is empty", option_letter(*index))
            }
            Self::DuplicateOptions { first, second } => write!(
                f,
                "options {} and {} are identical",
                option_letter(*first),
                option_letter(*second)
            ),
            Self::MissingCorrectAnswer { block } => {
                write!(f, "block {} states no correct answer", block)
            }
            Self::AnswerOutOfRange { index } => {
                write!(f, "correct answer index {} is out of range", index)
            }
            Self::EmptyQuestion => write!(f, "question text is empty"),
            Self::DuplicateQuestion { text } => {
                write!(f, "duplicate question: {}", text)
            }
        }
    }
}

/// Display letter for an option index (0 -> A)
pub fn option_letter(index: usize) -> char {
    (b'A' + (index as u8).min(25)) as char
}
