//! Parsing free-form model output into structured question specs
//!
//! Model output is untrusted text. This parser recognizes the numbered
//! `Question / A)..D) / Correct Answer / Explanation` format the prompt
//! asks for, tolerating minor formatting drift (lowercase letters,
//! `A.` instead of `A)`, `Answer:` instead of `Correct Answer:`). It never
//! fabricates missing pieces: a block without four options or without a
//! stated correct answer becomes a schema violation, and the generator
//! decides whether to re-prompt.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::types::question::{QuestionSpec, SchemaViolation, OPTION_COUNT};

static QUESTION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\d+\s*[.)]|Question\s+\d+\s*:)").expect("valid regex")
});

static OPTION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Da-d])\s*[.)]\s*(.*)$").expect("valid regex"));

static CORRECT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:correct\s*answer|correct|answer)\s*:\s*\(?\s*([A-Da-d])")
        .expect("valid regex")
});

static EXPLANATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*explanation\s*:\s*(.*)$").expect("valid regex"));

static QUESTION_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:\d+\s*[.)])?\s*(?:question\s*\d*\s*:?)?\s*").expect("valid regex")
});

/// Result of parsing one model reply
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Candidate specs; callers must still check spec invariants
    pub specs: Vec<QuestionSpec>,
    /// Violations from blocks that could not be turned into specs
    pub violations: Vec<SchemaViolation>,
}

/// Parse raw model output into candidate question specs
pub fn parse_questions(raw: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    let blocks = split_blocks(raw);
    if blocks.is_empty() {
        outcome.violations.push(SchemaViolation::NoQuestionsFound);
        return outcome;
    }

    for (i, block) in blocks.iter().enumerate() {
        parse_block(block, i + 1, &mut outcome);
    }

    outcome
}

/// Split output into question blocks at numbered headers. Preamble before
/// the first header is ignored.
fn split_blocks(raw: &str) -> Vec<Vec<&str>> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();

    for line in raw.lines() {
        if QUESTION_START.is_match(line) && !OPTION_LINE.is_match(line) {
            blocks.push(vec![line]);
        } else if let Some(current) = blocks.last_mut() {
            current.push(line);
        }
    }

    blocks
}

enum Section {
    Question,
    Options,
    Explanation,
    Done,
}

fn parse_block(lines: &[&str], block_number: usize, outcome: &mut ParseOutcome) {
    let mut question_lines: Vec<&str> = Vec::new();
    let mut options: Vec<(char, String)> = Vec::new();
    let mut correct_letter: Option<char> = None;
    let mut explanation_lines: Vec<String> = Vec::new();
    let mut section = Section::Question;

    for &line in lines {
        if let Some(caps) = OPTION_LINE.captures(line) {
            let letter = caps[1].to_ascii_uppercase().chars().next().unwrap_or('A');
            options.push((letter, caps[2].trim().to_string()));
            section = Section::Options;
        } else if let Some(caps) = CORRECT_LINE.captures(line) {
            correct_letter = caps[1].to_ascii_uppercase().chars().next();
            section = Section::Done;
        } else if let Some(caps) = EXPLANATION_LINE.captures(line) {
            explanation_lines.push(caps[1].trim().to_string());
            section = Section::Explanation;
        } else {
            match section {
                Section::Question => question_lines.push(line),
                Section::Options => {
                    // continuation of a wrapped option line
                    if let Some((_, text)) = options.last_mut() {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            if !text.is_empty() {
                                text.push(' ');
                            }
                            text.push_str(trimmed);
                        }
                    }
                }
                Section::Explanation => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        explanation_lines.push(trimmed.to_string());
                    }
                }
                Section::Done => {}
            }
        }
    }

    let question_text = clean_question_text(&question_lines.join(" "));
    if question_text.is_empty() {
        outcome.violations.push(SchemaViolation::MissingQuestionText {
            block: block_number,
        });
        return;
    }

    if options.len() != OPTION_COUNT {
        outcome.violations.push(SchemaViolation::WrongOptionCount {
            found: options.len(),
        });
        return;
    }

    let correct_letter = match correct_letter {
        Some(letter) => letter,
        None => {
            outcome.violations.push(SchemaViolation::MissingCorrectAnswer {
                block: block_number,
            });
            return;
        }
    };

    let correct_option_index = match options.iter().position(|(l, _)| *l == correct_letter) {
        Some(index) => index,
        None => {
            outcome.violations.push(SchemaViolation::AnswerOutOfRange {
                index: (correct_letter as u8 - b'A') as usize,
            });
            return;
        }
    };

    let explanation = if explanation_lines.is_empty() {
        None
    } else {
        Some(explanation_lines.join(" "))
    };

    outcome.specs.push(QuestionSpec {
        id: Uuid::new_v4(),
        question_text,
        options: options.into_iter().map(|(_, text)| text).collect(),
        correct_option_index,
        explanation,
        source_chunk_ids: Vec::new(),
    });
}

/// Strip numbering and `Question:` labels from the question text
fn clean_question_text(text: &str) -> String {
    QUESTION_PREFIX.replace(text.trim(), "").trim().to_string()
}
