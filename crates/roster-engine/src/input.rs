//! Parsed grading input, as typed into the score and exam-code boxes.

use roster_model::normalize::parse_score_text;
use roster_model::ValidationError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScoreInput {
    /// Leave the score as it is.
    Keep,
    Clear,
    /// A score typed directly. Must be within `[0, 10]`.
    Direct(f64),
    /// Number of correct answers, converted with the configured scoring.
    CorrectCount(u32),
}

impl ScoreInput {
    /// Parse a directly typed score. Blank input keeps the current score.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(ScoreInput::Keep);
        }
        parse_score_text(text)
            .map(ScoreInput::Direct)
            .ok_or_else(|| ValidationError::NonNumericScore(text.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExamCodeInput {
    /// Leave the exam code as it is.
    Keep,
    Clear,
    Set(String),
}

impl ExamCodeInput {
    /// Blank keeps the current code, `x` clears it, anything else must be a whole number.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(ExamCodeInput::Keep);
        }
        if text.eq_ignore_ascii_case("x") {
            return Ok(ExamCodeInput::Clear);
        }
        text.parse::<u64>()
            .map(|code| ExamCodeInput::Set(code.to_string()))
            .map_err(|_| ValidationError::NonNumericExamCode(text.to_string()))
    }
}
