use crate::assessment::AssessmentTable;
use crate::error::{GradeError, Result};
use crate::models::{guard_formula, AnswerKey, QuestionAnswer, PERFECT_SCORE};

/// Build the answer key from the most recent row scoring exactly [`PERFECT_SCORE`].
pub fn extract(table: &AssessmentTable) -> Result<AnswerKey> {
    extract_with_score(table, PERFECT_SCORE)
}

pub fn extract_with_score(table: &AssessmentTable, perfect_score: &str) -> Result<AnswerKey> {
    let row = table
        .rows
        .iter()
        .rev()
        .find(|row| row.score == perfect_score)
        .ok_or(GradeError::NoPerfectScore {
            application: table.application,
        })?;

    if row.answers.len() != table.questions.len() {
        return Err(GradeError::ColumnMismatch {
            application: table.application,
            detail: format!(
                "answer-key row has {} answers for {} questions",
                row.answers.len(),
                table.questions.len()
            ),
        });
    }

    let questions_and_answers = table
        .questions
        .iter()
        .zip(&row.answers)
        .map(|(question, answer)| QuestionAnswer {
            question: question.clone(),
            answer: guard_formula(answer),
        })
        .collect();

    Ok(AnswerKey {
        application: table.application,
        timestamp: row.timestamp.clone(),
        score: row.score.clone(),
        questions_and_answers,
    })
}

/// Positional alignment check between a table and the key built for it.
pub fn check_alignment(key: &AnswerKey, table: &AssessmentTable) -> Result<()> {
    let expected: Vec<&str> = key.questions().collect();
    let found: Vec<&str> = table.questions.iter().map(String::as_str).collect();

    if expected.len() != found.len() {
        return Err(GradeError::ColumnMismatch {
            application: table.application,
            detail: format!("expected {} question columns, found {}", expected.len(), found.len()),
        });
    }
    if let Some(pos) = expected.iter().zip(&found).position(|(a, b)| a != b) {
        return Err(GradeError::ColumnMismatch {
            application: table.application,
            detail: format!(
                "column {} is '{}' but the answer key has '{}'",
                pos + 1,
                found[pos],
                expected[pos]
            ),
        });
    }
    if let Some(row) = table.rows.iter().find(|row| row.answers.len() != expected.len()) {
        return Err(GradeError::ColumnMismatch {
            application: table.application,
            detail: format!(
                "submission at {} has {} answers for {} questions",
                row.timestamp,
                row.answers.len(),
                expected.len()
            ),
        });
    }
    Ok(())
}
