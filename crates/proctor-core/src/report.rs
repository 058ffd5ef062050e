//! Result assembly: per-question evaluation, aggregation, and status routing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    AnswerSet, AttemptStatus, ExamDescriptor, ExamType, FinalizeReason, Question, QuestionKind,
};
use crate::scoring;

/// Essay aggregates at or above this confidence finalize as provisional;
/// anything below routes to a human reviewer.
pub const PROVISIONAL_CONFIDENCE: f64 = 0.7;

/// Evaluation of a single question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEvaluation {
    pub question_id: String,
    /// Percent credit in [0, 100].
    pub percent: u32,
    /// Heuristic confidence; `None` for objective questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Exact-match outcome; `None` for essay questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
}

/// The assembled outcome of one attempt. Computed once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub attempt_id: Uuid,
    pub per_question: Vec<QuestionEvaluation>,
    pub aggregate_percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_confidence: Option<f64>,
    pub status: AttemptStatus,
}

/// Payload handed to the external persistence collaborator on finalize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedRecord {
    pub attempt_id: Uuid,
    pub exam_id: String,
    pub student_id: String,
    /// The frozen answer set, partial or empty as it stood at finalize.
    pub answers: AnswerSet,
    pub aggregate_percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_confidence: Option<f64>,
    pub status: AttemptStatus,
    pub time_spent_secs: u64,
    pub finalized_at: DateTime<Utc>,
    pub reason: FinalizeReason,
}

/// Evaluate the frozen answer set against the bank and route a status.
///
/// The strategy is selected by exam type. Objective exams always finalize as
/// completed; essay exams finalize as provisional only when the mean
/// heuristic confidence clears [`PROVISIONAL_CONFIDENCE`], and otherwise
/// escalate to pending review. Partial or empty answer sets are scored as-is.
pub fn assemble(
    exam: &ExamDescriptor,
    attempt_id: Uuid,
    questions: &[Question],
    answers: &AnswerSet,
) -> EvaluationResult {
    let per_question: Vec<QuestionEvaluation> = questions
        .iter()
        .map(|q| evaluate_question(q, answers.get(&q.id).map(String::as_str)))
        .collect();

    match exam.exam_type {
        ExamType::Objective => {
            let matches = per_question
                .iter()
                .filter(|e| e.matched == Some(true))
                .count();
            let aggregate_percent = if per_question.is_empty() {
                0
            } else {
                (100.0 * matches as f64 / per_question.len() as f64).round() as u32
            };
            EvaluationResult {
                attempt_id,
                per_question,
                aggregate_percent,
                aggregate_confidence: None,
                status: AttemptStatus::Completed,
            }
        }
        ExamType::Essay => {
            let n = per_question.len();
            let aggregate_percent = if n == 0 {
                0
            } else {
                (per_question.iter().map(|e| f64::from(e.percent)).sum::<f64>() / n as f64)
                    .round() as u32
            };
            let aggregate_confidence = if n == 0 {
                0.0
            } else {
                per_question
                    .iter()
                    .map(|e| e.confidence.unwrap_or(0.0))
                    .sum::<f64>()
                    / n as f64
            };
            let status = if aggregate_confidence >= PROVISIONAL_CONFIDENCE {
                AttemptStatus::Provisional
            } else {
                AttemptStatus::PendingReview
            };
            EvaluationResult {
                attempt_id,
                per_question,
                aggregate_percent,
                aggregate_confidence: Some(aggregate_confidence),
                status,
            }
        }
    }
}

fn evaluate_question(question: &Question, submitted: Option<&str>) -> QuestionEvaluation {
    match &question.kind {
        QuestionKind::Objective {
            options,
            correct_option,
        } => {
            let matched = scoring::objective_match(options, *correct_option, submitted);
            QuestionEvaluation {
                question_id: question.id.clone(),
                percent: if matched { 100 } else { 0 },
                confidence: None,
                matched: Some(matched),
            }
        }
        QuestionKind::Essay {
            rubric_keywords,
            min_words,
            model_answer,
        } => {
            let score = scoring::essay_score(
                rubric_keywords,
                *min_words,
                model_answer.as_deref(),
                submitted.unwrap_or(""),
            );
            QuestionEvaluation {
                question_id: question.id.clone(),
                percent: score.percent,
                confidence: Some(score.confidence),
                matched: None,
            }
        }
    }
}
