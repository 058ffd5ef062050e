//! Core data model types for the exam attempt engine.
//!
//! These are the fundamental types that the rest of the system uses to
//! represent exams, questions, attempts, and the reproducible per-attempt
//! ordering.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether an exam is scored by exact option match or by the essay heuristic.
///
/// An exam is uniformly one type; mixed exams are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamType {
    Objective,
    Essay,
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExamType::Objective => write!(f, "objective"),
            ExamType::Essay => write!(f, "essay"),
        }
    }
}

impl FromStr for ExamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "objective" | "choice" => Ok(ExamType::Objective),
            "essay" | "freetext" => Ok(ExamType::Essay),
            other => Err(format!("unknown exam type: {other}")),
        }
    }
}

/// Everything the engine needs to know about one exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDescriptor {
    /// Unique exam identifier.
    pub id: String,
    /// Human-readable title.
    #[serde(default)]
    pub title: String,
    /// Scoring strategy for every question in this exam.
    pub exam_type: ExamType,
    /// Wall-clock time budget in minutes.
    pub duration_minutes: u32,
    /// Shuffle the question sequence per attempt.
    #[serde(default = "default_true")]
    pub randomize_questions: bool,
    /// Shuffle each question's options per attempt.
    #[serde(default = "default_true")]
    pub randomize_options: bool,
}

fn default_true() -> bool {
    true
}

impl ExamDescriptor {
    /// Time budget in seconds.
    pub fn duration_secs(&self) -> u64 {
        u64::from(self.duration_minutes) * 60
    }
}

/// A question as supplied by the external question bank. Read-only input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    /// The prompt text shown to the student.
    pub prompt: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

/// The shape-specific part of a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QuestionKind {
    Objective {
        /// Candidate answers in authored order.
        options: Vec<String>,
        /// Index into `options` designating the correct answer. This index is
        /// the single source of truth for objective scoring.
        correct_option: usize,
    },
    Essay {
        /// Comma-separated rubric keywords, as authored.
        rubric_keywords: String,
        /// Minimum expected word count; 0 means unconfigured.
        min_words: u32,
        /// Optional model answer for token-overlap scoring.
        model_answer: Option<String>,
    },
}

impl Question {
    /// Number of options; 0 for essay questions.
    pub fn option_count(&self) -> usize {
        match &self.kind {
            QuestionKind::Objective { options, .. } => options.len(),
            QuestionKind::Essay { .. } => 0,
        }
    }
}

/// Student-facing view of a question: prompt and permuted options, with the
/// answer key stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedQuestion {
    pub id: String,
    pub prompt: String,
    /// Options in presentation order; empty for essay questions.
    #[serde(default)]
    pub options: Vec<String>,
    /// Minimum expected word count for essay questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_words: Option<u32>,
}

/// Lifecycle status of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    /// Objectively scored, final.
    Completed,
    /// Heuristic score accepted as likely correct without human review.
    Provisional,
    /// Heuristic score too uncertain; requires human grading.
    PendingReview,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptStatus::NotStarted => "not_started",
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Provisional => "provisional",
            AttemptStatus::PendingReview => "pending_review",
        };
        write!(f, "{s}")
    }
}

/// One student's single pass at one exam instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub exam_id: String,
    pub student_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub status: AttemptStatus,
}

/// The persisted, reproducible shuffle of questions and options for one
/// attempt. Immutable for the life of the attempt; deleted on finalize so a
/// retake regenerates fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingRecord {
    /// Tag of the frozen ordering algorithm that produced this record.
    pub version: u32,
    pub exam_id: String,
    pub student_id: String,
    /// Question ids in presentation order.
    pub question_order: Vec<String>,
    /// Per question: original option indices in presentation order.
    pub option_orders: HashMap<String, Vec<usize>>,
}

/// Submitted answers keyed by question id. In-memory only; frozen at finalize.
pub type AnswerSet = HashMap<String, String>;

/// Why an attempt was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizeReason {
    /// Explicit submit before the budget ran out.
    Manual,
    /// The countdown hit zero and forced submission.
    Expired,
}

impl fmt::Display for FinalizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizeReason::Manual => write!(f, "manual"),
            FinalizeReason::Expired => write!(f, "expired"),
        }
    }
}
