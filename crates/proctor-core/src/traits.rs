//! Async seams to the engine's external collaborators.
//!
//! The engine owns no persistence of its own: question supply, ordering
//! persistence, and result persistence all live behind these traits,
//! implemented by the `proctor-store` crate (or the host application).

use async_trait::async_trait;

use crate::model::{OrderingRecord, Question};
use crate::report::FinalizedRecord;

/// Read-only question supply keyed by exam id.
///
/// The bank is the only shared cross-attempt resource and is never mutated
/// by the engine.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Fetch the question bank for an exam. An unknown exam id is an error
    /// (see [`crate::error::AttemptError::ExamNotFound`]); an empty bank is
    /// not.
    async fn questions_for(&self, exam_id: &str) -> anyhow::Result<Vec<Question>>;
}

/// Persistence for per-attempt ordering records, scoped per (exam, student).
///
/// `load` misses (and stale records) are regenerated silently by the engine;
/// `save` and `clear` failures are surfaced, since a finalize is only durable
/// once the record is cleared.
#[async_trait]
pub trait OrderingStore: Send + Sync {
    async fn load(&self, exam_id: &str, student_id: &str)
        -> anyhow::Result<Option<OrderingRecord>>;

    async fn save(
        &self,
        exam_id: &str,
        student_id: &str,
        record: &OrderingRecord,
    ) -> anyhow::Result<()>;

    async fn clear(&self, exam_id: &str, student_id: &str) -> anyhow::Result<()>;
}

/// The external persistence collaborator that receives finalized results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist one finalized attempt. Must complete before the attempt is
    /// considered durably finalized.
    async fn persist(&self, record: &FinalizedRecord) -> anyhow::Result<()>;
}
