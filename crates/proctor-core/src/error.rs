//! Engine error types.
//!
//! Defined here so callers can downcast and classify failures without string
//! matching. The graceful-degradation cases (stale orderings, configuration
//! defects, finalize races) never surface as errors at all.

use thiserror::Error;

/// Errors the attempt engine can surface to its caller.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The question source knows no exam with this id.
    #[error("exam not found: {0}")]
    ExamNotFound(String),

    /// The ordering store failed to save or clear a record.
    #[error("ordering store failure: {0}")]
    Store(String),

    /// The result sink rejected a finalized record.
    #[error("result sink failure: {0}")]
    Sink(String),
}

impl AttemptError {
    /// Returns `true` if retrying the operation could succeed. A missing exam
    /// is permanent; storage transport failures are not.
    pub fn is_retriable(&self) -> bool {
        matches!(self, AttemptError::Store(_) | AttemptError::Sink(_))
    }
}
