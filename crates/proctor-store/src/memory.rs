//! In-memory store, sink, and question source.
//!
//! These are real implementations, not stubs: a single-process deployment can
//! run on them as-is. The call counters exist so tests can assert on store
//! traffic without wrapping the trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use proctor_core::error::AttemptError;
use proctor_core::model::{OrderingRecord, Question};
use proctor_core::report::FinalizedRecord;
use proctor_core::traits::{OrderingStore, QuestionSource, ResultSink};

type Key = (String, String);

fn key(exam_id: &str, student_id: &str) -> Key {
    (exam_id.to_string(), student_id.to_string())
}

/// In-memory ordering store keyed by (exam, student).
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Key, OrderingRecord>>,
    save_count: AtomicU32,
    clear_count: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls made against this store.
    pub fn save_count(&self) -> u32 {
        self.save_count.load(Ordering::Relaxed)
    }

    /// Number of `clear` calls made against this store.
    pub fn clear_count(&self) -> u32 {
        self.clear_count.load(Ordering::Relaxed)
    }

    /// Peek at the stored record for one (exam, student) pair.
    pub fn record(&self, exam_id: &str, student_id: &str) -> Option<OrderingRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&key(exam_id, student_id))
            .cloned()
    }
}

#[async_trait]
impl OrderingStore for MemoryStore {
    async fn load(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> anyhow::Result<Option<OrderingRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&key(exam_id, student_id))
            .cloned())
    }

    async fn save(
        &self,
        exam_id: &str,
        student_id: &str,
        record: &OrderingRecord,
    ) -> anyhow::Result<()> {
        self.save_count.fetch_add(1, Ordering::Relaxed);
        self.records
            .lock()
            .unwrap()
            .insert(key(exam_id, student_id), record.clone());
        Ok(())
    }

    async fn clear(&self, exam_id: &str, student_id: &str) -> anyhow::Result<()> {
        self.clear_count.fetch_add(1, Ordering::Relaxed);
        self.records.lock().unwrap().remove(&key(exam_id, student_id));
        Ok(())
    }
}

/// Result sink that records everything it is handed.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<FinalizedRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FinalizedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn persist(&self, record: &FinalizedRecord) -> anyhow::Result<()> {
        tracing::debug!(
            attempt = %record.attempt_id,
            status = %record.status,
            "recording finalized attempt"
        );
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Question source backed by a fixed map of exam id to question bank.
#[derive(Default)]
pub struct StaticQuestionSource {
    banks: HashMap<String, Vec<Question>>,
}

impl StaticQuestionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bank(mut self, exam_id: &str, questions: Vec<Question>) -> Self {
        self.banks.insert(exam_id.to_string(), questions);
        self
    }
}

#[async_trait]
impl QuestionSource for StaticQuestionSource {
    async fn questions_for(&self, exam_id: &str) -> anyhow::Result<Vec<Question>> {
        self.banks
            .get(exam_id)
            .cloned()
            .ok_or_else(|| AttemptError::ExamNotFound(exam_id.to_string()).into())
    }
}
