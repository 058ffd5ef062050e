//! The attempt engine: one session per (exam, student) attempt.
//!
//! The engine resolves the per-attempt ordering (reusing a persisted record
//! when it still fits the bank), anchors the countdown, collects answers in
//! memory, and finalizes exactly once — manually or on expiry — handing the
//! assembled result to the persistence collaborator.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::countdown::{Countdown, CountdownState};
use crate::error::AttemptError;
use crate::model::{
    AnswerSet, Attempt, AttemptStatus, ExamDescriptor, FinalizeReason, OrderedQuestion, Question,
};
use crate::ordering;
use crate::report::{self, EvaluationResult, FinalizedRecord};
use crate::traits::{OrderingStore, QuestionSource, ResultSink};

/// Entry point: wires the question source, ordering store, and result sink.
pub struct AttemptEngine {
    source: Arc<dyn QuestionSource>,
    store: Arc<dyn OrderingStore>,
    sink: Arc<dyn ResultSink>,
}

impl AttemptEngine {
    pub fn new(
        source: Arc<dyn QuestionSource>,
        store: Arc<dyn OrderingStore>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            source,
            store,
            sink,
        }
    }

    /// Start (or resume the ordering of) one student's attempt at one exam.
    ///
    /// Fetches the bank, reuses the persisted ordering when it still maps
    /// cleanly onto the current questions, regenerates and saves it
    /// otherwise, and starts the countdown. The returned session owns the
    /// countdown for its whole life.
    pub async fn start_attempt(
        &self,
        exam: &ExamDescriptor,
        student_id: &str,
    ) -> Result<AttemptSession> {
        let questions = self.source.questions_for(&exam.id).await?;
        let ordered = self.resolve_ordering(exam, &questions, student_id).await?;

        let now = Utc::now();
        let mut countdown = Countdown::new(exam.duration_secs());
        countdown.start(now);

        let attempt = Attempt {
            id: Uuid::new_v4(),
            exam_id: exam.id.clone(),
            student_id: student_id.to_string(),
            started_at: now,
            duration_secs: exam.duration_secs(),
            status: AttemptStatus::InProgress,
        };
        tracing::info!(
            exam = %exam.id,
            student = %student_id,
            attempt = %attempt.id,
            questions = questions.len(),
            "attempt started"
        );

        let known_ids = questions.iter().map(|q| q.id.clone()).collect();
        Ok(AttemptSession {
            exam: exam.clone(),
            student_id: student_id.to_string(),
            questions,
            ordered,
            known_ids,
            inner: Mutex::new(SessionInner {
                attempt,
                countdown,
                answers: AnswerSet::new(),
                result: None,
            }),
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
        })
    }

    async fn resolve_ordering(
        &self,
        exam: &ExamDescriptor,
        questions: &[Question],
        student_id: &str,
    ) -> Result<Vec<OrderedQuestion>> {
        match self.store.load(&exam.id, student_id).await {
            Ok(Some(record)) => {
                if let Some(ordered) = ordering::apply(&record, questions) {
                    tracing::debug!(exam = %exam.id, student = %student_id, "reusing persisted ordering");
                    return Ok(ordered);
                }
                tracing::warn!(
                    exam = %exam.id,
                    student = %student_id,
                    "persisted ordering no longer fits the bank, regenerating"
                );
            }
            Ok(None) => {}
            // A load failure is treated as a miss: the student gets a fresh
            // (still deterministic) ordering instead of an error.
            Err(e) => {
                tracing::warn!(exam = %exam.id, student = %student_id, error = %e, "ordering load failed, regenerating");
            }
        }

        let record = ordering::generate(exam, questions, student_id);
        self.store
            .save(&exam.id, student_id, &record)
            .await
            .map_err(|e| AttemptError::Store(e.to_string()))?;
        ordering::apply(&record, questions)
            .ok_or_else(|| anyhow!("freshly generated ordering did not apply"))
    }
}

struct SessionInner {
    attempt: Attempt,
    countdown: Countdown,
    answers: AnswerSet,
    result: Option<EvaluationResult>,
}

/// One in-flight attempt. Owned exclusively by that student's session; the
/// countdown is released with the session on every exit path.
pub struct AttemptSession {
    exam: ExamDescriptor,
    student_id: String,
    questions: Vec<Question>,
    ordered: Vec<OrderedQuestion>,
    known_ids: HashSet<String>,
    inner: Mutex<SessionInner>,
    store: Arc<dyn OrderingStore>,
    sink: Arc<dyn ResultSink>,
}

impl std::fmt::Debug for AttemptSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptSession")
            .field("exam", &self.exam)
            .field("student_id", &self.student_id)
            .finish_non_exhaustive()
    }
}

impl AttemptSession {
    /// The question sequence in presentation order, answer keys stripped.
    pub fn ordered_questions(&self) -> &[OrderedQuestion] {
        &self.ordered
    }

    /// Snapshot of the attempt record.
    pub fn attempt(&self) -> Attempt {
        self.inner.lock().unwrap().attempt.clone()
    }

    /// The evaluation result, once finalized.
    pub fn result(&self) -> Option<EvaluationResult> {
        self.inner.lock().unwrap().result.clone()
    }

    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        self.inner.lock().unwrap().countdown.remaining_secs(now)
    }

    /// Record (or overwrite) an answer in the in-memory answer set.
    ///
    /// Returns `false` when the answer is dropped: after finalize, or for a
    /// question id that is not part of this attempt. Neither case is an
    /// error the student sees.
    pub fn record_answer(&self, question_id: &str, value: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.countdown.is_terminal() {
            tracing::warn!(
                attempt = %inner.attempt.id,
                question = %question_id,
                "answer after finalize dropped"
            );
            return false;
        }
        if !self.known_ids.contains(question_id) {
            tracing::warn!(
                attempt = %inner.attempt.id,
                question = %question_id,
                "answer for unknown question dropped"
            );
            return false;
        }
        inner
            .answers
            .insert(question_id.to_string(), value.to_string());
        true
    }

    /// Manual submit. Returns `Ok(None)` when this call lost the race against
    /// expiry (or the attempt was already finalized).
    pub async fn finalize(&self, reason: FinalizeReason) -> Result<Option<EvaluationResult>> {
        self.finalize_at(reason, Utc::now()).await
    }

    /// Cooperative countdown advance. When the budget is exhausted this
    /// finalizes with reason `Expired`, scoring whatever answers exist at
    /// that instant; otherwise it is a no-op.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Option<EvaluationResult>> {
        let due = {
            let inner = self.inner.lock().unwrap();
            inner.countdown.state() == CountdownState::Running
                && inner.countdown.remaining_secs(now) == 0
        };
        if !due {
            return Ok(None);
        }
        self.finalize_at(FinalizeReason::Expired, now).await
    }

    /// Drive the countdown at one-second granularity until the attempt
    /// reaches a terminal state. Returns the result if this driver performed
    /// the expiry finalize, `None` if the attempt was finalized elsewhere.
    pub async fn run_countdown(&self) -> Result<Option<EvaluationResult>> {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if self.inner.lock().unwrap().countdown.is_terminal() {
                return Ok(None);
            }
            if let Some(result) = self.tick(Utc::now()).await? {
                return Ok(Some(result));
            }
        }
    }

    async fn finalize_at(
        &self,
        reason: FinalizeReason,
        now: DateTime<Utc>,
    ) -> Result<Option<EvaluationResult>> {
        let (result, record) = {
            let mut inner = self.inner.lock().unwrap();
            let won = match reason {
                FinalizeReason::Manual => inner.countdown.complete(),
                FinalizeReason::Expired => inner.countdown.tick(now),
            };
            if !won {
                tracing::warn!(
                    attempt = %inner.attempt.id,
                    %reason,
                    "dropping losing finalize transition"
                );
                return Ok(None);
            }

            let result =
                report::assemble(&self.exam, inner.attempt.id, &self.questions, &inner.answers);
            inner.attempt.status = result.status;
            let record = FinalizedRecord {
                attempt_id: inner.attempt.id,
                exam_id: self.exam.id.clone(),
                student_id: self.student_id.clone(),
                answers: inner.answers.clone(),
                aggregate_percent: result.aggregate_percent,
                aggregate_confidence: result.aggregate_confidence,
                status: result.status,
                time_spent_secs: inner.countdown.elapsed_secs(now),
                finalized_at: now,
                reason,
            };
            inner.result = Some(result.clone());
            (result, record)
        };

        // Both must complete before the attempt counts as durably finalized;
        // clearing the ordering record is what gives a retake a fresh shuffle.
        let persist = async {
            self.sink
                .persist(&record)
                .await
                .map_err(|e| AttemptError::Sink(e.to_string()))
        };
        let clear = async {
            self.store
                .clear(&self.exam.id, &self.student_id)
                .await
                .map_err(|e| AttemptError::Store(e.to_string()))
        };
        futures::try_join!(persist, clear)?;

        tracing::info!(
            attempt = %record.attempt_id,
            status = %record.status,
            percent = record.aggregate_percent,
            %reason,
            "attempt finalized"
        );
        Ok(Some(result))
    }
}

impl Drop for AttemptSession {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut() {
            if !inner.countdown.is_terminal() {
                tracing::warn!(
                    attempt = %inner.attempt.id,
                    "attempt session dropped while still running"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExamType, OrderingRecord, QuestionKind};
    use crate::ordering::ORDERING_VERSION;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;

    struct FixedSource(HashMap<String, Vec<Question>>);

    #[async_trait]
    impl QuestionSource for FixedSource {
        async fn questions_for(&self, exam_id: &str) -> Result<Vec<Question>> {
            self.0
                .get(exam_id)
                .cloned()
                .ok_or_else(|| AttemptError::ExamNotFound(exam_id.to_string()).into())
        }
    }

    #[derive(Default)]
    struct MapStore {
        records: Mutex<HashMap<(String, String), OrderingRecord>>,
    }

    #[async_trait]
    impl OrderingStore for MapStore {
        async fn load(&self, exam_id: &str, student_id: &str) -> Result<Option<OrderingRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(exam_id.to_string(), student_id.to_string()))
                .cloned())
        }

        async fn save(
            &self,
            exam_id: &str,
            student_id: &str,
            record: &OrderingRecord,
        ) -> Result<()> {
            self.records
                .lock()
                .unwrap()
                .insert((exam_id.to_string(), student_id.to_string()), record.clone());
            Ok(())
        }

        async fn clear(&self, exam_id: &str, student_id: &str) -> Result<()> {
            self.records
                .lock()
                .unwrap()
                .remove(&(exam_id.to_string(), student_id.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct VecSink {
        records: Mutex<Vec<FinalizedRecord>>,
    }

    #[async_trait]
    impl ResultSink for VecSink {
        async fn persist(&self, record: &FinalizedRecord) -> Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ResultSink for FailingSink {
        async fn persist(&self, _record: &FinalizedRecord) -> Result<()> {
            Err(anyhow!("results database unreachable"))
        }
    }

    fn objective(id: &str, options: &[&str], correct: usize) -> Question {
        Question {
            id: id.into(),
            prompt: format!("prompt {id}"),
            kind: QuestionKind::Objective {
                options: options.iter().map(|s| s.to_string()).collect(),
                correct_option: correct,
            },
        }
    }

    fn exam(duration_minutes: u32, randomize: bool) -> ExamDescriptor {
        ExamDescriptor {
            id: "bio-101".into(),
            title: "Biology".into(),
            exam_type: ExamType::Objective,
            duration_minutes,
            randomize_questions: randomize,
            randomize_options: randomize,
        }
    }

    fn bank() -> Vec<Question> {
        vec![
            objective("q1", &["Paris", "London"], 0),
            objective("q2", &["2", "4"], 1),
        ]
    }

    fn engine_with(
        questions: Vec<Question>,
        store: Arc<MapStore>,
        sink: Arc<dyn ResultSink>,
    ) -> AttemptEngine {
        let mut banks = HashMap::new();
        banks.insert("bio-101".to_string(), questions);
        AttemptEngine::new(Arc::new(FixedSource(banks)), store, sink)
    }

    #[tokio::test]
    async fn unknown_exam_is_an_error() {
        let engine = engine_with(bank(), Arc::default(), Arc::new(VecSink::default()));
        let missing = ExamDescriptor {
            id: "ghost".into(),
            ..exam(1, false)
        };
        let err = engine.start_attempt(&missing, "s1").await.unwrap_err();
        let attempt_err = err.downcast_ref::<AttemptError>().unwrap();
        assert!(matches!(attempt_err, AttemptError::ExamNotFound(_)));
        assert!(!attempt_err.is_retriable());
    }

    #[tokio::test]
    async fn reuses_persisted_ordering() {
        let store = Arc::new(MapStore::default());
        // A hand-written record in reversed order: with randomization off a
        // regeneration would yield identity, so seeing q2-first proves reuse.
        let record = OrderingRecord {
            version: ORDERING_VERSION,
            exam_id: "bio-101".into(),
            student_id: "s1".into(),
            question_order: vec!["q2".into(), "q1".into()],
            option_orders: HashMap::from([
                ("q1".to_string(), vec![0, 1]),
                ("q2".to_string(), vec![0, 1]),
            ]),
        };
        store.save("bio-101", "s1", &record).await.unwrap();

        let engine = engine_with(bank(), Arc::clone(&store), Arc::new(VecSink::default()));
        let session = engine.start_attempt(&exam(1, false), "s1").await.unwrap();
        let ids: Vec<&str> = session
            .ordered_questions()
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert_eq!(ids, vec!["q2", "q1"]);
    }

    #[tokio::test]
    async fn stale_ordering_regenerates_silently() {
        let store = Arc::new(MapStore::default());
        let record = OrderingRecord {
            version: ORDERING_VERSION,
            exam_id: "bio-101".into(),
            student_id: "s1".into(),
            question_order: vec!["ghost".into(), "q1".into()],
            option_orders: HashMap::from([("q1".to_string(), vec![0, 1])]),
        };
        store.save("bio-101", "s1", &record).await.unwrap();

        let engine = engine_with(bank(), Arc::clone(&store), Arc::new(VecSink::default()));
        let session = engine.start_attempt(&exam(1, true), "s1").await.unwrap();

        let mut ids: Vec<&str> = session
            .ordered_questions()
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["q1", "q2"]);
        // The fresh record replaced the stale one.
        let saved = store.load("bio-101", "s1").await.unwrap().unwrap();
        assert_ne!(saved, record);
    }

    #[tokio::test]
    async fn identical_attempts_order_identically() {
        let sink: Arc<dyn ResultSink> = Arc::new(VecSink::default());
        let a = engine_with(bank(), Arc::default(), Arc::clone(&sink));
        let b = engine_with(bank(), Arc::default(), Arc::clone(&sink));
        let sa = a.start_attempt(&exam(1, true), "s1").await.unwrap();
        let sb = b.start_attempt(&exam(1, true), "s1").await.unwrap();
        assert_eq!(sa.ordered_questions(), sb.ordered_questions());
    }

    #[tokio::test]
    async fn manual_finalize_scores_persists_and_clears() {
        let store = Arc::new(MapStore::default());
        let sink = Arc::new(VecSink::default());
        let engine = engine_with(bank(), Arc::clone(&store), Arc::clone(&sink) as _);
        let session = engine.start_attempt(&exam(1, false), "s1").await.unwrap();

        assert!(session.record_answer("q1", "Paris"));
        assert!(session.record_answer("q2", "2")); // wrong option

        let result = session
            .finalize(FinalizeReason::Manual)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.aggregate_percent, 50);
        assert_eq!(result.status, AttemptStatus::Completed);
        assert_eq!(session.attempt().status, AttemptStatus::Completed);

        let persisted = sink.records.lock().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].reason, FinalizeReason::Manual);
        drop(persisted);

        // Cleared so a retake regenerates fresh.
        assert!(store.load("bio-101", "s1").await.unwrap().is_none());

        // Second finalize is the losing transition, dropped silently.
        let second = session.finalize(FinalizeReason::Manual).await.unwrap();
        assert!(second.is_none());
        assert_eq!(sink.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expiry_finalizes_once_over_partial_answers() {
        let store = Arc::new(MapStore::default());
        let sink = Arc::new(VecSink::default());
        let engine = engine_with(bank(), Arc::clone(&store), Arc::clone(&sink) as _);
        let session = engine.start_attempt(&exam(1, false), "s1").await.unwrap();
        let started_at = session.attempt().started_at;

        assert!(session.record_answer("q1", "Paris"));
        // q2 never answered.

        let before = session.tick(started_at + ChronoDuration::seconds(59)).await.unwrap();
        assert!(before.is_none());

        let result = session
            .tick(started_at + ChronoDuration::seconds(60))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.aggregate_percent, 50);
        assert_eq!(result.status, AttemptStatus::Completed);

        let persisted = sink.records.lock().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].reason, FinalizeReason::Expired);
        assert_eq!(persisted[0].time_spent_secs, 60);
        drop(persisted);

        // Later ticks and a late manual submit are both losing transitions.
        let late_tick = session.tick(started_at + ChronoDuration::seconds(90)).await.unwrap();
        assert!(late_tick.is_none());
        let late_manual = session.finalize(FinalizeReason::Manual).await.unwrap();
        assert!(late_manual.is_none());
        assert_eq!(sink.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn answers_after_finalize_are_dropped() {
        let engine = engine_with(bank(), Arc::default(), Arc::new(VecSink::default()));
        let session = engine.start_attempt(&exam(1, false), "s1").await.unwrap();
        session.finalize(FinalizeReason::Manual).await.unwrap();
        assert!(!session.record_answer("q1", "Paris"));
        assert!(session.result().unwrap().per_question[0].matched == Some(false));
    }

    #[tokio::test]
    async fn unknown_question_answers_are_dropped() {
        let engine = engine_with(bank(), Arc::default(), Arc::new(VecSink::default()));
        let session = engine.start_attempt(&exam(1, false), "s1").await.unwrap();
        assert!(!session.record_answer("ghost", "whatever"));
    }

    #[tokio::test]
    async fn sink_failure_is_not_durable() {
        let engine = engine_with(bank(), Arc::default(), Arc::new(FailingSink));
        let session = engine.start_attempt(&exam(1, false), "s1").await.unwrap();
        let err = session.finalize(FinalizeReason::Manual).await.unwrap_err();
        let attempt_err = err.downcast_ref::<AttemptError>().unwrap();
        assert!(matches!(attempt_err, AttemptError::Sink(_)));
        assert!(attempt_err.is_retriable());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_driver_stops_after_manual_submit() {
        let engine = engine_with(bank(), Arc::default(), Arc::new(VecSink::default()));
        let session = Arc::new(engine.start_attempt(&exam(60, false), "s1").await.unwrap());

        let driver = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.run_countdown().await })
        };

        session.finalize(FinalizeReason::Manual).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        let outcome = driver.await.unwrap().unwrap();
        assert!(outcome.is_none(), "driver must yield to the manual submit");
    }
}
