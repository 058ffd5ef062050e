//! Deterministic, reproducible ordering of questions and options.
//!
//! The seed hash and bit generator below are a frozen contract: attempts
//! already in flight depend on them reproducing the same permutation across
//! process restarts. Any change must bump [`ORDERING_VERSION`]; records
//! stamped with an unknown version are treated as a cache miss and
//! regenerated.

use std::collections::{HashMap, HashSet};

use crate::model::{ExamDescriptor, OrderedQuestion, OrderingRecord, Question, QuestionKind};

/// Version tag stamped into every generated [`OrderingRecord`].
pub const ORDERING_VERSION: u32 = 1;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Derive a 32-bit seed from an arbitrary string, FNV-1a style.
pub fn derive_seed(input: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in input.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Mulberry32-style generator: 32-bit state advanced by a fixed odd increment,
/// mixed through two xorshift/multiply rounds per draw.
struct SeededRng {
    state: u32,
}

impl SeededRng {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next value in [0, 1).
    fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6d2b_79f5);
        let mut z = self.state;
        z = (z ^ (z >> 15)).wrapping_mul(z | 1);
        z ^= z.wrapping_add((z ^ (z >> 7)).wrapping_mul(z | 61));
        f64::from(z ^ (z >> 14)) / 4_294_967_296.0
    }
}

/// In-place Fisher-Yates: from the last index down to 1, swap with an index
/// drawn uniformly from 0..=i.
fn shuffle<T>(items: &mut [T], rng: &mut SeededRng) {
    for i in (1..items.len()).rev() {
        let j = (rng.next_f64() * (i + 1) as f64) as usize;
        items.swap(i, j);
    }
}

fn question_seed(exam_id: &str, student_id: &str) -> u32 {
    derive_seed(&format!("{exam_id}:{student_id}"))
}

fn option_seed(exam_id: &str, student_id: &str, question_id: &str) -> u32 {
    derive_seed(&format!("{exam_id}:{student_id}:{question_id}"))
}

/// Generate the ordering record for one (exam, student) attempt.
///
/// The question permutation and each question's option permutation are seeded
/// independently, so either shuffle can be toggled off without disturbing the
/// other. Zero questions yields an empty record; a question with fewer than
/// two options keeps its authored option order.
pub fn generate(
    exam: &ExamDescriptor,
    questions: &[Question],
    student_id: &str,
) -> OrderingRecord {
    let mut question_order: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
    if exam.randomize_questions && question_order.len() >= 2 {
        let mut rng = SeededRng::new(question_seed(&exam.id, student_id));
        shuffle(&mut question_order, &mut rng);
    }

    let mut option_orders = HashMap::new();
    for question in questions {
        let count = question.option_count();
        if count == 0 {
            continue;
        }
        let mut indices: Vec<usize> = (0..count).collect();
        if exam.randomize_options && count >= 2 {
            let mut rng = SeededRng::new(option_seed(&exam.id, student_id, &question.id));
            shuffle(&mut indices, &mut rng);
        }
        option_orders.insert(question.id.clone(), indices);
    }

    OrderingRecord {
        version: ORDERING_VERSION,
        exam_id: exam.id.clone(),
        student_id: student_id.to_string(),
        question_order,
        option_orders,
    }
}

/// Map a stored record onto the current question bank.
///
/// Returns `None` when the record no longer fits the bank — unknown version,
/// a referenced question that no longer exists, a question added since the
/// record was made, or an option permutation that does not match the current
/// option count. Callers treat `None` as a cache miss and regenerate.
pub fn apply(record: &OrderingRecord, questions: &[Question]) -> Option<Vec<OrderedQuestion>> {
    if record.version != ORDERING_VERSION {
        return None;
    }
    if record.question_order.len() != questions.len() {
        return None;
    }

    let by_id: HashMap<&str, &Question> =
        questions.iter().map(|q| (q.id.as_str(), q)).collect();
    let distinct: HashSet<&str> = record.question_order.iter().map(String::as_str).collect();
    if distinct.len() != record.question_order.len() {
        return None;
    }

    let mut ordered = Vec::with_capacity(questions.len());
    for id in &record.question_order {
        let question = by_id.get(id.as_str())?;
        ordered.push(present(question, record)?);
    }
    Some(ordered)
}

fn present(question: &Question, record: &OrderingRecord) -> Option<OrderedQuestion> {
    match &question.kind {
        QuestionKind::Objective { options, .. } => {
            let order = record.option_orders.get(&question.id)?;
            if !is_permutation(order, options.len()) {
                return None;
            }
            Some(OrderedQuestion {
                id: question.id.clone(),
                prompt: question.prompt.clone(),
                options: order.iter().map(|&i| options[i].clone()).collect(),
                min_words: None,
            })
        }
        QuestionKind::Essay { min_words, .. } => Some(OrderedQuestion {
            id: question.id.clone(),
            prompt: question.prompt.clone(),
            options: Vec::new(),
            min_words: (*min_words > 0).then_some(*min_words),
        }),
    }
}

fn is_permutation(indices: &[usize], len: usize) -> bool {
    if indices.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &i in indices {
        if i >= len || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    true
}
