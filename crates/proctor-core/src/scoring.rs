//! Scoring strategies: exact option match and the essay heuristic.
//!
//! Both strategies are pure, synchronous functions. The essay heuristic is a
//! provisional estimate pending possible human review, never a final grade on
//! its own; result assembly routes low-confidence aggregates to a reviewer.

use std::collections::HashSet;

/// Exact-match check for one objective question.
///
/// The submitted value is compared by exact string equality against the
/// option at the designated correct index. No normalization, no partial
/// credit, and no fallback to any other answer field: a differently worded
/// but "correct" submission counts as wrong. A missing or blank submission
/// never matches, and an out-of-range correct index means no submission can
/// match (a configuration defect degrades to zero, it does not error).
pub fn objective_match(options: &[String], correct_option: usize, submitted: Option<&str>) -> bool {
    let Some(correct) = options.get(correct_option) else {
        return false;
    };
    match submitted {
        Some(value) if !value.trim().is_empty() => value == correct,
        _ => false,
    }
}

/// Heuristic score for one essay submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EssayScore {
    /// Estimated percent in [0, 100].
    pub percent: u32,
    /// Heuristic confidence in [0, 1].
    pub confidence: f64,
}

const KEYWORD_WEIGHT: f64 = 0.5;
const LENGTH_WEIGHT: f64 = 0.3;
const OVERLAP_WEIGHT: f64 = 0.2;

/// Credit cap applied to the length factor while under the minimum word count.
const UNDER_LENGTH_CAP: f64 = 0.8;

/// Boost applied to raw model-answer overlap before capping at 1.0.
const OVERLAP_BOOST: f64 = 1.2;

/// Multi-factor heuristic for a free-text submission.
///
/// Factors: rubric keyword coverage (weight 0.5), length adequacy against the
/// minimum word count (0.3), and token overlap with the model answer (0.2).
/// Unconfigured factors score neutral rather than penalizing the student.
pub fn essay_score(
    rubric_keywords: &str,
    min_words: u32,
    model_answer: Option<&str>,
    submission: &str,
) -> EssayScore {
    let tokens = tokenize(submission);
    let token_set: HashSet<&str> = tokens.iter().map(String::as_str).collect();

    let keywords: Vec<String> = rubric_keywords
        .split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    let keyword_coverage = if keywords.is_empty() {
        1.0
    } else {
        let matched = keywords
            .iter()
            .filter(|k| token_set.contains(k.as_str()))
            .count();
        matched as f64 / keywords.len() as f64
    };

    let length_adequacy = if min_words == 0 {
        1.0
    } else if tokens.len() as u32 >= min_words {
        1.0
    } else {
        (tokens.len() as f64 / f64::from(min_words)) * UNDER_LENGTH_CAP
    };

    let model_overlap = match model_answer {
        Some(answer) => {
            let model_tokens = tokenize(answer);
            let model_set: HashSet<&str> = model_tokens.iter().map(String::as_str).collect();
            if model_set.is_empty() {
                0.5
            } else {
                let shared = token_set.intersection(&model_set).count();
                ((shared as f64 / model_set.len() as f64) * OVERLAP_BOOST).min(1.0)
            }
        }
        None => 0.5,
    };

    let score = KEYWORD_WEIGHT * keyword_coverage
        + LENGTH_WEIGHT * length_adequacy
        + OVERLAP_WEIGHT * model_overlap;
    let percent = (score * 100.0).round() as u32;

    let mut confidence: f64 = 0.4;
    if keywords.len() >= 3 {
        confidence += 0.2;
    }
    if length_adequacy >= 1.0 {
        confidence += 0.2;
    }
    if model_overlap >= 0.2 {
        confidence += 0.2;
    }

    EssayScore {
        percent: percent.min(100),
        confidence: confidence.min(1.0),
    }
}

/// Lowercase, strip to alphanumeric/whitespace, split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
