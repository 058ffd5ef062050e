//! TOML exam bundle parser.
//!
//! Loads exam descriptors and their question banks from TOML files and
//! directories, and validates them for operator-visible configuration
//! defects. Validation only warns: scoring degrades gracefully at runtime,
//! so a defective bundle never errors in front of a student.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{ExamDescriptor, ExamType, Question, QuestionKind};

/// An exam descriptor together with its question bank.
#[derive(Debug, Clone)]
pub struct ExamBundle {
    pub exam: ExamDescriptor,
    pub questions: Vec<Question>,
}

/// Intermediate TOML structure for parsing exam bundle files.
#[derive(Debug, Deserialize)]
struct TomlExamFile {
    exam: TomlExamHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlExamHeader {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type")]
    exam_type: String,
    duration_minutes: u32,
    #[serde(default = "default_true")]
    randomize_questions: bool,
    #[serde(default = "default_true")]
    randomize_options: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    prompt: String,
    // Objective shape.
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    correct_option: usize,
    // Essay shape.
    #[serde(default)]
    rubric_keywords: String,
    #[serde(default)]
    min_words: u32,
    #[serde(default)]
    model_answer: Option<String>,
}

/// Parse a single TOML file into an `ExamBundle`.
pub fn parse_exam_bundle(path: &Path) -> Result<ExamBundle> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read exam bundle file: {}", path.display()))?;

    parse_exam_bundle_str(&content, path)
}

/// Parse a TOML string into an `ExamBundle` (useful for testing).
pub fn parse_exam_bundle_str(content: &str, source_path: &Path) -> Result<ExamBundle> {
    let parsed: TomlExamFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let exam_type: ExamType = parsed
        .exam
        .exam_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{}", e))?;

    let exam = ExamDescriptor {
        id: parsed.exam.id,
        title: parsed.exam.title,
        exam_type,
        duration_minutes: parsed.exam.duration_minutes,
        randomize_questions: parsed.exam.randomize_questions,
        randomize_options: parsed.exam.randomize_options,
    };

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let kind = match exam_type {
                ExamType::Objective => QuestionKind::Objective {
                    options: q.options,
                    correct_option: q.correct_option,
                },
                ExamType::Essay => QuestionKind::Essay {
                    rubric_keywords: q.rubric_keywords,
                    min_words: q.min_words,
                    model_answer: q.model_answer,
                },
            };
            Question {
                id: q.id,
                prompt: q.prompt,
                kind,
            }
        })
        .collect();

    Ok(ExamBundle { exam, questions })
}

/// Recursively load all `.toml` exam bundle files from a directory.
pub fn load_exam_directory(dir: &Path) -> Result<Vec<ExamBundle>> {
    let mut bundles = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            bundles.extend(load_exam_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_exam_bundle(&path) {
                Ok(bundle) => bundles.push(bundle),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(bundles)
}

/// A warning from exam bundle validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question id (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate an exam bundle for common configuration defects.
pub fn validate_exam(bundle: &ExamBundle) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if bundle.exam.duration_minutes == 0 {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "duration_minutes is 0: the attempt expires immediately".into(),
        });
    }

    let mut seen_ids = std::collections::HashSet::new();
    for question in &bundle.questions {
        if !seen_ids.insert(&question.id) {
            warnings.push(ValidationWarning {
                question_id: Some(question.id.clone()),
                message: format!("duplicate question ID: {}", question.id),
            });
        }
    }

    for question in &bundle.questions {
        match &question.kind {
            QuestionKind::Objective {
                options,
                correct_option,
            } => {
                if options.len() < 2 {
                    warnings.push(ValidationWarning {
                        question_id: Some(question.id.clone()),
                        message: "objective question has fewer than 2 options".into(),
                    });
                }
                if *correct_option >= options.len() {
                    warnings.push(ValidationWarning {
                        question_id: Some(question.id.clone()),
                        message: format!(
                            "correct_option {} is out of range: no answer can match",
                            correct_option
                        ),
                    });
                }
            }
            QuestionKind::Essay {
                rubric_keywords,
                min_words,
                model_answer,
            } => {
                let unconfigured = rubric_keywords.split(',').all(|k| k.trim().is_empty())
                    && *min_words == 0
                    && model_answer.is_none();
                if unconfigured {
                    warnings.push(ValidationWarning {
                        question_id: Some(question.id.clone()),
                        message: "essay question is fully unconfigured and scores neutral".into(),
                    });
                }
            }
        }
    }

    warnings
}
