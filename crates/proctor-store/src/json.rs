//! JSON-file-backed ordering store.
//!
//! One file per (exam, student) pair under a root directory. This is what
//! makes the reproducibility contract visible across process restarts: a new
//! process loads the same record and presents the same ordering. A file that
//! cannot be read or parsed is a cache miss, never an error.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use proctor_core::model::OrderingRecord;
use proctor_core::traits::OrderingStore;

/// Ordering store persisting records as pretty-printed JSON files.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, exam_id: &str, student_id: &str) -> PathBuf {
        self.root
            .join(format!("{}__{}.json", sanitize(exam_id), sanitize(student_id)))
    }
}

/// Keep ids filesystem-safe without losing readability.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl OrderingStore for JsonFileStore {
    async fn load(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> anyhow::Result<Option<OrderingRecord>> {
        let path = self.path_for(exam_id, student_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!("corrupt ordering record {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(
        &self,
        exam_id: &str,
        student_id: &str,
        record: &OrderingRecord,
    ) -> anyhow::Result<()> {
        let path = self.path_for(exam_id, student_id);
        let json = serde_json::to_string_pretty(record).context("failed to serialize record")?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }

    async fn clear(&self, exam_id: &str, student_id: &str) -> anyhow::Result<()> {
        let path = self.path_for(exam_id, student_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

impl JsonFileStore {
    /// The file backing one (exam, student) pair; exposed for operators.
    pub fn record_path(&self, exam_id: &str, student_id: &str) -> PathBuf {
        self.path_for(exam_id, student_id)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
