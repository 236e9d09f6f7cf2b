//! Append-only JSONL learning log.
//!
//! One line per completed action, consumed by offline training jobs.

use govern_core::{ContextId, DimensionTags, Time, ValidationResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::trait_::Result;

/// One consolidated record of a completed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEntry {
    /// When the action completed
    pub timestamp: Time,
    /// Context id
    pub context_id: ContextId,
    /// Action text
    pub action: String,
    /// Assigned worker
    pub worker: String,
    /// Routing category
    pub category: String,
    /// Whether the action succeeded
    pub success: bool,
    /// Action duration
    pub duration_ms: f64,
    /// Facet tags
    pub dimensions: DimensionTags,
    /// Post-phase validation
    pub validation: ValidationResult,
}

/// JSONL file that entries are appended to.
#[derive(Debug, Clone)]
pub struct LearningLog {
    path: PathBuf,
}

impl LearningLog {
    /// Log at `path`; the file and its parent are created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single line.
    pub async fn append(&self, entry: &LearningEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Read every entry back, skipping malformed lines.
    pub async fn read_all(&self) -> Result<Vec<LearningEntry>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(action: &str, success: bool) -> LearningEntry {
        LearningEntry {
            timestamp: chrono::Utc::now(),
            context_id: ContextId::derive(action, chrono::Utc::now()),
            action: action.to_string(),
            worker: "coder".to_string(),
            category: "agentic-teams".to_string(),
            success,
            duration_ms: 42.0,
            dimensions: DimensionTags {
                actor: "unknown".into(),
                action: "action:build".into(),
                time: "unknown".into(),
                location: "unknown".into(),
                motivation: "unknown".into(),
                mechanism: "unknown".into(),
                category: "agentic-teams".into(),
                confidence: 1.0 / 6.0,
            },
            validation: ValidationResult::from_violations(vec![]),
        }
    }

    #[tokio::test]
    async fn test_append_creates_parent_and_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = LearningLog::new(dir.path().join("logs/learning/events.jsonl"));

        log.append(&entry("cargo build", true)).await.unwrap();
        log.append(&entry("cargo test", false)).await.unwrap();

        let entries = log.read_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "cargo build");
        assert!(!entries[1].success);
    }

    #[tokio::test]
    async fn test_append_to_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let log = LearningLog::new(dir.path());
        assert!(log.append(&entry("ls", true)).await.is_err());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = LearningLog::new(dir.path().join("absent.jsonl"));
        assert!(log.read_all().await.unwrap().is_empty());
    }
}
