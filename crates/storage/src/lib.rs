//! Audit storage for the governance components.
//!
//! This crate provides the [`AuditStore`] trait with a SQLite
//! implementation, plus the append-only JSONL learning log.

#![warn(missing_docs)]

pub mod trait_;
pub mod sqlite_storage;
pub mod learning_log;

pub use trait_::{AssignmentSummary, AuditStore, Result, ScanSummary, StorageError};
pub use sqlite_storage::SqliteAuditStore;
pub use learning_log::{LearningEntry, LearningLog};
