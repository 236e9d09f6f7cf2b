//! Govern core data models.
//!
//! This crate defines the records shared by the governance components:
//! identifiers, threat verdicts, worker profiles, facet tags, hook
//! contexts and outcomes, and cycle audit records.

#![warn(missing_docs)]

// Identities
mod id;

// Classification tables
mod rules;

// Hook pipeline records
mod threat;
mod worker;
mod dimension;
mod context;

// Control loop records
mod cycle;

// Re-exports
pub use id::{content_hash, ContextId, EventId, InvalidContextId, RunId, WorkerId, CONTEXT_ID_LEN};
pub use rules::{KeywordRule, PatternRule, RuleList};
pub use threat::{ScanAction, ScanVerdict, ThreatLevel, ThreatPattern, UnknownThreatLevel};
pub use worker::{Assignment, AssignmentMethod, AssignmentRecord, PerformanceDelta, WorkerProfile};
pub use dimension::{DimensionEvent, DimensionTags, Facet, UNKNOWN};
pub use context::{
    AuditRecord, ContextParts, ExecutionContext, ExecutionOutcome, HookPhase, LearningRecord,
    OptimizationHint, OutcomeParts, RetryState, ValidationResult, Violation,
};
pub use cycle::{
    CycleRun, EventKind, Focus, GovernanceEvent, Iteration, RewardBreakdown, RunStatus,
    SafetyState, PROD_CYCLE,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
