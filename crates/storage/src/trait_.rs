//! Audit store abstraction.

use async_trait::async_trait;
use govern_core::{
    AssignmentRecord, AuditRecord, ContextId, CycleRun, DimensionEvent, GovernanceEvent,
    HookPhase, Iteration, PerformanceDelta, RetryState, RunId, ScanVerdict, ThreatPattern, Time,
    WorkerId, WorkerProfile,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Aggregate scanner metrics over a period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Scans recorded
    pub total_scans: u64,
    /// Scans with a detected threat
    pub threats_detected: u64,
    /// Mean risk
    pub avg_risk: Option<f64>,
    /// Mean scan duration
    pub avg_scan_ms: Option<f64>,
    /// Detected threats per level
    pub threats_by_level: BTreeMap<String, u64>,
    /// False positives over detections, across all patterns
    pub false_positive_rate: f64,
}

/// Aggregate routing metrics over a period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSummary {
    /// Assignments recorded
    pub total_assignments: u64,
    /// Assignments reported successful
    pub successful: u64,
    /// Mean assignment confidence
    pub avg_confidence: Option<f64>,
    /// Mean reported duration
    pub avg_duration_ms: Option<f64>,
    /// Mean reported quality
    pub avg_quality: Option<f64>,
}

/// Persistent, mostly-append store shared by the governance components.
///
/// Implementations serialize writes; every counter update is a single
/// atomic statement or transaction.
#[async_trait]
pub trait AuditStore: Send + Sync {
    // === Threat patterns ===

    /// Insert a pattern, or update level and description of an existing one.
    async fn upsert_threat_pattern(&self, pattern: &ThreatPattern) -> Result<()>;

    /// Insert a pattern unless it exists. Returns whether it was inserted.
    async fn seed_threat_pattern(&self, pattern: &ThreatPattern) -> Result<bool>;

    /// All patterns in insertion order.
    async fn list_threat_patterns(&self) -> Result<Vec<ThreatPattern>>;

    /// Count a detection for a pattern.
    async fn record_detection(&self, pattern: &str, at: Time) -> Result<()>;

    /// Count a false positive and decay confidence once the rate exceeds 20%.
    async fn record_false_positive(&self, pattern: &str) -> Result<Option<ThreatPattern>>;

    // === Security scans ===

    /// Look up a scan by text hash.
    async fn find_scan(&self, text_hash: &str) -> Result<Option<ScanVerdict>>;

    /// Record a scan. Returns false if the hash was already recorded.
    async fn save_scan(&self, text: &str, verdict: &ScanVerdict) -> Result<bool>;

    /// Scanner metrics since `since`.
    async fn scan_summary(&self, since: Time) -> Result<ScanSummary>;

    // === Worker profiles ===

    /// Insert a profile unless its id or name exists. Returns whether it was inserted.
    async fn seed_worker(&self, profile: &WorkerProfile) -> Result<bool>;

    /// Insert or replace a profile by id.
    async fn save_worker(&self, profile: &WorkerProfile) -> Result<()>;

    /// Load a profile by id.
    async fn load_worker(&self, id: WorkerId) -> Result<Option<WorkerProfile>>;

    /// Load a profile by name.
    async fn find_worker_by_name(&self, name: &str) -> Result<Option<WorkerProfile>>;

    /// All profiles in insertion order.
    async fn list_workers(&self) -> Result<Vec<WorkerProfile>>;

    /// Apply one outcome to a profile's counters.
    ///
    /// Expertise is recomputed only once the profile has at least five tasks.
    async fn apply_worker_outcome(
        &self,
        id: WorkerId,
        success: bool,
        duration_ms: Option<f64>,
        at: Time,
    ) -> Result<Option<WorkerProfile>>;

    // === Assignments ===

    /// Look up an assignment by description hash.
    async fn find_assignment(&self, task_hash: &str) -> Result<Option<AssignmentRecord>>;

    /// Record an assignment. Returns false if the hash was already recorded.
    async fn save_assignment(&self, record: &AssignmentRecord) -> Result<bool>;

    /// Attach an outcome to an assignment. Returns false if none exists.
    async fn complete_assignment(
        &self,
        task_hash: &str,
        success: bool,
        duration_ms: Option<f64>,
        quality: Option<f64>,
        at: Time,
    ) -> Result<bool>;

    /// Append a performance delta.
    async fn append_performance_delta(&self, delta: &PerformanceDelta) -> Result<()>;

    /// Deltas recorded for a worker, oldest first.
    async fn list_performance_deltas(&self, worker_id: WorkerId) -> Result<Vec<PerformanceDelta>>;

    /// Routing metrics since `since`.
    async fn assignment_summary(&self, since: Time) -> Result<AssignmentSummary>;

    // === Dimension events ===

    /// Record an extraction. Returns false if the text hash was already recorded.
    async fn save_dimension_event(&self, event: &DimensionEvent) -> Result<bool>;

    /// Look up an extraction by text hash.
    async fn load_dimension_event(&self, text_hash: &str) -> Result<Option<DimensionEvent>>;

    // === Hook execution log ===

    /// Write the record for a (context id, phase), preserving its retry counter.
    async fn append_hook_record(&self, record: &AuditRecord) -> Result<()>;

    /// Count a failure for a (context id, phase), clamped at `max_retries`.
    async fn record_hook_failure(
        &self,
        context_id: &ContextId,
        phase: HookPhase,
        action: &str,
        max_retries: u32,
    ) -> Result<RetryState>;

    /// Load the record for a (context id, phase).
    async fn load_hook_record(
        &self,
        context_id: &ContextId,
        phase: HookPhase,
    ) -> Result<Option<AuditRecord>>;

    /// Whether the routing outcome of a context has already been applied.
    async fn outcome_applied(&self, context_id: &ContextId) -> Result<bool>;

    /// Mark the routing outcome of a context as applied. False if it already was.
    async fn mark_outcome_applied(
        &self,
        context_id: &ContextId,
        worker: &str,
        success: bool,
        at: Time,
    ) -> Result<bool>;

    // === Cycle runs ===

    /// Insert or update a run.
    async fn save_cycle_run(&self, run: &CycleRun) -> Result<()>;

    /// Load a run.
    async fn load_cycle_run(&self, id: RunId) -> Result<Option<CycleRun>>;

    /// Append an iteration record.
    async fn append_iteration(&self, iteration: &Iteration) -> Result<()>;

    /// Iterations of a run in order.
    async fn list_iterations(&self, run_id: RunId) -> Result<Vec<Iteration>>;

    /// Append a governance event.
    async fn append_governance_event(&self, event: &GovernanceEvent) -> Result<()>;

    /// Governance events of a run in order.
    async fn list_governance_events(&self, run_id: RunId) -> Result<Vec<GovernanceEvent>>;
}
