//! Worker profiles and task assignments.

use crate::id::WorkerId;
use crate::Time;
use serde::{Deserialize, Serialize};

/// A worker that actions can be routed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerProfile {
    /// Stable identifier
    pub id: WorkerId,
    /// Unique display name
    pub name: String,
    /// Task types this worker specializes in
    pub specializations: Vec<String>,
    /// Tasks completed (either outcome)
    pub total_tasks: u64,
    /// Tasks completed successfully
    pub successful_tasks: u64,
    /// successful / total, in [0, 1]
    pub success_rate: f64,
    /// Running mean of reported durations
    pub avg_completion_ms: Option<f64>,
    /// Smoothed expertise in [0, 1]
    pub expertise: f64,
    /// Last time an outcome was recorded
    pub last_active: Option<Time>,
    /// When the profile was created
    pub created_at: Time,
}

impl WorkerProfile {
    /// Expertise assigned to a profile with no history.
    pub const DEFAULT_EXPERTISE: f64 = 0.5;

    /// Create a fresh profile.
    pub fn new(name: impl Into<String>, specializations: Vec<String>) -> Self {
        Self {
            id: WorkerId::new(),
            name: name.into(),
            specializations,
            total_tasks: 0,
            successful_tasks: 0,
            success_rate: 0.0,
            avg_completion_ms: None,
            expertise: Self::DEFAULT_EXPERTISE,
            last_active: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Whether the worker lists `task_type` as a specialization.
    pub fn specializes_in(&self, task_type: &str) -> bool {
        self.specializations.iter().any(|s| s == task_type)
    }
}

/// How an assignment was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentMethod {
    /// Best-scoring eligible worker
    Scored,
    /// No eligible worker; default generalist used
    Fallback,
    /// Same description was assigned before
    Cached,
}

impl AssignmentMethod {
    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentMethod::Scored => "scored",
            AssignmentMethod::Fallback => "fallback",
            AssignmentMethod::Cached => "cached",
        }
    }
}

impl std::str::FromStr for AssignmentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scored" => Ok(AssignmentMethod::Scored),
            "fallback" => Ok(AssignmentMethod::Fallback),
            "cached" => Ok(AssignmentMethod::Cached),
            other => Err(format!("unknown assignment method: {other}")),
        }
    }
}

/// The router's answer for one description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Chosen worker id
    pub worker_id: WorkerId,
    /// Chosen worker name
    pub worker: String,
    /// Score of the chosen worker
    pub confidence: f64,
    /// How the decision was made
    pub method: AssignmentMethod,
    /// Explanation
    pub reasoning: String,
    /// Inferred task type
    pub task_type: String,
    /// Estimated complexity in [0, 1]
    pub complexity: f64,
}

/// Persisted assignment, keyed by description hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    /// Content hash of the description
    pub task_hash: String,
    /// Description text
    pub description: String,
    /// The assignment as first decided
    pub assignment: Assignment,
    /// When it was assigned
    pub started_at: Time,
    /// When an outcome was reported
    pub completed_at: Option<Time>,
    /// Reported outcome
    pub success: Option<bool>,
    /// Reported duration
    pub duration_ms: Option<f64>,
    /// Reported quality score
    pub quality: Option<f64>,
}

/// Signed contribution of one outcome to a worker's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceDelta {
    /// Worker the outcome belongs to
    pub worker_id: WorkerId,
    /// +1.0 on success, -0.5 on failure
    pub delta: f64,
    /// When it was recorded
    pub recorded_at: Time,
}

impl PerformanceDelta {
    /// Delta for an outcome.
    pub fn for_outcome(worker_id: WorkerId, success: bool) -> Self {
        Self {
            worker_id,
            delta: if success { 1.0 } else { -0.5 },
            recorded_at: chrono::Utc::now(),
        }
    }
}
