//! Immutable records produced by the hook pipeline.
//!
//! An [`ExecutionContext`] is built once by the pre-phase and an
//! [`ExecutionOutcome`] once by the post-phase. Neither exposes setters.

use crate::dimension::DimensionTags;
use crate::id::ContextId;
use crate::threat::{ScanAction, ScanVerdict};
use crate::worker::Assignment;
use crate::Time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle phase of a hook execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPhase {
    /// Before the action runs
    Pre,
    /// After the action ran
    Post,
}

impl HookPhase {
    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::Pre => "pre",
            HookPhase::Post => "post",
        }
    }
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HookPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre" => Ok(HookPhase::Pre),
            "post" => Ok(HookPhase::Post),
            other => Err(format!("unknown hook phase: {other}")),
        }
    }
}

/// A non-binding optimization suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationHint {
    /// Short machine-readable kind
    pub kind: String,
    /// Human message
    pub message: String,
}

impl OptimizationHint {
    /// Create a hint.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Everything the pre-phase learned about an action.
pub struct ContextParts {
    /// Derived id
    pub id: ContextId,
    /// Action text
    pub action: String,
    /// When the pre-phase started
    pub created_at: Time,
    /// Environment snapshot
    pub environment: BTreeMap<String, String>,
    /// Threat scan
    pub scan: ScanVerdict,
    /// Routing decision
    pub assignment: Assignment,
    /// Facet tags
    pub dimensions: DimensionTags,
    /// Optimization hints
    pub hints: Vec<OptimizationHint>,
    /// Pre-phase latency
    pub latency_ms: f64,
}

/// Immutable description of one governed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    id: ContextId,
    action: String,
    created_at: Time,
    environment: BTreeMap<String, String>,
    scan: ScanVerdict,
    assignment: Assignment,
    dimensions: DimensionTags,
    hints: Vec<OptimizationHint>,
    latency_ms: f64,
}

impl ExecutionContext {
    /// Freeze the pre-phase results.
    pub fn from_parts(parts: ContextParts) -> Self {
        Self {
            id: parts.id,
            action: parts.action,
            created_at: parts.created_at,
            environment: parts.environment,
            scan: parts.scan,
            assignment: parts.assignment,
            dimensions: parts.dimensions,
            hints: parts.hints,
            latency_ms: parts.latency_ms,
        }
    }

    /// Context id.
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// Action text.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Creation time.
    pub fn created_at(&self) -> Time {
        self.created_at
    }

    /// Environment snapshot.
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Threat scan.
    pub fn scan(&self) -> &ScanVerdict {
        &self.scan
    }

    /// Routing decision.
    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    /// Facet tags.
    pub fn dimensions(&self) -> &DimensionTags {
        &self.dimensions
    }

    /// Optimization hints.
    pub fn hints(&self) -> &[OptimizationHint] {
        &self.hints
    }

    /// Pre-phase latency.
    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }
}

/// A problem the post-phase found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Violation {
    /// A confident assignment did not produce success
    Misprediction {
        /// Assignment confidence
        confidence: f64,
        /// Actual outcome
        success: bool,
    },
    /// A phase ran slower than its target
    Latency {
        /// Measured latency
        latency_ms: f64,
        /// Target latency
        target_ms: f64,
    },
}

impl Violation {
    /// Whether the violation fails validation.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Violation::Misprediction { .. })
    }
}

/// Result of post-phase validation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// No blocking violation occurred
    pub passed: bool,
    /// All violations found
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    /// Build a result from violations.
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            passed: !violations.iter().any(Violation::is_blocking),
            violations,
        }
    }
}

/// Which downstream models an outcome would update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LearningRecord {
    /// Model names
    pub models: Vec<String>,
    /// Whether the update was actually applied
    pub applied: bool,
}

/// Everything the post-phase produced.
pub struct OutcomeParts {
    /// Context this outcome belongs to
    pub context_id: ContextId,
    /// Whether the action succeeded
    pub success: bool,
    /// Action duration
    pub duration_ms: f64,
    /// Free-form action outputs
    pub outputs: serde_json::Value,
    /// Validation
    pub validation: ValidationResult,
    /// Routing category carried over from the context
    pub routing_tag: String,
    /// Learning update record
    pub learning: LearningRecord,
    /// When the post-phase finished
    pub completed_at: Time,
    /// Post-phase latency
    pub latency_ms: f64,
}

/// Immutable result of one governed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    context_id: ContextId,
    success: bool,
    duration_ms: f64,
    outputs: serde_json::Value,
    validation: ValidationResult,
    routing_tag: String,
    learning: LearningRecord,
    completed_at: Time,
    latency_ms: f64,
}

impl ExecutionOutcome {
    /// Freeze the post-phase results.
    pub fn from_parts(parts: OutcomeParts) -> Self {
        Self {
            context_id: parts.context_id,
            success: parts.success,
            duration_ms: parts.duration_ms,
            outputs: parts.outputs,
            validation: parts.validation,
            routing_tag: parts.routing_tag,
            learning: parts.learning,
            completed_at: parts.completed_at,
            latency_ms: parts.latency_ms,
        }
    }

    /// Context id.
    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    /// Whether the action succeeded.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Action duration.
    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Action outputs.
    pub fn outputs(&self) -> &serde_json::Value {
        &self.outputs
    }

    /// Validation.
    pub fn validation(&self) -> &ValidationResult {
        &self.validation
    }

    /// Routing category.
    pub fn routing_tag(&self) -> &str {
        &self.routing_tag
    }

    /// Learning update record.
    pub fn learning(&self) -> &LearningRecord {
        &self.learning
    }

    /// Completion time.
    pub fn completed_at(&self) -> Time {
        self.completed_at
    }

    /// Post-phase latency.
    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }
}

/// One row of the hook execution log, keyed by (context id, phase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Context id
    pub context_id: ContextId,
    /// Phase
    pub phase: HookPhase,
    /// When the phase ran
    pub recorded_at: Time,
    /// Action text
    pub action: String,
    /// Phase latency
    pub latency_ms: f64,
    /// Scanner decision, if the scan ran
    pub security_action: Option<ScanAction>,
    /// Assigned worker name
    pub worker: Option<String>,
    /// Routing category
    pub category: Option<String>,
    /// Post-phase validation verdict
    pub validation_passed: Option<bool>,
    /// Failures recorded for this (context id, phase)
    pub retry_count: u32,
    /// The action was refused
    pub halted: bool,
    /// Serialized context
    pub context_json: serde_json::Value,
    /// Serialized outcome
    pub outcome_json: Option<serde_json::Value>,
}

/// Retry counter after recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Counter after the update, never above the max
    pub retry_count: u32,
    /// This failure brought the counter to the max
    pub escalate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_mispredictions_block() {
        let latency = Violation::Latency {
            latency_ms: 90.0,
            target_ms: 50.0,
        };
        assert!(ValidationResult::from_violations(vec![latency.clone()]).passed);

        let miss = Violation::Misprediction {
            confidence: 0.9,
            success: false,
        };
        let result = ValidationResult::from_violations(vec![latency, miss]);
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 2);
    }

    #[test]
    fn test_violation_serializes_with_kind_tag() {
        let value = serde_json::to_value(Violation::Latency {
            latency_ms: 60.0,
            target_ms: 50.0,
        })
        .unwrap();
        assert_eq!(value["kind"], "latency");
    }
}
