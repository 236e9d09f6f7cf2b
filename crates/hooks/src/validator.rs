//! Post-phase validation.

use govern_core::{ExecutionContext, ValidationResult, Violation};

/// Checks an outcome against what the pre-phase predicted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityValidator {
    /// Assignment confidence above which a failure is a misprediction
    pub confidence_threshold: f64,
    /// Phase latency target
    pub latency_target_ms: f64,
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            latency_target_ms: 50.0,
        }
    }
}

impl QualityValidator {
    /// Validate the outcome of `context`.
    ///
    /// Mispredictions fail validation. Slow phases are recorded only.
    pub fn validate(&self, context: &ExecutionContext, success: bool) -> ValidationResult {
        let mut violations = Vec::new();

        let confidence = context.assignment().confidence;
        if confidence > self.confidence_threshold && !success {
            violations.push(Violation::Misprediction {
                confidence,
                success,
            });
        }

        if context.latency_ms() > self.latency_target_ms {
            violations.push(Violation::Latency {
                latency_ms: context.latency_ms(),
                target_ms: self.latency_target_ms,
            });
        }

        ValidationResult::from_violations(violations)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use govern_core::{
        Assignment, AssignmentMethod, ContextId, ContextParts, DimensionTags, ScanAction,
        ScanVerdict, ThreatLevel, WorkerId, UNKNOWN,
    };
    use std::collections::BTreeMap;

    pub(crate) fn context(confidence: f64, latency_ms: f64) -> ExecutionContext {
        let now = chrono::Utc::now();
        let unknown = || UNKNOWN.to_string();
        ExecutionContext::from_parts(ContextParts {
            id: ContextId::derive("write the parser", now),
            action: "write the parser".to_string(),
            created_at: now,
            environment: BTreeMap::new(),
            scan: ScanVerdict {
                text_hash: govern_core::content_hash("write the parser"),
                detected: false,
                level: ThreatLevel::Safe,
                risk: 0.0,
                action: ScanAction::Allow,
                matched: Vec::new(),
                reasoning: "No threats detected".to_string(),
                cached: false,
                duration_ms: 0.1,
                scanned_at: now,
            },
            assignment: Assignment {
                worker_id: WorkerId::new(),
                worker: "coder".to_string(),
                confidence,
                method: AssignmentMethod::Scored,
                reasoning: "best match".to_string(),
                task_type: "implementation".to_string(),
                complexity: 0.1,
            },
            dimensions: DimensionTags {
                actor: unknown(),
                action: unknown(),
                time: unknown(),
                location: unknown(),
                motivation: unknown(),
                mechanism: unknown(),
                category: "agentic-teams".to_string(),
                confidence: 0.0,
            },
            hints: Vec::new(),
            latency_ms,
        })
    }

    #[test]
    fn test_confident_failure_is_a_misprediction() {
        let result = QualityValidator::default().validate(&context(0.9, 1.0), false);
        assert!(!result.passed);
        assert!(matches!(
            result.violations.as_slice(),
            [Violation::Misprediction { success: false, .. }]
        ));
    }

    #[test]
    fn test_unconfident_failure_passes() {
        let result = QualityValidator::default().validate(&context(0.7, 1.0), false);
        assert!(result.passed);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_slow_phase_is_recorded_but_passes() {
        let result = QualityValidator::default().validate(&context(0.9, 80.0), true);
        assert!(result.passed);
        assert_eq!(
            result.violations,
            vec![Violation::Latency {
                latency_ms: 80.0,
                target_ms: 50.0
            }]
        );
    }
}
