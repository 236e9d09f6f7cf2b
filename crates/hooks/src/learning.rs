//! Downstream learning updates.

use async_trait::async_trait;
use govern_core::{ExecutionContext, LearningRecord, ValidationResult};

/// Feeds completed actions to downstream models.
#[async_trait]
pub trait LearningUpdater: Send + Sync {
    /// Record which models an outcome updates.
    async fn update(
        &self,
        context: &ExecutionContext,
        success: bool,
        validation: &ValidationResult,
    ) -> LearningRecord;
}

/// Updater that only reports which models would be updated.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunUpdater;

#[async_trait]
impl LearningUpdater for DryRunUpdater {
    async fn update(
        &self,
        _context: &ExecutionContext,
        success: bool,
        _validation: &ValidationResult,
    ) -> LearningRecord {
        let models = if success {
            vec!["decision-transformer".to_string()]
        } else {
            Vec::new()
        };
        LearningRecord {
            models,
            applied: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::tests::context;

    #[tokio::test]
    async fn test_dry_run_never_applies() {
        let ctx = context(0.5, 1.0);
        let passed = ValidationResult::from_violations(Vec::new());

        let record = DryRunUpdater.update(&ctx, true, &passed).await;
        assert_eq!(record.models, vec!["decision-transformer"]);
        assert!(!record.applied);

        let record = DryRunUpdater.update(&ctx, false, &passed).await;
        assert!(record.models.is_empty());
    }
}
