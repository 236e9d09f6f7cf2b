//! Pre/post hook pipeline around one governed action.
//!
//! The pre-phase screens, routes and tags an action and freezes the result
//! into an [`ExecutionContext`]. The post-phase feeds the outcome back to
//! the router, validates it and appends it to the learning log.
//!
//! Infrastructure failures are counted per (context id, phase). The failure
//! that brings the counter to `max_retries` is escalated once on the
//! `govern::fatal` target; later attempts are refused without running.

use govern_core::{
    AuditRecord, ContextId, ContextParts, ExecutionContext, ExecutionOutcome, HookPhase,
    OutcomeParts, ScanAction, Time,
};
use govern_guard::ThreatScanner;
use govern_routing::{DimensionExtractor, TaskRouter};
use govern_storage::{AuditStore, LearningEntry, LearningLog};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::advisor::{memory_usage_pct, AdviceRequest, NoopAdvisor, OptimizationAdvisor, MEMORY_PCT};
use crate::learning::{DryRunUpdater, LearningUpdater};
use crate::validator::QualityValidator;
use crate::{HookError, Result};

/// Configuration for the hook pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Per-phase latency target
    pub latency_target_ms: f64,
    /// Failures per (context id, phase) before escalation
    pub max_retries: u32,
    /// Assignment confidence above which a failure is a misprediction
    pub misprediction_confidence: f64,
    /// JSONL learning log
    pub learning_log: PathBuf,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            latency_target_ms: 50.0,
            max_retries: 3,
            misprediction_confidence: 0.7,
            learning_log: PathBuf::from("logs/learning/events.jsonl"),
        }
    }
}

/// Wraps actions in screening, routing, tagging and audit logging.
pub struct HookPipeline {
    store: Arc<dyn AuditStore>,
    scanner: ThreatScanner,
    router: TaskRouter,
    extractor: DimensionExtractor,
    advisor: Box<dyn OptimizationAdvisor>,
    updater: Box<dyn LearningUpdater>,
    validator: QualityValidator,
    log: LearningLog,
    config: HookConfig,
    last_created: Mutex<Option<Time>>,
    escalations: AtomicU64,
}

impl HookPipeline {
    /// Create a pipeline with default components over `store`.
    pub fn new(store: Arc<dyn AuditStore>) -> Result<Self> {
        let config = HookConfig::default();
        Ok(Self {
            scanner: ThreatScanner::new(store.clone()),
            router: TaskRouter::new(store.clone()),
            extractor: DimensionExtractor::new(store.clone())?,
            advisor: Box::new(NoopAdvisor),
            updater: Box::new(DryRunUpdater),
            validator: validator_for(&config),
            log: LearningLog::new(config.learning_log.clone()),
            config,
            store,
            last_created: Mutex::new(None),
            escalations: AtomicU64::new(0),
        })
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: HookConfig) -> Self {
        self.validator = validator_for(&config);
        self.log = LearningLog::new(config.learning_log.clone());
        self.config = config;
        self
    }

    /// Replace the task router.
    pub fn with_router(mut self, router: TaskRouter) -> Self {
        self.router = router;
        self
    }

    /// Replace the dimension extractor.
    pub fn with_extractor(mut self, extractor: DimensionExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the optimization advisor.
    pub fn with_advisor(mut self, advisor: Box<dyn OptimizationAdvisor>) -> Self {
        self.advisor = advisor;
        self
    }

    /// Replace the learning updater.
    pub fn with_updater(mut self, updater: Box<dyn LearningUpdater>) -> Self {
        self.updater = updater;
        self
    }

    /// Seed default threat patterns and workers.
    pub async fn seed(&self) -> Result<()> {
        self.scanner.seed_defaults().await?;
        self.router.seed_workers().await?;
        Ok(())
    }

    /// The threat scanner.
    pub fn scanner(&self) -> &ThreatScanner {
        &self.scanner
    }

    /// The task router.
    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    /// The dimension extractor.
    pub fn extractor(&self) -> &DimensionExtractor {
        &self.extractor
    }

    /// Failures escalated since the pipeline was created.
    pub fn escalations(&self) -> u64 {
        self.escalations.load(Ordering::Relaxed)
    }

    /// Run the pre-phase for `action`.
    pub async fn pre(
        &self,
        action: &str,
        environment: BTreeMap<String, String>,
    ) -> Result<ExecutionContext> {
        let created_at = self.next_timestamp().await;
        self.pre_at(action, environment, created_at).await
    }

    /// Run the pre-phase with an explicit timestamp.
    ///
    /// The context id is derived from (action, timestamp), so repeating a
    /// call retries the same context.
    pub async fn pre_at(
        &self,
        action: &str,
        environment: BTreeMap<String, String>,
        created_at: Time,
    ) -> Result<ExecutionContext> {
        let id = ContextId::derive(action, created_at);
        self.ensure_retries_left(&id, HookPhase::Pre).await?;

        match self.run_pre(&id, action, environment, created_at).await {
            Ok(context) => Ok(context),
            Err(e @ HookError::Denied { .. }) => Err(e),
            Err(e) => Err(self.fail(&id, HookPhase::Pre, action, e).await),
        }
    }

    /// Run the post-phase for an action that ran under `context`.
    pub async fn post(
        &self,
        context: &ExecutionContext,
        success: bool,
        duration_ms: f64,
        outputs: serde_json::Value,
    ) -> Result<ExecutionOutcome> {
        self.ensure_retries_left(context.id(), HookPhase::Post).await?;

        match self.run_post(context, success, duration_ms, outputs).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(context.id(), HookPhase::Post, context.action(), e).await),
        }
    }

    async fn run_pre(
        &self,
        id: &ContextId,
        action: &str,
        mut environment: BTreeMap<String, String>,
        created_at: Time,
    ) -> Result<ExecutionContext> {
        let start = Instant::now();

        let scan = self.scanner.scan(action).await?;
        if scan.action == ScanAction::Deny {
            let record = AuditRecord {
                context_id: id.clone(),
                phase: HookPhase::Pre,
                recorded_at: chrono::Utc::now(),
                action: action.to_string(),
                latency_ms: 0.0,
                security_action: Some(ScanAction::Deny),
                worker: None,
                category: None,
                validation_passed: None,
                retry_count: 0,
                halted: true,
                context_json: serde_json::json!({ "scan": &scan, "halted": true }),
                outcome_json: None,
            };
            self.store.append_hook_record(&record).await?;
            warn!(context_id = %id, "Action denied: {}", scan.reasoning);
            return Err(HookError::Denied {
                context_id: id.clone(),
                reasoning: scan.reasoning,
            });
        }

        let assignment = self.router.assign(action).await?;
        let dimensions = self.extractor.extract(action).await?;

        if !environment.contains_key(MEMORY_PCT) {
            if let Some(pct) = memory_usage_pct() {
                environment.insert(MEMORY_PCT.to_string(), format!("{pct:.1}"));
            }
        }
        let hints = self.advisor.suggest(&AdviceRequest {
            action,
            environment: &environment,
            worker: &assignment.worker,
            category: &dimensions.category,
        });

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let context = ExecutionContext::from_parts(ContextParts {
            id: id.clone(),
            action: action.to_string(),
            created_at,
            environment,
            scan,
            assignment,
            dimensions,
            hints,
            latency_ms,
        });

        self.store
            .append_hook_record(&AuditRecord {
                context_id: id.clone(),
                phase: HookPhase::Pre,
                recorded_at: chrono::Utc::now(),
                action: action.to_string(),
                latency_ms,
                security_action: Some(context.scan().action),
                worker: Some(context.assignment().worker.clone()),
                category: Some(context.dimensions().category.clone()),
                validation_passed: None,
                retry_count: 0,
                halted: false,
                context_json: serde_json::to_value(&context)?,
                outcome_json: None,
            })
            .await?;

        if latency_ms > self.config.latency_target_ms {
            warn!(
                context_id = %id,
                "Pre-phase latency {:.2}ms exceeds {}ms target",
                latency_ms,
                self.config.latency_target_ms
            );
        }
        debug!(context_id = %id, worker = %context.assignment().worker, "Pre-phase complete");

        Ok(context)
    }

    async fn run_post(
        &self,
        context: &ExecutionContext,
        success: bool,
        duration_ms: f64,
        outputs: serde_json::Value,
    ) -> Result<ExecutionOutcome> {
        let start = Instant::now();

        // A retried post-phase must not count the same outcome twice
        if self.store.outcome_applied(context.id()).await? {
            debug!(context_id = %context.id(), "Routing outcome already applied");
        } else {
            let quality = outputs.get("quality_score").and_then(serde_json::Value::as_f64);
            self.router
                .update(context.action(), success, Some(duration_ms), quality)
                .await?;
            self.store
                .mark_outcome_applied(
                    context.id(),
                    &context.assignment().worker,
                    success,
                    chrono::Utc::now(),
                )
                .await?;
        }

        let validation = self.validator.validate(context, success);
        if !validation.passed {
            warn!(context_id = %context.id(), "Validation failed: {:?}", validation.violations);
        }

        let learning = self.updater.update(context, success, &validation).await;

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let outcome = ExecutionOutcome::from_parts(OutcomeParts {
            context_id: context.id().clone(),
            success,
            duration_ms,
            outputs,
            validation: validation.clone(),
            routing_tag: context.dimensions().category.clone(),
            learning,
            completed_at: chrono::Utc::now(),
            latency_ms,
        });

        self.log
            .append(&LearningEntry {
                timestamp: outcome.completed_at(),
                context_id: context.id().clone(),
                action: context.action().to_string(),
                worker: context.assignment().worker.clone(),
                category: outcome.routing_tag().to_string(),
                success,
                duration_ms,
                dimensions: context.dimensions().clone(),
                validation,
            })
            .await?;

        self.store
            .append_hook_record(&AuditRecord {
                context_id: context.id().clone(),
                phase: HookPhase::Post,
                recorded_at: outcome.completed_at(),
                action: context.action().to_string(),
                latency_ms,
                security_action: None,
                worker: Some(context.assignment().worker.clone()),
                category: Some(outcome.routing_tag().to_string()),
                validation_passed: Some(outcome.validation().passed),
                retry_count: 0,
                halted: false,
                context_json: serde_json::to_value(context)?,
                outcome_json: Some(serde_json::to_value(&outcome)?),
            })
            .await?;

        if latency_ms > self.config.latency_target_ms {
            warn!(
                context_id = %context.id(),
                "Post-phase latency {:.2}ms exceeds {}ms target",
                latency_ms,
                self.config.latency_target_ms
            );
        }

        Ok(outcome)
    }

    async fn ensure_retries_left(&self, id: &ContextId, phase: HookPhase) -> Result<()> {
        let record = self.store.load_hook_record(id, phase).await?;
        if record.is_some_and(|r| r.retry_count >= self.config.max_retries) {
            return Err(HookError::RetriesExhausted {
                context_id: id.clone(),
                phase,
            });
        }
        Ok(())
    }

    /// Count a failure and escalate it when the counter reaches the max.
    async fn fail(&self, id: &ContextId, phase: HookPhase, action: &str, err: HookError) -> HookError {
        match self
            .store
            .record_hook_failure(id, phase, action, self.config.max_retries)
            .await
        {
            Ok(state) => {
                warn!(
                    context_id = %id,
                    %phase,
                    retry_count = state.retry_count,
                    "Hook phase failed: {}",
                    err
                );
                if state.escalate {
                    self.escalations.fetch_add(1, Ordering::Relaxed);
                    error!(
                        target: "govern::fatal",
                        context_id = %id,
                        %phase,
                        "FATAL: hook execution failed after {} retries: {}",
                        state.retry_count,
                        err
                    );
                }
            }
            Err(e) => error!(context_id = %id, %phase, "Failed to record hook failure: {}", e),
        }
        err
    }

    /// A timestamp strictly after the previous one, so context ids never repeat.
    async fn next_timestamp(&self) -> Time {
        let mut last = self.last_created.lock().await;
        let mut now = chrono::Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + chrono::Duration::nanoseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

fn validator_for(config: &HookConfig) -> QualityValidator {
    QualityValidator {
        confidence_threshold: config.misprediction_confidence,
        latency_target_ms: config.latency_target_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::HeuristicAdvisor;
    use govern_core::{ThreatLevel, Violation};
    use govern_storage::SqliteAuditStore;

    struct Fixture {
        pipeline: HookPipeline,
        store: Arc<dyn AuditStore>,
        dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::in_memory().await.unwrap());
        let pipeline = HookPipeline::new(store.clone())
            .unwrap()
            .with_config(HookConfig {
                learning_log: dir.path().join("events.jsonl"),
                ..HookConfig::default()
            });
        pipeline.seed().await.unwrap();
        Fixture {
            pipeline,
            store,
            dir,
        }
    }

    #[tokio::test]
    async fn test_pre_builds_context_and_audit_record() {
        let f = fixture().await;
        let context = f.pipeline.pre("cargo test --all", BTreeMap::new()).await.unwrap();

        assert_eq!(context.action(), "cargo test --all");
        assert_eq!(context.id().as_str().len(), govern_core::CONTEXT_ID_LEN);
        assert_eq!(context.scan().action, ScanAction::Allow);
        assert_eq!(context.assignment().worker, "tester");

        let record = f
            .store
            .load_hook_record(context.id(), HookPhase::Pre)
            .await
            .unwrap()
            .unwrap();
        assert!(!record.halted);
        assert_eq!(record.worker.as_deref(), Some("tester"));
        assert_eq!(record.security_action, Some(ScanAction::Allow));
    }

    #[tokio::test]
    async fn test_denied_action_is_halted_not_counted() {
        let f = fixture().await;
        let at = chrono::Utc::now();
        let err = f.pipeline.pre_at("rm -rf /", BTreeMap::new(), at).await.unwrap_err();
        let HookError::Denied { context_id, .. } = err else {
            panic!("expected denial");
        };

        let record = f
            .store
            .load_hook_record(&context_id, HookPhase::Pre)
            .await
            .unwrap()
            .unwrap();
        assert!(record.halted);
        assert_eq!(record.security_action, Some(ScanAction::Deny));
        assert_eq!(record.retry_count, 0);
        assert_eq!(f.pipeline.escalations(), 0);
    }

    #[tokio::test]
    async fn test_context_ids_are_unique_for_repeated_actions() {
        let f = fixture().await;
        let a = f.pipeline.pre("ls", BTreeMap::new()).await.unwrap();
        let b = f.pipeline.pre("ls", BTreeMap::new()).await.unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_post_updates_router_and_learning_log() {
        let f = fixture().await;
        let context = f.pipeline.pre("deploy the release", BTreeMap::new()).await.unwrap();
        let outcome = f
            .pipeline
            .post(&context, true, 120.0, serde_json::json!({ "quality_score": 0.9 }))
            .await
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.context_id(), context.id());
        assert_eq!(outcome.learning().models, vec!["decision-transformer".to_string()]);
        assert!(!outcome.learning().applied);

        let worker = f.store.find_worker_by_name("devops").await.unwrap().unwrap();
        assert_eq!(worker.total_tasks, 1);

        let entries = LearningLog::new(f.dir.path().join("events.jsonl"))
            .read_all()
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].worker, "devops");

        let record = f
            .store
            .load_hook_record(context.id(), HookPhase::Post)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.validation_passed, Some(true));
        assert!(record.outcome_json.is_some());
    }

    #[tokio::test]
    async fn test_misprediction_fails_validation() {
        let f = fixture().await;
        let context = f.pipeline.pre("run the tests", BTreeMap::new()).await.unwrap();
        let validator = QualityValidator {
            confidence_threshold: 0.0,
            latency_target_ms: f64::MAX,
        };

        let failed = validator.validate(&context, false);
        assert!(!failed.passed);
        assert!(matches!(failed.violations[0], Violation::Misprediction { .. }));

        assert!(validator.validate(&context, true).passed);
    }

    #[tokio::test]
    async fn test_latency_violation_is_not_blocking() {
        let f = fixture().await;
        let context = f.pipeline.pre("run the tests", BTreeMap::new()).await.unwrap();
        let validator = QualityValidator {
            confidence_threshold: 1.0,
            latency_target_ms: -1.0,
        };

        let result = validator.validate(&context, false);
        assert!(result.passed);
        assert!(matches!(result.violations[0], Violation::Latency { .. }));
    }

    #[tokio::test]
    async fn test_heuristic_hints_are_attached() {
        let f = fixture().await;
        let pipeline = f.pipeline.with_advisor(Box::new(HeuristicAdvisor::default()));
        let mut env = BTreeMap::new();
        env.insert(MEMORY_PCT.to_string(), "97".to_string());

        let context = pipeline.pre("rebalance the portfolio", env).await.unwrap();
        let kinds: Vec<_> = context.hints().iter().map(|h| h.kind.as_str()).collect();
        assert_eq!(kinds, vec!["memory-cleanup", "risk-check"]);
        assert_eq!(context.environment().get(MEMORY_PCT).map(String::as_str), Some("97"));
    }

    #[tokio::test]
    async fn test_escalated_pattern_is_not_denied() {
        let f = fixture().await;
        f.pipeline
            .scanner()
            .learn(r"chmod\s+-R", ThreatLevel::Medium, None)
            .await
            .unwrap();

        let context = f.pipeline.pre("chmod -R 755 build", BTreeMap::new()).await.unwrap();
        assert_eq!(context.scan().action, ScanAction::Escalate);
    }

    #[tokio::test]
    async fn test_three_failures_escalate_once() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::in_memory().await.unwrap());
        // A directory cannot be appended to, so every post-phase fails
        let pipeline = HookPipeline::new(store.clone())
            .unwrap()
            .with_config(HookConfig {
                learning_log: dir.path().to_path_buf(),
                ..HookConfig::default()
            });
        pipeline.seed().await.unwrap();

        let context = pipeline.pre("cargo build", BTreeMap::new()).await.unwrap();

        let mut counts = Vec::new();
        for _ in 0..3 {
            let err = pipeline
                .post(&context, true, 10.0, serde_json::Value::Null)
                .await
                .unwrap_err();
            assert!(matches!(err, HookError::Storage(_)));

            let record = store
                .load_hook_record(context.id(), HookPhase::Post)
                .await
                .unwrap()
                .unwrap();
            counts.push(record.retry_count);
        }
        assert_eq!(counts, vec![1, 2, 3]);
        assert_eq!(pipeline.escalations(), 1);

        let err = pipeline
            .post(&context, true, 10.0, serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::RetriesExhausted { .. }));
        assert_eq!(pipeline.escalations(), 1);
    }

    #[tokio::test]
    async fn test_failed_post_retries_apply_the_outcome_once() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::in_memory().await.unwrap());
        let pipeline = HookPipeline::new(store.clone())
            .unwrap()
            .with_config(HookConfig {
                learning_log: dir.path().to_path_buf(),
                ..HookConfig::default()
            });
        pipeline.seed().await.unwrap();

        let context = pipeline.pre("cargo build", BTreeMap::new()).await.unwrap();
        for _ in 0..3 {
            assert!(pipeline
                .post(&context, true, 10.0, serde_json::Value::Null)
                .await
                .is_err());
        }

        let worker = store
            .find_worker_by_name(&context.assignment().worker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(worker.total_tasks, 1);
        assert_eq!(store.list_performance_deltas(worker.id).await.unwrap().len(), 1);

        // Only the failure counter exists for the phase
        let record = store
            .load_hook_record(context.id(), HookPhase::Post)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.validation_passed, None);
        assert!(record.outcome_json.is_none());
    }

    #[tokio::test]
    async fn test_pre_failure_is_counted_per_context() {
        let store: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::in_memory().await.unwrap());
        let pipeline = HookPipeline::new(store.clone()).unwrap();
        let at = chrono::Utc::now();
        let id = ContextId::derive("ls", at);

        // Pre-existing exhausted counter refuses the phase outright
        for _ in 0..3 {
            store.record_hook_failure(&id, HookPhase::Pre, "ls", 3).await.unwrap();
        }
        let err = pipeline.pre_at("ls", BTreeMap::new(), at).await.unwrap_err();
        assert!(matches!(err, HookError::RetriesExhausted { phase: HookPhase::Pre, .. }));
    }
}
