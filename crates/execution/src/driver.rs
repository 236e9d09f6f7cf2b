//! The cycle driver - runs the governed loop.
//!
//! ```text
//! pre-flight gate -> [budget -> gate -> focus -> pre-hook -> work unit
//!                     -> reward -> post-hook -> iteration record]* -> completion
//! ```
//!
//! Only a DEGRADED pre-flight (without `force`) or an exhausted budget stops
//! the loop. Failed work units are recorded and the loop moves on.

use govern_core::{
    CycleRun, EventKind, GovernanceEvent, Iteration, RunId, RunStatus, SafetyState,
};
use govern_hooks::{HookError, HookPipeline};
use govern_storage::AuditStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::budget::{BudgetController, BudgetDecision};
use crate::config::{GovernConfig, RunDefaults};
use crate::env::{PatternMetrics, WorkEnvironment};
use crate::focus::{FocusPolicy, FocusSelector};
use crate::safety::{SafetyEvaluation, SafetyGate};
use crate::signals::Signals;
use crate::work_unit::{WorkUnit, WorkUnitInput};

/// Options for one run, usually from the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Requested iterations
    pub iterations: u32,
    /// Base depth
    pub depth: u32,
    /// Fixed circle
    pub circle: Option<String>,
    /// Rotate circles when no circle is fixed
    pub rotate_circles: bool,
    /// Allow autocommit while SAFE
    pub autocommit: bool,
    /// Shadow mode, never autocommit
    pub dry_run: bool,
    /// Skip the pre-flight gate
    pub force: bool,
    /// Deployment environment name
    pub environment: String,
}

impl RunOptions {
    /// Options from configured defaults.
    pub fn from_defaults(defaults: &RunDefaults) -> Self {
        Self {
            iterations: defaults.iterations,
            depth: defaults.depth,
            circle: None,
            rotate_circles: defaults.rotate_circles,
            autocommit: defaults.autocommit,
            dry_run: false,
            force: false,
            environment: defaults.environment.clone(),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_defaults(&RunDefaults::default())
    }
}

/// Result of a single iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleResult {
    /// The work unit ran
    Ran {
        /// Exit code, `None` when killed or timed out
        exit_code: Option<i32>,
        /// Wall time
        duration_ms: f64,
    },
    /// The hook pipeline refused the action
    Denied(String),
    /// The work unit or the pre-phase failed
    Error(String),
}

impl CycleResult {
    /// Whether the iteration succeeded.
    pub fn success(&self) -> bool {
        matches!(self, CycleResult::Ran { exit_code: Some(0), .. })
    }

    fn exit_code(&self) -> Option<i32> {
        match self {
            CycleResult::Ran { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    fn duration_ms(&self) -> f64 {
        match self {
            CycleResult::Ran { duration_ms, .. } => *duration_ms,
            _ => 0.0,
        }
    }

    fn failure_reason(&self) -> String {
        match self {
            CycleResult::Ran {
                exit_code: Some(code),
                ..
            } => format!("exit-code-{code}"),
            CycleResult::Ran { exit_code: None, .. } => "no-exit-code".to_string(),
            CycleResult::Denied(_) => "denied".to_string(),
            CycleResult::Error(_) => "error".to_string(),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run id
    pub run_id: RunId,
    /// Final status
    pub status: RunStatus,
    /// Iterations executed
    pub iterations_run: u32,
    /// Budget extensions granted
    pub extensions_used: u32,
    /// Safety reason at exit
    pub safety_reason: String,
}

impl RunSummary {
    /// Process exit code: 1 when the pre-flight gate blocked the run.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Blocked | RunStatus::Failed => 1,
            _ => 0,
        }
    }
}

/// The governed loop.
pub struct CycleDriver {
    store: Arc<dyn AuditStore>,
    work_unit: Box<dyn WorkUnit>,
    hooks: Option<HookPipeline>,
    config: GovernConfig,
    options: RunOptions,
    gate: SafetyGate,
    budget: BudgetController,
    focus: FocusSelector,
    signals: Signals,
    metrics: PatternMetrics,
    shutdown: Arc<AtomicBool>,
    consecutive_failures: u32,
}

impl CycleDriver {
    /// Create a driver.
    pub fn new(
        store: Arc<dyn AuditStore>,
        work_unit: Box<dyn WorkUnit>,
        config: GovernConfig,
        options: RunOptions,
    ) -> Self {
        let policy = FocusPolicy::from_options(
            options.circle.clone(),
            options.rotate_circles,
            config.focus.circles.clone(),
        );
        Self {
            store,
            work_unit,
            hooks: None,
            gate: SafetyGate::new(config.safety.clone()),
            budget: BudgetController::new(options.iterations, config.budget),
            focus: FocusSelector::new(policy, options.depth, config.focus.depth_offsets.clone()),
            signals: Signals::new(config.signals.clone()),
            metrics: PatternMetrics::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
            consecutive_failures: 0,
            config,
            options,
        }
    }

    /// Wrap every work-unit invocation in the hook pipeline.
    pub fn with_hooks(mut self, hooks: HookPipeline) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Flag that stops the loop after the in-flight iteration.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// The safety gate.
    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    /// Run the loop to completion.
    pub async fn run(&mut self) -> anyhow::Result<RunSummary> {
        let mut run = CycleRun::start(self.options.iterations);
        info!("Starting prod-cycle (run id: {})", run.id);
        self.store.save_cycle_run(&run).await?;
        self.write_state_file("last_run_id", format!("{}\n", run.id)).await;

        if let Err(e) = self.run_inner(&mut run).await {
            error!("Run failed: {:#}", e);
            run.status = RunStatus::Failed;
            run.ended_at = Some(chrono::Utc::now());
            if let Err(save) = self.store.save_cycle_run(&run).await {
                error!("Failed to record failed run: {}", save);
            }
            return Err(e);
        }

        Ok(RunSummary {
            run_id: run.id,
            status: run.status,
            iterations_run: run.iterations_run,
            extensions_used: run.extensions_used,
            safety_reason: self.gate.reason().to_string(),
        })
    }

    async fn run_inner(&mut self, run: &mut CycleRun) -> anyhow::Result<()> {
        if self.options.force {
            warn!("Pre-flight safety gate bypassed with --force");
            self.emit(
                run.id,
                None,
                EventKind::SafetyBypass,
                json!({ "reason": "force", "gate": "safe-degrade" }),
            )
            .await?;
        } else {
            let evaluation = self.evaluate_safety(1).await;
            self.emit_safety(run.id, None, &evaluation).await?;

            if !evaluation.decision.state.is_safe() {
                self.write_preflight_snapshot(run.id, &evaluation).await;
                error!(
                    "System health check failed ({}); execution blocked before the loop. Use --force to override.",
                    evaluation.decision.reason
                );
                run.status = RunStatus::Blocked;
                run.ended_at = Some(chrono::Utc::now());
                self.store.save_cycle_run(run).await?;
                return Ok(());
            }
            info!("System health check: GREEN");
        }

        let mut iteration = 1;
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping after {} iterations", run.iterations_run);
                run.status = RunStatus::Interrupted;
                break;
            }

            match self.budget.check(iteration, self.gate.state()) {
                BudgetDecision::Continue => {}
                BudgetDecision::Extended => {
                    info!(
                        "Iteration budget extended to {} ({} of {} extensions)",
                        self.budget.requested(),
                        self.budget.extensions_used(),
                        self.config.budget.max_extensions
                    );
                    self.emit(
                        run.id,
                        Some(iteration),
                        EventKind::IterationBudget,
                        json!({
                            "reason": "unfinished-business-unsafe",
                            "action": "extend-budget",
                            "requested": self.budget.requested(),
                            "extensions_used": self.budget.extensions_used(),
                        }),
                    )
                    .await?;
                }
                BudgetDecision::Halt => break,
            }

            self.run_iteration(run.id, iteration).await?;
            run.iterations_run += 1;
            iteration += 1;
        }

        if run.status == RunStatus::Running {
            run.status = RunStatus::Completed;
        }
        run.extensions_used = self.budget.extensions_used();
        run.ended_at = Some(chrono::Utc::now());
        self.store.save_cycle_run(run).await?;

        self.emit(
            run.id,
            None,
            EventKind::Completion,
            json!({
                "status": run.status.as_str(),
                "total_iterations": run.iterations_run,
                "extensions_used": run.extensions_used,
                "requested_iterations": run.requested_iterations,
            }),
        )
        .await?;
        info!(
            "Prod-cycle {} ({} iterations, {} extensions)",
            run.status.as_str(),
            run.iterations_run,
            run.extensions_used
        );

        Ok(())
    }

    /// Run one iteration.
    pub async fn run_iteration(&mut self, run_id: RunId, iteration: u32) -> anyhow::Result<CycleResult> {
        let evaluation = self.evaluate_safety(iteration).await;
        self.emit_safety(run_id, Some(iteration), &evaluation).await?;

        let selection = self.focus.select(iteration);
        let focus = selection.focus.clone();
        self.emit(
            run_id,
            Some(iteration),
            EventKind::CircleRiskFocus,
            json!({
                "circle": focus.circle,
                "reason": selection.mode,
                "action": format!("select-{}", focus.circle),
            }),
        )
        .await?;
        self.emit(
            run_id,
            Some(iteration),
            EventKind::DepthLadder,
            json!({
                "circle": focus.circle,
                "base_depth": selection.base_depth,
                "depth": focus.depth,
                "mutation": focus.depth != selection.base_depth,
                "action": format!("set-depth-{}", focus.depth),
            }),
        )
        .await?;

        let risk_delta = self.signals.risk_delta(&focus.circle).await;
        let safety = self.gate.state();
        let autocommit = safety.is_safe() && self.options.autocommit && !self.options.dry_run;
        if autocommit {
            self.metrics.autocommit_runs += 1;
        }
        self.refresh_metrics(iteration, &focus.circle, risk_delta);

        let env = WorkEnvironment {
            run_id,
            iteration,
            focus: &focus,
            environment: &self.options.environment,
            safety,
            shadow: self.options.dry_run,
            autocommit,
            metrics: &self.metrics,
        }
        .render();

        let action = self.work_unit.describe();
        info!(
            "Running cycle {}/{} | circle: {} | depth: {} | safety: {}",
            iteration,
            self.budget.requested(),
            focus.circle,
            focus.depth,
            safety
        );

        let pre = match &self.hooks {
            Some(hooks) => Some(hooks.pre(&action, env.clone()).await),
            None => None,
        };
        let mut context = None;
        let result = match pre {
            Some(Err(HookError::Denied { reasoning, .. })) => CycleResult::Denied(reasoning),
            Some(Err(e)) => CycleResult::Error(format!("pre-phase failed: {e}")),
            Some(Ok(ctx)) => {
                context = Some(ctx);
                self.invoke(env).await
            }
            None => self.invoke(env).await,
        };

        let success = result.success();
        let duration_ms = result.duration_ms();
        if success {
            self.consecutive_failures = 0;
        } else {
            self.record_failure(run_id, iteration, &result).await?;
        }

        let reward = self.config.reward.compute(success, duration_ms, risk_delta);
        self.gate.record_reward(reward.total);

        let post_error = match (&self.hooks, &context) {
            (Some(hooks), Some(context)) => {
                let outputs = json!({ "exit_code": result.exit_code(), "iteration": iteration });
                hooks.post(context, success, duration_ms, outputs).await.err()
            }
            _ => None,
        };
        if let Some(e) = post_error {
            warn!(iteration, "Post-phase failed: {}", e);
            self.emit(
                run_id,
                Some(iteration),
                EventKind::FailureStrategy,
                json!({
                    "reason": "post-phase-failed",
                    "mode": "degrade-and-continue",
                    "action": "log-failure",
                    "error": e.to_string(),
                }),
            )
            .await?;
        }

        self.store
            .append_iteration(&Iteration {
                run_id,
                index: iteration,
                focus,
                safety,
                safety_reason: self.gate.reason().to_string(),
                action,
                success,
                exit_code: result.exit_code(),
                duration_ms,
                reward,
                recorded_at: chrono::Utc::now(),
            })
            .await?;

        Ok(result)
    }

    async fn invoke(&self, env: std::collections::BTreeMap<String, String>) -> CycleResult {
        let input = WorkUnitInput {
            env,
            timeout: self.config.work_unit.timeout_secs.map(Duration::from_secs),
        };
        match self.work_unit.run(&input).await {
            Ok(output) => CycleResult::Ran {
                exit_code: output.exit_code,
                duration_ms: output.duration.as_secs_f64() * 1000.0,
            },
            Err(e) => {
                error!("Work unit failed to run: {:#}", e);
                CycleResult::Error(e.to_string())
            }
        }
    }

    async fn evaluate_safety(&mut self, iteration: u32) -> SafetyEvaluation {
        let window = chrono::Duration::seconds(
            i64::try_from(self.config.safety.incident_window_secs).unwrap_or(i64::MAX / 1000),
        );
        let incidents = self.signals.incident_count(window, chrono::Utc::now()).await;
        if let Some(baseline) = self.signals.baseline_score().await {
            self.gate.set_baseline(baseline);
        }
        self.gate.evaluate(iteration, incidents)
    }

    async fn record_failure(
        &mut self,
        run_id: RunId,
        iteration: u32,
        result: &CycleResult,
    ) -> anyhow::Result<()> {
        self.consecutive_failures += 1;
        let reason = result.failure_reason();
        warn!(iteration, "Cycle failed: {}", reason);

        self.metrics.failure_strategy_mode = "degrade-and-continue".to_string();
        self.metrics.failure_strategy_abort_at = iteration;
        self.metrics.failure_strategy_reason = reason.clone();

        self.emit(
            run_id,
            Some(iteration),
            EventKind::FailureStrategy,
            json!({
                "reason": reason,
                "mode": "degrade-and-continue",
                "action": "log-failure",
                "consecutive_failures": self.consecutive_failures,
            }),
        )
        .await?;

        if self.consecutive_failures == self.config.run.failure_threshold {
            let mut subsystems = vec!["work-unit", "environment"];
            if self.hooks.is_some() {
                subsystems.push("hook-pipeline");
            }
            if !self.gate.state().is_safe() {
                subsystems.push("safety-gate");
            }
            let hypothesis = match result {
                CycleResult::Denied(_) => "threat scanner refuses the work unit".to_string(),
                CycleResult::Error(e) => format!("work unit cannot be started: {e}"),
                CycleResult::Ran { .. } => format!("work unit keeps failing ({reason})"),
            };
            warn!(
                "{} consecutive failures, hypothesis: {}",
                self.consecutive_failures, hypothesis
            );
            self.emit(
                run_id,
                Some(iteration),
                EventKind::Diagnostic,
                json!({
                    "consecutive_failures": self.consecutive_failures,
                    "hypothesis": hypothesis,
                    "candidate_subsystems": subsystems,
                }),
            )
            .await?;
        }

        Ok(())
    }

    fn refresh_metrics(&mut self, iteration: u32, circle: &str, risk_delta: f64) {
        let m = &mut self.metrics;
        m.safe_degrade_triggers = self.gate.triggers();
        m.safe_degrade_actions = self.gate.reasons().map(String::from).collect();
        m.safe_degrade_recovery_cycles = self.gate.recoveries().collect();
        m.safe_degrade_reason = self.gate.reason().to_string();
        m.circle_focus_owner = circle.to_string();
        m.circle_focus_extra_iterations = self.budget.extensions_used();
        m.circle_focus_roam_reduction = risk_delta;
        m.iteration_budget_enforced = iteration;
        m.iteration_budget_requested = self.budget.requested();
    }

    async fn emit_safety(
        &self,
        run_id: RunId,
        iteration: Option<u32>,
        evaluation: &SafetyEvaluation,
    ) -> anyhow::Result<()> {
        let action = match evaluation.decision.state {
            SafetyState::Safe => "allow-autocommit",
            SafetyState::Degraded => "disable-autocommit",
        };
        self.emit(
            run_id,
            iteration,
            EventKind::SafeDegrade,
            json!({
                "evaluation": evaluation,
                "action": action,
                "triggers": self.gate.triggers(),
            }),
        )
        .await
    }

    async fn emit(
        &self,
        run_id: RunId,
        iteration: Option<u32>,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> anyhow::Result<()> {
        let event = GovernanceEvent::new(run_id, iteration, kind, payload);
        self.store.append_governance_event(&event).await?;
        Ok(())
    }

    async fn write_preflight_snapshot(&self, run_id: RunId, evaluation: &SafetyEvaluation) {
        let snapshot = json!({
            "run_id": run_id,
            "iteration": 1,
            "depth": self.options.depth,
            "timestamp": chrono::Utc::now(),
            "state_dir": self.config.state_dir,
            "guardrail": "safe-degrade",
            "evaluation": evaluation,
            "safe_degrade_triggers": self.gate.triggers(),
            "safe_degrade_actions": self.gate.reasons().collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&snapshot) {
            Ok(body) => {
                self.write_state_file(&format!("preflight_{run_id}.json"), body)
                    .await
            }
            Err(e) => warn!("Failed to serialize pre-flight snapshot: {}", e),
        }
    }

    /// Write a file under the state directory. Failures are logged only.
    async fn write_state_file(&self, name: &str, contents: String) {
        let path: PathBuf = self.config.state_dir.join(name);
        let result = async {
            tokio::fs::create_dir_all(&self.config.state_dir).await?;
            tokio::fs::write(&path, contents).await
        }
        .await;
        if let Err(e) = result {
            warn!(path = %path.display(), "Failed to write state file: {}", e);
        }
    }
}
