//! Environment handed to the work unit.

use govern_core::{Focus, RunId, SafetyState, PROD_CYCLE};
use serde::Serialize;
use std::collections::BTreeMap;

/// Pattern counters exported to the work unit as `AF_PC_*`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMetrics {
    /// DEGRADED evaluations
    pub safe_degrade_triggers: u32,
    /// Recent DEGRADED reasons
    pub safe_degrade_actions: Vec<String>,
    /// Recent recovery durations
    pub safe_degrade_recovery_cycles: Vec<u32>,
    /// Current safety reason
    pub safe_degrade_reason: String,
    /// Iterations run with autocommit on
    pub autocommit_runs: u32,
    /// Circle in focus
    pub circle_focus_owner: String,
    /// Budget extensions granted
    pub circle_focus_extra_iterations: u32,
    /// ROAM delta of the focused circle
    pub circle_focus_roam_reduction: f64,
    /// Failure strategy in effect
    pub failure_strategy_mode: String,
    /// Iteration of the last failure
    pub failure_strategy_abort_at: u32,
    /// Reason of the last failure
    pub failure_strategy_reason: String,
    /// Current iteration
    pub iteration_budget_enforced: u32,
    /// Current budget
    pub iteration_budget_requested: u32,
}

impl Default for PatternMetrics {
    fn default() -> Self {
        Self {
            safe_degrade_triggers: 0,
            safe_degrade_actions: Vec::new(),
            safe_degrade_recovery_cycles: Vec::new(),
            safe_degrade_reason: "none".to_string(),
            autocommit_runs: 0,
            circle_focus_owner: "unknown".to_string(),
            circle_focus_extra_iterations: 0,
            circle_focus_roam_reduction: 0.0,
            failure_strategy_mode: "none".to_string(),
            failure_strategy_abort_at: 0,
            failure_strategy_reason: "none".to_string(),
            iteration_budget_enforced: 0,
            iteration_budget_requested: 0,
        }
    }
}

impl PatternMetrics {
    /// Write the counters into `env`.
    pub fn export(&self, env: &mut BTreeMap<String, String>) {
        let mut set = |key: &str, value: String| {
            env.insert(format!("AF_PC_{key}"), value);
        };

        set("SAFE_DEGRADE_TRIGGERS", self.safe_degrade_triggers.to_string());
        set("SAFE_DEGRADE_ACTIONS", json(&self.safe_degrade_actions));
        set("SAFE_DEGRADE_RECOVERY_CYCLES", json(&self.safe_degrade_recovery_cycles));
        set("SAFE_DEGRADE_REASON", self.safe_degrade_reason.clone());
        set("AUTOCOMMIT_RUNS", self.autocommit_runs.to_string());
        set("CIRCLE_RISK_FOCUS_TOP_OWNER", self.circle_focus_owner.clone());
        set(
            "CIRCLE_RISK_FOCUS_EXTRA_ITERATIONS",
            self.circle_focus_extra_iterations.to_string(),
        );
        set(
            "CIRCLE_RISK_FOCUS_ROAM_REDUCTION",
            self.circle_focus_roam_reduction.to_string(),
        );
        set("FAILURE_STRATEGY_MODE", self.failure_strategy_mode.clone());
        set("FAILURE_STRATEGY_ABORT_AT", self.failure_strategy_abort_at.to_string());
        set("FAILURE_STRATEGY_DEGRADE_REASON", self.failure_strategy_reason.clone());
        set("ITERATION_BUDGET_ENFORCED", self.iteration_budget_enforced.to_string());
        set("ITERATION_BUDGET_REQUESTED", self.iteration_budget_requested.to_string());
    }
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

/// Everything the work-unit environment is built from.
#[derive(Debug, Clone)]
pub struct WorkEnvironment<'a> {
    /// Run id
    pub run_id: RunId,
    /// 1-based iteration
    pub iteration: u32,
    /// Focus of the iteration
    pub focus: &'a Focus,
    /// Deployment environment name
    pub environment: &'a str,
    /// Gate state
    pub safety: SafetyState,
    /// Shadow mode
    pub shadow: bool,
    /// Autocommit allowed for this iteration
    pub autocommit: bool,
    /// Counters
    pub metrics: &'a PatternMetrics,
}

impl WorkEnvironment<'_> {
    /// Render the `AF_*` variables.
    pub fn render(&self) -> BTreeMap<String, String> {
        let flag = |on: bool| if on { "1" } else { "0" }.to_string();

        let mut env = BTreeMap::new();
        env.insert("AF_RUN_ID".to_string(), self.run_id.to_string());
        env.insert("AF_RUN_KIND".to_string(), PROD_CYCLE.to_string());
        env.insert("AF_RUN_ITERATION".to_string(), self.iteration.to_string());
        env.insert("AF_CIRCLE".to_string(), self.focus.circle.clone());
        env.insert("AF_DEPTH_LEVEL".to_string(), self.focus.depth.to_string());
        env.insert("AF_ENVIRONMENT".to_string(), self.environment.to_string());
        env.insert("AF_SAFETY_STATE".to_string(), self.safety.as_str().to_string());
        env.insert("AF_PROD_SHADOW_MODE".to_string(), flag(self.shadow));
        env.insert("AF_FULL_CYCLE_AUTOCOMMIT".to_string(), flag(self.autocommit));
        env.insert("AF_ALLOW_CODE_AUTOCOMMIT".to_string(), flag(self.autocommit));
        self.metrics.export(&mut env);
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let focus = Focus {
            circle: "orchestrator".to_string(),
            depth: 4,
        };
        let metrics = PatternMetrics {
            safe_degrade_actions: vec!["low_risk_score_40.0".to_string()],
            ..PatternMetrics::default()
        };
        let run_id = RunId::new();
        let env = WorkEnvironment {
            run_id,
            iteration: 2,
            focus: &focus,
            environment: "staging",
            safety: SafetyState::Degraded,
            shadow: true,
            autocommit: false,
            metrics: &metrics,
        }
        .render();

        assert_eq!(env["AF_RUN_ID"], run_id.to_string());
        assert_eq!(env["AF_RUN_KIND"], "prod-cycle");
        assert_eq!(env["AF_RUN_ITERATION"], "2");
        assert_eq!(env["AF_CIRCLE"], "orchestrator");
        assert_eq!(env["AF_DEPTH_LEVEL"], "4");
        assert_eq!(env["AF_ENVIRONMENT"], "staging");
        assert_eq!(env["AF_SAFETY_STATE"], "DEGRADED");
        assert_eq!(env["AF_PROD_SHADOW_MODE"], "1");
        assert_eq!(env["AF_FULL_CYCLE_AUTOCOMMIT"], "0");
        assert_eq!(env["AF_ALLOW_CODE_AUTOCOMMIT"], "0");
        assert_eq!(env["AF_PC_SAFE_DEGRADE_ACTIONS"], r#"["low_risk_score_40.0"]"#);
        assert_eq!(env["AF_PC_SAFE_DEGRADE_RECOVERY_CYCLES"], "[]");
        assert_eq!(env["AF_PC_FAILURE_STRATEGY_MODE"], "none");
    }
}
