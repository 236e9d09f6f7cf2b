//! Cycle runs, iterations, and governance events.

use crate::id::{EventId, RunId};
use crate::Time;
use serde::{Deserialize, Serialize};

/// Run kind recorded for production cycles.
pub const PROD_CYCLE: &str = "prod-cycle";

/// Output of the safety gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SafetyState {
    /// Work may proceed normally
    Safe,
    /// Work should be curtailed
    Degraded,
}

impl SafetyState {
    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyState::Safe => "SAFE",
            SafetyState::Degraded => "DEGRADED",
        }
    }

    /// Whether the state is safe.
    pub fn is_safe(self) -> bool {
        self == SafetyState::Safe
    }
}

impl std::fmt::Display for SafetyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SafetyState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SAFE" => Ok(SafetyState::Safe),
            "DEGRADED" => Ok(SafetyState::Degraded),
            other => Err(format!("unknown safety state: {other}")),
        }
    }
}

/// How a cycle run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// Loop is still going
    Running,
    /// Budget exhausted normally
    Completed,
    /// Interrupted by the operator
    Interrupted,
    /// Refused at pre-flight
    Blocked,
    /// Aborted by an infrastructure error
    Failed,
}

impl RunStatus {
    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Interrupted => "interrupted",
            RunStatus::Blocked => "blocked",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "interrupted" => Ok(RunStatus::Interrupted),
            "blocked" => Ok(RunStatus::Blocked),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// One invocation of the cycle driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRun {
    /// Run id
    pub id: RunId,
    /// Run kind
    pub kind: String,
    /// Iterations requested up front
    pub requested_iterations: u32,
    /// Budget extensions granted
    pub extensions_used: u32,
    /// Iterations actually run
    pub iterations_run: u32,
    /// When the run started
    pub started_at: Time,
    /// When the run ended
    pub ended_at: Option<Time>,
    /// Final status
    pub status: RunStatus,
}

impl CycleRun {
    /// Start a production cycle run.
    pub fn start(requested_iterations: u32) -> Self {
        Self {
            id: RunId::new(),
            kind: PROD_CYCLE.to_string(),
            requested_iterations,
            extensions_used: 0,
            iterations_run: 0,
            started_at: chrono::Utc::now(),
            ended_at: None,
            status: RunStatus::Running,
        }
    }
}

/// Circle and depth chosen for one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Focus {
    /// Work circle
    pub circle: String,
    /// Derived depth
    pub depth: u32,
}

/// Components of an iteration's reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    /// +1 on success, -1 on failure
    pub success_term: f64,
    /// Duration term in [-1, 1]
    pub duration_term: f64,
    /// Risk-delta term
    pub risk_delta_term: f64,
    /// Weighted sum
    pub total: f64,
}

/// One pass of the cycle loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// Owning run
    pub run_id: RunId,
    /// 1-based index
    pub index: u32,
    /// Focus used
    pub focus: Focus,
    /// Gate state at the start of the iteration
    pub safety: SafetyState,
    /// Gate reason
    pub safety_reason: String,
    /// Action text handed to the work unit
    pub action: String,
    /// Whether the work unit succeeded
    pub success: bool,
    /// Work unit exit code, if it ran
    pub exit_code: Option<i32>,
    /// Work unit duration
    pub duration_ms: f64,
    /// Reward components
    pub reward: RewardBreakdown,
    /// When the iteration finished
    pub recorded_at: Time,
}

/// Category of a governance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Safety gate evaluation
    SafeDegrade,
    /// Circle selection
    CircleRiskFocus,
    /// Depth selection
    DepthLadder,
    /// Budget extension or halt
    IterationBudget,
    /// Failure handling strategy
    FailureStrategy,
    /// Gate bypassed with force
    SafetyBypass,
    /// Observational diagnostic
    Diagnostic,
    /// Run summary
    Completion,
}

impl EventKind {
    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SafeDegrade => "safe-degrade",
            EventKind::CircleRiskFocus => "circle-risk-focus",
            EventKind::DepthLadder => "depth-ladder",
            EventKind::IterationBudget => "iteration-budget",
            EventKind::FailureStrategy => "failure-strategy",
            EventKind::SafetyBypass => "safety-bypass",
            EventKind::Diagnostic => "diagnostic",
            EventKind::Completion => "completion",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe-degrade" => Ok(EventKind::SafeDegrade),
            "circle-risk-focus" => Ok(EventKind::CircleRiskFocus),
            "depth-ladder" => Ok(EventKind::DepthLadder),
            "iteration-budget" => Ok(EventKind::IterationBudget),
            "failure-strategy" => Ok(EventKind::FailureStrategy),
            "safety-bypass" => Ok(EventKind::SafetyBypass),
            "diagnostic" => Ok(EventKind::Diagnostic),
            "completion" => Ok(EventKind::Completion),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// Append-only audit event emitted by the governance components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceEvent {
    /// Event id
    pub id: EventId,
    /// Owning run
    pub run_id: RunId,
    /// Iteration, if emitted inside the loop
    pub iteration: Option<u32>,
    /// Category
    pub kind: EventKind,
    /// Structured payload
    pub payload: serde_json::Value,
    /// When it happened
    pub recorded_at: Time,
}

impl GovernanceEvent {
    /// Create an event stamped now.
    pub fn new(
        run_id: RunId,
        iteration: Option<u32>,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            run_id,
            iteration,
            kind,
            payload,
            recorded_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_starts_running() {
        let run = CycleRun::start(12);
        assert_eq!(run.kind, PROD_CYCLE);
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.requested_iterations, 12);
        assert!(run.ended_at.is_none());
    }

    #[test]
    fn test_safety_state_parse_is_case_insensitive() {
        assert_eq!("degraded".parse::<SafetyState>().unwrap(), SafetyState::Degraded);
        assert_eq!(SafetyState::Safe.to_string(), "SAFE");
        assert!("amber".parse::<SafetyState>().is_err());
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EventKind::SafeDegrade.as_str(), "safe-degrade");
        assert_eq!("iteration-budget".parse::<EventKind>().unwrap(), EventKind::IterationBudget);
    }
}
