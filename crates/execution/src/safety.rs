//! Safety gate - a circuit breaker over incident load and outcome score.
//!
//! ```text
//! incidents > max_incidents           -> DEGRADED (high_system_load_incidents_<n>)
//! trusted score < min_score           -> DEGRADED (low_risk_score_<score>)
//! otherwise                           -> SAFE     (none)
//! ```
//!
//! The score is an exponential moving average of iteration rewards mapped
//! onto 0-100. It is only trusted once `min_samples` rewards were seen or an
//! external baseline seeded it.

use govern_core::SafetyState;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};

/// Safety gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Incidents above which the gate degrades
    pub max_incidents: u32,
    /// Trusted score below which the gate degrades
    pub min_score: f64,
    /// EMA smoothing factor
    pub smoothing: f64,
    /// Samples before the score is trusted without a baseline
    pub min_samples: u32,
    /// Trailing incident window
    pub incident_window_secs: u64,
    /// Reasons and recoveries kept in history
    pub history_len: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_incidents: 8,
            min_score: 50.0,
            smoothing: 0.35,
            min_samples: 3,
            incident_window_secs: 600,
            history_len: 10,
        }
    }
}

/// Outcome of the pure decision rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyDecision {
    /// Resulting state
    pub state: SafetyState,
    /// Machine-readable reason
    pub reason: String,
}

/// Decide the safety state from incident count and a trusted score.
///
/// `score` is `None` while the score is untrusted.
pub fn decide(config: &SafetyConfig, incident_count: u32, score: Option<f64>) -> SafetyDecision {
    if incident_count > config.max_incidents {
        return SafetyDecision {
            state: SafetyState::Degraded,
            reason: format!("high_system_load_incidents_{incident_count}"),
        };
    }

    match score {
        Some(score) if score < config.min_score => SafetyDecision {
            state: SafetyState::Degraded,
            reason: format!("low_risk_score_{score:.1}"),
        },
        _ => SafetyDecision {
            state: SafetyState::Safe,
            reason: "none".to_string(),
        },
    }
}

/// Map a composite reward onto the 0-100 score scale.
pub fn reward_to_score(reward: f64) -> f64 {
    ((reward + 1.5) / 3.0).clamp(0.0, 1.0) * 100.0
}

/// Exponential moving average whose first sample seeds the value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreAccumulator {
    alpha: f64,
    value: Option<f64>,
    samples: u32,
}

impl ScoreAccumulator {
    /// Create an empty accumulator.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            value: None,
            samples: 0,
        }
    }

    /// Add a sample.
    pub fn push(&mut self, sample: f64) {
        self.value = Some(match self.value {
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
            None => sample,
        });
        self.samples += 1;
    }

    /// Current average.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Samples pushed so far.
    pub fn samples(&self) -> u32 {
        self.samples
    }
}

/// Everything one evaluation saw and decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyEvaluation {
    /// Iteration the evaluation ran at
    pub iteration: u32,
    /// Decision
    pub decision: SafetyDecision,
    /// Incidents in the trailing window
    pub incident_count: u32,
    /// Trusted score, if any
    pub score: Option<f64>,
    /// Incident threshold
    pub max_incidents: u32,
    /// Score threshold
    pub min_score: f64,
    /// Iterations spent degraded, set when this evaluation recovered
    pub recovery: Option<u32>,
}

/// Stateful circuit breaker.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    config: SafetyConfig,
    score: ScoreAccumulator,
    baseline: bool,
    state: SafetyState,
    reason: String,
    degraded_since: Option<u32>,
    triggers: u32,
    reasons: VecDeque<String>,
    recoveries: VecDeque<u32>,
}

impl SafetyGate {
    /// Create a gate in the SAFE state.
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            score: ScoreAccumulator::new(config.smoothing),
            config,
            baseline: false,
            state: SafetyState::Safe,
            reason: "none".to_string(),
            degraded_since: None,
            triggers: 0,
            reasons: VecDeque::new(),
            recoveries: VecDeque::new(),
        }
    }

    /// Seed the score with an external baseline.
    ///
    /// Only the first baseline seeds an empty accumulator; later ones just
    /// mark the score as trusted.
    pub fn set_baseline(&mut self, baseline: f64) {
        if self.score.value().is_none() {
            self.score.push(baseline);
        }
        self.baseline = true;
    }

    /// Feed an iteration reward into the smoothed score.
    pub fn record_reward(&mut self, reward: f64) {
        self.score.push(reward_to_score(reward));
    }

    /// The smoothed score once it can be trusted.
    pub fn trusted_score(&self) -> Option<f64> {
        if self.baseline || self.score.samples() >= self.config.min_samples {
            self.score.value()
        } else {
            None
        }
    }

    /// Evaluate the gate at `iteration`.
    pub fn evaluate(&mut self, iteration: u32, incident_count: u32) -> SafetyEvaluation {
        let score = self.trusted_score();
        let decision = decide(&self.config, incident_count, score);
        let mut recovery = None;

        match decision.state {
            SafetyState::Degraded => {
                if self.degraded_since.is_none() {
                    self.degraded_since = Some(iteration);
                }
                self.triggers += 1;
                push_bounded(&mut self.reasons, decision.reason.clone(), self.config.history_len);
                warn!(iteration, reason = %decision.reason, "Safety gate DEGRADED");
            }
            SafetyState::Safe => {
                if let Some(since) = self.degraded_since.take() {
                    let cycles = iteration.saturating_sub(since);
                    push_bounded(&mut self.recoveries, cycles, self.config.history_len);
                    recovery = Some(cycles);
                    info!(iteration, recovery_cycles = cycles, "Safety gate recovered");
                }
            }
        }

        self.state = decision.state;
        self.reason = decision.reason.clone();

        SafetyEvaluation {
            iteration,
            decision,
            incident_count,
            score,
            max_incidents: self.config.max_incidents,
            min_score: self.config.min_score,
            recovery,
        }
    }

    /// Current state.
    pub fn state(&self) -> SafetyState {
        self.state
    }

    /// Reason for the current state.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// DEGRADED evaluations so far.
    pub fn triggers(&self) -> u32 {
        self.triggers
    }

    /// Recent DEGRADED reasons, oldest first.
    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.reasons.iter().map(String::as_str)
    }

    /// Recent recovery durations in iterations, oldest first.
    pub fn recoveries(&self) -> impl Iterator<Item = u32> + '_ {
        self.recoveries.iter().copied()
    }

    /// Configuration.
    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, value: T, max: usize) {
    history.push_back(value);
    while history.len() > max {
        history.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incidents_over_threshold_degrade_regardless_of_score() {
        let config = SafetyConfig::default();
        let decision = decide(&config, 9, Some(100.0));
        assert_eq!(decision.state, SafetyState::Degraded);
        assert_eq!(decision.reason, "high_system_load_incidents_9");

        assert_eq!(decide(&config, 8, Some(100.0)).state, SafetyState::Safe);
    }

    #[test]
    fn test_low_score_degrades_only_when_trusted() {
        let config = SafetyConfig::default();
        assert_eq!(decide(&config, 0, None).state, SafetyState::Safe);

        let decision = decide(&config, 0, Some(40.0));
        assert_eq!(decision.state, SafetyState::Degraded);
        assert_eq!(decision.reason, "low_risk_score_40.0");
    }

    #[test]
    fn test_reward_to_score() {
        assert_eq!(reward_to_score(1.5), 100.0);
        assert_eq!(reward_to_score(-1.5), 0.0);
        assert_eq!(reward_to_score(0.0), 50.0);
        assert_eq!(reward_to_score(9.0), 100.0);
    }

    #[test]
    fn test_accumulator_seeds_then_smooths() {
        let mut acc = ScoreAccumulator::new(0.35);
        assert_eq!(acc.value(), None);
        acc.push(100.0);
        assert_eq!(acc.value(), Some(100.0));
        acc.push(0.0);
        assert!((acc.value().unwrap() - 65.0).abs() < 1e-9);
        assert_eq!(acc.samples(), 2);
    }

    #[test]
    fn test_score_untrusted_until_min_samples() {
        let mut gate = SafetyGate::new(SafetyConfig::default());
        gate.record_reward(-1.5);
        gate.record_reward(-1.5);
        assert_eq!(gate.trusted_score(), None);
        assert_eq!(gate.evaluate(1, 0).decision.state, SafetyState::Safe);

        gate.record_reward(-1.5);
        assert_eq!(gate.trusted_score(), Some(0.0));
        assert_eq!(gate.evaluate(2, 0).decision.state, SafetyState::Degraded);
    }

    #[test]
    fn test_baseline_trusts_score_immediately() {
        let mut gate = SafetyGate::new(SafetyConfig::default());
        gate.set_baseline(30.0);
        assert_eq!(gate.trusted_score(), Some(30.0));
        assert_eq!(gate.evaluate(1, 0).decision.state, SafetyState::Degraded);

        // A second baseline does not reseed
        gate.set_baseline(90.0);
        assert_eq!(gate.trusted_score(), Some(30.0));
    }

    #[test]
    fn test_hysteresis_and_history() {
        let mut gate = SafetyGate::new(SafetyConfig::default());

        gate.evaluate(2, 9);
        gate.evaluate(3, 10);
        assert_eq!(gate.state(), SafetyState::Degraded);
        assert_eq!(gate.triggers(), 2);

        let recovered = gate.evaluate(5, 0);
        assert_eq!(recovered.recovery, Some(3));
        assert_eq!(gate.state(), SafetyState::Safe);
        assert_eq!(gate.reason(), "none");
        assert_eq!(gate.recoveries().collect::<Vec<_>>(), vec![3]);
        assert_eq!(
            gate.reasons().collect::<Vec<_>>(),
            vec!["high_system_load_incidents_9", "high_system_load_incidents_10"]
        );
    }

    #[test]
    fn test_reason_history_is_bounded() {
        let mut gate = SafetyGate::new(SafetyConfig::default());
        for i in 0..15 {
            gate.evaluate(i, 20 + i);
        }
        assert_eq!(gate.reasons().count(), 10);
        assert_eq!(gate.reasons().next(), Some("high_system_load_incidents_25"));
        assert_eq!(gate.triggers(), 15);
    }
}
