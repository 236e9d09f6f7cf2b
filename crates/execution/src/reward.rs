//! Composite iteration reward.

use govern_core::RewardBreakdown;
use serde::{Deserialize, Serialize};

/// Reward weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Weight of the success term
    pub success_weight: f64,
    /// Weight of the duration term
    pub duration_weight: f64,
    /// Weight of the risk-delta term
    pub risk_delta_weight: f64,
    /// Duration at which the duration term reaches zero
    pub duration_scale_ms: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            success_weight: 1.0,
            duration_weight: 0.2,
            risk_delta_weight: 0.3,
            duration_scale_ms: 60_000.0,
        }
    }
}

impl RewardConfig {
    /// Reward for one iteration. A positive `risk_delta` is a risk reduction.
    pub fn compute(&self, success: bool, duration_ms: f64, risk_delta: f64) -> RewardBreakdown {
        let success_term = if success { 1.0 } else { -1.0 };
        let duration_term = if self.duration_scale_ms > 0.0 {
            (1.0 - duration_ms / self.duration_scale_ms).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let risk_delta_term = risk_delta.clamp(-1.0, 1.0);

        RewardBreakdown {
            success_term,
            duration_term,
            risk_delta_term,
            total: self.success_weight * success_term
                + self.duration_weight * duration_term
                + self.risk_delta_weight * risk_delta_term,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_success() {
        let reward = RewardConfig::default().compute(true, 0.0, 0.0);
        assert!((reward.total - 1.2).abs() < 1e-9);
        assert_eq!(reward.duration_term, 1.0);
    }

    #[test]
    fn test_slow_failure_is_clamped() {
        let reward = RewardConfig::default().compute(false, 600_000.0, 0.0);
        assert_eq!(reward.duration_term, -1.0);
        assert!((reward.total - -1.2).abs() < 1e-9);
    }

    #[test]
    fn test_risk_delta_term() {
        let reward = RewardConfig::default().compute(true, 30_000.0, -0.5);
        assert!((reward.total - (1.0 + 0.1 - 0.15)).abs() < 1e-9);
    }

    #[test]
    fn test_large_risk_delta_cannot_outweigh_failure() {
        let reward = RewardConfig::default().compute(false, 0.0, 10.0);
        assert_eq!(reward.risk_delta_term, 1.0);
        assert!((reward.total - -0.5).abs() < 1e-9);

        let rising = RewardConfig::default().compute(true, 0.0, -10.0);
        assert_eq!(rising.risk_delta_term, -1.0);
        assert!((rising.total - 0.9).abs() < 1e-9);
    }
}
