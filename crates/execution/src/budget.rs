//! Iteration budget with bounded extensions.

use govern_core::SafetyState;
use serde::{Deserialize, Serialize};

/// Budget configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Extensions granted at most per run
    pub max_extensions: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self { max_extensions: 3 }
    }
}

/// Answer to a budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    /// Within the requested budget
    Continue,
    /// Over budget, but an extension was granted
    Extended,
    /// Stop the loop
    Halt,
}

impl BudgetDecision {
    /// Whether the loop may run another iteration.
    pub fn proceeds(self) -> bool {
        !matches!(self, BudgetDecision::Halt)
    }
}

/// Tracks consumed against requested iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetController {
    requested: u32,
    extensions_used: u32,
    max_extensions: u32,
}

impl BudgetController {
    /// Create a controller for `requested` iterations.
    pub fn new(requested: u32, config: BudgetConfig) -> Self {
        Self {
            requested,
            extensions_used: 0,
            max_extensions: config.max_extensions,
        }
    }

    /// Check whether 1-based `iteration` may run.
    ///
    /// Past the budget, a DEGRADED gate earns one more iteration while
    /// extensions remain.
    pub fn check(&mut self, iteration: u32, safety: SafetyState) -> BudgetDecision {
        if iteration <= self.requested {
            return BudgetDecision::Continue;
        }

        if !safety.is_safe() && self.extensions_used < self.max_extensions {
            self.requested += 1;
            self.extensions_used += 1;
            return BudgetDecision::Extended;
        }

        BudgetDecision::Halt
    }

    /// Current budget including extensions.
    pub fn requested(&self) -> u32 {
        self.requested
    }

    /// Extensions granted so far.
    pub fn extensions_used(&self) -> u32 {
        self.extensions_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_budget() {
        let mut budget = BudgetController::new(2, BudgetConfig::default());
        assert_eq!(budget.check(1, SafetyState::Degraded), BudgetDecision::Continue);
        assert_eq!(budget.check(2, SafetyState::Safe), BudgetDecision::Continue);
        assert_eq!(budget.check(3, SafetyState::Safe), BudgetDecision::Halt);
        assert_eq!(budget.extensions_used(), 0);
    }

    #[test]
    fn test_extensions_are_bounded() {
        let mut budget = BudgetController::new(1, BudgetConfig::default());
        let mut iteration = 1;
        while budget.check(iteration, SafetyState::Degraded).proceeds() {
            iteration += 1;
            assert!(iteration <= 10, "loop must terminate");
        }
        assert_eq!(budget.extensions_used(), 3);
        assert_eq!(budget.requested(), 4);
        assert_eq!(iteration, 5);
    }

    #[test]
    fn test_zero_extensions() {
        let mut budget = BudgetController::new(0, BudgetConfig { max_extensions: 0 });
        assert_eq!(budget.check(1, SafetyState::Degraded), BudgetDecision::Halt);
    }
}
