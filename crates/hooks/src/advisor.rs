//! Optimization hints attached to a context.

use govern_core::OptimizationHint;
use std::collections::BTreeMap;

/// Environment key carrying memory usage in percent.
pub const MEMORY_PCT: &str = "memory_pct";

/// What an advisor sees about an action.
#[derive(Debug, Clone, Copy)]
pub struct AdviceRequest<'a> {
    /// Action text
    pub action: &'a str,
    /// Environment snapshot
    pub environment: &'a BTreeMap<String, String>,
    /// Assigned worker name
    pub worker: &'a str,
    /// Routing category
    pub category: &'a str,
}

/// Suggests optimizations before an action runs. Hints never block.
pub trait OptimizationAdvisor: Send + Sync {
    /// Hints for one action.
    fn suggest(&self, request: &AdviceRequest<'_>) -> Vec<OptimizationHint>;
}

/// Advisor that never suggests anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdvisor;

impl OptimizationAdvisor for NoopAdvisor {
    fn suggest(&self, _request: &AdviceRequest<'_>) -> Vec<OptimizationHint> {
        Vec::new()
    }
}

/// Rule-of-thumb advisor.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicAdvisor {
    /// Memory usage above which cleanup is suggested
    pub memory_threshold_pct: f64,
}

impl Default for HeuristicAdvisor {
    fn default() -> Self {
        Self {
            memory_threshold_pct: 90.0,
        }
    }
}

impl OptimizationAdvisor for HeuristicAdvisor {
    fn suggest(&self, request: &AdviceRequest<'_>) -> Vec<OptimizationHint> {
        let mut hints = Vec::new();

        let memory = request
            .environment
            .get(MEMORY_PCT)
            .and_then(|v| v.parse::<f64>().ok());
        if memory.is_some_and(|pct| pct > self.memory_threshold_pct) {
            hints.push(OptimizationHint::new(
                "memory-cleanup",
                "Run memory cleanup before execution",
            ));
        }

        if request.category == "neural-trading" {
            hints.push(OptimizationHint::new(
                "risk-check",
                "Validate risk limits before trade execution",
            ));
        }

        if request.worker == "security" && request.action.to_lowercase().contains("deploy") {
            hints.push(OptimizationHint::new(
                "security-scan",
                "Run security audit before deployment",
            ));
        }

        hints
    }
}

/// Memory usage in percent, read from `/proc/meminfo`.
pub fn memory_usage_pct() -> Option<f64> {
    let raw = std::fs::read_to_string("/proc/meminfo").ok()?;
    let field = |name: &str| -> Option<f64> {
        raw.lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };

    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some((1.0 - available / total) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(
        action: &'a str,
        environment: &'a BTreeMap<String, String>,
        worker: &'a str,
        category: &'a str,
    ) -> AdviceRequest<'a> {
        AdviceRequest {
            action,
            environment,
            worker,
            category,
        }
    }

    fn kinds(hints: &[OptimizationHint]) -> Vec<&str> {
        hints.iter().map(|h| h.kind.as_str()).collect()
    }

    #[test]
    fn test_noop_advisor() {
        let env = BTreeMap::new();
        assert!(NoopAdvisor
            .suggest(&request("deploy", &env, "security", "neural-trading"))
            .is_empty());
    }

    #[test]
    fn test_memory_pressure() {
        let mut env = BTreeMap::new();
        env.insert(MEMORY_PCT.to_string(), "93.5".to_string());
        let hints = HeuristicAdvisor::default().suggest(&request("ls", &env, "coder", "x"));
        assert_eq!(kinds(&hints), vec!["memory-cleanup"]);

        env.insert(MEMORY_PCT.to_string(), "45.2".to_string());
        assert!(HeuristicAdvisor::default()
            .suggest(&request("ls", &env, "coder", "x"))
            .is_empty());
    }

    #[test]
    fn test_category_and_worker_rules() {
        let env = BTreeMap::new();
        let hints = HeuristicAdvisor::default().suggest(&request(
            "Deploy the trading bot",
            &env,
            "security",
            "neural-trading",
        ));
        assert_eq!(kinds(&hints), vec!["risk-check", "security-scan"]);
    }
}
