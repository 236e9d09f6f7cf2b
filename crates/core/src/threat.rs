//! Threat patterns and scan verdicts.

use crate::Time;
use serde::{Deserialize, Serialize};

/// Severity attached to a threat pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    /// No threat
    Safe,
    /// Log only
    Low,
    /// Warn and log
    Medium,
    /// Block and escalate
    High,
    /// Immediate block
    Critical,
}

impl ThreatLevel {
    /// Base risk contributed by a match at this level.
    pub fn base_risk(self) -> f64 {
        match self {
            ThreatLevel::Critical => 1.0,
            ThreatLevel::High => 0.8,
            ThreatLevel::Medium => 0.5,
            ThreatLevel::Low => 0.2,
            ThreatLevel::Safe => 0.0,
        }
    }

    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ThreatLevel::Critical => "critical",
            ThreatLevel::High => "high",
            ThreatLevel::Medium => "medium",
            ThreatLevel::Low => "low",
            ThreatLevel::Safe => "safe",
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unknown threat level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown threat level: {0}")]
pub struct UnknownThreatLevel(pub String);

impl std::str::FromStr for ThreatLevel {
    type Err = UnknownThreatLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(ThreatLevel::Critical),
            "high" => Ok(ThreatLevel::High),
            "medium" => Ok(ThreatLevel::Medium),
            "low" => Ok(ThreatLevel::Low),
            "safe" => Ok(ThreatLevel::Safe),
            _ => Err(UnknownThreatLevel(s.to_string())),
        }
    }
}

/// What the scanner wants done with an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanAction {
    /// Proceed
    Allow,
    /// Proceed, but flag for review
    Escalate,
    /// Refuse
    Deny,
}

impl ScanAction {
    /// Map a risk score onto an action.
    pub fn from_risk(risk: f64) -> Self {
        if risk >= 0.8 {
            ScanAction::Deny
        } else if risk >= 0.4 {
            ScanAction::Escalate
        } else {
            ScanAction::Allow
        }
    }

    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ScanAction::Allow => "allow",
            ScanAction::Escalate => "escalate",
            ScanAction::Deny => "deny",
        }
    }
}

impl std::str::FromStr for ScanAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(ScanAction::Allow),
            "escalate" => Ok(ScanAction::Escalate),
            "deny" => Ok(ScanAction::Deny),
            other => Err(format!("unknown scan action: {other}")),
        }
    }
}

/// A learned regex describing dangerous input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatPattern {
    /// Regex source, unique across patterns
    pub pattern: String,
    /// Human description
    pub description: Option<String>,
    /// Severity
    pub level: ThreatLevel,
    /// Confidence in the pattern, decays on false positives
    pub confidence: f64,
    /// Number of matches seen
    pub detection_count: u64,
    /// Number of matches reported as false positives
    pub false_positive_count: u64,
    /// Last time the pattern matched
    pub last_detected: Option<Time>,
    /// When the pattern was learned
    pub created_at: Time,
}

impl ThreatPattern {
    /// Default confidence for a freshly learned pattern.
    pub const DEFAULT_CONFIDENCE: f64 = 0.5;

    /// Create a new pattern with zeroed counters.
    pub fn new(pattern: impl Into<String>, level: ThreatLevel, description: Option<String>) -> Self {
        Self {
            pattern: pattern.into(),
            description,
            level,
            confidence: Self::DEFAULT_CONFIDENCE,
            detection_count: 0,
            false_positive_count: 0,
            last_detected: None,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Result of scanning one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanVerdict {
    /// Content hash of the scanned text
    pub text_hash: String,
    /// Whether risk exceeds the detection floor
    pub detected: bool,
    /// Level of the riskiest match
    pub level: ThreatLevel,
    /// Risk in [0, 1]
    pub risk: f64,
    /// Recommended action
    pub action: ScanAction,
    /// Patterns that matched
    pub matched: Vec<String>,
    /// Explanation
    pub reasoning: String,
    /// Whether the verdict came from the scan cache
    pub cached: bool,
    /// Time spent scanning
    pub duration_ms: f64,
    /// When the scan ran
    pub scanned_at: Time,
}

impl ScanVerdict {
    /// Risk above which a threat counts as detected.
    pub const DETECTION_FLOOR: f64 = 0.2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_thresholds() {
        assert_eq!(ScanAction::from_risk(1.0), ScanAction::Deny);
        assert_eq!(ScanAction::from_risk(0.8), ScanAction::Deny);
        assert_eq!(ScanAction::from_risk(0.5), ScanAction::Escalate);
        assert_eq!(ScanAction::from_risk(0.4), ScanAction::Escalate);
        assert_eq!(ScanAction::from_risk(0.2), ScanAction::Allow);
        assert_eq!(ScanAction::from_risk(0.0), ScanAction::Allow);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("HIGH".parse::<ThreatLevel>().unwrap(), ThreatLevel::High);
        assert!("severe".parse::<ThreatLevel>().is_err());
        assert!(ThreatLevel::Critical > ThreatLevel::High);
    }
}
