//! Pattern-based threat scanner.
//!
//! Text is matched case-insensitively against every stored pattern. The
//! riskiest match decides the verdict:
//!
//! | risk        | action   |
//! |-------------|----------|
//! | >= 0.8      | deny     |
//! | >= 0.4      | escalate |
//! | otherwise   | allow    |
//!
//! Verdicts are cached by content hash, so rescanning identical text
//! returns the first verdict without touching pattern counters.

use govern_core::{content_hash, ScanAction, ScanVerdict, ThreatLevel, ThreatPattern};
use govern_storage::{AuditStore, ScanSummary, StorageError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::patterns::default_patterns;

/// Acceptable false-positive rate.
const FALSE_POSITIVE_TARGET: f64 = 0.05;

/// Acceptable mean scan duration.
const SCAN_OVERHEAD_TARGET_MS: f64 = 10.0;

/// Errors raised by the scanner.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Pattern does not compile
    #[error("invalid pattern {pattern}: {source}")]
    InvalidPattern {
        /// Regex source
        pattern: String,
        /// Compile error
        source: regex::Error,
    },

    /// No scan exists for the reported text
    #[error("no scan recorded for: {0}")]
    NotScanned(String),
}

/// Result alias for scanner operations.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Scanner metrics for a reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Period length
    pub period_days: u32,
    /// Aggregates
    pub summary: ScanSummary,
    /// False-positive rate within target
    pub meets_false_positive_target: bool,
    /// Mean scan duration within target
    pub meets_overhead_target: bool,
}

/// Classifies free-text actions as allow, escalate, or deny.
pub struct ThreatScanner {
    store: Arc<dyn AuditStore>,
    /// Compiled regexes by source; holding the lock serializes counter updates.
    compiled: Mutex<HashMap<String, Regex>>,
}

impl ThreatScanner {
    /// Create a scanner over `store`.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            compiled: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the built-in patterns. Existing patterns are left untouched.
    pub async fn seed_defaults(&self) -> Result<usize> {
        let mut inserted = 0;
        for pattern in default_patterns() {
            if self.store.seed_threat_pattern(&pattern).await? {
                inserted += 1;
            }
        }
        if inserted > 0 {
            info!("Seeded {} threat patterns", inserted);
        }
        Ok(inserted)
    }

    /// Scan `text`.
    pub async fn scan(&self, text: &str) -> Result<ScanVerdict> {
        let start = Instant::now();
        let text_hash = content_hash(text);

        let mut compiled = self.compiled.lock().await;

        if let Some(mut verdict) = self.store.find_scan(&text_hash).await? {
            debug!(hash = %text_hash, "Scan cache hit");
            verdict.cached = true;
            verdict.reasoning = "Cached scan result".to_string();
            return Ok(verdict);
        }

        let now = chrono::Utc::now();
        let mut matched = Vec::new();
        let mut risk = 0.0;
        let mut level = ThreatLevel::Safe;

        for pattern in self.store.list_threat_patterns().await? {
            if !compiled.contains_key(&pattern.pattern) {
                match compile(&pattern.pattern) {
                    Ok(regex) => {
                        compiled.insert(pattern.pattern.clone(), regex);
                    }
                    Err(e) => {
                        warn!("Skipping invalid stored pattern: {}", e);
                        continue;
                    }
                }
            }
            let Some(regex) = compiled.get(&pattern.pattern) else {
                continue;
            };

            if regex.is_match(text) {
                self.store.record_detection(&pattern.pattern, now).await?;
                let pattern_risk = pattern.level.base_risk();
                if pattern_risk > risk {
                    risk = pattern_risk;
                    level = pattern.level;
                }
                matched.push(pattern.pattern);
            }
        }

        let action = ScanAction::from_risk(risk);
        let reasoning = match action {
            ScanAction::Deny => format!("Critical/high threat detected: {level}"),
            ScanAction::Escalate => format!("Medium threat detected, requires review: {level}"),
            ScanAction::Allow => "No significant threats detected".to_string(),
        };

        let verdict = ScanVerdict {
            text_hash,
            detected: risk > ScanVerdict::DETECTION_FLOOR,
            level,
            risk,
            action,
            matched,
            reasoning,
            cached: false,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            scanned_at: now,
        };
        self.store.save_scan(text, &verdict).await?;

        if verdict.action != ScanAction::Allow {
            warn!(
                action = verdict.action.as_str(),
                level = %verdict.level,
                "Threat detected: {}",
                verdict.matched.join(", ")
            );
        }

        Ok(verdict)
    }

    /// Learn a pattern, or update the level and description of a known one.
    pub async fn learn(
        &self,
        pattern: &str,
        level: ThreatLevel,
        description: Option<String>,
    ) -> Result<()> {
        let regex = compile(pattern)?;

        let mut compiled = self.compiled.lock().await;
        self.store
            .upsert_threat_pattern(&ThreatPattern::new(pattern, level, description))
            .await?;
        compiled.insert(pattern.to_string(), regex);

        info!("Learned threat pattern: {} ({})", pattern, level);
        Ok(())
    }

    /// Report a previous scan of `text` as a false positive.
    ///
    /// Every pattern that matched gets its false-positive count bumped;
    /// once false positives exceed 20% of detections, confidence decays by 0.8.
    pub async fn report_false_positive(&self, text: &str) -> Result<Vec<ThreatPattern>> {
        let _guard = self.compiled.lock().await;

        let Some(scan) = self.store.find_scan(&content_hash(text)).await? else {
            return Err(ScanError::NotScanned(text.chars().take(50).collect()));
        };

        let mut adjusted = Vec::with_capacity(scan.matched.len());
        for pattern in &scan.matched {
            if let Some(updated) = self.store.record_false_positive(pattern).await? {
                adjusted.push(updated);
            }
        }

        info!("Reported false positive against {} patterns", adjusted.len());
        Ok(adjusted)
    }

    /// Scanner metrics over the last `days` days.
    pub async fn report(&self, days: u32) -> Result<SecurityReport> {
        let since = chrono::Utc::now() - chrono::Duration::days(i64::from(days));
        let summary = self.store.scan_summary(since).await?;

        Ok(SecurityReport {
            period_days: days,
            meets_false_positive_target: summary.false_positive_rate <= FALSE_POSITIVE_TARGET,
            meets_overhead_target: summary.avg_scan_ms.unwrap_or(0.0) <= SCAN_OVERHEAD_TARGET_MS,
            summary,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ScanError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use govern_storage::SqliteAuditStore;

    async fn scanner() -> (ThreatScanner, Arc<dyn AuditStore>) {
        let store: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::in_memory().await.unwrap());
        let scanner = ThreatScanner::new(store.clone());
        scanner.seed_defaults().await.unwrap();
        (scanner, store)
    }

    #[tokio::test]
    async fn test_root_delete_is_denied_as_critical() {
        let (scanner, _) = scanner().await;
        let verdict = scanner.scan("rm -rf /").await.unwrap();
        assert_eq!(verdict.action, ScanAction::Deny);
        assert_eq!(verdict.level, ThreatLevel::Critical);
        assert_eq!(verdict.risk, 1.0);
        assert!(verdict.detected);
        assert!(!verdict.cached);
    }

    #[tokio::test]
    async fn test_matching_is_case_insensitive() {
        let (scanner, _) = scanner().await;
        let verdict = scanner.scan("drop table users").await.unwrap();
        assert_eq!(verdict.action, ScanAction::Deny);
        assert_eq!(verdict.level, ThreatLevel::High);
    }

    #[tokio::test]
    async fn test_medium_threat_escalates() {
        let (scanner, _) = scanner().await;
        let verdict = scanner.scan("python -c 'eval(input())'").await.unwrap();
        assert_eq!(verdict.action, ScanAction::Escalate);
        assert_eq!(verdict.level, ThreatLevel::Medium);
    }

    #[tokio::test]
    async fn test_low_threat_is_allowed_and_not_detected() {
        let (scanner, _) = scanner().await;
        let verdict = scanner.scan("SELECT 1 -- #").await.unwrap();
        assert_eq!(verdict.action, ScanAction::Allow);
        assert_eq!(verdict.level, ThreatLevel::Low);
        assert!(!verdict.detected);
    }

    #[tokio::test]
    async fn test_safe_command() {
        let (scanner, _) = scanner().await;
        let verdict = scanner.scan("cargo test --workspace").await.unwrap();
        assert_eq!(verdict.action, ScanAction::Allow);
        assert_eq!(verdict.level, ThreatLevel::Safe);
        assert!(verdict.matched.is_empty());
    }

    #[tokio::test]
    async fn test_rescan_is_cached_and_does_not_recount() {
        let (scanner, store) = scanner().await;
        let first = scanner.scan("sudo rm -rf /var").await.unwrap();
        let second = scanner.scan("sudo rm -rf /var").await.unwrap();

        assert!(second.cached);
        assert_eq!(first.action, second.action);
        assert_eq!(first.matched, second.matched);

        let patterns = store.list_threat_patterns().await.unwrap();
        let sudo = patterns.iter().find(|p| p.pattern == r"sudo\s+rm\s+-rf").unwrap();
        assert_eq!(sudo.detection_count, 1);
    }

    #[tokio::test]
    async fn test_learn_rejects_invalid_regex() {
        let (scanner, _) = scanner().await;
        let err = scanner.learn("(unclosed", ThreatLevel::High, None).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn test_learn_is_idempotent() {
        let (scanner, store) = scanner().await;
        let before = store.list_threat_patterns().await.unwrap().len();

        scanner.learn(r"shutdown\s+-h", ThreatLevel::High, None).await.unwrap();
        scanner.learn(r"shutdown\s+-h", ThreatLevel::High, None).await.unwrap();

        assert_eq!(store.list_threat_patterns().await.unwrap().len(), before + 1);
        let verdict = scanner.scan("sudo shutdown -h now").await.unwrap();
        assert_eq!(verdict.action, ScanAction::Deny);
    }

    #[tokio::test]
    async fn test_false_positive_confidence_never_increases() {
        let (scanner, _) = scanner().await;
        scanner.scan("eval(x)").await.unwrap();

        let mut last = ThreatPattern::DEFAULT_CONFIDENCE;
        for _ in 0..3 {
            let adjusted = scanner.report_false_positive("eval(x)").await.unwrap();
            assert_eq!(adjusted.len(), 1);
            assert!(adjusted[0].confidence <= last);
            last = adjusted[0].confidence;
        }
        assert!(last < ThreatPattern::DEFAULT_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_false_positive_requires_prior_scan() {
        let (scanner, _) = scanner().await;
        let err = scanner.report_false_positive("never scanned").await.unwrap_err();
        assert!(matches!(err, ScanError::NotScanned(_)));
    }

    #[tokio::test]
    async fn test_report_counts_threats_by_level() {
        let (scanner, _) = scanner().await;
        scanner.scan("rm -rf /").await.unwrap();
        scanner.scan("eval(1)").await.unwrap();
        scanner.scan("ls -la").await.unwrap();

        let report = scanner.report(7).await.unwrap();
        assert_eq!(report.summary.total_scans, 3);
        assert_eq!(report.summary.threats_detected, 2);
        assert_eq!(report.summary.threats_by_level.get("critical"), Some(&1));
        assert_eq!(report.summary.threats_by_level.get("medium"), Some(&1));
    }
}
