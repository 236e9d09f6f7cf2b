//! Upstream signals read from JSONL logs.
//!
//! - incidents log: `{"ts": "<rfc3339>", "type": "system_overload", ...}`
//! - metrics log: the last `average_score` is the external baseline
//! - cycle log: `{"circle": "...", "roam_score": <n>}` per cycle
//!
//! Missing files and malformed lines are treated as no signal.

use govern_core::Time;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Signal source locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Incidents log
    pub incidents_log: PathBuf,
    /// Marker identifying high-load incidents
    pub incident_marker: String,
    /// Metrics log carrying `average_score`
    pub metrics_log: PathBuf,
    /// Cycle log carrying `roam_score` per circle
    pub cycle_log: PathBuf,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            incidents_log: PathBuf::from("logs/governor_incidents.jsonl"),
            incident_marker: "system_overload".to_string(),
            metrics_log: PathBuf::from(".goalie/metrics_log.jsonl"),
            cycle_log: PathBuf::from(".goalie/cycle_log.jsonl"),
        }
    }
}

/// Reads upstream signals.
#[derive(Debug, Clone)]
pub struct Signals {
    config: SignalConfig,
}

impl Signals {
    /// Create a reader.
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Incidents carrying the marker with `ts` inside `(now - window, now]`.
    pub async fn incident_count(&self, window: chrono::Duration, now: Time) -> u32 {
        let cutoff = now - window;
        let count = read_lines(&self.config.incidents_log)
            .await
            .iter()
            .filter(|line| line.contains(self.config.incident_marker.as_str()))
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|entry| {
                let ts = entry.get("ts")?.as_str()?;
                chrono::DateTime::parse_from_rfc3339(ts).ok()
            })
            .filter(|ts| {
                let ts = ts.with_timezone(&chrono::Utc);
                ts > cutoff && ts <= now
            })
            .count();
        count as u32
    }

    /// Last `average_score` in the metrics log.
    pub async fn baseline_score(&self) -> Option<f64> {
        read_lines(&self.config.metrics_log)
            .await
            .iter()
            .rev()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .find_map(|entry| entry.get("average_score")?.as_f64())
    }

    /// Risk reduction between the last two `roam_score` values for `circle`,
    /// positive when the score fell.
    pub async fn risk_delta(&self, circle: &str) -> f64 {
        let scores: Vec<f64> = read_lines(&self.config.cycle_log)
            .await
            .iter()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter(|entry| entry.get("circle").and_then(Value::as_str) == Some(circle))
            .filter_map(|entry| entry.get("roam_score")?.as_f64())
            .collect();

        match scores.as_slice() {
            [.., prev, last] => prev - last,
            _ => 0.0,
        }
    }
}

async fn read_lines(path: &Path) -> Vec<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), "Unreadable signal log: {}", e);
            }
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(dir: &Path) -> Signals {
        Signals::new(SignalConfig {
            incidents_log: dir.join("incidents.jsonl"),
            metrics_log: dir.join("metrics.jsonl"),
            cycle_log: dir.join("cycles.jsonl"),
            ..SignalConfig::default()
        })
    }

    #[tokio::test]
    async fn test_missing_logs_mean_no_signal() {
        let dir = tempfile::tempdir().unwrap();
        let s = signals(dir.path());
        assert_eq!(s.incident_count(chrono::Duration::minutes(10), chrono::Utc::now()).await, 0);
        assert_eq!(s.baseline_score().await, None);
        assert_eq!(s.risk_delta("analyst").await, 0.0);
    }

    #[tokio::test]
    async fn test_incidents_inside_window() {
        let dir = tempfile::tempdir().unwrap();
        let now = chrono::Utc::now();
        let line = |minutes_ago: i64, kind: &str| {
            serde_json::json!({
                "ts": (now - chrono::Duration::minutes(minutes_ago)).to_rfc3339(),
                "type": kind,
            })
            .to_string()
        };
        let log = [
            line(30, "system_overload"),
            line(5, "system_overload"),
            line(2, "system_overload"),
            line(1, "disk_full"),
            "not json system_overload".to_string(),
        ]
        .join("\n");
        std::fs::write(dir.path().join("incidents.jsonl"), log).unwrap();

        let count = signals(dir.path())
            .incident_count(chrono::Duration::minutes(10), now)
            .await;
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_baseline_is_last_average_score() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("metrics.jsonl"),
            "{\"average_score\": 80}\n{\"event\": \"other\"}\n{\"average_score\": 42.5}\n{\"event\": \"x\"}\n",
        )
        .unwrap();
        assert_eq!(signals(dir.path()).baseline_score().await, Some(42.5));
    }

    #[tokio::test]
    async fn test_risk_delta_per_circle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cycles.jsonl"),
            [
                r#"{"circle": "analyst", "roam_score": 10}"#,
                r#"{"circle": "seeker", "roam_score": 3}"#,
                r#"{"circle": "analyst", "roam_score": 7.5}"#,
                "garbage",
            ]
            .join("\n"),
        )
        .unwrap();

        let s = signals(dir.path());
        assert_eq!(s.risk_delta("analyst").await, 2.5);
        assert_eq!(s.risk_delta("seeker").await, 0.0);
    }
}
