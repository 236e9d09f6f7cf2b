//! Task router - scores worker profiles against an action description.

use govern_core::{
    content_hash, Assignment, AssignmentMethod, AssignmentRecord, PerformanceDelta, RuleList,
    WorkerProfile,
};
use govern_storage::{AssignmentSummary, AuditStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::tables::{default_complexity_signals, default_task_types, default_workers, WorkerSpec};
use crate::Result;

/// Configuration for the task router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Task-type buckets
    pub task_types: RuleList,
    /// Keywords adding to complexity
    pub complexity_signals: Vec<String>,
    /// Workers seeded at startup
    pub workers: Vec<WorkerSpec>,
    /// Worker used when nobody is eligible
    pub fallback_worker: String,
    /// Success rate below which experienced workers are skipped
    pub min_success_rate: f64,
    /// Tasks before a worker's success rate is held against it
    pub probation_tasks: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            task_types: default_task_types(),
            complexity_signals: default_complexity_signals(),
            workers: default_workers(),
            fallback_worker: "coder".to_string(),
            min_success_rate: 0.3,
            probation_tasks: 5,
        }
    }
}

/// Routing metrics for a reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationReport {
    /// Period length
    pub period_days: u32,
    /// Aggregates
    pub summary: AssignmentSummary,
    /// Successful over total assignments
    pub success_rate: f64,
    /// Workers with at least one task, by expertise
    pub workers: Vec<WorkerProfile>,
}

/// Assigns actions to worker profiles and learns from outcomes.
pub struct TaskRouter {
    store: Arc<dyn AuditStore>,
    config: RouterConfig,
    /// Single writer for assignments and profile counters.
    writer: Mutex<()>,
}

impl TaskRouter {
    /// Create a router with the default tables.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            config: RouterConfig::default(),
            writer: Mutex::new(()),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed configured workers. Existing names are left untouched.
    pub async fn seed_workers(&self) -> Result<usize> {
        let mut inserted = 0;
        for spec in &self.config.workers {
            let profile = WorkerProfile::new(spec.name.clone(), spec.specializations.clone());
            if self.store.seed_worker(&profile).await? {
                inserted += 1;
            }
        }
        if inserted > 0 {
            info!("Seeded {} worker profiles", inserted);
        }
        Ok(inserted)
    }

    /// Infer the task type of a description.
    pub fn infer_task_type(&self, description: &str) -> String {
        self.config.task_types.first_match(description).to_string()
    }

    /// Estimate complexity in [0, 1] from length and signal keywords.
    pub fn estimate_complexity(&self, description: &str) -> f64 {
        let words = description.split_whitespace().count() as f64;
        let lower = description.to_lowercase();
        let signals = self
            .config
            .complexity_signals
            .iter()
            .filter(|s| lower.contains(s.as_str()))
            .count() as f64;

        ((words / 50.0).min(0.7) + 0.1 * signals).min(1.0)
    }

    /// Whether a worker may be considered at all.
    pub fn is_eligible(&self, worker: &WorkerProfile) -> bool {
        worker.success_rate >= self.config.min_success_rate
            || worker.total_tasks < self.config.probation_tasks
    }

    /// Pick the best eligible worker. Ties go to the earlier worker.
    pub fn best_candidate<'a>(
        &self,
        workers: &'a [WorkerProfile],
        task_type: &str,
        complexity: f64,
    ) -> Option<(&'a WorkerProfile, f64)> {
        let mut best: Option<(&WorkerProfile, f64)> = None;
        for worker in workers.iter().filter(|w| self.is_eligible(w)) {
            let score = score_worker(worker, task_type, complexity);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((worker, score));
            }
        }
        best
    }

    /// Assign a description to a worker.
    ///
    /// A description seen before returns its original assignment.
    pub async fn assign(&self, description: &str) -> Result<Assignment> {
        let _writer = self.writer.lock().await;
        let task_hash = content_hash(description);

        if let Some(record) = self.store.find_assignment(&task_hash).await? {
            debug!(worker = %record.assignment.worker, "Assignment cache hit");
            return Ok(Assignment {
                method: AssignmentMethod::Cached,
                reasoning: "Task previously assigned".to_string(),
                ..record.assignment
            });
        }

        let task_type = self.infer_task_type(description);
        let complexity = self.estimate_complexity(description);
        let workers = self.store.list_workers().await?;

        let assignment = match self.best_candidate(&workers, &task_type, complexity) {
            Some((worker, score)) => Assignment {
                worker_id: worker.id,
                worker: worker.name.clone(),
                confidence: score,
                method: AssignmentMethod::Scored,
                reasoning: format!("Best match for {task_type} with complexity {complexity:.2}"),
                task_type,
                complexity,
            },
            None => {
                let worker = self.fallback_worker().await?;
                Assignment {
                    worker_id: worker.id,
                    worker: worker.name,
                    confidence: 0.5,
                    method: AssignmentMethod::Fallback,
                    reasoning: "No eligible worker found, using default".to_string(),
                    task_type,
                    complexity,
                }
            }
        };

        self.store
            .save_assignment(&AssignmentRecord {
                task_hash,
                description: description.to_string(),
                assignment: assignment.clone(),
                started_at: chrono::Utc::now(),
                completed_at: None,
                success: None,
                duration_ms: None,
                quality: None,
            })
            .await?;

        debug!(
            worker = %assignment.worker,
            confidence = assignment.confidence,
            "Assigned {} task",
            assignment.task_type
        );
        Ok(assignment)
    }

    /// Record the outcome of a previously assigned description.
    ///
    /// Returns the updated profile, or `None` if the description was never assigned.
    pub async fn update(
        &self,
        description: &str,
        success: bool,
        duration_ms: Option<f64>,
        quality: Option<f64>,
    ) -> Result<Option<WorkerProfile>> {
        let _writer = self.writer.lock().await;
        let task_hash = content_hash(description);
        let now = chrono::Utc::now();

        let Some(record) = self.store.find_assignment(&task_hash).await? else {
            warn!("No assignment found for task: {}", truncate(description, 50));
            return Ok(None);
        };

        self.store
            .complete_assignment(&task_hash, success, duration_ms, quality, now)
            .await?;

        let worker_id = record.assignment.worker_id;
        let profile = self
            .store
            .apply_worker_outcome(worker_id, success, duration_ms, now)
            .await?;
        self.store
            .append_performance_delta(&PerformanceDelta::for_outcome(worker_id, success))
            .await?;

        Ok(profile)
    }

    /// All worker profiles.
    pub async fn workers(&self) -> Result<Vec<WorkerProfile>> {
        Ok(self.store.list_workers().await?)
    }

    /// Routing metrics over the last `days` days.
    pub async fn report(&self, days: u32) -> Result<CoordinationReport> {
        let since = chrono::Utc::now() - chrono::Duration::days(i64::from(days));
        let summary = self.store.assignment_summary(since).await?;

        let mut workers: Vec<_> = self
            .store
            .list_workers()
            .await?
            .into_iter()
            .filter(|w| w.total_tasks > 0)
            .collect();
        workers.sort_by(|a, b| b.expertise.total_cmp(&a.expertise));

        Ok(CoordinationReport {
            period_days: days,
            success_rate: summary.successful as f64 / summary.total_assignments.max(1) as f64,
            summary,
            workers,
        })
    }

    async fn fallback_worker(&self) -> Result<WorkerProfile> {
        let name = &self.config.fallback_worker;
        if let Some(worker) = self.store.find_worker_by_name(name).await? {
            return Ok(worker);
        }
        let worker = WorkerProfile::new(name.clone(), Vec::new());
        self.store.seed_worker(&worker).await?;
        Ok(worker)
    }
}

/// Score a worker for a task.
///
/// `(0.6 * expertise + 0.4 * success_rate) * specialization_match
///  * (1 - |complexity - expected| * 0.3)` where `expected = 0.5 + 0.5 * expertise`.
pub fn score_worker(worker: &WorkerProfile, task_type: &str, complexity: f64) -> f64 {
    let base = 0.6 * worker.expertise + 0.4 * worker.success_rate;
    let specialization = if worker.specializes_in(task_type) { 1.0 } else { 0.5 };
    let expected = 0.5 + 0.5 * worker.expertise;
    base * specialization * (1.0 - (complexity - expected).abs() * 0.3)
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use govern_storage::SqliteAuditStore;

    async fn router() -> (TaskRouter, Arc<dyn AuditStore>) {
        let store: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::in_memory().await.unwrap());
        (TaskRouter::new(store.clone()), store)
    }

    fn profile(name: &str, specs: &[&str], expertise: f64, rate: f64, tasks: u64) -> WorkerProfile {
        let mut p = WorkerProfile::new(name, specs.iter().map(|s| s.to_string()).collect());
        p.expertise = expertise;
        p.success_rate = rate;
        p.total_tasks = tasks;
        p.successful_tasks = (rate * tasks as f64).round() as u64;
        p
    }

    #[tokio::test]
    async fn test_task_type_inference() {
        let (router, _) = router().await;
        assert_eq!(router.infer_task_type("fix the login bug"), "debugging");
        assert_eq!(router.infer_task_type("deploy to production"), "deployment");
        assert_eq!(router.infer_task_type("write some docs"), "implementation");
    }

    #[tokio::test]
    async fn test_complexity_estimate() {
        let (router, _) = router().await;
        assert!((router.estimate_complexity("fix the login bug") - 0.08).abs() < 1e-9);

        let long = "word ".repeat(100) + "integrate optimize distributed";
        assert!((router.estimate_complexity(&long) - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_new_specialist_beats_mismatched_expert() {
        let (router, store) = router().await;
        let novice = profile("debugger", &["debugging"], 0.5, 0.0, 0);
        let expert = profile("architect", &["architecture"], 0.6, 0.5, 20);
        store.save_worker(&novice).await.unwrap();
        store.save_worker(&expert).await.unwrap();

        let workers = store.list_workers().await.unwrap();
        let novice_score = score_worker(&workers[0], "debugging", 0.08);
        let expert_score = score_worker(&workers[1], "debugging", 0.08);
        assert!((novice_score - 0.2397).abs() < 1e-4);
        assert!((expert_score - 0.21952).abs() < 1e-4);

        let assignment = router.assign("fix the login bug").await.unwrap();
        assert_eq!(assignment.worker, "debugger");
        assert_eq!(assignment.method, AssignmentMethod::Scored);
    }

    #[tokio::test]
    async fn test_ties_go_to_first_seen() {
        let (router, _) = router().await;
        let a = profile("a", &["testing"], 0.5, 0.5, 10);
        let b = profile("b", &["testing"], 0.5, 0.5, 10);
        let workers = vec![a, b];
        let (best, _) = router.best_candidate(&workers, "testing", 0.2).unwrap();
        assert_eq!(best.name, "a");
    }

    #[tokio::test]
    async fn test_assignment_is_deterministic_and_cached() {
        let (router, _) = router().await;
        router.seed_workers().await.unwrap();

        let first = router.assign("add integration tests for the parser").await.unwrap();
        let second = router.assign("add integration tests for the parser").await.unwrap();
        assert_eq!(first.worker, "tester");
        assert_eq!(second.worker, first.worker);
        assert_eq!(second.confidence, first.confidence);
        assert_eq!(second.method, AssignmentMethod::Cached);
    }

    #[tokio::test]
    async fn test_fallback_when_no_worker_is_eligible() {
        let (router, store) = router().await;
        store.save_worker(&profile("flaky", &["debugging"], 0.1, 0.1, 50)).await.unwrap();

        let assignment = router.assign("fix the crash").await.unwrap();
        assert_eq!(assignment.method, AssignmentMethod::Fallback);
        assert_eq!(assignment.worker, "coder");
        assert_eq!(assignment.confidence, 0.5);
        assert!(store.find_worker_by_name("coder").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_tracks_outcomes_and_deltas() {
        let (router, store) = router().await;
        router.seed_workers().await.unwrap();
        let assignment = router.assign("deploy the release").await.unwrap();
        assert_eq!(assignment.worker, "devops");

        let profile = router
            .update("deploy the release", true, Some(1200.0), Some(0.9))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.total_tasks, 1);
        assert_eq!(profile.success_rate, 1.0);
        assert_eq!(profile.expertise, WorkerProfile::DEFAULT_EXPERTISE);

        router.update("deploy the release", false, None, None).await.unwrap();
        let deltas = store.list_performance_deltas(assignment.worker_id).await.unwrap();
        let values: Vec<f64> = deltas.iter().map(|d| d.delta).collect();
        assert_eq!(values, vec![1.0, -0.5]);
    }

    #[tokio::test]
    async fn test_update_unknown_description() {
        let (router, _) = router().await;
        assert!(router.update("never assigned", true, None, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_success_rate_stays_in_unit_interval() {
        let (router, _) = router().await;
        router.seed_workers().await.unwrap();
        router.assign("benchmark the cache").await.unwrap();
        for i in 0..12 {
            let p = router
                .update("benchmark the cache", i % 3 != 0, Some(10.0), None)
                .await
                .unwrap()
                .unwrap();
            assert!((0.0..=1.0).contains(&p.success_rate));
            assert!((0.0..=1.0).contains(&p.expertise));
        }
    }

    #[tokio::test]
    async fn test_report() {
        let (router, _) = router().await;
        router.seed_workers().await.unwrap();
        router.assign("secure the auth flow").await.unwrap();
        router.update("secure the auth flow", true, Some(5.0), None).await.unwrap();

        let report = router.report(7).await.unwrap();
        assert_eq!(report.summary.total_assignments, 1);
        assert_eq!(report.success_rate, 1.0);
        assert_eq!(report.workers.len(), 1);
        assert_eq!(report.workers[0].name, "security");
    }
}
