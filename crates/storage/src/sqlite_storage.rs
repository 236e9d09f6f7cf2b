//! SQLite backend for the audit store.
//!
//! All writes go through a single pooled connection, so statements and
//! transactions never interleave. Timestamps are stored as fixed-width
//! RFC 3339 UTC strings and compare lexically.

use async_trait::async_trait;
use govern_core::{
    Assignment, AssignmentRecord, AuditRecord, ContextId, CycleRun, DimensionEvent,
    DimensionTags, EventKind, Focus, GovernanceEvent, HookPhase, Iteration, PerformanceDelta,
    RetryState, RewardBreakdown, RunId, RunStatus, SafetyState, ScanAction, ScanVerdict,
    ThreatPattern, Time, WorkerId, WorkerProfile,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::trait_::{AssignmentSummary, AuditStore, Result, ScanSummary, StorageError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threat_patterns (
    pattern TEXT PRIMARY KEY,
    description TEXT,
    level TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.5,
    detection_count INTEGER NOT NULL DEFAULT 0,
    false_positive_count INTEGER NOT NULL DEFAULT 0,
    last_detected TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS security_scans (
    scan_hash TEXT PRIMARY KEY,
    input_text TEXT NOT NULL,
    detected INTEGER NOT NULL,
    level TEXT NOT NULL,
    risk REAL NOT NULL,
    action TEXT NOT NULL,
    matched TEXT NOT NULL,
    reasoning TEXT NOT NULL,
    duration_ms REAL NOT NULL,
    scanned_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scans_time ON security_scans(scanned_at);

CREATE TABLE IF NOT EXISTS worker_profiles (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    specializations TEXT NOT NULL,
    total_tasks INTEGER NOT NULL DEFAULT 0,
    successful_tasks INTEGER NOT NULL DEFAULT 0,
    success_rate REAL NOT NULL DEFAULT 0,
    avg_completion_ms REAL,
    expertise REAL NOT NULL DEFAULT 0.5,
    last_active TEXT,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_workers_name ON worker_profiles(name);

CREATE TABLE IF NOT EXISTS task_assignments (
    task_hash TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    task_type TEXT NOT NULL,
    complexity REAL NOT NULL,
    worker_id TEXT NOT NULL,
    worker_name TEXT NOT NULL,
    confidence REAL NOT NULL,
    method TEXT NOT NULL,
    reasoning TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    success INTEGER,
    duration_ms REAL,
    quality REAL
);
CREATE INDEX IF NOT EXISTS idx_assignments_time ON task_assignments(started_at);

CREATE TABLE IF NOT EXISTS performance_deltas (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_id TEXT NOT NULL,
    delta REAL NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_deltas_worker ON performance_deltas(worker_id);

CREATE TABLE IF NOT EXISTS dimension_events (
    text_hash TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    actor TEXT NOT NULL,
    action TEXT NOT NULL,
    time_tag TEXT NOT NULL,
    location TEXT NOT NULL,
    motivation TEXT NOT NULL,
    mechanism TEXT NOT NULL,
    category TEXT NOT NULL,
    confidence REAL NOT NULL,
    latency_ms REAL NOT NULL,
    extracted_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_dimensions_category ON dimension_events(category);

CREATE TABLE IF NOT EXISTS hook_execution_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    context_id TEXT NOT NULL,
    phase TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    action TEXT NOT NULL,
    latency_ms REAL NOT NULL DEFAULT 0,
    security_action TEXT,
    worker TEXT,
    category TEXT,
    validation_passed INTEGER,
    retry_count INTEGER NOT NULL DEFAULT 0,
    halted INTEGER NOT NULL DEFAULT 0,
    context_json TEXT NOT NULL,
    outcome_json TEXT,
    UNIQUE(context_id, phase)
);
CREATE INDEX IF NOT EXISTS idx_hook_log_time ON hook_execution_log(recorded_at);

CREATE TABLE IF NOT EXISTS hook_outcomes (
    context_id TEXT PRIMARY KEY,
    worker TEXT NOT NULL,
    success INTEGER NOT NULL,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cycle_runs (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    requested_iterations INTEGER NOT NULL,
    extensions_used INTEGER NOT NULL,
    iterations_run INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS iterations (
    run_id TEXT NOT NULL,
    idx INTEGER NOT NULL,
    circle TEXT NOT NULL,
    depth INTEGER NOT NULL,
    safety TEXT NOT NULL,
    safety_reason TEXT NOT NULL,
    action TEXT NOT NULL,
    success INTEGER NOT NULL,
    exit_code INTEGER,
    duration_ms REAL NOT NULL,
    success_term REAL NOT NULL,
    duration_term REAL NOT NULL,
    risk_delta_term REAL NOT NULL,
    reward REAL NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (run_id, idx)
);

CREATE TABLE IF NOT EXISTS governance_events (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    iteration INTEGER,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_run ON governance_events(run_id, recorded_at);
"#;

/// SQLite audit store.
#[derive(Clone)]
pub struct SqliteAuditStore {
    /// Database connection pool
    pool: SqlitePool,
}

impl SqliteAuditStore {
    /// Open (or create) a database file.
    pub async fn open(path: &Path) -> Result<Self> {
        let url = format!("sqlite:{}", path.display());
        let options = SqliteConnectOptions::from_str(&url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path.display(), "Opened audit store");

        Ok(store)
    }

    /// Create an in-memory store for testing.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // The single connection must never be recycled or the database is lost.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Closed audit store");
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

fn ts(time: Time) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<Time> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp {raw}: {e}")))
}

fn parse_field<T>(raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| StorageError::Corrupt(format!("{raw}: {e}")))
}

fn time_col(row: &SqliteRow, column: &str) -> Result<Time> {
    let raw: String = row.try_get(column)?;
    parse_time(&raw)
}

fn opt_time_col(row: &SqliteRow, column: &str) -> Result<Option<Time>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.as_deref().map(parse_time).transpose()
}

fn count_col(row: &SqliteRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column)?;
    Ok(value.max(0) as u64)
}

fn pattern_from_row(row: &SqliteRow) -> Result<ThreatPattern> {
    let level: String = row.try_get("level")?;
    Ok(ThreatPattern {
        pattern: row.try_get("pattern")?,
        description: row.try_get("description")?,
        level: parse_field(&level)?,
        confidence: row.try_get("confidence")?,
        detection_count: count_col(row, "detection_count")?,
        false_positive_count: count_col(row, "false_positive_count")?,
        last_detected: opt_time_col(row, "last_detected")?,
        created_at: time_col(row, "created_at")?,
    })
}

fn worker_from_row(row: &SqliteRow) -> Result<WorkerProfile> {
    let id: String = row.try_get("id")?;
    let specializations: String = row.try_get("specializations")?;
    Ok(WorkerProfile {
        id: parse_field(&id)?,
        name: row.try_get("name")?,
        specializations: serde_json::from_str(&specializations)?,
        total_tasks: count_col(row, "total_tasks")?,
        successful_tasks: count_col(row, "successful_tasks")?,
        success_rate: row.try_get("success_rate")?,
        avg_completion_ms: row.try_get("avg_completion_ms")?,
        expertise: row.try_get("expertise")?,
        last_active: opt_time_col(row, "last_active")?,
        created_at: time_col(row, "created_at")?,
    })
}

fn assignment_from_row(row: &SqliteRow) -> Result<AssignmentRecord> {
    let worker_id: String = row.try_get("worker_id")?;
    let method: String = row.try_get("method")?;
    Ok(AssignmentRecord {
        task_hash: row.try_get("task_hash")?,
        description: row.try_get("description")?,
        assignment: Assignment {
            worker_id: parse_field(&worker_id)?,
            worker: row.try_get("worker_name")?,
            confidence: row.try_get("confidence")?,
            method: parse_field(&method)?,
            reasoning: row.try_get("reasoning")?,
            task_type: row.try_get("task_type")?,
            complexity: row.try_get("complexity")?,
        },
        started_at: time_col(row, "started_at")?,
        completed_at: opt_time_col(row, "completed_at")?,
        success: row.try_get("success")?,
        duration_ms: row.try_get("duration_ms")?,
        quality: row.try_get("quality")?,
    })
}

fn scan_from_row(row: &SqliteRow) -> Result<ScanVerdict> {
    let level: String = row.try_get("level")?;
    let action: String = row.try_get("action")?;
    let matched: String = row.try_get("matched")?;
    Ok(ScanVerdict {
        text_hash: row.try_get("scan_hash")?,
        detected: row.try_get("detected")?,
        level: parse_field(&level)?,
        risk: row.try_get("risk")?,
        action: parse_field(&action)?,
        matched: serde_json::from_str(&matched)?,
        reasoning: row.try_get("reasoning")?,
        cached: false,
        duration_ms: row.try_get("duration_ms")?,
        scanned_at: time_col(row, "scanned_at")?,
    })
}

fn hook_record_from_row(row: &SqliteRow) -> Result<AuditRecord> {
    let context_id: String = row.try_get("context_id")?;
    let phase: String = row.try_get("phase")?;
    let security_action: Option<String> = row.try_get("security_action")?;
    let context_json: String = row.try_get("context_json")?;
    let outcome_json: Option<String> = row.try_get("outcome_json")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    Ok(AuditRecord {
        context_id: parse_field(&context_id)?,
        phase: parse_field(&phase)?,
        recorded_at: time_col(row, "recorded_at")?,
        action: row.try_get("action")?,
        latency_ms: row.try_get("latency_ms")?,
        security_action: security_action
            .as_deref()
            .map(parse_field::<ScanAction>)
            .transpose()?,
        worker: row.try_get("worker")?,
        category: row.try_get("category")?,
        validation_passed: row.try_get("validation_passed")?,
        retry_count: retry_count.max(0) as u32,
        halted: row.try_get("halted")?,
        context_json: serde_json::from_str(&context_json)?,
        outcome_json: outcome_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
    })
}

fn run_from_row(row: &SqliteRow) -> Result<CycleRun> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let requested: i64 = row.try_get("requested_iterations")?;
    let extensions: i64 = row.try_get("extensions_used")?;
    let iterations: i64 = row.try_get("iterations_run")?;
    Ok(CycleRun {
        id: parse_field(&id)?,
        kind: row.try_get("kind")?,
        requested_iterations: requested.max(0) as u32,
        extensions_used: extensions.max(0) as u32,
        iterations_run: iterations.max(0) as u32,
        started_at: time_col(row, "started_at")?,
        ended_at: opt_time_col(row, "ended_at")?,
        status: parse_field::<RunStatus>(&status)?,
    })
}

fn iteration_from_row(row: &SqliteRow) -> Result<Iteration> {
    let run_id: String = row.try_get("run_id")?;
    let safety: String = row.try_get("safety")?;
    let index: i64 = row.try_get("idx")?;
    let depth: i64 = row.try_get("depth")?;
    Ok(Iteration {
        run_id: parse_field(&run_id)?,
        index: index.max(0) as u32,
        focus: Focus {
            circle: row.try_get("circle")?,
            depth: depth.max(0) as u32,
        },
        safety: parse_field::<SafetyState>(&safety)?,
        safety_reason: row.try_get("safety_reason")?,
        action: row.try_get("action")?,
        success: row.try_get("success")?,
        exit_code: row.try_get("exit_code")?,
        duration_ms: row.try_get("duration_ms")?,
        reward: RewardBreakdown {
            success_term: row.try_get("success_term")?,
            duration_term: row.try_get("duration_term")?,
            risk_delta_term: row.try_get("risk_delta_term")?,
            total: row.try_get("reward")?,
        },
        recorded_at: time_col(row, "recorded_at")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<GovernanceEvent> {
    let id: String = row.try_get("id")?;
    let run_id: String = row.try_get("run_id")?;
    let kind: String = row.try_get("kind")?;
    let payload: String = row.try_get("payload")?;
    let iteration: Option<i64> = row.try_get("iteration")?;
    Ok(GovernanceEvent {
        id: parse_field(&id)?,
        run_id: parse_field(&run_id)?,
        iteration: iteration.map(|i| i.max(0) as u32),
        kind: parse_field::<EventKind>(&kind)?,
        payload: serde_json::from_str(&payload)?,
        recorded_at: time_col(row, "recorded_at")?,
    })
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    // === Threat patterns ===

    async fn upsert_threat_pattern(&self, pattern: &ThreatPattern) -> Result<()> {
        sqlx::query(
            "INSERT INTO threat_patterns
                (pattern, description, level, confidence, detection_count, false_positive_count,
                 last_detected, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(pattern) DO UPDATE SET
                level = excluded.level,
                description = COALESCE(excluded.description, threat_patterns.description)",
        )
        .bind(&pattern.pattern)
        .bind(&pattern.description)
        .bind(pattern.level.as_str())
        .bind(pattern.confidence)
        .bind(pattern.detection_count as i64)
        .bind(pattern.false_positive_count as i64)
        .bind(pattern.last_detected.map(ts))
        .bind(ts(pattern.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn seed_threat_pattern(&self, pattern: &ThreatPattern) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO threat_patterns
                (pattern, description, level, confidence, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&pattern.pattern)
        .bind(&pattern.description)
        .bind(pattern.level.as_str())
        .bind(pattern.confidence)
        .bind(ts(pattern.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_threat_patterns(&self) -> Result<Vec<ThreatPattern>> {
        let rows = sqlx::query("SELECT * FROM threat_patterns ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(pattern_from_row).collect()
    }

    async fn record_detection(&self, pattern: &str, at: Time) -> Result<()> {
        sqlx::query(
            "UPDATE threat_patterns
             SET detection_count = detection_count + 1, last_detected = ?
             WHERE pattern = ?",
        )
        .bind(ts(at))
        .bind(pattern)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_false_positive(&self, pattern: &str) -> Result<Option<ThreatPattern>> {
        // SET expressions see pre-update values, hence the explicit + 1.
        sqlx::query(
            "UPDATE threat_patterns
             SET false_positive_count = false_positive_count + 1,
                 confidence = CASE
                     WHEN false_positive_count + 1 > detection_count * 0.2 THEN confidence * 0.8
                     ELSE confidence
                 END
             WHERE pattern = ?",
        )
        .bind(pattern)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM threat_patterns WHERE pattern = ?")
            .bind(pattern)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(pattern_from_row).transpose()
    }

    // === Security scans ===

    async fn find_scan(&self, text_hash: &str) -> Result<Option<ScanVerdict>> {
        let row = sqlx::query("SELECT * FROM security_scans WHERE scan_hash = ?")
            .bind(text_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(scan_from_row).transpose()
    }

    async fn save_scan(&self, text: &str, verdict: &ScanVerdict) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO security_scans
                (scan_hash, input_text, detected, level, risk, action, matched, reasoning,
                 duration_ms, scanned_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&verdict.text_hash)
        .bind(text)
        .bind(verdict.detected)
        .bind(verdict.level.as_str())
        .bind(verdict.risk)
        .bind(verdict.action.as_str())
        .bind(serde_json::to_string(&verdict.matched)?)
        .bind(&verdict.reasoning)
        .bind(verdict.duration_ms)
        .bind(ts(verdict.scanned_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn scan_summary(&self, since: Time) -> Result<ScanSummary> {
        let cutoff = ts(since);
        let overall = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN detected = 1 THEN 1 ELSE 0 END), 0) AS detected,
                    AVG(risk) AS avg_risk,
                    AVG(duration_ms) AS avg_ms
             FROM security_scans WHERE scanned_at >= ?",
        )
        .bind(&cutoff)
        .fetch_one(&self.pool)
        .await?;

        let by_level = sqlx::query(
            "SELECT level, COUNT(*) AS n FROM security_scans
             WHERE detected = 1 AND scanned_at >= ?
             GROUP BY level",
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut threats_by_level = BTreeMap::new();
        for row in &by_level {
            threats_by_level.insert(row.try_get::<String, _>("level")?, count_col(row, "n")?);
        }

        let fp = sqlx::query(
            "SELECT COALESCE(SUM(false_positive_count), 0) AS fp,
                    COALESCE(SUM(detection_count), 0) AS det
             FROM threat_patterns WHERE detection_count > 0",
        )
        .fetch_one(&self.pool)
        .await?;
        let false_positives = count_col(&fp, "fp")?;
        let detections = count_col(&fp, "det")?;

        Ok(ScanSummary {
            total_scans: count_col(&overall, "total")?,
            threats_detected: count_col(&overall, "detected")?,
            avg_risk: overall.try_get("avg_risk")?,
            avg_scan_ms: overall.try_get("avg_ms")?,
            threats_by_level,
            false_positive_rate: false_positives as f64 / detections.max(1) as f64,
        })
    }

    // === Worker profiles ===

    async fn seed_worker(&self, profile: &WorkerProfile) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO worker_profiles
                (id, name, specializations, total_tasks, successful_tasks, success_rate,
                 avg_completion_ms, expertise, last_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(profile.id.to_string())
        .bind(&profile.name)
        .bind(serde_json::to_string(&profile.specializations)?)
        .bind(profile.total_tasks as i64)
        .bind(profile.successful_tasks as i64)
        .bind(profile.success_rate)
        .bind(profile.avg_completion_ms)
        .bind(profile.expertise)
        .bind(profile.last_active.map(ts))
        .bind(ts(profile.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_worker(&self, profile: &WorkerProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO worker_profiles
                (id, name, specializations, total_tasks, successful_tasks, success_rate,
                 avg_completion_ms, expertise, last_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                specializations = excluded.specializations,
                total_tasks = excluded.total_tasks,
                successful_tasks = excluded.successful_tasks,
                success_rate = excluded.success_rate,
                avg_completion_ms = excluded.avg_completion_ms,
                expertise = excluded.expertise,
                last_active = excluded.last_active",
        )
        .bind(profile.id.to_string())
        .bind(&profile.name)
        .bind(serde_json::to_string(&profile.specializations)?)
        .bind(profile.total_tasks as i64)
        .bind(profile.successful_tasks as i64)
        .bind(profile.success_rate)
        .bind(profile.avg_completion_ms)
        .bind(profile.expertise)
        .bind(profile.last_active.map(ts))
        .bind(ts(profile.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_worker(&self, id: WorkerId) -> Result<Option<WorkerProfile>> {
        let row = sqlx::query("SELECT * FROM worker_profiles WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(worker_from_row).transpose()
    }

    async fn find_worker_by_name(&self, name: &str) -> Result<Option<WorkerProfile>> {
        let row = sqlx::query("SELECT * FROM worker_profiles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(worker_from_row).transpose()
    }

    async fn list_workers(&self) -> Result<Vec<WorkerProfile>> {
        let rows = sqlx::query("SELECT * FROM worker_profiles ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(worker_from_row).collect()
    }

    async fn apply_worker_outcome(
        &self,
        id: WorkerId,
        success: bool,
        duration_ms: Option<f64>,
        at: Time,
    ) -> Result<Option<WorkerProfile>> {
        // SET expressions see pre-update values; ?1 is 1 on success.
        sqlx::query(
            "UPDATE worker_profiles SET
                total_tasks = total_tasks + 1,
                successful_tasks = successful_tasks + ?1,
                success_rate = CAST(successful_tasks + ?1 AS REAL) / (total_tasks + 1),
                avg_completion_ms = CASE
                    WHEN ?2 IS NULL THEN avg_completion_ms
                    WHEN avg_completion_ms IS NULL THEN ?2
                    ELSE (avg_completion_ms * total_tasks + ?2) / (total_tasks + 1)
                END,
                expertise = CASE
                    WHEN total_tasks + 1 >= 5 THEN
                        (CAST(successful_tasks + ?1 AS REAL) / (total_tasks + 1))
                        * (0.5 + 0.5 * MIN((total_tasks + 1) / 100.0, 1.0))
                    ELSE expertise
                END,
                last_active = ?3
             WHERE id = ?4",
        )
        .bind(i64::from(success))
        .bind(duration_ms)
        .bind(ts(at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.load_worker(id).await
    }

    // === Assignments ===

    async fn find_assignment(&self, task_hash: &str) -> Result<Option<AssignmentRecord>> {
        let row = sqlx::query("SELECT * FROM task_assignments WHERE task_hash = ?")
            .bind(task_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(assignment_from_row).transpose()
    }

    async fn save_assignment(&self, record: &AssignmentRecord) -> Result<bool> {
        let a = &record.assignment;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO task_assignments
                (task_hash, description, task_type, complexity, worker_id, worker_name,
                 confidence, method, reasoning, started_at, completed_at, success,
                 duration_ms, quality)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.task_hash)
        .bind(&record.description)
        .bind(&a.task_type)
        .bind(a.complexity)
        .bind(a.worker_id.to_string())
        .bind(&a.worker)
        .bind(a.confidence)
        .bind(a.method.as_str())
        .bind(&a.reasoning)
        .bind(ts(record.started_at))
        .bind(record.completed_at.map(ts))
        .bind(record.success)
        .bind(record.duration_ms)
        .bind(record.quality)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_assignment(
        &self,
        task_hash: &str,
        success: bool,
        duration_ms: Option<f64>,
        quality: Option<f64>,
        at: Time,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE task_assignments
             SET completed_at = ?, success = ?, duration_ms = ?, quality = ?
             WHERE task_hash = ?",
        )
        .bind(ts(at))
        .bind(success)
        .bind(duration_ms)
        .bind(quality)
        .bind(task_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_performance_delta(&self, delta: &PerformanceDelta) -> Result<()> {
        sqlx::query(
            "INSERT INTO performance_deltas (worker_id, delta, recorded_at) VALUES (?, ?, ?)",
        )
        .bind(delta.worker_id.to_string())
        .bind(delta.delta)
        .bind(ts(delta.recorded_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_performance_deltas(&self, worker_id: WorkerId) -> Result<Vec<PerformanceDelta>> {
        let rows = sqlx::query(
            "SELECT worker_id, delta, recorded_at FROM performance_deltas
             WHERE worker_id = ? ORDER BY id",
        )
        .bind(worker_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PerformanceDelta> {
                Ok(PerformanceDelta {
                    worker_id,
                    delta: row.try_get("delta")?,
                    recorded_at: time_col(row, "recorded_at")?,
                })
            })
            .collect()
    }

    async fn assignment_summary(&self, since: Time) -> Result<AssignmentSummary> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0) AS successful,
                    AVG(confidence) AS avg_confidence,
                    AVG(duration_ms) AS avg_duration,
                    AVG(quality) AS avg_quality
             FROM task_assignments WHERE started_at >= ?",
        )
        .bind(ts(since))
        .fetch_one(&self.pool)
        .await?;

        Ok(AssignmentSummary {
            total_assignments: count_col(&row, "total")?,
            successful: count_col(&row, "successful")?,
            avg_confidence: row.try_get("avg_confidence")?,
            avg_duration_ms: row.try_get("avg_duration")?,
            avg_quality: row.try_get("avg_quality")?,
        })
    }

    // === Dimension events ===

    async fn save_dimension_event(&self, event: &DimensionEvent) -> Result<bool> {
        let tags = &event.tags;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO dimension_events
                (text_hash, text, actor, action, time_tag, location, motivation, mechanism,
                 category, confidence, latency_ms, extracted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.text_hash)
        .bind(&event.text)
        .bind(&tags.actor)
        .bind(&tags.action)
        .bind(&tags.time)
        .bind(&tags.location)
        .bind(&tags.motivation)
        .bind(&tags.mechanism)
        .bind(&tags.category)
        .bind(tags.confidence)
        .bind(event.latency_ms)
        .bind(ts(event.extracted_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn load_dimension_event(&self, text_hash: &str) -> Result<Option<DimensionEvent>> {
        let row = sqlx::query("SELECT * FROM dimension_events WHERE text_hash = ?")
            .bind(text_hash)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(DimensionEvent {
            text_hash: row.try_get("text_hash")?,
            text: row.try_get("text")?,
            tags: DimensionTags {
                actor: row.try_get("actor")?,
                action: row.try_get("action")?,
                time: row.try_get("time_tag")?,
                location: row.try_get("location")?,
                motivation: row.try_get("motivation")?,
                mechanism: row.try_get("mechanism")?,
                category: row.try_get("category")?,
                confidence: row.try_get("confidence")?,
            },
            latency_ms: row.try_get("latency_ms")?,
            extracted_at: time_col(&row, "extracted_at")?,
        }))
    }

    // === Hook execution log ===

    async fn append_hook_record(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO hook_execution_log
                (context_id, phase, recorded_at, action, latency_ms, security_action, worker,
                 category, validation_passed, retry_count, halted, context_json, outcome_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(context_id, phase) DO UPDATE SET
                recorded_at = excluded.recorded_at,
                latency_ms = excluded.latency_ms,
                security_action = excluded.security_action,
                worker = excluded.worker,
                category = excluded.category,
                validation_passed = excluded.validation_passed,
                halted = excluded.halted,
                context_json = excluded.context_json,
                outcome_json = excluded.outcome_json",
        )
        .bind(record.context_id.as_str())
        .bind(record.phase.as_str())
        .bind(ts(record.recorded_at))
        .bind(&record.action)
        .bind(record.latency_ms)
        .bind(record.security_action.map(ScanAction::as_str))
        .bind(&record.worker)
        .bind(&record.category)
        .bind(record.validation_passed)
        .bind(i64::from(record.retry_count))
        .bind(record.halted)
        .bind(serde_json::to_string(&record.context_json)?)
        .bind(
            record
                .outcome_json
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_hook_failure(
        &self,
        context_id: &ContextId,
        phase: HookPhase,
        action: &str,
        max_retries: u32,
    ) -> Result<RetryState> {
        let max = i64::from(max_retries.max(1));
        let mut tx = self.pool.begin().await?;

        let previous: Option<i64> = sqlx::query_scalar(
            "SELECT retry_count FROM hook_execution_log WHERE context_id = ? AND phase = ?",
        )
        .bind(context_id.as_str())
        .bind(phase.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let previous = previous.unwrap_or(0);

        sqlx::query(
            "INSERT INTO hook_execution_log
                (context_id, phase, recorded_at, action, retry_count, context_json)
             VALUES (?, ?, ?, ?, MIN(1, ?), 'null')
             ON CONFLICT(context_id, phase) DO UPDATE SET
                retry_count = MIN(hook_execution_log.retry_count + 1, ?)",
        )
        .bind(context_id.as_str())
        .bind(phase.as_str())
        .bind(ts(chrono::Utc::now()))
        .bind(action)
        .bind(max)
        .bind(max)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let current = (previous + 1).min(max);
        Ok(RetryState {
            retry_count: current as u32,
            escalate: previous < max && current == max,
        })
    }

    async fn load_hook_record(
        &self,
        context_id: &ContextId,
        phase: HookPhase,
    ) -> Result<Option<AuditRecord>> {
        let row = sqlx::query(
            "SELECT * FROM hook_execution_log WHERE context_id = ? AND phase = ?",
        )
        .bind(context_id.as_str())
        .bind(phase.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(hook_record_from_row).transpose()
    }

    async fn outcome_applied(&self, context_id: &ContextId) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM hook_outcomes WHERE context_id = ?")
                .bind(context_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }

    async fn mark_outcome_applied(
        &self,
        context_id: &ContextId,
        worker: &str,
        success: bool,
        at: Time,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO hook_outcomes (context_id, worker, success, applied_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(context_id.as_str())
        .bind(worker)
        .bind(success)
        .bind(ts(at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // === Cycle runs ===

    async fn save_cycle_run(&self, run: &CycleRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO cycle_runs
                (id, kind, requested_iterations, extensions_used, iterations_run, started_at,
                 ended_at, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                requested_iterations = excluded.requested_iterations,
                extensions_used = excluded.extensions_used,
                iterations_run = excluded.iterations_run,
                ended_at = excluded.ended_at,
                status = excluded.status",
        )
        .bind(run.id.to_string())
        .bind(&run.kind)
        .bind(i64::from(run.requested_iterations))
        .bind(i64::from(run.extensions_used))
        .bind(i64::from(run.iterations_run))
        .bind(ts(run.started_at))
        .bind(run.ended_at.map(ts))
        .bind(run.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_cycle_run(&self, id: RunId) -> Result<Option<CycleRun>> {
        let row = sqlx::query("SELECT * FROM cycle_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(run_from_row).transpose()
    }

    async fn append_iteration(&self, iteration: &Iteration) -> Result<()> {
        sqlx::query(
            "INSERT INTO iterations
                (run_id, idx, circle, depth, safety, safety_reason, action, success, exit_code,
                 duration_ms, success_term, duration_term, risk_delta_term, reward, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(iteration.run_id.to_string())
        .bind(i64::from(iteration.index))
        .bind(&iteration.focus.circle)
        .bind(i64::from(iteration.focus.depth))
        .bind(iteration.safety.as_str())
        .bind(&iteration.safety_reason)
        .bind(&iteration.action)
        .bind(iteration.success)
        .bind(iteration.exit_code)
        .bind(iteration.duration_ms)
        .bind(iteration.reward.success_term)
        .bind(iteration.reward.duration_term)
        .bind(iteration.reward.risk_delta_term)
        .bind(iteration.reward.total)
        .bind(ts(iteration.recorded_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_iterations(&self, run_id: RunId) -> Result<Vec<Iteration>> {
        let rows = sqlx::query("SELECT * FROM iterations WHERE run_id = ? ORDER BY idx")
            .bind(run_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(iteration_from_row).collect()
    }

    async fn append_governance_event(&self, event: &GovernanceEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO governance_events (id, run_id, iteration, kind, payload, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(event.run_id.to_string())
        .bind(event.iteration.map(i64::from))
        .bind(event.kind.as_str())
        .bind(serde_json::to_string(&event.payload)?)
        .bind(ts(event.recorded_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_governance_events(&self, run_id: RunId) -> Result<Vec<GovernanceEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM governance_events WHERE run_id = ? ORDER BY recorded_at, rowid",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }
}
