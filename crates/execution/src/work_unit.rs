//! The opaque work unit the driver invokes once per iteration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Work-unit configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkUnitConfig {
    /// Kill the work unit after this many seconds
    pub timeout_secs: Option<u64>,
    /// Capture output instead of inheriting the terminal
    pub capture_output: bool,
}

/// Input to a work unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkUnitInput {
    /// Environment variables added to the inherited environment
    pub env: BTreeMap<String, String>,

    /// Timeout
    pub timeout: Option<Duration>,
}

/// Output from a work unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnitOutput {
    /// Exit code, `None` when killed or timed out
    pub exit_code: Option<i32>,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Execution duration
    pub duration: Duration,

    /// The timeout fired
    pub timed_out: bool,
}

impl WorkUnitOutput {
    /// Whether the work unit exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Something the driver can run once per iteration.
#[async_trait]
pub trait WorkUnit: Send + Sync {
    /// Action text screened by the hook pipeline.
    fn describe(&self) -> String;

    /// Run the work unit.
    async fn run(&self, input: &WorkUnitInput) -> Result<WorkUnitOutput, anyhow::Error>;
}

/// External command work unit.
#[derive(Debug, Clone)]
pub struct CommandWorkUnit {
    program: String,
    args: Vec<String>,
    capture_output: bool,
}

impl CommandWorkUnit {
    /// Create a work unit from a program and its arguments.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            capture_output: false,
        }
    }

    /// Create a work unit from a command line, first element is the program.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    /// Capture stdout/stderr instead of inheriting them.
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }
}

#[async_trait]
impl WorkUnit for CommandWorkUnit {
    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn run(&self, input: &WorkUnitInput) -> Result<WorkUnitOutput, anyhow::Error> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&input.env).kill_on_drop(true);
        if self.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        debug!("Running work unit: {}", self.describe());
        let child = cmd.spawn()?;
        let waited = match input.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output()).await,
            None => Ok(child.wait_with_output().await),
        };

        let output = match waited {
            Ok(output) => output?,
            Err(_) => {
                warn!("Work unit timed out after {:?}", input.timeout);
                return Ok(WorkUnitOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: start.elapsed(),
                    timed_out: true,
                });
            }
        };

        Ok(WorkUnitOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
            timed_out: false,
        })
    }
}
