//! Execution layer - the governed production cycle.
//!
//! The [`CycleDriver`] runs a work unit repeatedly under a [`SafetyGate`],
//! a [`BudgetController`] and a [`FocusSelector`], optionally wrapping each
//! invocation in the hook pipeline, and records every decision.

#![warn(missing_docs)]

pub mod budget;
pub mod config;
pub mod driver;
pub mod env;
pub mod focus;
pub mod reward;
pub mod safety;
pub mod signals;
pub mod work_unit;

pub use budget::{BudgetConfig, BudgetController, BudgetDecision};
pub use config::{GovernConfig, RunDefaults};
pub use driver::{CycleDriver, CycleResult, RunOptions, RunSummary};
pub use env::{PatternMetrics, WorkEnvironment};
pub use focus::{CircleSelector, FocusConfig, FocusPolicy, FocusSelector, Selection};
pub use reward::RewardConfig;
pub use safety::{decide, SafetyConfig, SafetyDecision, SafetyEvaluation, SafetyGate};
pub use signals::{SignalConfig, Signals};
pub use work_unit::{CommandWorkUnit, WorkUnit, WorkUnitConfig, WorkUnitInput, WorkUnitOutput};

use govern_hooks::HookError;
use govern_routing::RoutingError;
use govern_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Execution layer errors.
#[derive(Error, Debug)]
pub enum GovernError {
    /// Config file could not be read
    #[error("cannot read config {}: {source}", path.display())]
    Config {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid TOML
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Storage error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Hook pipeline error
    #[error(transparent)]
    Hook(#[from] HookError),

    /// Routing error
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for the execution layer.
pub type Result<T> = std::result::Result<T, GovernError>;
