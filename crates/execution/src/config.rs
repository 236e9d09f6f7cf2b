//! Governance configuration, loaded from TOML.
//!
//! Every section is optional; missing keys fall back to the defaults.
//!
//! ```toml
//! state_dir = ".goalie"
//!
//! [run]
//! iterations = 12
//! depth = 3
//!
//! [safety]
//! max_incidents = 8
//! smoothing = 0.35
//!
//! [focus.depth_offsets]
//! orchestrator = 1
//! assessor = 2
//!
//! [work_unit]
//! timeout_secs = 900
//! ```

use govern_hooks::HookConfig;
use govern_routing::{ExtractorConfig, RouterConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::budget::BudgetConfig;
use crate::focus::FocusConfig;
use crate::reward::RewardConfig;
use crate::safety::SafetyConfig;
use crate::signals::SignalConfig;
use crate::work_unit::WorkUnitConfig;
use crate::{GovernError, Result};

/// Defaults for a governed run, overridable from the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    /// Requested iterations
    pub iterations: u32,
    /// Base depth
    pub depth: u32,
    /// Rotate circles when no circle is fixed
    pub rotate_circles: bool,
    /// Allow autocommit while SAFE
    pub autocommit: bool,
    /// Deployment environment name
    pub environment: String,
    /// Consecutive failures before a diagnostic event
    pub failure_threshold: u32,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            iterations: 12,
            depth: 3,
            rotate_circles: true,
            autocommit: true,
            environment: "local".to_string(),
            failure_threshold: 3,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernConfig {
    /// Directory for run ids and pre-flight snapshots
    pub state_dir: PathBuf,
    /// SQLite audit store
    pub database: PathBuf,
    /// Run defaults
    pub run: RunDefaults,
    /// Safety gate
    pub safety: SafetyConfig,
    /// Iteration budget
    pub budget: BudgetConfig,
    /// Circles and depth ladder
    pub focus: FocusConfig,
    /// Reward weights
    pub reward: RewardConfig,
    /// Upstream signal logs
    pub signals: SignalConfig,
    /// Work-unit invocation
    pub work_unit: WorkUnitConfig,
    /// Hook pipeline
    pub hooks: HookConfig,
    /// Task routing tables
    pub router: RouterConfig,
    /// Dimension tagging tables
    pub extractor: ExtractorConfig,
}

impl Default for GovernConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".goalie"),
            database: PathBuf::from(".goalie/govern.db"),
            run: RunDefaults::default(),
            safety: SafetyConfig::default(),
            budget: BudgetConfig::default(),
            focus: FocusConfig::default(),
            reward: RewardConfig::default(),
            signals: SignalConfig::default(),
            work_unit: WorkUnitConfig::default(),
            hooks: HookConfig::default(),
            router: RouterConfig::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

impl GovernConfig {
    /// Parse a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| GovernError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Load from `path`, or use the defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }
}
