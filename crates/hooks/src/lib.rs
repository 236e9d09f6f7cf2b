//! Pre/post hook pipeline for governed actions.
//!
//! [`HookPipeline`] composes the threat scanner, task router and dimension
//! extractor into a lifecycle around one action, producing immutable
//! context and outcome records with an audit row per phase.

#![warn(missing_docs)]

pub mod advisor;
pub mod learning;
pub mod pipeline;
pub mod validator;

pub use advisor::{AdviceRequest, HeuristicAdvisor, NoopAdvisor, OptimizationAdvisor};
pub use learning::{DryRunUpdater, LearningUpdater};
pub use pipeline::{HookConfig, HookPipeline};
pub use validator::QualityValidator;

use govern_core::{ContextId, HookPhase};
use govern_guard::ScanError;
use govern_routing::RoutingError;
use govern_storage::StorageError;

/// Errors raised by the hook pipeline.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The threat scanner refused the action
    #[error("action blocked by threat scanner: {reasoning}")]
    Denied {
        /// Context of the refused action
        context_id: ContextId,
        /// Scanner explanation
        reasoning: String,
    },

    /// The (context id, phase) already failed the maximum number of times
    #[error("retries exhausted for {context_id} ({phase})")]
    RetriesExhausted {
        /// Context id
        context_id: ContextId,
        /// Phase
        phase: HookPhase,
    },

    /// Threat scanner failure
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Routing failure
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Record serialization failure
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HookError {
    /// Whether this is an infrastructure failure rather than a policy decision.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, HookError::Denied { .. } | HookError::RetriesExhausted { .. })
    }
}

/// Result alias for hook operations.
pub type Result<T> = std::result::Result<T, HookError>;
