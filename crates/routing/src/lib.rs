//! Task routing and dimension tagging for governed actions.
//!
//! [`TaskRouter`] assigns an action description to the best-scoring
//! worker profile and learns from reported outcomes. [`DimensionExtractor`]
//! tags the same description along six facets and infers a routing
//! category. Both work from plain rule tables in [`tables`].

#![warn(missing_docs)]

pub mod extractor;
pub mod router;
pub mod tables;

pub use extractor::{DimensionExtractor, ExtractorConfig};
pub use router::{score_worker, CoordinationReport, RouterConfig, TaskRouter};
pub use tables::{FacetRules, WorkerSpec};

use govern_storage::StorageError;

/// Errors raised by routing components.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Facet pattern does not compile
    #[error("invalid pattern {pattern}: {source}")]
    InvalidPattern {
        /// Regex source
        pattern: String,
        /// Compile error
        source: regex::Error,
    },
}

/// Result alias for routing operations.
pub type Result<T> = std::result::Result<T, RoutingError>;
