//! Threat screening for governed actions.

#![warn(missing_docs)]

pub mod patterns;
pub mod scanner;

pub use patterns::default_patterns;
pub use scanner::{ScanError, SecurityReport, ThreatScanner};
