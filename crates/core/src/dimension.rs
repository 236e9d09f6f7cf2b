//! Six-facet descriptive tags for an action.

use crate::Time;
use serde::{Deserialize, Serialize};

/// Value of a facet with no hits.
pub const UNKNOWN: &str = "unknown";

/// One of the six descriptive facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
    /// Who acts
    Actor,
    /// What happens
    Action,
    /// When it happens
    Time,
    /// Where it happens
    Location,
    /// Why it happens
    Motivation,
    /// How it happens
    Mechanism,
}

impl Facet {
    /// All facets in extraction order.
    pub const ALL: [Facet; 6] = [
        Facet::Actor,
        Facet::Action,
        Facet::Time,
        Facet::Location,
        Facet::Motivation,
        Facet::Mechanism,
    ];
}

/// Tags extracted from one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionTags {
    /// Actors
    pub actor: String,
    /// Actions, events, outcomes, artifacts
    pub action: String,
    /// Temporal markers
    pub time: String,
    /// Locations and environments
    pub location: String,
    /// Goals and purposes
    pub motivation: String,
    /// Methods and mechanisms
    pub mechanism: String,
    /// Inferred routing category
    pub category: String,
    /// Fraction of facets that are not unknown
    pub confidence: f64,
}

impl DimensionTags {
    /// Value of a facet.
    pub fn get(&self, facet: Facet) -> &str {
        match facet {
            Facet::Actor => &self.actor,
            Facet::Action => &self.action,
            Facet::Time => &self.time,
            Facet::Location => &self.location,
            Facet::Motivation => &self.motivation,
            Facet::Mechanism => &self.mechanism,
        }
    }

    /// Iterate over the six facet values.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        Facet::ALL.into_iter().map(move |f| self.get(f))
    }
}

/// Persisted extraction, keyed by text hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionEvent {
    /// Content hash of the text
    pub text_hash: String,
    /// Source text
    pub text: String,
    /// Extracted tags
    pub tags: DimensionTags,
    /// Extraction latency
    pub latency_ms: f64,
    /// When it was extracted
    pub extracted_at: Time,
}
