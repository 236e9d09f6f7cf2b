//! Six-facet dimension extraction.

use govern_core::{content_hash, DimensionEvent, DimensionTags, Facet, RuleList, UNKNOWN};
use govern_storage::AuditStore;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::tables::{default_categories, default_facets, FacetRules};
use crate::{Result, RoutingError};

/// Configuration for the dimension extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Labelled patterns per facet
    pub facets: Vec<FacetRules>,
    /// Routing categories
    pub categories: RuleList,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            facets: default_facets(),
            categories: default_categories(),
        }
    }
}

struct CompiledRule {
    label: String,
    regex: Regex,
}

/// Tags free text along six facets and infers a routing category.
pub struct DimensionExtractor {
    store: Arc<dyn AuditStore>,
    facets: Vec<(Facet, Vec<CompiledRule>)>,
    categories: RuleList,
}

impl DimensionExtractor {
    /// Create an extractor with the default tables.
    pub fn new(store: Arc<dyn AuditStore>) -> Result<Self> {
        Self::with_config(store, ExtractorConfig::default())
    }

    /// Create an extractor from `config`, compiling every pattern.
    pub fn with_config(store: Arc<dyn AuditStore>, config: ExtractorConfig) -> Result<Self> {
        let mut facets = Vec::with_capacity(config.facets.len());
        for facet_rules in config.facets {
            let mut compiled = Vec::with_capacity(facet_rules.rules.len());
            for rule in facet_rules.rules {
                let regex = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RoutingError::InvalidPattern {
                        pattern: rule.pattern.clone(),
                        source,
                    })?;
                compiled.push(CompiledRule {
                    label: rule.label,
                    regex,
                });
            }
            facets.push((facet_rules.facet, compiled));
        }

        Ok(Self {
            store,
            facets,
            categories: config.categories,
        })
    }

    /// Tag `text` without persisting anything.
    pub fn tag(&self, text: &str) -> DimensionTags {
        let facet = |f: Facet| self.facet_value(f, text);
        let mut tags = DimensionTags {
            actor: facet(Facet::Actor),
            action: facet(Facet::Action),
            time: facet(Facet::Time),
            location: facet(Facet::Location),
            motivation: facet(Facet::Motivation),
            mechanism: facet(Facet::Mechanism),
            category: String::new(),
            confidence: 0.0,
        };

        let known = tags.values().filter(|v| *v != UNKNOWN).count();
        tags.confidence = known as f64 / Facet::ALL.len() as f64;
        tags.category = self.infer_category(text, &tags);
        tags
    }

    /// Tag `text` and record the extraction.
    pub async fn extract(&self, text: &str) -> Result<DimensionTags> {
        let start = Instant::now();
        let tags = self.tag(text);
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let event = DimensionEvent {
            text_hash: content_hash(text),
            text: text.to_string(),
            tags: tags.clone(),
            latency_ms,
            extracted_at: chrono::Utc::now(),
        };
        if !self.store.save_dimension_event(&event).await? {
            debug!("Dimension event already recorded");
        }

        Ok(tags)
    }

    fn facet_value(&self, facet: Facet, text: &str) -> String {
        let hits: Vec<String> = self
            .facets
            .iter()
            .filter(|(f, _)| *f == facet)
            .flat_map(|(_, rules)| rules.iter())
            .flat_map(|rule| {
                rule.regex.captures_iter(text).filter_map(move |caps| {
                    let value = caps.get(1).or_else(|| caps.get(0))?;
                    Some(format!("{}:{}", rule.label, value.as_str()))
                })
            })
            .collect();

        if hits.is_empty() {
            UNKNOWN.to_string()
        } else {
            hits.join("; ")
        }
    }

    fn infer_category(&self, text: &str, tags: &DimensionTags) -> String {
        let text_lower = text.to_lowercase();
        let facet_values: Vec<String> = tags.values().map(str::to_lowercase).collect();

        let mut best: Option<(&str, f64)> = None;
        for rule in self.categories.iter() {
            let mut score = rule.hits(&text_lower) as f64;
            for value in &facet_values {
                score += 0.5 * rule.hits(value) as f64;
            }
            if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((rule.label.as_str(), score));
            }
        }

        best.map(|(label, _)| label)
            .unwrap_or(self.categories.fallback.as_str())
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govern_core::PatternRule;
    use govern_storage::SqliteAuditStore;

    async fn extractor() -> (DimensionExtractor, Arc<dyn AuditStore>) {
        let store: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::in_memory().await.unwrap());
        (DimensionExtractor::new(store.clone()).unwrap(), store)
    }

    #[tokio::test]
    async fn test_tags_facets() {
        let (extractor, _) = extractor().await;
        let tags = extractor.tag("deploy the api service to production via pipeline");

        assert!(tags.action.contains("action:deploy"));
        assert!(tags.action.contains("artifact:api"));
        assert!(tags.location.contains("environment:production"));
        assert!(tags.mechanism.contains("method:via"));
        assert!(tags.mechanism.contains("process:pipeline"));
        assert_eq!(tags.time, UNKNOWN);
    }

    #[tokio::test]
    async fn test_capture_group_value() {
        let (extractor, _) = extractor().await;
        let tags = extractor.tag("agent: alpha completed the run");
        assert!(tags.actor.contains("agent:alpha"));
        assert!(tags.action.contains("event:completed"));
    }

    #[tokio::test]
    async fn test_word_boundaries() {
        let (extractor, _) = extractor().await;
        // "readme" must not tag a read action
        let tags = extractor.tag("readme");
        assert_eq!(tags.action, UNKNOWN);
    }

    #[tokio::test]
    async fn test_all_unknown_defaults() {
        let (extractor, _) = extractor().await;
        let tags = extractor.tag("zzz");
        assert!(tags.values().all(|v| v == UNKNOWN));
        assert_eq!(tags.confidence, 0.0);
        assert_eq!(tags.category, "agentic-teams");
    }

    #[tokio::test]
    async fn test_confidence_is_fraction_of_known_facets() {
        let (extractor, _) = extractor().await;
        let tags = extractor.tag("deploy daily");
        // action and time
        assert!((tags.confidence - 2.0 / 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_category_inference() {
        let (extractor, _) = extractor().await;
        assert_eq!(
            extractor.tag("rebalance the portfolio to cut market risk").category,
            "neural-trading"
        );
        assert_eq!(
            extractor.tag("run a compliance audit on encryption keys").category,
            "security-infrastructure"
        );
    }

    #[tokio::test]
    async fn test_facet_hits_add_to_category_score() {
        let (extractor, _) = extractor().await;
        // "pipeline" scores startups-saas from both the text and the mechanism facet
        assert_eq!(extractor.tag("run the pipeline").category, "startups-saas");
    }

    #[tokio::test]
    async fn test_extract_persists_once() {
        let (extractor, store) = extractor().await;
        let first = extractor.extract("test the module").await.unwrap();
        let second = extractor.extract("test the module").await.unwrap();
        assert_eq!(first.action, second.action);

        let event = store
            .load_dimension_event(&content_hash("test the module"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.tags.action, first.action);
    }

    #[tokio::test]
    async fn test_invalid_pattern_rejected() {
        let store: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::in_memory().await.unwrap());
        let config = ExtractorConfig {
            facets: vec![FacetRules {
                facet: Facet::Actor,
                rules: vec![PatternRule::new("broken", "(")],
            }],
            ..ExtractorConfig::default()
        };
        assert!(matches!(
            DimensionExtractor::with_config(store, config),
            Err(RoutingError::InvalidPattern { .. })
        ));
    }
}
