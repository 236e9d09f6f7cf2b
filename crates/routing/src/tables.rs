//! Default routing tables.
//!
//! Every table here is plain data and can be replaced from configuration.

use govern_core::{Facet, KeywordRule, PatternRule, RuleList};
use serde::{Deserialize, Serialize};

/// A worker to seed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Unique name
    pub name: String,
    /// Task types the worker specializes in
    pub specializations: Vec<String>,
}

impl WorkerSpec {
    fn new(name: &str, specializations: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            specializations: specializations.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Labelled patterns for one facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetRules {
    /// Facet the hits belong to
    pub facet: Facet,
    /// Patterns, evaluated in order
    pub rules: Vec<PatternRule>,
}

/// Default worker catalog.
pub fn default_workers() -> Vec<WorkerSpec> {
    vec![
        WorkerSpec::new("coder", &["implementation", "debugging", "refactoring", "api-design"]),
        WorkerSpec::new("architect", &["system-design", "architecture", "patterns", "scalability"]),
        WorkerSpec::new("tester", &["testing", "qa", "validation", "coverage"]),
        WorkerSpec::new("devops", &["deployment", "ci-cd", "infrastructure", "monitoring"]),
        WorkerSpec::new("security", &["security", "authentication", "encryption", "audit"]),
        WorkerSpec::new("researcher", &["research", "analysis", "benchmarking", "optimization"]),
    ]
}

/// Default task-type buckets, first match wins.
pub fn default_task_types() -> RuleList {
    RuleList::new(
        vec![
            KeywordRule::new("implementation", &["implement", "build", "create", "develop", "code"]),
            KeywordRule::new("debugging", &["debug", "fix", "bug", "error", "issue"]),
            KeywordRule::new("testing", &["test", "qa", "validate", "verify"]),
            KeywordRule::new("deployment", &["deploy", "release", "production", "ci/cd"]),
            KeywordRule::new("security", &["security", "auth", "encrypt", "secure"]),
            KeywordRule::new("architecture", &["design", "architecture", "pattern", "structure"]),
            KeywordRule::new("research", &["research", "analyze", "investigate", "benchmark"]),
        ],
        "implementation",
    )
}

/// Keywords that each add 0.1 to estimated complexity.
pub fn default_complexity_signals() -> Vec<String> {
    [
        "integrate",
        "optimize",
        "refactor",
        "migrate",
        "enterprise",
        "scalable",
        "distributed",
        "real-time",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Default facet patterns.
pub fn default_facets() -> Vec<FacetRules> {
    fn rules(facet: Facet, rules: &[(&str, &str)]) -> FacetRules {
        FacetRules {
            facet,
            rules: rules
                .iter()
                .map(|(label, pattern)| PatternRule::new(*label, *pattern))
                .collect(),
        }
    }

    vec![
        rules(
            Facet::Actor,
            &[
                ("agent", r"\bagent[:\-_]?\s*(\w+)"),
                ("user", r"\buser[:\-_]?\s*(\w+)"),
                ("team", r"\bteam[:\-_]?\s*(\w+)"),
                ("system", r"\b(claude|gpt|deepseek|qwen|grok|gemini)\b"),
                ("role", r"\b(coder|architect|tester|devops|security|researcher)\b"),
            ],
        ),
        rules(
            Facet::Action,
            &[
                ("action", r"\b(create|update|delete|read|execute|deploy|test|analyze|refactor)\b"),
                ("event", r"\b(started|completed|failed|succeeded|triggered|cancelled)\b"),
                ("outcome", r"\b(success|failure|partial|pending|blocked)\b"),
                ("artifact", r"\b(file|function|class|module|service|database|api)\b"),
            ],
        ),
        rules(
            Facet::Time,
            &[
                ("temporal", r"(\d{4}-\d{2}-\d{2}|\d{2}:\d{2}:\d{2})"),
                ("sequence", r"\b(before|after|during|while|then|next)\b"),
                ("frequency", r"\b(daily|weekly|monthly|continuous|hourly)\b"),
            ],
        ),
        rules(
            Facet::Location,
            &[
                ("location", r"\b(local|remote|cloud|edge|distributed)\b"),
                ("environment", r"\b(dev|test|staging|prod|production)\b"),
                ("context", r"\b(file|directory|repository|server|container|cluster)\b"),
            ],
        ),
        rules(
            Facet::Motivation,
            &[
                ("goal", r"\b(to|for|because|since|improve|fix|optimize|enhance)\b"),
                ("motivation", r"\b(performance|security|reliability|usability|cost)\b"),
                ("purpose", r"\b(testing|debugging|monitoring|analysis|deployment)\b"),
            ],
        ),
        rules(
            Facet::Mechanism,
            &[
                ("method", r"\b(via|using|through|with|by)\b"),
                ("mechanism", r"\b(api|cli|ui|webhook|queue|stream)\b"),
                ("process", r"\b(pipeline|workflow|chain|sequence|batch)\b"),
            ],
        ),
    ]
}

/// Default routing categories; the fallback is used when nothing scores.
pub fn default_categories() -> RuleList {
    RuleList::new(
        vec![
            KeywordRule::new(
                "agentic-teams",
                &["coordination", "collaboration", "swarm", "delegation"],
            ),
            KeywordRule::new(
                "deep-research",
                &["analysis", "benchmarking", "investigation", "evaluation"],
            ),
            KeywordRule::new("neural-trading", &["trade", "risk", "alpha", "portfolio", "market"]),
            KeywordRule::new(
                "security-infrastructure",
                &["security", "authentication", "encryption", "audit", "compliance"],
            ),
            KeywordRule::new(
                "startups-saas",
                &["deployment", "pipeline", "release", "monitoring", "scaling"],
            ),
        ],
        "agentic-teams",
    )
}
