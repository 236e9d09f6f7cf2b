//! Ordered, configurable rule lists shared by the classifiers.
//!
//! Routing tables are plain data: a list of labelled keyword or regex rules
//! evaluated in declaration order. Consumers decide how hits are scored.

use serde::{Deserialize, Serialize};

/// A label with the keywords that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    /// Label produced when the rule matches
    pub label: String,
    /// Lowercase keywords, matched as substrings
    pub keywords: Vec<String>,
}

impl KeywordRule {
    /// Create a rule from a label and keywords.
    pub fn new(label: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            label: label.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Whether any keyword occurs in `text_lower`.
    pub fn matches(&self, text_lower: &str) -> bool {
        self.keywords.iter().any(|k| text_lower.contains(k.as_str()))
    }

    /// Number of keywords that occur in `text_lower`.
    pub fn hits(&self, text_lower: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| text_lower.contains(k.as_str()))
            .count()
    }
}

/// Ordered keyword rules with a fallback label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleList {
    /// Rules, evaluated first to last
    pub rules: Vec<KeywordRule>,
    /// Label used when nothing matches
    pub fallback: String,
}

impl RuleList {
    /// Create a rule list.
    pub fn new(rules: Vec<KeywordRule>, fallback: impl Into<String>) -> Self {
        Self {
            rules,
            fallback: fallback.into(),
        }
    }

    /// Label of the first rule matching `text`, or the fallback.
    pub fn first_match(&self, text: &str) -> &str {
        let lower = text.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.matches(&lower))
            .map(|r| r.label.as_str())
            .unwrap_or(self.fallback.as_str())
    }

    /// Iterate over the rules in order.
    pub fn iter(&self) -> impl Iterator<Item = &KeywordRule> {
        self.rules.iter()
    }
}

/// A labelled regular expression, compiled by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Label attached to each hit
    pub label: String,
    /// Regex source
    pub pattern: String,
}

impl PatternRule {
    /// Create a pattern rule.
    pub fn new(label: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pattern: pattern.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_types() -> RuleList {
        RuleList::new(
            vec![
                KeywordRule::new("implementation", &["implement", "build"]),
                KeywordRule::new("debugging", &["debug", "fix", "bug"]),
            ],
            "implementation",
        )
    }

    #[test]
    fn test_first_match_respects_order() {
        let list = task_types();
        assert_eq!(list.first_match("Fix the login BUG"), "debugging");
        assert_eq!(list.first_match("build then fix"), "implementation");
    }

    #[test]
    fn test_fallback_when_nothing_matches() {
        assert_eq!(task_types().first_match("write docs"), "implementation");
    }

    #[test]
    fn test_hits_counts_each_keyword_once() {
        let rule = KeywordRule::new("debugging", &["debug", "bug"]);
        assert_eq!(rule.hits("debug the bug"), 2);
        assert_eq!(rule.hits("nothing"), 0);
    }
}
