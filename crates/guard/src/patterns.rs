//! Built-in threat patterns.

use govern_core::{ThreatLevel, ThreatPattern};

const DEFAULTS: &[(&str, ThreatLevel, &str)] = &[
    (r"rm\s+-rf\s+/", ThreatLevel::Critical, "recursive delete of the filesystem root"),
    (r"rm\s+-rf\s+\*", ThreatLevel::Critical, "recursive delete of everything in scope"),
    (r":\(\)\{.*\};", ThreatLevel::Critical, "fork bomb"),
    (r"sudo\s+chmod\s+777", ThreatLevel::High, "world-writable permissions as root"),
    (r"sudo\s+rm\s+-rf", ThreatLevel::High, "recursive delete as root"),
    (r"curl\s+.*\|\s*(bash|sh)", ThreatLevel::High, "piping a download into a shell"),
    (r"eval\s*\(", ThreatLevel::Medium, "dynamic evaluation"),
    (r"DROP\s+TABLE", ThreatLevel::High, "schema destruction"),
    (r"DELETE\s+FROM\s+\w+\s*;?$", ThreatLevel::Medium, "unqualified DELETE"),
    (r"--\s*#", ThreatLevel::Low, "SQL comment injection"),
];

/// Patterns seeded into an empty store.
pub fn default_patterns() -> Vec<ThreatPattern> {
    DEFAULTS
        .iter()
        .map(|(pattern, level, description)| {
            ThreatPattern::new(*pattern, *level, Some((*description).to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_compile() {
        for p in default_patterns() {
            assert!(regex::Regex::new(&p.pattern).is_ok(), "{}", p.pattern);
        }
    }

    #[test]
    fn test_defaults_are_unique() {
        let patterns = default_patterns();
        let mut names: Vec<_> = patterns.iter().map(|p| p.pattern.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), patterns.len());
    }
}
