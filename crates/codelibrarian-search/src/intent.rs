//! Pattern-based classification of graph-intent queries.
//!
//! Queries like "callers of parse_file" bypass the hybrid ranker and go
//! straight to the corresponding graph query.

use regex::Regex;

/// A recognised graph intent with its extracted target name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIntent {
    Callers(String),
    Callees(String),
    Hierarchy(String),
}

/// Classify a query as a graph intent, or None for the hybrid path.
pub fn classify(query: &str) -> Option<GraphIntent> {
    let patterns: &[(&str, fn(String) -> GraphIntent)] = &[
        (
            r"(?i)^\s*(?:who\s+calls|callers\s+of)\s+(\S+?)\s*\??\s*$",
            GraphIntent::Callers,
        ),
        (
            r"(?i)^\s*(?:callees\s+of|what\s+is\s+called\s+by)\s+(\S+?)\s*\??\s*$",
            GraphIntent::Callees,
        ),
        (
            r"(?i)^\s*what\s+does\s+(\S+?)\s+call\s*\??\s*$",
            GraphIntent::Callees,
        ),
        (
            r"(?i)^\s*(?:class\s+hierarchy\s+(?:of|for)|hierarchy\s+of|subclasses\s+of|parents\s+of)\s+(\S+?)\s*\??\s*$",
            GraphIntent::Hierarchy,
        ),
    ];

    for (pattern, build) in patterns {
        let regex = Regex::new(pattern).expect("static intent regex");
        if let Some(captures) = regex.captures(query) {
            let target = captures.get(1)?.as_str().to_string();
            return Some(build(target));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_caller_phrasings() {
        assert_eq!(
            classify("callers of parse_file"),
            Some(GraphIntent::Callers("parse_file".to_string()))
        );
        assert_eq!(
            classify("who calls models.Dog.fetch?"),
            Some(GraphIntent::Callers("models.Dog.fetch".to_string()))
        );
        assert_eq!(
            classify("Who Calls upsert_file"),
            Some(GraphIntent::Callers("upsert_file".to_string()))
        );
    }

    #[test]
    fn recognises_callee_phrasings() {
        assert_eq!(
            classify("callees of main"),
            Some(GraphIntent::Callees("main".to_string()))
        );
        assert_eq!(
            classify("what does index_root call?"),
            Some(GraphIntent::Callees("index_root".to_string()))
        );
    }

    #[test]
    fn recognises_hierarchy_phrasings() {
        assert_eq!(
            classify("hierarchy of Animal"),
            Some(GraphIntent::Hierarchy("Animal".to_string()))
        );
        assert_eq!(
            classify("class hierarchy for Dog"),
            Some(GraphIntent::Hierarchy("Dog".to_string()))
        );
        assert_eq!(
            classify("subclasses of BaseParser"),
            Some(GraphIntent::Hierarchy("BaseParser".to_string()))
        );
    }

    #[test]
    fn plain_queries_are_not_intents() {
        assert_eq!(classify("find oldest animal"), None);
        assert_eq!(classify("parse_file"), None);
        assert_eq!(classify("how does caching work"), None);
        // Target must be a single token.
        assert_eq!(classify("callers of the parser module"), None);
    }
}
