// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic query classification for retrieval routing.
//!
//! Zero-cost signals only: no model call, no network, no latency. Queries
//! showing both code and governance signals route to hybrid rather than
//! guessing a winner.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Corpus routing decision for a free-form query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueryRoute {
    Code,
    Governance,
    Hybrid,
}

/// Keywords that pull a query toward the code corpus.
const CODE_KEYWORDS: &[&str] = &["function", "class", "import", "endpoint"];

/// Keywords that pull a query toward the governance corpus.
const GOVERNANCE_KEYWORDS: &[&str] = &[
    "rule",
    "adr",
    "decision",
    "policy",
    "standard",
    "convention",
];

/// Common source-file extensions for path-like token detection.
const SOURCE_EXTENSIONS: &[&str] = &[
    ".rs", ".py", ".ts", ".tsx", ".js", ".jsx", ".go", ".java", ".rb", ".c", ".h", ".cpp",
    ".toml", ".yaml", ".yml", ".json", ".sql",
];

/// Classify a query as code, governance, or hybrid.
pub fn classify_query(query: &str) -> QueryRoute {
    let lower = query.to_lowercase();
    let tokens: Vec<&str> = query.split_whitespace().collect();

    let code_signal = tokens.iter().any(|t| is_path_like(t))
        || tokens.iter().any(|t| is_code_identifier(t))
        || contains_word(&lower, CODE_KEYWORDS);
    let governance_signal = contains_word(&lower, GOVERNANCE_KEYWORDS);

    match (code_signal, governance_signal) {
        (true, false) => QueryRoute::Code,
        (false, true) => QueryRoute::Governance,
        _ => QueryRoute::Hybrid,
    }
}

fn contains_word(lower_query: &str, keywords: &[&str]) -> bool {
    lower_query
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| keywords.contains(&word))
}

/// Path-like: contains a separator or ends in a known source extension.
fn is_path_like(token: &str) -> bool {
    if token.contains('/') {
        return true;
    }
    let lower = token.to_lowercase();
    SOURCE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Identifier-shaped: `mod::item`, snake_case, or CamelCase.
fn is_code_identifier(token: &str) -> bool {
    if token.contains("::") {
        return true;
    }
    if !token.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return false;
    }
    // snake_case: interior underscore between alphanumerics.
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 2 && chars[1..chars.len() - 1].contains(&'_') {
        return true;
    }
    // CamelCase: lowercase followed by uppercase.
    chars
        .windows(2)
        .any(|w| w[0].is_ascii_lowercase() && w[1].is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_tokens_route_to_code() {
        assert_eq!(classify_query("where is src/auth/token.rs"), QueryRoute::Code);
        assert_eq!(classify_query("what does main.py do"), QueryRoute::Code);
    }

    #[test]
    fn identifier_shapes_route_to_code() {
        assert_eq!(classify_query("usage of parse_verdict"), QueryRoute::Code);
        assert_eq!(classify_query("who calls SpecCoordinator"), QueryRoute::Code);
        assert_eq!(classify_query("tokio::spawn semantics"), QueryRoute::Code);
    }

    #[test]
    fn code_keywords_route_to_code() {
        assert_eq!(classify_query("the function that saves events"), QueryRoute::Code);
        assert_eq!(classify_query("which endpoint lists sessions"), QueryRoute::Code);
    }

    #[test]
    fn governance_keywords_route_to_governance() {
        assert_eq!(classify_query("naming rule for services"), QueryRoute::Governance);
        assert_eq!(classify_query("the adr about caching"), QueryRoute::Governance);
        assert_eq!(
            classify_query("what is our testing policy"),
            QueryRoute::Governance
        );
    }

    #[test]
    fn mixed_signals_route_to_hybrid() {
        assert_eq!(
            classify_query("convention for naming a function"),
            QueryRoute::Hybrid
        );
    }

    #[test]
    fn neutral_queries_route_to_hybrid() {
        assert_eq!(classify_query("error handling"), QueryRoute::Hybrid);
        assert_eq!(classify_query("how does retry work"), QueryRoute::Hybrid);
    }

    #[test]
    fn keyword_matching_is_word_bounded() {
        // "classic" contains "class" as a substring but not a word.
        assert_eq!(classify_query("classic retry behavior"), QueryRoute::Hybrid);
    }
}
