//! Query intent classification and lexical query parsing
//!
//! Intents are detected with keyword/regex heuristics over cached patterns;
//! the default is a plain Search. Query parsing pulls out stop-word-filtered
//! keywords, identifier candidates, file-path hints, and a language filter.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::Language;

/// What the caller is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Search,
    Navigation,
    Relations,
    Documentation,
    Examples,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Search => "search",
            QueryIntent::Navigation => "navigation",
            QueryIntent::Relations => "relations",
            QueryIntent::Documentation => "documentation",
            QueryIntent::Examples => "examples",
        }
    }
}

/// Retrieval profile requested by the caller. Fast skips the dense arm,
/// Semantic skips the lexical arm; Hybrid is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrievalProfile {
    Fast,
    Hybrid,
    Semantic,
}

impl RetrievalProfile {
    pub const ALLOWED: &'static [&'static str] = &["Fast", "Hybrid", "Semantic"];

    /// Parse a caller-supplied profile name; unknown names are a structured
    /// error listing the allowed set
    pub fn parse(name: &str) -> Result<Self, EngineError> {
        match name.to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "hybrid" => Ok(Self::Hybrid),
            "semantic" => Ok(Self::Semantic),
            _ => Err(EngineError::UnknownProfile {
                profile: name.to_string(),
                allowed: Self::ALLOWED.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

impl Default for RetrievalProfile {
    fn default() -> Self {
        Self::Hybrid
    }
}

static RELATIONS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(what\s+calls|who\s+calls|who\s+uses|what\s+uses|who\s+overrides|implementations?\s+of|callers?\s+of|call\s+chain|depends\s+on|references\s+to|similar\s+to|duplicates?\s+of)\b",
    )
    .expect("invalid relations pattern")
});

static EXAMPLES_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(examples?\s+of|show\s+me\s+how\s+to\s+use|how\s+to\s+use|usage\s+of|sample\s+(code|usage))\b")
        .expect("invalid examples pattern")
});

static DOCUMENTATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(explain|how\s+does|what\s+does|what\s+is|describe|documentation\s+for)\b")
        .expect("invalid documentation pattern")
});

static NAVIGATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(where\s+is|where's|show\s+me\s+the\s+definition|definition\s+of|go\s+to|find\s+the\s+(class|struct|function|method|definition)|locate)\b",
    )
    .expect("invalid navigation pattern")
});

/// CamelCase or snake_case identifier candidates
static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z][a-z0-9]*(?:[A-Z][a-z0-9]*)+|[a-z][a-z0-9]*(?:_[a-z0-9]+)+|[A-Z][A-Z0-9_]{2,})$")
        .expect("invalid identifier pattern")
});

static LANGUAGE_FILTER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:in|lang:|language:)\s*([a-z#+]+)\b").expect("invalid language pattern")
});

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "code", "do", "does", "find", "for", "from",
    "how", "in", "is", "it", "me", "my", "of", "on", "or", "show", "that", "the", "this", "to",
    "use", "used", "uses", "what", "when", "where", "which", "who", "why", "with",
];

/// Classify a raw query. Navigation also triggers on a bare identifier.
pub fn detect_intent(query: &str) -> QueryIntent {
    let trimmed = query.trim();
    if RELATIONS_PATTERN.is_match(trimmed) {
        return QueryIntent::Relations;
    }
    if EXAMPLES_PATTERN.is_match(trimmed) {
        return QueryIntent::Examples;
    }
    if DOCUMENTATION_PATTERN.is_match(trimmed) {
        return QueryIntent::Documentation;
    }
    if NAVIGATION_PATTERN.is_match(trimmed) {
        return QueryIntent::Navigation;
    }
    // A lone CamelCase/snake_case token is a jump-to-definition ask
    let bare = trimmed.trim_end_matches(['?', '.', '!']);
    if !bare.contains(char::is_whitespace) && IDENTIFIER_PATTERN.is_match(bare) {
        return QueryIntent::Navigation;
    }
    QueryIntent::Search
}

/// Lexical decomposition of a query
#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    /// Stop-word-filtered search terms
    pub keywords: Vec<String>,
    /// CamelCase/snake_case identifier candidates, in query order
    pub identifiers: Vec<String>,
    /// Tokens that look like file paths
    pub path_hints: Vec<String>,
    /// Explicit language filter ("in rust", "language:python")
    pub language: Option<Language>,
}

impl ParsedQuery {
    /// Best single identifier to anchor symbol lookups on
    pub fn primary_identifier(&self) -> Option<&str> {
        self.identifiers
            .first()
            .map(|s| s.as_str())
            .or_else(|| self.keywords.last().map(|s| s.as_str()))
    }
}

pub fn parse_query(query: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();

    if let Some(captures) = LANGUAGE_FILTER_PATTERN.captures(query) {
        if let Some(matched) = captures.get(1) {
            parsed.language = Language::from_name(matched.as_str());
        }
    }

    for raw in query.split_whitespace() {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '/' && c != '.');
        if token.is_empty() {
            continue;
        }
        if token.contains('/') || looks_like_file(token) {
            parsed.path_hints.push(token.to_string());
            continue;
        }
        let word = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
        if word.is_empty() {
            continue;
        }
        if IDENTIFIER_PATTERN.is_match(word) {
            parsed.identifiers.push(word.to_string());
            parsed.keywords.push(word.to_lowercase());
            continue;
        }
        let lower = word.to_lowercase();
        if !STOP_WORDS.contains(&lower.as_str()) {
            parsed.keywords.push(lower);
        }
    }

    parsed
}

fn looks_like_file(token: &str) -> bool {
    let Some((_, ext)) = token.rsplit_once('.') else {
        return false;
    };
    !ext.is_empty() && ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn navigation_phrases_and_bare_identifiers() {
        assert_eq!(
            detect_intent("Where is the UserService class?"),
            QueryIntent::Navigation
        );
        assert_eq!(
            detect_intent("show me the definition of login"),
            QueryIntent::Navigation
        );
        assert_eq!(detect_intent("UserService"), QueryIntent::Navigation);
        assert_eq!(detect_intent("hash_password"), QueryIntent::Navigation);
    }

    #[test]
    fn relations_phrases() {
        assert_eq!(detect_intent("what calls HashPassword?"), QueryIntent::Relations);
        assert_eq!(detect_intent("who uses the session store"), QueryIntent::Relations);
        assert_eq!(
            detect_intent("implementations of Authenticator"),
            QueryIntent::Relations
        );
    }

    #[test]
    fn documentation_and_examples() {
        assert_eq!(
            detect_intent("explain the retry logic"),
            QueryIntent::Documentation
        );
        assert_eq!(
            detect_intent("how does chunking work"),
            QueryIntent::Documentation
        );
        assert_eq!(
            detect_intent("show me how to use the embedding client"),
            QueryIntent::Examples
        );
        assert_eq!(detect_intent("example of a hybrid query"), QueryIntent::Examples);
    }

    #[test]
    fn plain_text_defaults_to_search() {
        assert_eq!(detect_intent("password hashing"), QueryIntent::Search);
        assert_eq!(detect_intent("error retry backoff"), QueryIntent::Search);
    }

    #[test]
    fn parsing_extracts_identifiers_keywords_and_paths() {
        let parsed = parse_query("where is HashPassword in user/auth_service.rs?");
        assert_eq!(parsed.identifiers, vec!["HashPassword".to_string()]);
        assert!(parsed.path_hints.contains(&"user/auth_service.rs".to_string()));
        assert!(!parsed.keywords.contains(&"where".to_string()));
        assert_eq!(parsed.primary_identifier(), Some("HashPassword"));
    }

    #[test]
    fn language_filter_is_detected() {
        let parsed = parse_query("serialization helpers in rust");
        assert_eq!(parsed.language, Some(Language::Rust));
    }

    #[test]
    fn unknown_profile_is_a_structured_error() {
        let err = RetrievalProfile::parse("Turbo").unwrap_err();
        match err {
            EngineError::UnknownProfile { profile, allowed } => {
                assert_eq!(profile, "Turbo");
                assert_eq!(allowed, vec!["Fast", "Hybrid", "Semantic"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(RetrievalProfile::parse("hybrid").unwrap(), RetrievalProfile::Hybrid);
    }
}
