//! Language detection and symbol/edge extraction
//!
//! Rust gets a semantic tree-sitter parser; every other recognized language
//! goes through a textual parser with per-language heuristics. Parsers never
//! propagate errors into the pipeline: a failed parse yields an outcome with
//! `success = false` and the remaining files proceed.

pub mod textual;
pub mod tree_sitter;

use crate::types::{Language, ParsedEdge, ParsedSymbol};

/// Result of parsing one file
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub symbols: Vec<ParsedSymbol>,
    pub edges: Vec<ParsedEdge>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl ParseOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            symbols: Vec::new(),
            edges: Vec::new(),
            success: false,
            error_message: Some(message.into()),
        }
    }
}

/// Built-in and primitive type names that never become TypeOf/Returns edge
/// targets. Covers the primary language's primitives plus the spellings the
/// textual parsers encounter.
const PRIMITIVE_TYPES: &[&str] = &[
    // Rust
    "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize", "f32",
    "f64", "bool", "char", "str", "String", "()", "Self", "self",
    // Common spellings in other languages
    "int", "long", "short", "byte", "float", "double", "decimal", "string", "boolean", "void",
    "object", "any", "number", "null", "nil", "None",
];

/// Whether a type name is a built-in excluded from type edges
pub fn is_primitive_type(name: &str) -> bool {
    let bare = name
        .trim_start_matches('&')
        .trim_start_matches("mut ")
        .trim();
    PRIMITIVE_TYPES.contains(&bare)
}

/// Parse one file's content into symbols and edges.
///
/// Dispatches on the detected language; unknown languages produce an empty
/// successful outcome so the file still contributes a whole-file chunk.
pub fn parse_file(path: &str, content: &str, language: Language) -> ParseOutcome {
    match language {
        Language::Rust => tree_sitter::parse_rust(path, content),
        Language::Unknown => ParseOutcome {
            success: true,
            ..Default::default()
        },
        other => textual::parse_textual(path, content, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_recognized() {
        assert!(is_primitive_type("u32"));
        assert!(is_primitive_type("&str"));
        assert!(is_primitive_type("bool"));
        assert!(is_primitive_type("void"));
        assert!(!is_primitive_type("UserService"));
        assert!(!is_primitive_type("HashMap"));
    }

    #[test]
    fn unknown_language_is_an_empty_success() {
        let outcome = parse_file("notes.txt", "plain text", Language::Unknown);
        assert!(outcome.success);
        assert!(outcome.symbols.is_empty());
    }
}
