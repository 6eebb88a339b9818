//! Core domain types shared across the indexing pipeline and the query layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages the engine recognizes. Rust has a semantic tree-sitter parser;
/// the rest are handled by textual parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "language", rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    CSharp,
    Ruby,
    Shell,
    Unknown,
}

impl Language {
    /// Detect language from a file extension (lowercased, without the dot)
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "rs" => Some(Language::Rust),
            "py" | "pyi" => Some(Language::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Language::JavaScript),
            "ts" | "tsx" | "mts" => Some(Language::TypeScript),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            "cs" => Some(Language::CSharp),
            "rb" => Some(Language::Ruby),
            "sh" | "bash" | "zsh" => Some(Language::Shell),
            _ => None,
        }
    }

    /// Detect language from a shebang line, for extension-less scripts
    pub fn from_shebang(first_line: &str) -> Option<Self> {
        if !first_line.starts_with("#!") {
            return None;
        }
        let line = first_line.to_lowercase();
        if line.contains("python") {
            Some(Language::Python)
        } else if line.contains("node") {
            Some(Language::JavaScript)
        } else if line.contains("ruby") {
            Some(Language::Ruby)
        } else if line.contains("bash") || line.contains("/sh") || line.contains("zsh") {
            Some(Language::Shell)
        } else {
            None
        }
    }

    /// Parse language from string name, accepting common abbreviations
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "rust" | "rs" => Some(Language::Rust),
            "python" | "py" => Some(Language::Python),
            "javascript" | "js" => Some(Language::JavaScript),
            "typescript" | "ts" => Some(Language::TypeScript),
            "go" | "golang" => Some(Language::Go),
            "java" => Some(Language::Java),
            "csharp" | "c#" | "cs" => Some(Language::CSharp),
            "ruby" | "rb" => Some(Language::Ruby),
            "shell" | "sh" | "bash" => Some(Language::Shell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Shell => "shell",
            Language::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a source-code symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "symbol_kind", rename_all = "snake_case")]
pub enum SymbolKind {
    Namespace,
    Class,
    Interface,
    Struct,
    Enum,
    Method,
    Function,
    Property,
    Field,
    Variable,
    Parameter,
    Constant,
    Event,
    Delegate,
    Constructor,
    Destructor,
    Module,
    Package,
    TypeParameter,
    Unknown,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Namespace => "namespace",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Method => "method",
            SymbolKind::Function => "function",
            SymbolKind::Property => "property",
            SymbolKind::Field => "field",
            SymbolKind::Variable => "variable",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Constant => "constant",
            SymbolKind::Event => "event",
            SymbolKind::Delegate => "delegate",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Destructor => "destructor",
            SymbolKind::Module => "module",
            SymbolKind::Package => "package",
            SymbolKind::TypeParameter => "type_parameter",
            SymbolKind::Unknown => "unknown",
        }
    }

    /// Parse a kind filter supplied by a caller
    pub fn parse_kind(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "namespace" => Some(Self::Namespace),
            "class" => Some(Self::Class),
            "interface" | "trait" => Some(Self::Interface),
            "struct" => Some(Self::Struct),
            "enum" => Some(Self::Enum),
            "method" => Some(Self::Method),
            "function" | "fn" | "func" | "def" => Some(Self::Function),
            "property" => Some(Self::Property),
            "field" => Some(Self::Field),
            "variable" | "var" => Some(Self::Variable),
            "parameter" => Some(Self::Parameter),
            "constant" | "const" => Some(Self::Constant),
            "event" => Some(Self::Event),
            "delegate" => Some(Self::Delegate),
            "constructor" => Some(Self::Constructor),
            "destructor" => Some(Self::Destructor),
            "module" | "mod" => Some(Self::Module),
            "package" => Some(Self::Package),
            "type_parameter" => Some(Self::TypeParameter),
            _ => None,
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a directed relationship between two symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "edge_kind", rename_all = "snake_case")]
pub enum EdgeKind {
    Import,
    Inherits,
    Implements,
    Calls,
    References,
    Defines,
    Contains,
    Overrides,
    TypeOf,
    Returns,
    Unknown,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Import => "import",
            EdgeKind::Inherits => "inherits",
            EdgeKind::Implements => "implements",
            EdgeKind::Calls => "calls",
            EdgeKind::References => "references",
            EdgeKind::Defines => "defines",
            EdgeKind::Contains => "contains",
            EdgeKind::Overrides => "overrides",
            EdgeKind::TypeOf => "type_of",
            EdgeKind::Returns => "returns",
            EdgeKind::Unknown => "unknown",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "import" => Some(Self::Import),
            "inherits" => Some(Self::Inherits),
            "implements" => Some(Self::Implements),
            "calls" => Some(Self::Calls),
            "references" => Some(Self::References),
            "defines" => Some(Self::Defines),
            "contains" => Some(Self::Contains),
            "overrides" => Some(Self::Overrides),
            "type_of" | "typeof" => Some(Self::TypeOf),
            "returns" => Some(Self::Returns),
            _ => None,
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indexing lifecycle state of a tracked branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "index_state", rename_all = "snake_case")]
pub enum IndexState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Stale,
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IndexState::Pending => "pending",
            IndexState::InProgress => "in_progress",
            IndexState::Completed => "completed",
            IndexState::Failed => "failed",
            IndexState::Stale => "stale",
        };
        f.write_str(s)
    }
}

/// How a file changed between the indexed commit and the current head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One changed file reported by the git tracker
#[derive(Debug, Clone)]
pub struct FileChange {
    /// Path relative to the repository root
    pub path: String,
    pub kind: ChangeKind,
    /// New blob content; None for deletions and filtered files
    pub content: Option<String>,
}

/// A symbol extracted by a parser, before persistence.
///
/// Parent links are indices into the containing parse result rather than
/// owning pointers; symbols within one file share the lifetime of that
/// file's index pass.
#[derive(Debug, Clone)]
pub struct ParsedSymbol {
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    pub start_column: u32,
    pub end_column: u32,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    pub modifiers: Vec<String>,
    /// Index of the enclosing symbol within the same parse result
    pub parent: Option<usize>,
}

/// Target of a parsed edge. In-file targets are symbol indices; everything
/// else is a qualified name resolved in a later pass against the committed
/// symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeTarget {
    Symbol(usize),
    Name(String),
}

/// A relationship extracted by a parser, before persistence
#[derive(Debug, Clone)]
pub struct ParsedEdge {
    /// Index of the source symbol within the same parse result
    pub source: usize,
    pub target: EdgeTarget,
    pub kind: EdgeKind,
    pub line: u32,
}

/// A contiguous, context-padded slice of a source file, the unit of
/// dense embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChunk {
    pub file_path: String,
    pub symbol_name: String,
    pub symbol_kind: SymbolKind,
    pub language: Language,
    pub content: String,
    /// Span of the primary symbol
    pub symbol_start_line: u32,
    pub symbol_end_line: u32,
    /// Span of the chunk including context lines
    pub start_line: u32,
    pub end_line: u32,
    pub token_count: u32,
    pub parent_symbol: Option<String>,
    pub signature: Option<String>,
    pub documentation: Option<String>,
}

/// A 64-bit similarity fingerprint sliced into four 16-bit LSH bands.
/// Two symbols colliding in any band are near-duplicate candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub bits: u64,
    pub bands: [u16; 4],
}

/// Snapshot of a tracked branch as seen by the lifecycle registry
#[derive(Debug, Clone)]
pub struct BranchStatus {
    pub name: String,
    pub head_commit: String,
    pub indexed_commit: Option<String>,
    pub state: IndexState,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
}

/// Detect the language of a file from its path, consulting the shebang of
/// extension-less files. `include_extensions` force-maps extensions that
/// would otherwise be filtered.
pub fn detect_language(
    path: &str,
    first_line: Option<&str>,
    include_extensions: &[String],
) -> Language {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    if let Some(ext) = &ext {
        if include_extensions.iter().any(|inc| inc.eq_ignore_ascii_case(ext)) {
            if let Some(lang) = Language::from_extension(ext) {
                return lang;
            }
        }
        if let Some(lang) = Language::from_extension(ext) {
            return lang;
        }
        return Language::Unknown;
    }

    if let Some(line) = first_line {
        if let Some(lang) = Language::from_shebang(line) {
            return lang;
        }
    }

    Language::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_detection_prefers_extension() {
        assert_eq!(
            detect_language("src/main.rs", Some("#!/usr/bin/env python"), &[]),
            Language::Rust
        );
    }

    #[test]
    fn language_detection_falls_back_to_shebang() {
        assert_eq!(
            detect_language("scripts/deploy", Some("#!/usr/bin/env python3"), &[]),
            Language::Python
        );
        assert_eq!(
            detect_language("bin/run", Some("#!/bin/bash"), &[]),
            Language::Shell
        );
    }

    #[test]
    fn unknown_extension_is_unknown_even_with_shebang() {
        // An extension wins the detection order; an unrecognized one stops it.
        assert_eq!(
            detect_language("data.bin", Some("#!/usr/bin/env node"), &[]),
            Language::Unknown
        );
    }

    #[test]
    fn kind_parsing_accepts_aliases() {
        assert_eq!(SymbolKind::parse_kind("fn"), Some(SymbolKind::Function));
        assert_eq!(SymbolKind::parse_kind("trait"), Some(SymbolKind::Interface));
        assert_eq!(SymbolKind::parse_kind("widget"), None);
        assert_eq!(EdgeKind::parse_kind("typeof"), Some(EdgeKind::TypeOf));
    }
}
