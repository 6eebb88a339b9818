//! Slices parsed files into overlapping symbol-centered chunks
//!
//! Each anchor symbol (type, function, method) yields one chunk padded with
//! configurable context lines; files with no anchors contribute one
//! whole-file chunk. Chunk content is capped at a character budget so
//! downstream embedding stays within model context limits.

use std::collections::HashSet;
use std::path::Path;

use crate::config::EngineConfig;
use crate::types::{CodeChunk, Language, ParsedSymbol, SymbolKind};

/// Symbol kinds that anchor a chunk
const ANCHOR_KINDS: &[SymbolKind] = &[
    SymbolKind::Namespace,
    SymbolKind::Class,
    SymbolKind::Interface,
    SymbolKind::Struct,
    SymbolKind::Enum,
    SymbolKind::Function,
    SymbolKind::Method,
    SymbolKind::Constructor,
    SymbolKind::Delegate,
];

/// Build the chunks for one parsed file
pub fn chunk_file(
    config: &EngineConfig,
    path: &str,
    content: &str,
    language: Language,
    symbols: &[ParsedSymbol],
) -> Vec<CodeChunk> {
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len().max(1) as u32;

    let anchors: Vec<&ParsedSymbol> = symbols
        .iter()
        .filter(|s| ANCHOR_KINDS.contains(&s.kind))
        // The file-level module spans everything; it would duplicate the
        // whole-file chunk
        .filter(|s| !(s.kind == SymbolKind::Module && s.start_line == 1 && s.end_line >= total_lines))
        .collect();

    let mut seen_spans: HashSet<(u32, u32)> = HashSet::new();
    let mut chunks = Vec::new();

    if anchors.is_empty() {
        if content.trim().is_empty() {
            return chunks;
        }
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path)
            .to_string();
        chunks.push(build_chunk(
            config,
            path,
            &lines,
            &name,
            SymbolKind::Unknown,
            language,
            1,
            total_lines,
            1,
            total_lines,
            None,
            None,
            None,
        ));
        return chunks;
    }

    for symbol in anchors {
        let start = symbol
            .start_line
            .saturating_sub(config.chunk_context_lines_before)
            .max(1);
        let end = symbol
            .end_line
            .saturating_add(config.chunk_context_lines_after)
            .min(total_lines);
        // Coalesce symbols that expand to an identical span
        if !seen_spans.insert((start, end)) {
            continue;
        }
        let parent_symbol = symbol
            .parent
            .and_then(|p| symbols.get(p))
            .map(|p| p.name.clone());
        chunks.push(build_chunk(
            config,
            path,
            &lines,
            &symbol.name,
            symbol.kind,
            language,
            symbol.start_line,
            symbol.end_line,
            start,
            end,
            parent_symbol,
            symbol.signature.clone(),
            symbol.documentation.clone(),
        ));
    }

    chunks
}

#[allow(clippy::too_many_arguments)]
fn build_chunk(
    config: &EngineConfig,
    path: &str,
    lines: &[&str],
    symbol_name: &str,
    symbol_kind: SymbolKind,
    language: Language,
    symbol_start: u32,
    symbol_end: u32,
    start: u32,
    end: u32,
    parent_symbol: Option<String>,
    signature: Option<String>,
    documentation: Option<String>,
) -> CodeChunk {
    let slice = &lines[(start as usize - 1)..(end as usize).min(lines.len())];
    let mut content = slice.join("\n");
    truncate_on_char_boundary(&mut content, config.max_chunk_chars);
    let token_count = (content.chars().count() / 4) as u32;

    CodeChunk {
        file_path: path.to_string(),
        symbol_name: symbol_name.to_string(),
        symbol_kind,
        language,
        content,
        symbol_start_line: symbol_start,
        symbol_end_line: symbol_end,
        start_line: start,
        end_line: end,
        token_count,
        parent_symbol,
        signature,
        documentation,
    }
}

/// Truncate to at most `max_chars` characters without splitting a UTF-8
/// sequence
fn truncate_on_char_boundary(content: &mut String, max_chars: usize) {
    if content.chars().count() <= max_chars {
        return;
    }
    let byte_end = content
        .char_indices()
        .nth(max_chars)
        .map(|(index, _)| index)
        .unwrap_or(content.len());
    content.truncate(byte_end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> EngineConfig {
        EngineConfig {
            chunk_context_lines_before: 2,
            chunk_context_lines_after: 2,
            max_chunk_chars: 200,
            ..Default::default()
        }
    }

    fn symbol(name: &str, kind: SymbolKind, start: u32, end: u32) -> ParsedSymbol {
        ParsedSymbol {
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind,
            start_line: start,
            end_line: end,
            start_column: 0,
            end_column: 0,
            signature: None,
            documentation: None,
            modifiers: Vec::new(),
            parent: None,
        }
    }

    #[test]
    fn chunk_spans_are_padded_and_clamped() {
        let content = (1..=20).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let symbols = vec![symbol("top", SymbolKind::Function, 1, 3)];
        let chunks = chunk_file(&config(), "a.rs", &content, Language::Rust, &symbols);
        assert_eq!(chunks.len(), 1);
        // Clamped at the top, padded below
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 5);
        assert!(chunks[0].start_line <= chunks[0].symbol_start_line);
        assert!(chunks[0].symbol_end_line <= chunks[0].end_line);
    }

    #[test]
    fn identical_spans_coalesce() {
        let content = (1..=10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let symbols = vec![
            symbol("a", SymbolKind::Function, 4, 6),
            symbol("b", SymbolKind::Function, 4, 6),
        ];
        let chunks = chunk_file(&config(), "a.rs", &content, Language::Rust, &symbols);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn file_without_symbols_yields_whole_file_chunk() {
        let content = "just\nsome\ntext";
        let chunks = chunk_file(&config(), "notes/readme.txt", content, Language::Unknown, &[]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol_name, "readme.txt");
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let chunks = chunk_file(&config(), "empty.rs", "  \n", Language::Rust, &[]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn multibyte_content_truncates_on_char_boundary() {
        let content = "é".repeat(500);
        let chunks = chunk_file(&config(), "a.txt", &content, Language::Unknown, &[]);
        assert_eq!(chunks[0].content.chars().count(), 200);
        assert!(chunks[0].content.is_char_boundary(chunks[0].content.len()));
    }

    proptest! {
        #[test]
        fn chunk_invariants_hold(
            line_count in 1u32..120,
            start in 1u32..100,
            len in 0u32..30,
            before in 0u32..10,
            after in 0u32..10,
            cap in 1usize..5000,
        ) {
            let start = start.min(line_count);
            let end = (start + len).min(line_count);
            let content = (0..line_count).map(|i| format!("line {i} with some text"))
                .collect::<Vec<_>>().join("\n");
            let cfg = EngineConfig {
                chunk_context_lines_before: before,
                chunk_context_lines_after: after,
                max_chunk_chars: cap,
                ..Default::default()
            };
            let symbols = vec![symbol("s", SymbolKind::Function, start, end)];
            let chunks = chunk_file(&cfg, "f.rs", &content, Language::Rust, &symbols);
            prop_assert_eq!(chunks.len(), 1);
            let chunk = &chunks[0];
            prop_assert!(chunk.start_line <= chunk.symbol_start_line);
            prop_assert!(chunk.symbol_start_line <= chunk.symbol_end_line);
            prop_assert!(chunk.symbol_end_line <= chunk.end_line);
            prop_assert!(chunk.end_line <= line_count);
            prop_assert!(chunk.content.chars().count() <= cap);
        }
    }
}
