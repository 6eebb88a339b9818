//! Semantic parser for Rust source, built on tree-sitter
//!
//! Emits one symbol per declarable construct with parent links, and typed
//! edges for implements/inherits, calls, member references, field/parameter
//! types, return types, and trait-method overrides. Primitive and built-in
//! types never become type-edge targets.

use std::path::Path;
use tree_sitter::{Node, Parser};

use crate::parsing::{is_primitive_type, ParseOutcome};
use crate::types::{EdgeKind, EdgeTarget, ParsedEdge, ParsedSymbol, SymbolKind};

/// Parse one Rust file. Never panics into the pipeline: any failure is
/// reported through the outcome.
pub fn parse_rust(path: &str, content: &str) -> ParseOutcome {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&tree_sitter_rust::LANGUAGE.into()) {
        return ParseOutcome::failure(format!("failed to load Rust grammar: {e}"));
    }
    let Some(tree) = parser.parse(content, None) else {
        return ParseOutcome::failure("tree-sitter returned no parse tree");
    };

    let mut walker = RustWalker {
        source: content,
        symbols: Vec::new(),
        edges: Vec::new(),
    };

    // Every Rust file is a module; it anchors file-level imports and the
    // qualified-name prefix of top-level items.
    let module_name = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();
    let root = tree.root_node();
    let module = walker.push_symbol(ParsedSymbol {
        name: module_name.clone(),
        qualified_name: module_name,
        kind: SymbolKind::Module,
        start_line: root.start_position().row as u32 + 1,
        end_line: root.end_position().row as u32 + 1,
        start_column: 0,
        end_column: 0,
        signature: None,
        documentation: None,
        modifiers: Vec::new(),
        parent: None,
    });

    walker.walk_items(root, module);

    ParseOutcome {
        symbols: walker.symbols,
        edges: walker.edges,
        success: true,
        error_message: None,
    }
}

struct RustWalker<'a> {
    source: &'a str,
    symbols: Vec<ParsedSymbol>,
    edges: Vec<ParsedEdge>,
}

impl<'a> RustWalker<'a> {
    fn push_symbol(&mut self, symbol: ParsedSymbol) -> usize {
        self.symbols.push(symbol);
        self.symbols.len() - 1
    }

    fn push_edge(&mut self, source: usize, target: EdgeTarget, kind: EdgeKind, node: Node) {
        self.edges.push(ParsedEdge {
            source,
            target,
            kind,
            line: node.start_position().row as u32 + 1,
        });
    }

    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn qualified(&self, parent: usize, name: &str) -> String {
        let prefix = &self.symbols[parent].qualified_name;
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}::{name}")
        }
    }

    /// Walk the items of a module body or the source file root
    fn walk_items(&mut self, node: Node, parent: usize) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit_item(child, parent);
        }
    }

    fn visit_item(&mut self, node: Node, parent: usize) {
        match node.kind() {
            "mod_item" => self.visit_module(node, parent),
            "struct_item" | "enum_item" | "union_item" => self.visit_type(node, parent),
            "trait_item" => self.visit_trait(node, parent),
            "impl_item" => self.visit_impl(node, parent),
            "function_item" | "function_signature_item" => {
                self.visit_function(node, parent, SymbolKind::Function, None);
            }
            "const_item" => self.visit_binding(node, parent, SymbolKind::Constant),
            "static_item" => self.visit_binding(node, parent, SymbolKind::Variable),
            "type_item" => self.visit_type_alias(node, parent),
            "use_declaration" => {
                if let Some(arg) = node.child_by_field_name("argument") {
                    let target = self.text(arg).to_string();
                    self.push_edge(parent, EdgeTarget::Name(target), EdgeKind::Import, node);
                }
            }
            _ => {}
        }
    }

    fn visit_module(&mut self, node: Node, parent: usize) {
        let Some(name) = self.name_of(node) else { return };
        let index = self.declare(node, parent, &name, SymbolKind::Module);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_items(body, index);
        }
    }

    fn visit_type(&mut self, node: Node, parent: usize) {
        let Some(name) = self.name_of(node) else { return };
        let kind = match node.kind() {
            "enum_item" => SymbolKind::Enum,
            _ => SymbolKind::Struct,
        };
        let index = self.declare(node, parent, &name, kind);
        self.visit_type_parameters(node, index);

        // Struct fields become Field symbols with TypeOf edges
        if let Some(body) = node.child_by_field_name("body") {
            if body.kind() == "field_declaration_list" {
                let mut cursor = body.walk();
                for field in body.named_children(&mut cursor) {
                    if field.kind() != "field_declaration" {
                        continue;
                    }
                    let Some(field_name) = field
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                    else {
                        continue;
                    };
                    let field_index = self.declare(field, index, &field_name, SymbolKind::Field);
                    if let Some(ty) = field.child_by_field_name("type") {
                        self.type_edge(field_index, ty, EdgeKind::TypeOf);
                    }
                }
            }
        }
    }

    fn visit_trait(&mut self, node: Node, parent: usize) {
        let Some(name) = self.name_of(node) else { return };
        let index = self.declare(node, parent, &name, SymbolKind::Interface);
        self.visit_type_parameters(node, index);

        // `trait A: B + C` inherits from its supertraits
        if let Some(bounds) = node.child_by_field_name("bounds") {
            let mut cursor = bounds.walk();
            for bound in bounds.named_children(&mut cursor) {
                if let Some(target) = self.base_type_name(bound) {
                    self.push_edge(index, EdgeTarget::Name(target), EdgeKind::Inherits, bounds);
                }
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for item in body.named_children(&mut cursor) {
                match item.kind() {
                    "function_item" | "function_signature_item" => {
                        self.visit_function(item, index, SymbolKind::Method, None);
                    }
                    "associated_type" | "const_item" => self.visit_item(item, index),
                    _ => {}
                }
            }
        }
    }

    fn visit_impl(&mut self, node: Node, parent: usize) {
        let impl_type = node
            .child_by_field_name("type")
            .and_then(|t| self.base_type_name(t));
        let impl_trait = node
            .child_by_field_name("trait")
            .and_then(|t| self.base_type_name(t));

        // Methods hang off the implemented type when it is declared in this
        // file; otherwise they fall back to the enclosing module.
        let owner = impl_type
            .as_deref()
            .and_then(|name| self.find_type_symbol(name))
            .unwrap_or(parent);

        if let (Some(trait_name), Some(_)) = (&impl_trait, &impl_type) {
            self.push_edge(
                owner,
                EdgeTarget::Name(trait_name.clone()),
                EdgeKind::Implements,
                node,
            );
        }

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for item in body.named_children(&mut cursor) {
                match item.kind() {
                    "function_item" => {
                        self.visit_function(item, owner, SymbolKind::Method, impl_trait.as_deref());
                    }
                    "const_item" => self.visit_binding(item, owner, SymbolKind::Constant),
                    _ => {}
                }
            }
        }
    }

    fn visit_function(
        &mut self,
        node: Node,
        parent: usize,
        kind: SymbolKind,
        overrides_trait: Option<&str>,
    ) {
        let Some(name) = self.name_of(node) else { return };
        let kind = if kind == SymbolKind::Method && name == "new" {
            SymbolKind::Constructor
        } else {
            kind
        };
        let index = self.declare(node, parent, &name, kind);
        self.visit_type_parameters(node, index);

        // A method in `impl Trait for Type` overrides the trait's member
        if let Some(trait_name) = overrides_trait {
            self.push_edge(
                index,
                EdgeTarget::Name(format!("{trait_name}::{name}")),
                EdgeKind::Overrides,
                node,
            );
        }

        // Parameter types contribute TypeOf edges from the function
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            for param in params.named_children(&mut cursor) {
                if param.kind() != "parameter" {
                    continue;
                }
                if let Some(ty) = param.child_by_field_name("type") {
                    self.type_edge(index, ty, EdgeKind::TypeOf);
                }
            }
        }

        if let Some(return_type) = node.child_by_field_name("return_type") {
            self.type_edge(index, return_type, EdgeKind::Returns);
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.walk_body(body, index);
        }
    }

    fn visit_binding(&mut self, node: Node, parent: usize, kind: SymbolKind) {
        let Some(name) = self.name_of(node) else { return };
        let index = self.declare(node, parent, &name, kind);
        if let Some(ty) = node.child_by_field_name("type") {
            self.type_edge(index, ty, EdgeKind::TypeOf);
        }
    }

    fn visit_type_alias(&mut self, node: Node, parent: usize) {
        let Some(name) = self.name_of(node) else { return };
        let index = self.declare(node, parent, &name, SymbolKind::Unknown);
        if let Some(ty) = node.child_by_field_name("type") {
            self.type_edge(index, ty, EdgeKind::TypeOf);
        }
    }

    fn visit_type_parameters(&mut self, node: Node, parent: usize) {
        let Some(params) = node.child_by_field_name("type_parameters") else {
            return;
        };
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            let name_node = match param.kind() {
                "type_identifier" => Some(param),
                "type_parameter" | "constrained_type_parameter" => param
                    .child_by_field_name("left")
                    .or_else(|| param.named_child(0)),
                _ => None,
            };
            if let Some(name_node) = name_node {
                if name_node.kind() == "type_identifier" {
                    let name = self.text(name_node).to_string();
                    self.declare(param, parent, &name, SymbolKind::TypeParameter);
                }
            }
        }
    }

    /// Walk an executable body: calls, member references, local bindings,
    /// and nested items.
    fn walk_body(&mut self, node: Node, enclosing: usize) {
        match node.kind() {
            "call_expression" => {
                if let Some(function) = node.child_by_field_name("function") {
                    if let Some(callee) = self.callee_name(function) {
                        self.push_edge(
                            enclosing,
                            EdgeTarget::Name(callee),
                            EdgeKind::Calls,
                            node,
                        );
                    }
                    // A method call's receiver may itself contain calls
                    if function.kind() == "field_expression" {
                        if let Some(value) = function.child_by_field_name("value") {
                            self.walk_body(value, enclosing);
                        }
                    }
                }
                if let Some(args) = node.child_by_field_name("arguments") {
                    self.walk_body(args, enclosing);
                }
                return;
            }
            "field_expression" => {
                if let Some(field) = node.child_by_field_name("field") {
                    let name = self.text(field).to_string();
                    if !name.is_empty() {
                        self.push_edge(
                            enclosing,
                            EdgeTarget::Name(name),
                            EdgeKind::References,
                            node,
                        );
                    }
                }
            }
            "let_declaration" => {
                if let Some(pattern) = node.child_by_field_name("pattern") {
                    if pattern.kind() == "identifier" {
                        let name = self.text(pattern).to_string();
                        let index = self.declare(node, enclosing, &name, SymbolKind::Variable);
                        if let Some(ty) = node.child_by_field_name("type") {
                            self.type_edge(index, ty, EdgeKind::TypeOf);
                        }
                    }
                }
            }
            "function_item" => {
                self.visit_function(node, enclosing, SymbolKind::Function, None);
                return;
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk_body(child, enclosing);
        }
    }

    /// Name of the function or path being called
    fn callee_name(&self, function: Node) -> Option<String> {
        match function.kind() {
            "identifier" => Some(self.text(function).to_string()),
            "scoped_identifier" => Some(self.text(function).to_string()),
            "field_expression" => function
                .child_by_field_name("field")
                .map(|f| self.text(f).to_string()),
            "generic_function" => function
                .child_by_field_name("function")
                .and_then(|f| self.callee_name(f)),
            _ => None,
        }
    }

    /// Reduce a type node to its base name, or None for types that cannot be
    /// an edge target (tuples, closures, primitives)
    fn base_type_name(&self, ty: Node) -> Option<String> {
        let name = match ty.kind() {
            "type_identifier" => self.text(ty).to_string(),
            "scoped_type_identifier" => self.text(ty).to_string(),
            "generic_type" => {
                let base = ty.child_by_field_name("type")?;
                self.text(base).to_string()
            }
            "reference_type" | "dynamic_type" | "abstract_type" => {
                let inner = ty
                    .child_by_field_name("type")
                    .or_else(|| ty.named_child(0))?;
                return self.base_type_name(inner);
            }
            "primitive_type" => return None,
            _ => return None,
        };
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// Emit a TypeOf/Returns edge unless the target is primitive
    fn type_edge(&mut self, source: usize, ty: Node, kind: EdgeKind) {
        if let Some(name) = self.base_type_name(ty) {
            if !is_primitive_type(&name) {
                self.push_edge(source, EdgeTarget::Name(name), kind, ty);
            }
        }
    }

    fn name_of(&self, node: Node) -> Option<String> {
        node.child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .filter(|n| !n.is_empty())
    }

    /// Find an already-declared type symbol (for attaching impl methods)
    fn find_type_symbol(&self, name: &str) -> Option<usize> {
        self.symbols.iter().rposition(|s| {
            s.name == name
                && matches!(
                    s.kind,
                    SymbolKind::Struct | SymbolKind::Enum | SymbolKind::Interface
                )
        })
    }

    /// Record a symbol with span, signature, docs, and modifiers
    fn declare(&mut self, node: Node, parent: usize, name: &str, kind: SymbolKind) -> usize {
        let symbol = ParsedSymbol {
            name: name.to_string(),
            qualified_name: self.qualified(parent, name),
            kind,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            start_column: node.start_position().column as u32,
            end_column: node.end_position().column as u32,
            signature: self.signature_of(node),
            documentation: self.documentation_of(node),
            modifiers: self.modifiers_of(node),
            parent: Some(parent),
        };
        self.push_symbol(symbol)
    }

    /// Declaration text up to the body, collapsed to one line
    fn signature_of(&self, node: Node) -> Option<String> {
        let end = node
            .child_by_field_name("body")
            .map(|b| b.start_byte())
            .unwrap_or_else(|| node.end_byte());
        let start = node.start_byte();
        if end <= start {
            return None;
        }
        let raw = &self.source[start..end];
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let trimmed = collapsed.trim_end_matches(['{', ';', ' ']).trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    /// Contiguous run of `///` or `//!` comments immediately above the node
    fn documentation_of(&self, node: Node) -> Option<String> {
        let mut lines = Vec::new();
        let mut prev = node.prev_sibling();
        // Attributes may sit between docs and the item
        while let Some(p) = prev {
            match p.kind() {
                "attribute_item" => prev = p.prev_sibling(),
                "line_comment" => {
                    let text = self.text(p);
                    if let Some(doc) = text
                        .strip_prefix("///")
                        .or_else(|| text.strip_prefix("//!"))
                    {
                        lines.push(doc.trim().to_string());
                        prev = p.prev_sibling();
                    } else {
                        break;
                    }
                }
                "block_comment" => {
                    let text = self.text(p);
                    if let Some(doc) = text.strip_prefix("/**") {
                        lines.push(doc.trim_end_matches("*/").trim().to_string());
                    }
                    break;
                }
                _ => break,
            }
        }
        if lines.is_empty() {
            return None;
        }
        lines.reverse();
        Some(lines.join("\n"))
    }

    fn modifiers_of(&self, node: Node) -> Vec<String> {
        let mut modifiers = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "visibility_modifier" => modifiers.push(self.text(child).to_string()),
                "function_modifiers" => {
                    for word in self.text(child).split_whitespace() {
                        modifiers.push(word.to_string());
                    }
                }
                _ => {}
            }
            // Modifiers precede the name; stop once past it
            if child.kind() == "identifier" || child.kind() == "type_identifier" {
                break;
            }
        }
        modifiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
/// Service that manages users.
pub struct UserService {
    store: UserStore,
    retries: u32,
}

pub trait Authenticator {
    fn login(&self, name: &str) -> Session;
}

impl Authenticator for UserService {
    fn login(&self, name: &str) -> Session {
        let hashed = hash_password(name);
        self.store.lookup(hashed)
    }
}

fn hash_password(input: &str) -> Digest {
    Digest::compute(input)
}
"#;

    fn parse(source: &str) -> ParseOutcome {
        parse_rust("user/user_service.rs", source)
    }

    fn find<'a>(outcome: &'a ParseOutcome, name: &str) -> &'a ParsedSymbol {
        outcome
            .symbols
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("symbol {name} not found"))
    }

    #[test]
    fn extracts_types_traits_and_functions() {
        let outcome = parse(SAMPLE);
        assert!(outcome.success);
        assert_eq!(find(&outcome, "UserService").kind, SymbolKind::Struct);
        assert_eq!(find(&outcome, "Authenticator").kind, SymbolKind::Interface);
        assert_eq!(find(&outcome, "hash_password").kind, SymbolKind::Function);
        assert_eq!(find(&outcome, "store").kind, SymbolKind::Field);
    }

    #[test]
    fn file_module_anchors_qualified_names() {
        let outcome = parse(SAMPLE);
        let service = find(&outcome, "UserService");
        assert_eq!(service.qualified_name, "user_service::UserService");
    }

    #[test]
    fn impl_methods_attach_to_the_type() {
        let outcome = parse(SAMPLE);
        let methods: Vec<_> = outcome
            .symbols
            .iter()
            .filter(|s| s.name == "login" && s.kind == SymbolKind::Method)
            .collect();
        // One from the trait, one from the impl
        assert_eq!(methods.len(), 2);
        let service_index = outcome
            .symbols
            .iter()
            .position(|s| s.name == "UserService")
            .unwrap();
        assert!(methods.iter().any(|m| m.parent == Some(service_index)));
    }

    #[test]
    fn call_edges_reach_helpers_and_methods() {
        let outcome = parse(SAMPLE);
        let callees: Vec<_> = outcome
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Calls)
            .filter_map(|e| match &e.target {
                EdgeTarget::Name(n) => Some(n.as_str()),
                _ => None,
            })
            .collect();
        assert!(callees.contains(&"hash_password"));
        assert!(callees.contains(&"lookup"));
    }

    #[test]
    fn implements_and_overrides_edges_are_emitted() {
        let outcome = parse(SAMPLE);
        assert!(outcome
            .edges
            .iter()
            .any(|e| e.kind == EdgeKind::Implements
                && e.target == EdgeTarget::Name("Authenticator".to_string())));
        assert!(outcome
            .edges
            .iter()
            .any(|e| e.kind == EdgeKind::Overrides
                && e.target == EdgeTarget::Name("Authenticator::login".to_string())));
    }

    #[test]
    fn primitive_types_are_excluded_from_type_edges() {
        let outcome = parse(SAMPLE);
        for edge in outcome
            .edges
            .iter()
            .filter(|e| matches!(e.kind, EdgeKind::TypeOf | EdgeKind::Returns))
        {
            if let EdgeTarget::Name(name) = &edge.target {
                assert!(!is_primitive_type(name), "primitive target {name}");
            }
        }
        // The u32 field produced no edge; the UserStore field did
        assert!(outcome.edges.iter().any(|e| e.kind == EdgeKind::TypeOf
            && e.target == EdgeTarget::Name("UserStore".to_string())));
    }

    #[test]
    fn parents_always_precede_children() {
        let outcome = parse(SAMPLE);
        for (index, symbol) in outcome.symbols.iter().enumerate() {
            if let Some(parent) = symbol.parent {
                assert!(parent < index, "parent of {} out of order", symbol.name);
            }
        }
    }

    #[test]
    fn docs_and_signatures_are_captured() {
        let outcome = parse(SAMPLE);
        let service = find(&outcome, "UserService");
        assert_eq!(
            service.documentation.as_deref(),
            Some("Service that manages users.")
        );
        let hash = find(&outcome, "hash_password");
        assert_eq!(
            hash.signature.as_deref(),
            Some("fn hash_password(input: &str) -> Digest")
        );
    }
}
