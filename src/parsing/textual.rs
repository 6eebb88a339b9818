//! Textual parsers for languages without a semantic grammar
//!
//! Per-language regex rules extract classes, functions, and methods with
//! approximate line ranges and signatures. Edges are limited to what the
//! declaration patterns reliably yield (inheritance and interface lists).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parsing::{is_primitive_type, ParseOutcome};
use crate::types::{EdgeKind, EdgeTarget, Language, ParsedEdge, ParsedSymbol, SymbolKind};

/// One declaration pattern within a language's rule set
struct SymbolPattern {
    regex: &'static Lazy<Regex>,
    kind: SymbolKind,
    /// Containers become parents of deeper declarations
    container: bool,
    /// Capture group holding the symbol name
    name_group: usize,
    /// Capture group holding a comma-separated base list, if the
    /// declaration form carries one
    bases_group: Option<usize>,
    bases_kind: EdgeKind,
}

struct MatchedDecl {
    line: u32,
    indent: usize,
    kind: SymbolKind,
    container: bool,
    name: String,
    signature: String,
    bases: Vec<(String, EdgeKind)>,
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("invalid pattern"));
    };
}

// Python
pattern!(PY_CLASS, r"^(\s*)class\s+([A-Za-z_]\w*)\s*(?:\(([^)]*)\))?\s*:");
pattern!(PY_DEF, r"^(\s*)(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(");

// JavaScript / TypeScript
pattern!(
    JS_CLASS,
    r"^(\s*)(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)(?:\s+extends\s+([\w$.]+))?"
);
pattern!(
    JS_FUNCTION,
    r"^(\s*)(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\("
);
pattern!(
    JS_ARROW,
    r"^(\s*)(?:export\s+)?(?:const|let)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>"
);
pattern!(
    TS_INTERFACE,
    r"^(\s*)(?:export\s+)?interface\s+([A-Za-z_$][\w$]*)(?:\s+extends\s+([\w$.,\s]+?))?\s*\{"
);
pattern!(
    JS_METHOD,
    r"^(\s+)(?:(?:public|private|protected|static|readonly|async)\s+)*([A-Za-z_$][\w$]*)\s*\([^)]*\)\s*(?::\s*[\w<>\[\],\s.|]+)?\s*\{"
);

// Go
pattern!(GO_FUNC, r"^func\s+(?:\(\s*\w+\s+\*?([\w]+)\s*\)\s+)?([A-Za-z_]\w*)\s*\(");
pattern!(GO_STRUCT, r"^type\s+([A-Za-z_]\w*)\s+struct\b");
pattern!(GO_INTERFACE, r"^type\s+([A-Za-z_]\w*)\s+interface\b");

// Java
pattern!(
    JAVA_TYPE,
    r"^(\s*)(?:(?:public|protected|private|static|final|abstract)\s+)*(class|interface|enum)\s+([A-Za-z_]\w*)(?:\s+extends\s+([\w.]+))?(?:\s+implements\s+([\w.,\s]+?))?\s*\{"
);
pattern!(
    JAVA_METHOD,
    r"^(\s+)(?:(?:public|protected|private|static|final|abstract|synchronized)\s+)+[\w<>\[\],.\s]+\s+([A-Za-z_]\w*)\s*\([^)]*\)\s*(?:throws\s+[\w.,\s]+)?\s*\{"
);

// C#
pattern!(
    CS_NAMESPACE,
    r"^(\s*)namespace\s+([\w.]+)"
);
pattern!(
    CS_TYPE,
    r"^(\s*)(?:(?:public|internal|protected|private|static|sealed|abstract|partial)\s+)*(class|interface|struct|enum|record)\s+([A-Za-z_]\w*)(?:\s*:\s*([\w.,<>\s]+?))?\s*(?:\{|$)"
);
pattern!(
    CS_METHOD,
    r"^(\s+)(?:(?:public|internal|protected|private|static|virtual|override|sealed|async|partial)\s+)+[\w<>\[\],.\s?]+\s+([A-Za-z_]\w*)\s*\([^)]*\)\s*(?:\{|=>|$)"
);

// Ruby
pattern!(RB_CLASS, r"^(\s*)class\s+([A-Z]\w*)(?:\s*<\s*([\w:]+))?");
pattern!(RB_MODULE, r"^(\s*)module\s+([A-Z]\w*)");
pattern!(RB_DEF, r"^(\s*)def\s+(?:self\.)?([a-z_]\w*[?!=]?)");

// Shell
pattern!(SH_FUNC, r"^(\s*)(?:function\s+)?([A-Za-z_][\w-]*)\s*\(\)\s*\{");
pattern!(SH_FUNC_KW, r"^(\s*)function\s+([A-Za-z_][\w-]*)\s*\{");

/// Names that look like declarations but are control flow
const KEYWORD_NAMES: &[&str] = &[
    "if", "else", "for", "while", "switch", "catch", "return", "new", "do", "try", "using",
    "lock", "foreach", "match", "when",
];

fn rules_for(language: Language) -> Vec<SymbolPattern> {
    use EdgeKind::Inherits;
    use SymbolKind::*;
    match language {
        Language::Python => vec![
            rule(&PY_CLASS, Class, true, 2, Some(3), Inherits),
            rule(&PY_DEF, Function, false, 2, None, Inherits),
        ],
        Language::JavaScript => vec![
            rule(&JS_CLASS, Class, true, 2, Some(3), Inherits),
            rule(&JS_FUNCTION, Function, false, 2, None, Inherits),
            rule(&JS_ARROW, Function, false, 2, None, Inherits),
            rule(&JS_METHOD, Method, false, 2, None, Inherits),
        ],
        Language::TypeScript => vec![
            rule(&JS_CLASS, Class, true, 2, Some(3), Inherits),
            rule(&TS_INTERFACE, Interface, true, 2, Some(3), Inherits),
            rule(&JS_FUNCTION, Function, false, 2, None, Inherits),
            rule(&JS_ARROW, Function, false, 2, None, Inherits),
            rule(&JS_METHOD, Method, false, 2, None, Inherits),
        ],
        Language::Go => vec![
            rule(&GO_STRUCT, Struct, false, 1, None, Inherits),
            rule(&GO_INTERFACE, Interface, false, 1, None, Inherits),
            rule(&GO_FUNC, Function, false, 2, None, Inherits),
        ],
        Language::Java => vec![
            rule(&JAVA_TYPE, Class, true, 3, Some(4), Inherits),
            rule(&JAVA_METHOD, Method, false, 2, None, Inherits),
        ],
        Language::CSharp => vec![
            rule(&CS_NAMESPACE, Namespace, true, 2, None, Inherits),
            rule(&CS_TYPE, Class, true, 3, Some(4), Inherits),
            rule(&CS_METHOD, Method, false, 2, None, Inherits),
        ],
        Language::Ruby => vec![
            rule(&RB_CLASS, Class, true, 2, Some(3), Inherits),
            rule(&RB_MODULE, Module, true, 2, None, Inherits),
            rule(&RB_DEF, Function, false, 2, None, Inherits),
        ],
        Language::Shell => vec![
            rule(&SH_FUNC, Function, false, 2, None, Inherits),
            rule(&SH_FUNC_KW, Function, false, 2, None, Inherits),
        ],
        Language::Rust | Language::Unknown => Vec::new(),
    }
}

fn rule(
    regex: &'static Lazy<Regex>,
    kind: SymbolKind,
    container: bool,
    name_group: usize,
    bases_group: Option<usize>,
    bases_kind: EdgeKind,
) -> SymbolPattern {
    SymbolPattern {
        regex,
        kind,
        container,
        name_group,
        bases_group,
        bases_kind,
    }
}

/// Parse a file with the textual rules for its language
pub fn parse_textual(_path: &str, content: &str, language: Language) -> ParseOutcome {
    let rules = rules_for(language);
    if rules.is_empty() {
        return ParseOutcome {
            success: true,
            ..Default::default()
        };
    }

    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len().max(1) as u32;

    let mut decls: Vec<MatchedDecl> = Vec::new();
    for (line_index, line) in lines.iter().enumerate() {
        for pattern in &rules {
            let Some(captures) = pattern.regex.captures(line) else {
                continue;
            };
            let name = captures
                .get(pattern.name_group)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            if name.is_empty() || KEYWORD_NAMES.contains(&name.as_str()) {
                continue;
            }
            let indent = line.len() - line.trim_start().len();
            let mut bases = Vec::new();
            if let Some(group) = pattern.bases_group {
                if let Some(list) = captures.get(group) {
                    for (position, base) in list
                        .as_str()
                        .split(',')
                        .map(|b| strip_generics(b.trim()))
                        .filter(|b| !b.is_empty() && !is_primitive_type(b) && *b != "object")
                        .enumerate()
                    {
                        // Java's implements list and C#'s interface tail
                        // are Implements; the first C# base is Inherits
                        let kind = if language == Language::CSharp && position > 0 {
                            EdgeKind::Implements
                        } else {
                            pattern.bases_kind
                        };
                        bases.push((base.to_string(), kind));
                    }
                }
            }
            decls.push(MatchedDecl {
                line: line_index as u32 + 1,
                indent,
                kind: pattern.kind,
                container: pattern.container,
                name,
                signature: line.trim().trim_end_matches(['{', ':']).trim().to_string(),
                bases,
            });
            break;
        }
    }

    // Java implements lists ride in a second capture group
    if language == Language::Java {
        collect_java_implements(&lines, &mut decls);
    }

    build_outcome(decls, total_lines, language)
}

fn strip_generics(base: &str) -> &str {
    match base.find('<') {
        Some(pos) => base[..pos].trim(),
        None => base,
    }
}

fn collect_java_implements(lines: &[&str], decls: &mut [MatchedDecl]) {
    for decl in decls.iter_mut() {
        if !decl.container {
            continue;
        }
        let Some(line) = lines.get(decl.line as usize - 1) else {
            continue;
        };
        if let Some(captures) = JAVA_TYPE.captures(line) {
            if let Some(list) = captures.get(5) {
                for base in list
                    .as_str()
                    .split(',')
                    .map(|b| strip_generics(b.trim()))
                    .filter(|b| !b.is_empty())
                {
                    decl.bases
                        .push((base.to_string(), EdgeKind::Implements));
                }
            }
        }
    }
}

/// Assign parents by indentation nesting, approximate end lines, and emit
/// the declaration-level edges
fn build_outcome(decls: Vec<MatchedDecl>, total_lines: u32, language: Language) -> ParseOutcome {
    let qualifier = if language == Language::Ruby { "::" } else { "." };
    let mut symbols: Vec<ParsedSymbol> = Vec::new();
    let mut edges: Vec<ParsedEdge> = Vec::new();
    // Stack of (symbol index, indent) for open containers
    let mut container_stack: Vec<(usize, usize)> = Vec::new();

    for (decl_index, decl) in decls.iter().enumerate() {
        while let Some(&(_, indent)) = container_stack.last() {
            if decl.indent <= indent {
                container_stack.pop();
            } else {
                break;
            }
        }
        let parent = container_stack.last().map(|&(index, _)| index);

        // A function nested in a container is a method
        let kind = if decl.kind == SymbolKind::Function && parent.is_some() {
            SymbolKind::Method
        } else {
            decl.kind
        };

        // End line: the line before the next declaration at the same or a
        // shallower indent, or end of file
        let end_line = decls[decl_index + 1..]
            .iter()
            .find(|next| next.indent <= decl.indent)
            .map(|next| next.line.saturating_sub(1))
            .unwrap_or(total_lines)
            .max(decl.line);

        let qualified_name = match parent {
            Some(p) => format!("{}{}{}", symbols[p].qualified_name, qualifier, decl.name),
            None => decl.name.clone(),
        };

        let index = symbols.len();
        symbols.push(ParsedSymbol {
            name: decl.name.clone(),
            qualified_name,
            kind,
            start_line: decl.line,
            end_line,
            start_column: decl.indent as u32,
            end_column: 0,
            signature: Some(decl.signature.clone()),
            documentation: None,
            modifiers: Vec::new(),
            parent,
        });

        for (base, edge_kind) in &decl.bases {
            edges.push(ParsedEdge {
                source: index,
                target: EdgeTarget::Name(base.clone()),
                kind: *edge_kind,
                line: decl.line,
            });
        }

        if decl.container {
            container_stack.push((index, decl.indent));
        }
    }

    ParseOutcome {
        symbols,
        edges,
        success: true,
        error_message: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_classes_and_methods_nest_by_indent() {
        let source = "\
class UserService(BaseService):
    def login(self, name):
        return name

    def logout(self):
        pass

def helper():
    pass
";
        let outcome = parse_textual("user_service.py", source, Language::Python);
        assert!(outcome.success);

        let class = &outcome.symbols[0];
        assert_eq!(class.name, "UserService");
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.start_line, 1);

        let login = outcome.symbols.iter().find(|s| s.name == "login").unwrap();
        assert_eq!(login.kind, SymbolKind::Method);
        assert_eq!(login.parent, Some(0));
        assert_eq!(login.qualified_name, "UserService.login");

        let helper = outcome.symbols.iter().find(|s| s.name == "helper").unwrap();
        assert_eq!(helper.kind, SymbolKind::Function);
        assert_eq!(helper.parent, None);

        assert!(outcome.edges.iter().any(|e| e.kind == EdgeKind::Inherits
            && e.target == EdgeTarget::Name("BaseService".to_string())));
    }

    #[test]
    fn go_methods_and_types_are_flat() {
        let source = "\
type Store struct {
}

func (s *Store) Get(key string) string {
\treturn key
}

func NewStore() *Store {
\treturn &Store{}
}
";
        let outcome = parse_textual("store.go", source, Language::Go);
        let kinds: Vec<_> = outcome.symbols.iter().map(|s| (s.name.as_str(), s.kind)).collect();
        assert!(kinds.contains(&("Store", SymbolKind::Struct)));
        assert!(kinds.contains(&("Get", SymbolKind::Function)));
        assert!(kinds.contains(&("NewStore", SymbolKind::Function)));
    }

    #[test]
    fn csharp_namespace_class_and_bases() {
        let source = "\
namespace Demo.Users
{
    public class UserService : ServiceBase, IUserService
    {
        public Session Login(string name)
        {
            return null;
        }
    }
}
";
        let outcome = parse_textual("UserService.cs", source, Language::CSharp);
        let class = outcome
            .symbols
            .iter()
            .find(|s| s.name == "UserService")
            .unwrap();
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.qualified_name, "Demo.Users.UserService");

        let login = outcome.symbols.iter().find(|s| s.name == "Login").unwrap();
        assert_eq!(login.kind, SymbolKind::Method);

        let inherits: Vec<_> = outcome
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Inherits)
            .collect();
        let implements: Vec<_> = outcome
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Implements)
            .collect();
        assert_eq!(inherits.len(), 1);
        assert_eq!(implements.len(), 1);
    }

    #[test]
    fn keyword_lines_are_not_symbols() {
        let source = "\
function run() {
  if (ready) {
    go();
  }
}
";
        let outcome = parse_textual("run.js", source, Language::JavaScript);
        assert_eq!(outcome.symbols.len(), 1);
        assert_eq!(outcome.symbols[0].name, "run");
    }
}
