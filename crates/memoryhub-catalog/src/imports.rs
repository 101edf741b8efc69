//! Import-edge extraction: a proper syntactic parse for Python, a
//! three-pattern regex fallback for everything else (and for Python sources
//! that fail to parse).

use std::sync::LazyLock;

use memoryhub_types::ImportSourceType;
use tree_sitter::{Node, Parser};

static IMPORT_FROM_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r#"import\s+[^;\n]*?from\s+['"]([^'"]+)['"]"#).unwrap());
static IMPORT_BARE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r#"import\s+['"]([^'"]+)['"]"#).unwrap());
static REQUIRE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

/// One extracted `(to_module, confidence, source_type)` edge, unique per
/// file and deduplicated by the caller.
pub type ImportEdge = (String, f64, ImportSourceType);

pub fn extract_imports(source: &str, language: &str) -> Vec<ImportEdge> {
    if language == "python" {
        if let Some(modules) = parse_python_imports(source) {
            let mut edges: Vec<ImportEdge> = modules
                .into_iter()
                .map(|m| (m, 1.0, ImportSourceType::Ast))
                .collect();
            edges.sort_by(|a, b| a.0.cmp(&b.0));
            edges.dedup_by(|a, b| a.0 == b.0);
            return edges;
        }
    }
    regex_fallback(source)
}

fn regex_fallback(source: &str) -> Vec<ImportEdge> {
    let mut modules = std::collections::BTreeSet::new();
    for re in [&*IMPORT_FROM_RE, &*IMPORT_BARE_RE, &*REQUIRE_RE] {
        for caps in re.captures_iter(source) {
            if let Some(m) = caps.get(1) {
                modules.insert(m.as_str().to_string());
            }
        }
    }
    modules
        .into_iter()
        .map(|m| (m, 0.5, ImportSourceType::Inferred))
        .collect()
}

/// Parses `source` as Python and returns every module named by an `import`
/// or `from ... import ...` statement, or `None` on a parse failure (the
/// caller falls through to the regex path).
fn parse_python_imports(source: &str) -> Option<Vec<String>> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;
    if tree.root_node().has_error() {
        return None;
    }

    let mut modules = Vec::new();
    walk_node(tree.root_node(), source.as_bytes(), &mut modules);
    Some(modules)
}

fn walk_node(node: Node, source: &[u8], modules: &mut Vec<String>) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect_dotted_names(child, source, modules);
            }
        }
        "import_from_statement" => {
            if let Some(module_node) = node.child_by_field_name("module_name") {
                if let Ok(text) = module_node.utf8_text(source) {
                    modules.push(text.to_string());
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_node(child, source, modules);
    }
}

fn collect_dotted_names(node: Node, source: &[u8], modules: &mut Vec<String>) {
    match node.kind() {
        "dotted_name" => {
            if let Ok(text) = node.utf8_text(source) {
                modules.push(text.to_string());
            }
        }
        "aliased_import" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                collect_dotted_names(name_node, source, modules);
            }
        }
        _ => {}
    }
}
