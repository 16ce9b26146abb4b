// Protolens Symbol Analyzer
// Discovers local and transitively imported symbols of a document

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::{debug, warn};

use super::import_resolver::ImportResolver;
use super::symbols::{ProtoSymbol, SourceRange, SymbolKind};
use super::trees::{DocTree, ProtoTrees};
use crate::config::AnalyzerConfig;
use crate::error::SyntaxResult;
use tree_sitter::{Node, Query};

/// Capture names double as symbol kinds, see `SymbolKind::from_capture`.
const SYMBOL_QUERY: &str = r#"
(message (message_name) @message)
(enum (enum_name) @enum)
(service (service_name) @service)
(rpc (rpc_name) @rpc)
(field (identifier) @field)
(map_field (identifier) @field)
(oneof_field (identifier) @field)
"#;
const PACKAGE_QUERY: &str = "(package (full_ident) @package)";
const IMPORT_QUERY: &str = "(import path: (string) @path)";

/// Owns the tree cache and answers symbol requests against it.
pub struct Analyzer {
    trees: ProtoTrees,
    config: AnalyzerConfig,
    resolver: ImportResolver,
    queries: SymbolQueries,
}

/// Queries compiled once per analyzer.
struct SymbolQueries {
    symbol: Query,
    package: Query,
    import: Query,
}

impl Analyzer {
    pub fn new(trees: ProtoTrees, config: AnalyzerConfig) -> SyntaxResult<Self> {
        let queries = SymbolQueries {
            symbol: trees.query(SYMBOL_QUERY)?,
            package: trees.query(PACKAGE_QUERY)?,
            import: trees.query(IMPORT_QUERY)?,
        };
        let resolver = ImportResolver::from_config(&config);
        Ok(Self {
            trees,
            config,
            resolver,
            queries,
        })
    }

    pub fn trees(&self) -> &ProtoTrees {
        &self.trees
    }

    pub fn trees_mut(&mut self) -> &mut ProtoTrees {
        &mut self.trees
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: AnalyzerConfig) {
        debug!("import roots: {:?}", config.import_paths);
        self.resolver = ImportResolver::from_config(&config);
        self.config = config;
    }

    /// Symbols visible in `uri`: its own declarations, followed by those of
    /// its transitive imports when `include_imported` is set.
    ///
    /// Unloadable documents and unresolvable imports contribute nothing.
    pub fn discover_proto_symbols(&mut self, uri: &str, include_imported: bool) -> Vec<ProtoSymbol> {
        if include_imported {
            let mut expanding = FxHashSet::default();
            self.collect(uri, &mut expanding)
        } else {
            match self.trees.get_doc(uri) {
                Some(tree) => self.queries.local_symbols(uri, tree),
                None => Vec::new(),
            }
        }
    }

    fn collect(&mut self, uri: &str, expanding: &mut FxHashSet<String>) -> Vec<ProtoSymbol> {
        if !expanding.insert(uri.to_string()) {
            warn!("import cycle through {}, skipping", uri);
            return Vec::new();
        }

        let (mut symbols, imports) = match self.trees.get_doc(uri) {
            Some(tree) => (
                self.queries.local_symbols(uri, tree),
                self.queries.import_literals(tree),
            ),
            None => {
                expanding.remove(uri);
                return Vec::new();
            }
        };

        for literal in imports {
            match self.resolver.resolve_uri(uri, &literal) {
                Ok(imported) => symbols.extend(self.collect(&imported, expanding)),
                Err(err) => warn!("{}", err),
            }
        }

        expanding.remove(uri);
        symbols
    }
}

impl SymbolQueries {
    fn local_symbols(&self, uri: &str, tree: &DocTree) -> Vec<ProtoSymbol> {
        let package = tree
            .captures(&self.package)
            .first()
            .map(|capture| tree.text_of(&capture.node).to_string())
            .unwrap_or_default();

        let names = self.symbol.capture_names();
        let mut symbols = Vec::new();
        for capture in tree.captures(&self.symbol) {
            let node = capture.node;
            let name = names[capture.index as usize];
            let kind = SymbolKind::from_capture(name);
            debug_assert!(kind.is_some(), "unmapped symbol capture {}", name);
            let Some(kind) = kind else {
                debug!("skipping unmapped symbol capture {}", name);
                continue;
            };
            let declaration = node.parent().unwrap_or(node);
            symbols.push(ProtoSymbol {
                name: tree.text_of(&node).to_string(),
                kind,
                value_type: if kind == SymbolKind::Field {
                    field_type(tree, &declaration)
                } else {
                    String::new()
                },
                package: package.clone(),
                scope: if kind == SymbolKind::Message {
                    enclosing_scope(tree, &declaration)
                } else {
                    String::new()
                },
                source: uri.to_string(),
                range: SourceRange::of(&node),
                decl_range: SourceRange::of(&declaration),
            });
        }
        symbols
    }

    fn import_literals(&self, tree: &DocTree) -> Vec<String> {
        tree.captures(&self.import)
            .into_iter()
            .map(|capture| tree.text_of(&capture.node).to_string())
            .collect()
    }
}

/// First named child of `node` with the given kind.
fn child_of_kind<'t>(node: &Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == kind);
    found
}

/// Dot-joined names of the messages enclosing `message`, outermost first.
fn enclosing_scope(tree: &DocTree, message: &Node<'_>) -> String {
    let mut names: SmallVec<[&str; 4]> = SmallVec::new();
    let mut current = owner_message(message);
    while let Some(owner) = current {
        match child_of_kind(&owner, "message_name") {
            Some(name) => names.push(tree.text_of(&name)),
            None => break,
        }
        current = owner_message(&owner);
    }
    names.reverse();
    names.join(".")
}

/// The message whose body directly contains `node`.
fn owner_message<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    let body = node.parent().filter(|parent| parent.kind() == "message_body")?;
    body.parent().filter(|owner| owner.kind() == "message")
}

/// Type text of a field declaration; `map<K, V>` for map fields.
fn field_type(tree: &DocTree, declaration: &Node<'_>) -> String {
    let text_of = |kind: &str| {
        child_of_kind(declaration, kind)
            .map(|node| tree.text_of(&node))
            .unwrap_or_default()
    };
    match declaration.kind() {
        "map_field" => format!("map<{}, {}>", text_of("key_type"), text_of("type")),
        _ => text_of("type").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "untitled:demo.proto";

    fn analyzer_with(source: &str) -> Analyzer {
        let mut trees = ProtoTrees::new().unwrap();
        trees.add_doc(URI, source, 1);
        Analyzer::new(trees, AnalyzerConfig::default()).unwrap()
    }

    #[test]
    fn test_local_symbols() {
        let mut analyzer = analyzer_with(
            "package demo.v1;\nmessage A {\n  message B {\n    message M { string s = 1; }\n  }\n  map<string, B> m = 2;\n}\nenum E { X = 0; }\nservice S { rpc Call (A) returns (A.B); }\n",
        );
        let symbols = analyzer.discover_proto_symbols(URI, false);
        let summary: Vec<(SymbolKind, String, String)> = symbols
            .iter()
            .map(|s| (s.kind, s.full_ident(), s.value_type.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (SymbolKind::Message, "A".to_string(), String::new()),
                (SymbolKind::Message, "A.B".to_string(), String::new()),
                (SymbolKind::Message, "A.B.M".to_string(), String::new()),
                (SymbolKind::Field, "s".to_string(), "string".to_string()),
                (SymbolKind::Field, "m".to_string(), "map<string, B>".to_string()),
                (SymbolKind::Enum, "E".to_string(), String::new()),
                (SymbolKind::Service, "S".to_string(), String::new()),
                (SymbolKind::Rpc, "Call".to_string(), String::new()),
            ]
        );
        assert!(symbols.iter().all(|s| s.package == "demo.v1"));
        assert!(symbols.iter().all(|s| s.source == URI));

        let m = &symbols[2];
        assert_eq!(m.scope, "A.B");
        assert_eq!(m.range.start.row, 3);
        assert_eq!(m.decl_range.start.column, 4);
    }

    #[test]
    fn test_unknown_document_is_empty() {
        let mut analyzer = analyzer_with("");
        assert!(analyzer
            .discover_proto_symbols("untitled:other.proto", true)
            .is_empty());
        assert!(analyzer.discover_proto_symbols(URI, true).is_empty());
    }

    #[test]
    fn test_unresolved_import_is_skipped() {
        let mut analyzer = analyzer_with("import \"missing.proto\";\nmessage Only {}\n");
        let symbols = analyzer.discover_proto_symbols(URI, true);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "Only");
    }

    #[test]
    fn test_oneof_fields_and_nested_enums() {
        let mut analyzer = analyzer_with(
            "message A {\n  oneof choice {\n    string a = 1;\n    .pkg.B b = 2;\n  }\n  enum Inner { X = 0; }\n}\n",
        );
        let symbols = analyzer.discover_proto_symbols(URI, false);
        let summary: Vec<(SymbolKind, &str, &str)> = symbols
            .iter()
            .map(|s| (s.kind, s.name.as_str(), s.value_type.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (SymbolKind::Message, "A", ""),
                (SymbolKind::Field, "a", "string"),
                (SymbolKind::Field, "b", ".pkg.B"),
                (SymbolKind::Enum, "Inner", ""),
            ]
        );
        assert_eq!(symbols[3].decl_range.start.row, 5);
    }

    #[test]
    fn test_symbol_query_captures_are_mapped() {
        let trees = ProtoTrees::new().unwrap();
        let query = trees.query(SYMBOL_QUERY).unwrap();
        assert!(query
            .capture_names()
            .iter()
            .all(|name| SymbolKind::from_capture(name).is_some()));
    }

    #[test]
    fn test_set_config_changes_import_roots() {
        let mut analyzer = analyzer_with("message A {}");
        assert!(analyzer.config().import_paths.is_empty());
        let config = AnalyzerConfig::new(vec!["/protos".into()]);
        analyzer.set_config(config.clone());
        assert_eq!(analyzer.config(), &config);
    }

    #[test]
    fn test_field_scope_stays_empty() {
        let mut analyzer = analyzer_with("message A { int32 x = 1; }");
        let symbols = analyzer.discover_proto_symbols(URI, false);
        let field = symbols.iter().find(|s| s.kind == SymbolKind::Field).unwrap();
        assert_eq!(field.scope, "");
        assert_eq!(field.full_ident(), "x");
    }
}
