// Protolens Symbols
// Declarations discovered in proto documents

use std::fmt;

use tree_sitter::{Node, Point};

/// Symbol kind for proto declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Message,
    Enum,
    Rpc,
    Service,
    Field,
}

/// Symbol query capture name to symbol kind. Every capture of the symbol
/// query must appear here.
const KIND_TABLE: &[(&str, SymbolKind)] = &[
    ("message", SymbolKind::Message),
    ("enum", SymbolKind::Enum),
    ("rpc", SymbolKind::Rpc),
    ("service", SymbolKind::Service),
    ("field", SymbolKind::Field),
];

impl SymbolKind {
    pub fn from_capture(name: &str) -> Option<SymbolKind> {
        KIND_TABLE
            .iter()
            .find(|(capture, _)| *capture == name)
            .map(|(_, kind)| *kind)
    }

    pub fn capture_name(&self) -> &'static str {
        match self {
            SymbolKind::Message => "message",
            SymbolKind::Enum => "enum",
            SymbolKind::Rpc => "rpc",
            SymbolKind::Service => "service",
            SymbolKind::Field => "field",
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            SymbolKind::Message => "message",
            SymbolKind::Enum => "enum",
            SymbolKind::Rpc => "rpc",
            SymbolKind::Service => "service",
            SymbolKind::Field => "field",
        }
    }

    /// Kinds that can appear as a field or rpc type.
    pub fn is_type(&self) -> bool {
        matches!(self, SymbolKind::Message | SymbolKind::Enum)
    }

    pub fn to_lsp(&self) -> tower_lsp::lsp_types::SymbolKind {
        match self {
            SymbolKind::Message => tower_lsp::lsp_types::SymbolKind::STRUCT,
            SymbolKind::Enum => tower_lsp::lsp_types::SymbolKind::ENUM,
            SymbolKind::Rpc => tower_lsp::lsp_types::SymbolKind::METHOD,
            SymbolKind::Service => tower_lsp::lsp_types::SymbolKind::INTERFACE,
            SymbolKind::Field => tower_lsp::lsp_types::SymbolKind::FIELD,
        }
    }

    pub fn to_completion_kind(&self) -> tower_lsp::lsp_types::CompletionItemKind {
        match self {
            SymbolKind::Message => tower_lsp::lsp_types::CompletionItemKind::STRUCT,
            SymbolKind::Enum => tower_lsp::lsp_types::CompletionItemKind::ENUM,
            SymbolKind::Rpc => tower_lsp::lsp_types::CompletionItemKind::METHOD,
            SymbolKind::Service => tower_lsp::lsp_types::CompletionItemKind::INTERFACE,
            SymbolKind::Field => tower_lsp::lsp_types::CompletionItemKind::FIELD,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Byte and row/column span of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceRange {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start: Point,
    pub end: Point,
}

impl SourceRange {
    pub fn of(node: &Node<'_>) -> Self {
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start: node.start_position(),
            end: node.end_position(),
        }
    }

    pub fn contains(&self, other: &SourceRange) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }
}

/// A named declaration found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoSymbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Field type text, empty for other kinds
    pub value_type: String,
    pub package: String,
    /// Dot-joined enclosing message names. Only nested messages get one.
    pub scope: String,
    /// URI of the defining document
    pub source: String,
    /// Span of the name
    pub range: SourceRange,
    /// Span of the whole declaration
    pub decl_range: SourceRange,
}

impl ProtoSymbol {
    /// `scope.name`, or just `name` at top level
    pub fn full_ident(&self) -> String {
        if self.scope.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.scope, self.name)
        }
    }

    /// `package.scope.name`, or the plain full ident without a package
    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.full_ident()
        } else {
            format!("{}.{}", self.package, self.full_ident())
        }
    }

    /// Whether `word` refers to this symbol by full ident, qualified name or
    /// bare name. A leading `.` (fully-qualified reference) is ignored.
    pub fn matches_reference(&self, word: &str) -> bool {
        let word = word.strip_prefix('.').unwrap_or(word);
        word == self.name || word == self.full_ident() || word == self.qualified_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, scope: &str, package: &str) -> ProtoSymbol {
        ProtoSymbol {
            name: name.to_string(),
            kind: SymbolKind::Message,
            value_type: String::new(),
            package: package.to_string(),
            scope: scope.to_string(),
            source: "file:///a.proto".to_string(),
            range: SourceRange::default(),
            decl_range: SourceRange::default(),
        }
    }

    #[test]
    fn test_full_ident() {
        assert_eq!(symbol("M", "", "").full_ident(), "M");
        assert_eq!(symbol("M", "A.B", "").full_ident(), "A.B.M");
        assert_eq!(symbol("M", "A.B", "pkg.v1").qualified_name(), "pkg.v1.A.B.M");
    }

    #[test]
    fn test_matches_reference() {
        let sym = symbol("M", "A", "pkg");
        assert!(sym.matches_reference("M"));
        assert!(sym.matches_reference("A.M"));
        assert!(sym.matches_reference("pkg.A.M"));
        assert!(sym.matches_reference(".pkg.A.M"));
        assert!(!sym.matches_reference("B.M"));
    }

    #[test]
    fn test_kind_table_round_trips_captures() {
        for (name, kind) in KIND_TABLE {
            assert_eq!(kind.capture_name(), *name);
            assert_eq!(SymbolKind::from_capture(name), Some(*kind));
        }
        assert_eq!(SymbolKind::from_capture("oneof"), None);
    }
}
