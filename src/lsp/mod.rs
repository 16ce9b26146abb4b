// Protolens Language Server Protocol (LSP) Module
// Tree cache, cross-file symbols and the editor-facing providers

pub mod analyzer;
mod backend;
pub mod completion;
pub mod highlight;
pub mod import_resolver;
pub mod position;
pub mod symbols;
pub mod trees;

pub use analyzer::Analyzer;
pub use backend::{
    definitions_at, hover_at, outline, resolve_reference, word_at, ProtolensLanguageServer,
};
pub use highlight::Highlighter;
pub use import_resolver::ImportResolver;
pub use symbols::{ProtoSymbol, SourceRange, SymbolKind};
pub use trees::{ContentChange, DocTree, ProtoTrees, TextDocument, DISK_VERSION};
