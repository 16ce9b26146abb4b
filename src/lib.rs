// Protolens
// Incremental syntax trees and cross-file symbols for Protocol Buffers

pub mod config;
pub mod error;
pub mod lexer;
pub mod lsp;

pub use config::AnalyzerConfig;
pub use error::{ResolveError, SyntaxError, TokenizeError};
