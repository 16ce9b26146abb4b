// Protolens Error Handling Module
// Error taxonomy shared by the tokenizer, the grammar setup and the resolver

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while scanning raw source text.
///
/// Both variants carry the zero-based line the scanner was on. Once a
/// tokenizer has produced an error, the rest of its token stream is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("illegal {subject} (line {line})")]
    IllegalSyntax { subject: &'static str, line: usize },

    #[error("illegal token '{found}', '{expected}' expected (line {line})")]
    UnexpectedToken {
        found: String,
        expected: String,
        line: usize,
    },
}

impl TokenizeError {
    pub fn line(&self) -> usize {
        match self {
            TokenizeError::IllegalSyntax { line, .. } => *line,
            TokenizeError::UnexpectedToken { line, .. } => *line,
        }
    }
}

/// Failures setting up the proto grammar: loading it into a parser or
/// compiling one of the embedded queries against it.
#[derive(Debug, Error)]
pub enum SyntaxError {
    #[error("cannot load the proto grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("invalid query at row {}, column {}: {}", .0.row, .0.column, .0.message)]
    Query(#[from] tree_sitter::QueryError),
}

/// Soft failures of the symbol resolver. These are logged and degrade to
/// fewer symbols; they never reach feature providers.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot resolve import \"{literal}\" from {source_uri}")]
    UnresolvedImport { literal: String, source_uri: String },

    #[error("document {uri} is not available")]
    MissingDocument { uri: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type TokenizeResult<T> = Result<T, TokenizeError>;
pub type ResolveResult<T> = Result<T, ResolveError>;
pub type SyntaxResult<T> = Result<T, SyntaxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_line() {
        let err = TokenizeError::IllegalSyntax {
            subject: "string",
            line: 3,
        };
        assert_eq!(err.to_string(), "illegal string (line 3)");
        assert_eq!(err.line(), 3);

        let err = TokenizeError::UnexpectedToken {
            found: "}".to_string(),
            expected: ";".to_string(),
            line: 7,
        };
        assert_eq!(err.to_string(), "illegal token '}', ';' expected (line 7)");
    }

    #[test]
    fn test_unknown_node_kind_is_a_query_error() {
        let language: tree_sitter::Language = tree_sitter_proto::LANGUAGE.into();
        let err: SyntaxError = tree_sitter::Query::new(&language, "(message\n  (no_such_kind))")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("invalid query"), "{}", err);
        match err {
            SyntaxError::Query(inner) => {
                assert_eq!(inner.kind, tree_sitter::QueryErrorKind::NodeType)
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
