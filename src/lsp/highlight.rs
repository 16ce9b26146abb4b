// Protolens Semantic Highlighting
// Structural highlight query rendered as LSP semantic tokens

use tower_lsp::lsp_types::{
    SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokensLegend,
};

use tree_sitter::{Point, Query};

use super::position::LineIndex;
use super::trees::{DocTree, ProtoTrees};
use crate::error::SyntaxResult;

/// Token types in legend order. Capture names of the highlight query must
/// use these names to be rendered.
pub const TOKEN_TYPES: &[&str] = &[
    "type",
    "enum",
    "class",
    "function",
    "comment",
    "string",
    "number",
    "keyword",
    "parameter",
    "member",
    "property",
    "enumMember",
    "namespace",
];

pub const TOKEN_MODIFIERS: &[&str] = &["definition", "deprecated", "documentation"];

pub const HIGHLIGHT_QUERY: &str = r#"
; literals
(comment) @comment
[(string) (reserved_identifier)] @string
[(int_lit) (float_lit)] @number
(bool) @keyword

[
  "syntax" "edition" "import" "weak" "public" "package" "option"
  "export" "local" "message" "enum" "service" "rpc" "returns" "stream"
  "repeated" "optional" "required" "oneof" "map" "group"
  "reserved" "extensions" "extend" "to" "max"
] @keyword

; declarations
(message_name) @class
(enum_name) @enum
(service_name) @type
(rpc_name) @function
(field (identifier) @property)
(map_field (identifier) @property)
(oneof_field (identifier) @property)
(oneof (identifier) @member)
(enum_field (identifier) @enumMember)

; references
[(key_type) (type) (message_or_enum_type)] @type
(extend (full_ident) @type)
(package (full_ident) @namespace)
(option (identifier) @parameter)
(field_option (identifier) @parameter)
(enum_value_option (identifier) @parameter)
"#;

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: TOKEN_TYPES
            .iter()
            .map(|name| SemanticTokenType::new(*name))
            .collect(),
        token_modifiers: TOKEN_MODIFIERS
            .iter()
            .map(|name| SemanticTokenModifier::new(*name))
            .collect(),
    }
}

/// Compiled highlight query.
pub struct Highlighter {
    query: Query,
    /// Legend index per capture index, `None` for captures outside the legend
    legend_index: Vec<Option<u32>>,
}

impl Highlighter {
    pub fn new(trees: &ProtoTrees) -> SyntaxResult<Self> {
        let query = trees.query(HIGHLIGHT_QUERY)?;
        let legend_index = query
            .capture_names()
            .iter()
            .map(|name| {
                TOKEN_TYPES
                    .iter()
                    .position(|t| t == name)
                    .map(|i| i as u32)
            })
            .collect();
        Ok(Self {
            query,
            legend_index,
        })
    }

    /// Delta-encoded semantic tokens for the whole tree. Multi-line captures
    /// are split per line; a capture overlapping an earlier one is dropped.
    pub fn tokens(&self, tree: &DocTree) -> Vec<SemanticToken> {
        let index = LineIndex::new(tree.source());
        let mut spans: Vec<(u32, u32, u32, u32)> = Vec::new();
        let mut covered_until = Point::default();

        for capture in tree.captures(&self.query) {
            let Some(token_type) = self.legend_index[capture.index as usize] else {
                continue;
            };
            let (start, end) = (capture.node.start_position(), capture.node.end_position());
            if start == end || (!spans.is_empty() && start < covered_until) {
                continue;
            }
            covered_until = end;

            for row in start.row..=end.row {
                let from = if row == start.row {
                    start
                } else {
                    Point::new(row, 0)
                };
                let to = if row == end.row {
                    end
                } else {
                    Point::new(row, usize::MAX)
                };
                let from = index.position_of(from);
                let to = index.position_of(to);
                if to.character > from.character {
                    spans.push((from.line, from.character, to.character - from.character, token_type));
                }
            }
        }

        let mut tokens = Vec::with_capacity(spans.len());
        let (mut prev_line, mut prev_start) = (0u32, 0u32);
        for (line, start, length, token_type) in spans {
            let delta_line = line - prev_line;
            let delta_start = if delta_line == 0 {
                start - prev_start
            } else {
                start
            };
            tokens.push(SemanticToken {
                delta_line,
                delta_start,
                length,
                token_type,
                token_modifiers_bitset: 0,
            });
            prev_line = line;
            prev_start = start;
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "untitled:h.proto";

    fn highlight(source: &str) -> Vec<(u32, u32, u32, &'static str)> {
        let mut trees = ProtoTrees::new().unwrap();
        let highlighter = Highlighter::new(&trees).unwrap();
        trees.add_doc(URI, source, 1);
        decode(&highlighter.tokens(trees.cached(URI).unwrap()))
    }

    fn decode(tokens: &[SemanticToken]) -> Vec<(u32, u32, u32, &'static str)> {
        let (mut line, mut start) = (0, 0);
        tokens
            .iter()
            .map(|t| {
                if t.delta_line > 0 {
                    line += t.delta_line;
                    start = t.delta_start;
                } else {
                    start += t.delta_start;
                }
                (line, start, t.length, TOKEN_TYPES[t.token_type as usize])
            })
            .collect()
    }

    #[test]
    fn test_highlight_message() {
        assert_eq!(
            highlight("message A {\n  int32 x = 1; // c\n}\n"),
            vec![
                (0, 0, 7, "keyword"),
                (0, 8, 1, "class"),
                (1, 2, 5, "type"),
                (1, 8, 1, "property"),
                (1, 12, 1, "number"),
                (1, 15, 4, "comment"),
            ]
        );
    }

    #[test]
    fn test_highlight_service_and_package() {
        assert_eq!(
            highlight("package a.b;\nservice S {\n  rpc Go (Req) returns (stream Res);\n}\n"),
            vec![
                (0, 0, 7, "keyword"),
                (0, 8, 3, "namespace"),
                (1, 0, 7, "keyword"),
                (1, 8, 1, "type"),
                (2, 2, 3, "keyword"),
                (2, 6, 2, "function"),
                (2, 10, 3, "type"),
                (2, 15, 7, "keyword"),
                (2, 24, 6, "keyword"),
                (2, 31, 3, "type"),
            ]
        );
    }

    #[test]
    fn test_multiline_comment_is_split() {
        let decoded = highlight("/* a\nbc */\nenum E {}");
        assert_eq!(decoded[0], (0, 0, 4, "comment"));
        assert_eq!(decoded[1], (1, 0, 5, "comment"));
        assert_eq!(decoded[2], (2, 0, 4, "keyword"));
        assert_eq!(decoded[3], (2, 5, 1, "enum"));
    }

    #[test]
    fn test_legend_matches_query_captures() {
        let highlighter = Highlighter::new(&ProtoTrees::new().unwrap()).unwrap();
        assert!(highlighter.legend_index.iter().all(Option::is_some));
        assert_eq!(legend().token_types.len(), TOKEN_TYPES.len());
    }
}
