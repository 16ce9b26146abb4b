// Protolens Completion Provider
// Keyword, scalar type, option and symbol suggestions at a cursor

use rustc_hash::FxHashSet;
use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, Documentation};

use super::analyzer::Analyzer;
use super::position::LineIndex;
use super::trees::DocTree;
use crate::lexer::{Token, Tokenizer};

/// Top-level declaration keywords
pub static KEYWORDS: &[&str] = &[
    "syntax", "package", "option", "import", "message", "enum", "service", "extend",
];

/// Keywords valid inside a message body
pub static BODY_KEYWORDS: &[&str] = &[
    "message",
    "enum",
    "oneof",
    "map",
    "reserved",
    "extensions",
    "extend",
    "option",
    "repeated",
    "optional",
    "required",
];

/// Scalar value types with their encoding notes
pub static SCALAR_TYPES: &[(&str, &str)] = &[
    ("bool", "Boolean value."),
    ("int32", "Uses variable-length encoding. Inefficient for encoding negative numbers; if your field is likely to have negative values, use sint32 instead."),
    ("int64", "Uses variable-length encoding. Inefficient for encoding negative numbers; if your field is likely to have negative values, use sint64 instead."),
    ("uint32", "Uses variable-length encoding."),
    ("uint64", "Uses variable-length encoding."),
    ("sint32", "Uses variable-length encoding. Signed int value. These more efficiently encode negative numbers than regular int32s."),
    ("sint64", "Uses variable-length encoding. Signed int value. These more efficiently encode negative numbers than regular int64s."),
    ("fixed32", "Always four bytes. More efficient than uint32 if values are often greater than 2^28."),
    ("fixed64", "Always eight bytes. More efficient than uint64 if values are often greater than 2^56."),
    ("sfixed32", "Always four bytes."),
    ("sfixed64", "Always eight bytes."),
    ("float", "32-bit floating point."),
    ("double", "64-bit floating point."),
    ("string", "A string must always contain UTF-8 encoded or 7-bit ASCII text."),
    ("bytes", "May contain any arbitrary sequence of bytes."),
];

/// File-level options
pub static FILE_OPTIONS: &[(&str, &str)] = &[
    ("java_package", "Sets the Java package where classes generated from this .proto will be placed. By default the proto package is used."),
    ("java_outer_classname", "If set, all the classes from the .proto file are wrapped in a single outer class with the given name."),
    ("java_multiple_files", "If set true, a separate .java file is generated for each top-level message, enum, and service defined in the .proto file."),
    ("java_generate_equals_and_hash", "If set true, equals() and hashCode() methods are generated for all messages defined in the .proto file."),
    ("java_string_check_utf8", "If set true, generated code throws whenever a non-UTF-8 byte sequence is assigned to a string field."),
    ("optimize_for", "Generated classes can be optimized for speed or code size."),
    ("go_package", "Sets the Go package where structs generated from this .proto will be placed."),
    ("deprecated", "Is this file deprecated? Depending on the target platform this emits Deprecated annotations or is ignored."),
    ("cc_enable_arenas", "Enables the use of arenas for the proto messages in this file. Applies only to generated C++ classes."),
    ("objc_class_prefix", "Sets the Objective-C class prefix prepended to all generated classes from this .proto. There is no default."),
    ("csharp_namespace", "Namespace for generated classes; defaults to the package."),
];

/// Field-level options
pub static FIELD_OPTIONS: &[(&str, &str)] = &[
    ("deprecated", "Is this field deprecated? Depending on the target platform this emits Deprecated annotations or is ignored."),
    ("packed", "Use the packed encoding for a repeated field of scalar numeric type."),
    ("json_name", "Overrides the name used for this field in the JSON mapping."),
    ("lazy", "Parse this message field lazily."),
];

/// What kind of suggestion the cursor position calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionContext {
    TopLevel,
    /// A field type, optionally followed by body keywords
    FieldType { keywords: bool },
    FileOption,
    FieldOption,
    /// Request/response type of an rpc
    RpcType,
    Nothing,
}

const CONTEXT_KINDS: &[&str] = &[
    "source_file",
    "message_body",
    "enum_body",
    "oneof",
    "field",
    "map_field",
    "field_options",
    "rpc",
    "service",
];

/// Classifies the cursor at byte `caret` of `tree`.
pub fn completion_context(tree: &DocTree, caret: usize) -> CompletionContext {
    let source = tree.source();
    let caret = caret.min(source.len());
    let point = LineIndex::new(source).point_at(caret);
    let Some(mut node) = tree.root_node().named_descendant_for_point_range(point, point) else {
        return CompletionContext::Nothing;
    };
    while !CONTEXT_KINDS.contains(&node.kind()) {
        match node.parent() {
            Some(parent) => node = parent,
            None => break,
        }
    }

    let (kind, base) = if node.has_error() {
        (enclosing_block(source.get(..caret).unwrap_or("")), 0)
    } else {
        (node.kind(), node.start_byte())
    };
    let text = source.get(base..caret).unwrap_or("");
    let prev = previous_token(text, base, caret);
    let prev = prev.as_ref().map(|token| token.text.as_str());

    match (kind, prev) {
        (_, Some("option")) => CompletionContext::FileOption,
        (_, Some("[")) => CompletionContext::FieldOption,
        ("field_options", Some(",")) => CompletionContext::FieldOption,
        ("rpc" | "service", Some("(" | "stream")) => CompletionContext::RpcType,
        ("source_file", _) => CompletionContext::TopLevel,
        ("message_body" | "oneof", None | Some("{" | ";" | "}")) => {
            CompletionContext::FieldType { keywords: true }
        }
        ("field", None) => CompletionContext::FieldType { keywords: true },
        ("message_body" | "oneof" | "field", Some("repeated" | "optional" | "required")) => {
            CompletionContext::FieldType { keywords: false }
        }
        ("map_field", Some("," | "<")) => CompletionContext::FieldType { keywords: false },
        _ => CompletionContext::Nothing,
    }
}

/// Node kind of the innermost construct left open at the end of `text`,
/// found by scanning braces and brackets. Used where the tree around the
/// caret is broken.
fn enclosing_block(text: &str) -> &'static str {
    let mut open: Vec<&'static str> = Vec::new();
    let mut opener: Option<&'static str> = None;
    let mut last = String::new();
    let mut in_string = false;

    for token in Tokenizer::alternate(text).tokens() {
        let Ok(token) = token else {
            break;
        };
        let word = token.text.as_str();
        if word == "\"" || word == "'" {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match word {
            "{" => {
                open.push(opener.take().unwrap_or("block"));
            }
            "}" => {
                while let Some(kind) = open.pop() {
                    if kind != "field_options" && kind != "map_field" {
                        break;
                    }
                }
                opener = None;
            }
            ";" => opener = None,
            "[" => open.push("field_options"),
            "]" => {
                if open.last() == Some(&"field_options") {
                    open.pop();
                }
            }
            "<" if last == "map" => open.push("map_field"),
            ">" => {
                if open.last() == Some(&"map_field") {
                    open.pop();
                }
            }
            _ if opener.is_none() => opener = block_kind(word),
            _ => {}
        }
        last = token.text;
    }
    open.last().copied().unwrap_or("source_file")
}

/// Node kind of the block a declaration keyword opens.
fn block_kind(keyword: &str) -> Option<&'static str> {
    match keyword {
        "message" | "extend" | "group" => Some("message_body"),
        "enum" => Some("enum_body"),
        "oneof" => Some("oneof"),
        "service" => Some("service"),
        "rpc" => Some("rpc"),
        _ => None,
    }
}

/// The token before the caret inside `text`, which starts at byte `base` of
/// the document. A word ending right at the caret is the one being typed, so
/// the token before it is returned instead.
pub fn previous_token(text: &str, base: usize, caret: usize) -> Option<Token> {
    let mut stack: Vec<Token> = Vec::new();
    for token in Tokenizer::alternate(text).tokens() {
        let Ok(token) = token else {
            break;
        };
        if base + token.offset > caret {
            break;
        }
        stack.push(token);
    }

    let last = stack.last()?;
    let typing = base + last.offset == caret
        && last
            .text
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if typing {
        stack.len().checked_sub(2).map(|i| stack.swap_remove(i))
    } else {
        stack.pop()
    }
}

fn keyword_items<'a>(keywords: &'a [&'a str]) -> impl Iterator<Item = CompletionItem> + 'a {
    keywords.iter().map(|keyword| CompletionItem {
        label: keyword.to_string(),
        kind: Some(CompletionItemKind::KEYWORD),
        ..Default::default()
    })
}

fn documented_items(
    entries: &'static [(&'static str, &'static str)],
    kind: CompletionItemKind,
) -> impl Iterator<Item = CompletionItem> {
    entries.iter().map(move |(label, doc)| CompletionItem {
        label: label.to_string(),
        kind: Some(kind),
        documentation: Some(Documentation::String(doc.to_string())),
        ..Default::default()
    })
}

/// Message and enum symbols visible from `uri`, labelled by full ident.
fn type_items(analyzer: &mut Analyzer, uri: &str) -> Vec<CompletionItem> {
    let mut seen = FxHashSet::default();
    analyzer
        .discover_proto_symbols(uri, true)
        .into_iter()
        .filter(|symbol| symbol.kind.is_type())
        .filter(|symbol| seen.insert(symbol.qualified_name()))
        .map(|symbol| CompletionItem {
            label: symbol.full_ident(),
            kind: Some(symbol.kind.to_completion_kind()),
            detail: Some(format!("{} {}", symbol.kind, symbol.qualified_name())),
            ..Default::default()
        })
        .collect()
}

/// Completion items for byte `caret` of document `uri`.
pub fn complete(analyzer: &mut Analyzer, uri: &str, caret: usize) -> Vec<CompletionItem> {
    let context = match analyzer.trees_mut().get_doc(uri) {
        Some(tree) => completion_context(tree, caret),
        None => return Vec::new(),
    };
    tracing::debug!("completion context {:?}", context);

    let mut items = Vec::new();
    match context {
        CompletionContext::TopLevel => items.extend(keyword_items(KEYWORDS)),
        CompletionContext::FieldType { keywords } => {
            items.extend(documented_items(SCALAR_TYPES, CompletionItemKind::KEYWORD));
            items.extend(type_items(analyzer, uri));
            if keywords {
                items.extend(keyword_items(BODY_KEYWORDS));
            }
        }
        CompletionContext::FileOption => {
            items.extend(documented_items(FILE_OPTIONS, CompletionItemKind::PROPERTY))
        }
        CompletionContext::FieldOption => {
            items.extend(documented_items(FIELD_OPTIONS, CompletionItemKind::PROPERTY))
        }
        CompletionContext::RpcType => {
            items.extend(
                type_items(analyzer, uri)
                    .into_iter()
                    .filter(|item| item.kind == Some(CompletionItemKind::STRUCT)),
            );
        }
        CompletionContext::Nothing => {}
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::lsp::trees::ProtoTrees;

    fn context_at_marker(marked: &str) -> CompletionContext {
        let caret = marked.find('|').unwrap();
        let source = marked.replacen('|', "", 1);
        let mut trees = ProtoTrees::new().unwrap();
        trees.add_doc("untitled:ctx.proto", &source, 1);
        completion_context(trees.cached("untitled:ctx.proto").unwrap(), caret)
    }

    #[test]
    fn test_previous_token() {
        let prev = previous_token("message A { repeated ", 0, 21).unwrap();
        assert_eq!(prev.text, "repeated");
        let prev = previous_token("message A { repe", 0, 16).unwrap();
        assert_eq!(prev.text, "{");
        let prev = previous_token("{ int32 a = 1; } ", 100, 115).unwrap();
        assert_eq!(prev.text, ";");
        assert!(previous_token("", 0, 0).is_none());
        assert!(previous_token("abc", 0, 3).is_none());
    }

    #[test]
    fn test_contexts() {
        assert_eq!(context_at_marker("syntax = \"proto3\";\n|"), CompletionContext::TopLevel);
        assert_eq!(
            context_at_marker("message A {\n  |\n}"),
            CompletionContext::FieldType { keywords: true }
        );
        assert_eq!(
            context_at_marker("message A {\n  int32 a = 1;\n  repeated |\n}"),
            CompletionContext::FieldType { keywords: false }
        );
        assert_eq!(
            context_at_marker("message A {\n  Fo|\n}"),
            CompletionContext::FieldType { keywords: true }
        );
        assert_eq!(context_at_marker("option |"), CompletionContext::FileOption);
        assert_eq!(
            context_at_marker("message A {\n  int32 a = 1 [|\n}"),
            CompletionContext::FieldOption
        );
        assert_eq!(
            context_at_marker("service S {\n  rpc Get (|\n}"),
            CompletionContext::RpcType
        );
        assert_eq!(
            context_at_marker("enum E {\n  |\n}"),
            CompletionContext::Nothing
        );
        assert_eq!(
            context_at_marker("message A {\n  map<string, |\n}"),
            CompletionContext::FieldType { keywords: false }
        );
        assert_eq!(
            context_at_marker("message A {\n  oneof o {\n    |\n  }\n}"),
            CompletionContext::FieldType { keywords: true }
        );
    }

    #[test]
    fn test_enclosing_block() {
        assert_eq!(enclosing_block(""), "source_file");
        assert_eq!(enclosing_block("message A { int32 a = 1;"), "message_body");
        assert_eq!(enclosing_block("message A { enum E { X = 0; } "), "message_body");
        assert_eq!(enclosing_block("message A { enum E { "), "enum_body");
        assert_eq!(enclosing_block("message A {} service S { rpc A (X) returns (Y) {"), "rpc");
        assert_eq!(enclosing_block("message A { int32 a = 1 [deprecated = true, "), "field_options");
        assert_eq!(enclosing_block("message A { map<string, "), "map_field");
        assert_eq!(enclosing_block("option (x) = { a: \"}\" "), "block");
        assert_eq!(enclosing_block("message A { int32 a = 1 [ }"), "source_file");
    }

    #[test]
    fn test_complete_field_types_include_symbols() {
        let uri = "untitled:c.proto";
        let mut trees = ProtoTrees::new().unwrap();
        trees.add_doc(uri, "message Outer {\n  message Inner {}\n  \n}\nenum Kind { K = 0; }\n", 1);
        let mut analyzer = Analyzer::new(trees, AnalyzerConfig::default()).unwrap();
        let caret = "message Outer {\n  message Inner {}\n  ".len();
        let items = complete(&mut analyzer, uri, caret);
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"int32"));
        assert!(labels.contains(&"Outer.Inner"));
        assert!(labels.contains(&"Kind"));
        assert!(labels.contains(&"oneof"));
        assert!(!labels.contains(&"syntax"));
    }

    #[test]
    fn test_complete_rpc_types_only_messages() {
        let uri = "untitled:r.proto";
        let source = "message Req {}\nenum E { X = 0; }\nservice S {\n  rpc Get (\n}\n";
        let mut trees = ProtoTrees::new().unwrap();
        trees.add_doc(uri, source, 1);
        let mut analyzer = Analyzer::new(trees, AnalyzerConfig::default()).unwrap();
        let caret = source.find("(\n").unwrap() + 1;
        let items = complete(&mut analyzer, uri, caret);
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["Req"]);
    }
}
