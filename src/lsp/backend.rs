// Protolens Language Server Backend
// Implements tower_lsp::LanguageServer over the tree cache and symbol analyzer

use parking_lot::Mutex;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, info, warn};

use super::analyzer::Analyzer;
use super::completion::complete;
use super::highlight::{legend, Highlighter};
use super::position::{point_range, LineIndex};
use super::symbols::{ProtoSymbol, SymbolKind};
use super::trees::{ContentChange, TextDocument};
use crate::config::AnalyzerConfig;

/// Protolens Language Server
pub struct ProtolensLanguageServer {
    client: Client,
    analyzer: Mutex<Analyzer>,
    highlighter: Highlighter,
    /// Roots given on the command line, appended to every configuration
    cli_config: AnalyzerConfig,
    workspace_roots: Mutex<Vec<std::path::PathBuf>>,
}

/// Document state carried by an open or change notification.
struct OpenDocument {
    uri: String,
    version: i32,
    text: String,
}

impl TextDocument for OpenDocument {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn text(&self) -> &str {
        &self.text
    }
}

impl ProtolensLanguageServer {
    pub fn new(
        client: Client,
        analyzer: Analyzer,
        highlighter: Highlighter,
        cli_config: AnalyzerConfig,
    ) -> Self {
        Self {
            client,
            analyzer: Mutex::new(analyzer),
            highlighter,
            cli_config,
            workspace_roots: Mutex::new(Vec::new()),
        }
    }

    /// Settings first, then workspace roots, then command line roots.
    fn merged_config(&self, settings: Option<AnalyzerConfig>) -> AnalyzerConfig {
        let mut config = settings.unwrap_or_default();
        for root in self.workspace_roots.lock().iter() {
            config.push_root(root.clone());
        }
        config.extend(self.cli_config.clone());
        config
    }

    async fn apply_config(&self, settings: Option<AnalyzerConfig>) {
        let config = self.merged_config(settings);
        {
            let mut analyzer = self.analyzer.lock();
            if analyzer.config() == &config {
                debug!("import roots unchanged");
                return;
            }
            analyzer.set_config(config.clone());
        }
        let message = format!("import roots: {:?}", config.import_paths);
        info!("{}", message);
        self.client.log_message(MessageType::INFO, message).await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for ProtolensLanguageServer {
    #[allow(deprecated)]
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        {
            let mut roots = self.workspace_roots.lock();
            let folders = params.workspace_folders.unwrap_or_default();
            for folder in folders {
                if let Ok(path) = folder.uri.to_file_path() {
                    roots.push(path);
                }
            }
            if roots.is_empty() {
                if let Some(path) = params.root_uri.and_then(|uri| uri.to_file_path().ok()) {
                    roots.push(path);
                }
            }
        }
        let settings = params
            .initialization_options
            .as_ref()
            .and_then(AnalyzerConfig::from_settings);
        let config = self.merged_config(settings);
        info!("import roots: {:?}", config.import_paths);
        self.analyzer.lock().set_config(config);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        ..Default::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![
                        ".".to_string(),
                        "(".to_string(),
                        "[".to_string(),
                    ]),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                definition_provider: Some(OneOf::Left(true)),
                semantic_tokens_provider: Some(
                    SemanticTokensServerCapabilities::SemanticTokensOptions(
                        SemanticTokensOptions {
                            legend: legend(),
                            full: Some(SemanticTokensFullOptions::Bool(true)),
                            range: None,
                            ..Default::default()
                        },
                    ),
                ),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "protolens-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Protolens LSP server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.analyzer.lock().trees_mut().clear();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        self.analyzer
            .lock()
            .trees_mut()
            .add_doc(doc.uri.as_str(), &doc.text, doc.version);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.to_string();
        let mut analyzer = self.analyzer.lock();
        let cached = analyzer.trees().cached(&uri).map(|tree| tree.source());
        let Some((text, changes)) = pending_edit(cached, params.content_changes) else {
            debug!("ignoring change to {} before it was opened", uri);
            return;
        };
        let doc = OpenDocument {
            uri,
            version: params.text_document.version,
            text,
        };
        analyzer.trees_mut().edit_doc(&doc, &changes);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.analyzer
            .lock()
            .trees_mut()
            .drop_doc(params.text_document.uri.as_str());
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        match AnalyzerConfig::from_settings(&params.settings) {
            Some(settings) => self.apply_config(Some(settings)).await,
            None => debug!("configuration change without import roots"),
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let mut analyzer = self.analyzer.lock();
        let Some(caret) = caret_offset(&mut analyzer, uri.as_str(), position) else {
            return Ok(None);
        };
        let items = complete(&mut analyzer, uri.as_str(), caret);
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        Ok(hover_at(&mut self.analyzer.lock(), uri.as_str(), position))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let mut locations = definitions_at(&mut self.analyzer.lock(), uri.as_str(), position);
        Ok(match locations.len() {
            0 => None,
            1 => locations.pop().map(GotoDefinitionResponse::Scalar),
            _ => Some(GotoDefinitionResponse::Array(locations)),
        })
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;
        let mut analyzer = self.analyzer.lock();
        if analyzer.trees_mut().get_doc(uri.as_str()).is_none() {
            return Ok(None);
        }
        let symbols = outline(&mut analyzer, uri.as_str());
        Ok(Some(DocumentSymbolResponse::Nested(symbols)))
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let uri = params.text_document.uri;
        let mut analyzer = self.analyzer.lock();
        let Some(tree) = analyzer.trees_mut().get_doc(uri.as_str()) else {
            return Ok(None);
        };
        let data = self.highlighter.tokens(tree);
        Ok(Some(SemanticTokensResult::Tokens(SemanticTokens {
            result_id: None,
            data,
        })))
    }
}

/// Converts editor changes to byte changes, applying each one to `text` so
/// later ranges are measured against the text they were written for.
fn byte_changes(text: &mut String, events: Vec<TextDocumentContentChangeEvent>) -> Vec<ContentChange> {
    let mut changes = Vec::with_capacity(events.len());
    for event in events {
        let (start, end) = match event.range {
            Some(range) => {
                let index = LineIndex::new(text);
                let start = index.offset_of(range.start);
                (start, index.offset_of(range.end).max(start))
            }
            None => (0, text.len()),
        };
        text.replace_range(start..end, &event.text);
        changes.push(ContentChange::new(start, end - start, event.text));
    }
    changes
}

/// Text after `events` and the byte changes producing it, starting from the
/// cached text. Without cached text only a single full replacement can be
/// applied; anything else yields `None`.
fn pending_edit(
    cached: Option<&str>,
    events: Vec<TextDocumentContentChangeEvent>,
) -> Option<(String, Vec<ContentChange>)> {
    let mut text = match (cached, events.as_slice()) {
        (Some(source), _) => source.to_string(),
        (None, [event]) if event.range.is_none() => String::new(),
        (None, _) => return None,
    };
    let changes = byte_changes(&mut text, events);
    Some((text, changes))
}

/// Byte offset of an LSP position in the cached text of `uri`.
fn caret_offset(analyzer: &mut Analyzer, uri: &str, position: Position) -> Option<usize> {
    let tree = analyzer.trees_mut().get_doc(uri)?;
    Some(LineIndex::new(tree.source()).offset_of(position))
}

/// Byte span of the dotted identifier around `offset`.
pub fn word_at(text: &str, offset: usize) -> Option<(usize, usize)> {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.';
    let offset = offset.min(text.len());
    if !text.is_char_boundary(offset) {
        return None;
    }
    let start = text[..offset]
        .rfind(|c: char| !is_word(c))
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = text[offset..]
        .find(|c: char| !is_word(c))
        .map(|i| offset + i)
        .unwrap_or(text.len());
    let word = &text[start..end];
    let end = start + word.trim_end_matches('.').len();
    if start >= end {
        None
    } else {
        Some((start, end))
    }
}

/// Symbols a reference resolves to: message and enum declarations when any
/// match, every match otherwise.
pub fn resolve_reference<'s>(symbols: &'s [ProtoSymbol], word: &str) -> Vec<&'s ProtoSymbol> {
    let matches: Vec<&ProtoSymbol> = symbols
        .iter()
        .filter(|symbol| symbol.matches_reference(word))
        .collect();
    if matches.iter().any(|symbol| symbol.kind.is_type()) {
        matches.into_iter().filter(|symbol| symbol.kind.is_type()).collect()
    } else {
        matches
    }
}

fn word_under_cursor(analyzer: &mut Analyzer, uri: &str, position: Position) -> Option<(String, Range)> {
    let tree = analyzer.trees_mut().get_doc(uri)?;
    let text = tree.source();
    let index = LineIndex::new(text);
    let (start, end) = word_at(text, index.offset_of(position))?;
    let range = Range::new(index.position_at(start), index.position_at(end));
    Some((text[start..end].to_string(), range))
}

fn symbol_range(analyzer: &Analyzer, symbol: &ProtoSymbol) -> Range {
    match analyzer.trees().cached(&symbol.source) {
        Some(tree) => LineIndex::new(tree.source()).range_of(&symbol.range),
        None => point_range(&symbol.range),
    }
}

pub fn definitions_at(analyzer: &mut Analyzer, uri: &str, position: Position) -> Vec<Location> {
    let Some((word, _)) = word_under_cursor(analyzer, uri, position) else {
        return Vec::new();
    };
    let symbols = analyzer.discover_proto_symbols(uri, true);
    let analyzer: &Analyzer = analyzer;
    resolve_reference(&symbols, &word)
        .into_iter()
        .filter_map(|symbol| match Url::parse(&symbol.source) {
            Ok(target) => Some(Location::new(target, symbol_range(analyzer, symbol))),
            Err(err) => {
                warn!("bad symbol source {}: {}", symbol.source, err);
                None
            }
        })
        .collect()
}

pub fn hover_at(analyzer: &mut Analyzer, uri: &str, position: Position) -> Option<Hover> {
    let (word, range) = word_under_cursor(analyzer, uri, position)?;
    let symbols = analyzer.discover_proto_symbols(uri, true);
    let symbol = resolve_reference(&symbols, &word).into_iter().next()?;

    let snippet = match symbol.kind {
        SymbolKind::Field => format!("{} {}", symbol.value_type, symbol.name),
        _ => analyzer
            .trees()
            .cached(&symbol.source)
            .and_then(|tree| {
                tree.source()
                    .get(symbol.decl_range.start_byte..symbol.decl_range.end_byte)
            })
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} {}", symbol.kind, symbol.name)),
    };
    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: format!(
                "**{}** ({})\n\n```proto\n{}\n```",
                symbol.qualified_name(),
                symbol.kind,
                snippet
            ),
        }),
        range: Some(range),
    })
}

/// Local symbols of `uri` nested by declaration containment.
pub fn outline(analyzer: &mut Analyzer, uri: &str) -> Vec<DocumentSymbol> {
    let symbols = analyzer.discover_proto_symbols(uri, false);
    let Some(tree) = analyzer.trees().cached(uri) else {
        return Vec::new();
    };
    let index = LineIndex::new(tree.source());
    let refs: Vec<&ProtoSymbol> = symbols.iter().collect();
    nest(&refs, &index)
}

#[allow(deprecated)]
fn nest(symbols: &[&ProtoSymbol], index: &LineIndex<'_>) -> Vec<DocumentSymbol> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < symbols.len() {
        let parent = symbols[i];
        let mut end = i + 1;
        while end < symbols.len() && parent.decl_range.contains(&symbols[end].decl_range) {
            end += 1;
        }
        let children = nest(&symbols[i + 1..end], index);
        out.push(DocumentSymbol {
            name: parent.name.clone(),
            detail: match parent.kind {
                SymbolKind::Field => Some(parent.value_type.clone()),
                _ => None,
            },
            kind: parent.kind.to_lsp(),
            tags: None,
            deprecated: None,
            range: index.range_of(&parent.decl_range),
            selection_range: index.range_of(&parent.range),
            children: if children.is_empty() {
                None
            } else {
                Some(children)
            },
        });
        i = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::trees::ProtoTrees;

    const URI: &str = "untitled:b.proto";

    fn analyzer_with(source: &str) -> Analyzer {
        let mut trees = ProtoTrees::new().unwrap();
        trees.add_doc(URI, source, 1);
        Analyzer::new(trees, AnalyzerConfig::default()).unwrap()
    }

    #[test]
    fn test_word_at() {
        let text = "  .pkg.Msg field = 1;";
        assert_eq!(word_at(text, 5), Some((2, 10)));
        assert_eq!(word_at(text, 10), Some((2, 10)));
        assert_eq!(word_at("a.b.", 1), Some((0, 3)));
        assert_eq!(word_at("  ", 1), None);
    }

    #[test]
    fn test_byte_changes_track_text() {
        let mut text = "message A {}\n".to_string();
        let events = vec![
            TextDocumentContentChangeEvent {
                range: Some(Range::new(Position::new(0, 9), Position::new(0, 9))),
                range_length: None,
                text: "B".to_string(),
            },
            TextDocumentContentChangeEvent {
                range: Some(Range::new(Position::new(0, 10), Position::new(0, 10))),
                range_length: None,
                text: "C".to_string(),
            },
        ];
        let changes = byte_changes(&mut text, events);
        assert_eq!(text, "message ABC {}\n");
        assert_eq!(changes[1], ContentChange::new(10, 0, "C"));

        let full = vec![TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "enum E {}".to_string(),
        }];
        let changes = byte_changes(&mut text, full);
        assert_eq!(changes, vec![ContentChange::new(0, 15, "enum E {}")]);
        assert_eq!(text, "enum E {}");
    }

    #[test]
    fn test_change_before_open_is_ignored() {
        let ranged = TextDocumentContentChangeEvent {
            range: Some(Range::new(Position::new(0, 0), Position::new(0, 0))),
            range_length: None,
            text: "x".to_string(),
        };
        assert!(pending_edit(None, vec![ranged.clone()]).is_none());

        let mut trees = ProtoTrees::new().unwrap();
        if let Some((text, changes)) = pending_edit(trees.cached(URI).map(|t| t.source()), vec![ranged]) {
            let doc = OpenDocument {
                uri: URI.to_string(),
                version: 3,
                text,
            };
            trees.edit_doc(&doc, &changes);
        }
        assert!(trees.is_empty());
        trees.add_doc(URI, "message Opened {}", 3);
        assert_eq!(trees.cached(URI).unwrap().source(), "message Opened {}");
        assert_eq!(trees.version(URI), Some(3));
    }

    #[test]
    fn test_full_change_before_open_is_applied() {
        let full = TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "enum E {}".to_string(),
        };
        let (text, changes) = pending_edit(None, vec![full]).unwrap();
        assert_eq!(text, "enum E {}");
        assert_eq!(changes, vec![ContentChange::new(0, 0, "enum E {}")]);

        let (text, _) = pending_edit(Some("message A {}"), Vec::new()).unwrap();
        assert_eq!(text, "message A {}");
    }

    #[test]
    fn test_outline_nesting() {
        let mut analyzer = analyzer_with(
            "message A {\n  int32 x = 1;\n  message B { string y = 1; }\n}\nservice S {\n  rpc Get (A) returns (A);\n}\n",
        );
        let symbols = outline(&mut analyzer, URI);
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "A");
        assert_eq!(symbols[0].kind, tower_lsp::lsp_types::SymbolKind::STRUCT);
        let children = symbols[0].children.as_ref().unwrap();
        let names: Vec<&str> = children.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["x", "B"]);
        assert_eq!(children[1].children.as_ref().unwrap()[0].name, "y");
        assert_eq!(symbols[1].children.as_ref().unwrap()[0].name, "Get");
        assert_eq!(symbols[1].selection_range, Range::new(Position::new(4, 8), Position::new(4, 9)));
    }

    #[test]
    fn test_definition_prefers_types() {
        let source = "message Item { int32 Item = 1; }\nmessage Box { Item item = 1; }\n";
        let mut analyzer = analyzer_with(source);
        let locations = definitions_at(&mut analyzer, URI, Position::new(1, 15));
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].range, Range::new(Position::new(0, 8), Position::new(0, 12)));
    }

    #[test]
    fn test_hover_shows_declaration() {
        let source = "message A {\n  message B {}\n  A.B b = 1;\n}\n";
        let mut analyzer = analyzer_with(source);
        let hover = hover_at(&mut analyzer, URI, Position::new(2, 3)).unwrap();
        let HoverContents::Markup(content) = hover.contents else {
            panic!("expected markup");
        };
        assert!(content.value.contains("**A.B** (message)"));
        assert!(content.value.contains("```proto\nmessage B {}\n```"));
        assert_eq!(hover.range, Some(Range::new(Position::new(2, 2), Position::new(2, 5))));

        let hover = hover_at(&mut analyzer, URI, Position::new(2, 6)).unwrap();
        let HoverContents::Markup(content) = hover.contents else {
            panic!("expected markup");
        };
        assert!(content.value.contains("A.B b"));
    }
}
