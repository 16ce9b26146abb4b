// Protolens Tree Cache
// One incrementally maintained syntax tree per document

use rustc_hash::FxHashMap;
use tower_lsp::lsp_types::Url;
use tracing::{debug, warn};
use tree_sitter::{
    InputEdit, Language, Node, Parser, Query, QueryCapture, QueryCursor, StreamingIterator, Tree,
};

use super::position::LineIndex;
use crate::error::{ResolveError, ResolveResult, SyntaxResult};

/// Version given to documents read from disk. Any editor version supersedes it.
pub const DISK_VERSION: i32 = -1;

/// Editor-side view of a document.
pub trait TextDocument {
    fn uri(&self) -> &str;
    fn version(&self) -> i32;
    fn text(&self) -> &str;
}

/// One replaced span, in byte offsets of the text it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub range_offset: usize,
    pub range_length: usize,
    pub text: String,
}

impl ContentChange {
    pub fn new(range_offset: usize, range_length: usize, text: impl Into<String>) -> Self {
        Self {
            range_offset,
            range_length,
            text: text.into(),
        }
    }
}

/// A parsed document: its text, the tree over that text and the version
/// both belong to.
#[derive(Debug, Clone)]
pub struct DocTree {
    version: i32,
    source: String,
    tree: Tree,
}

impl DocTree {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text spanned by `node`, a node of this tree.
    pub fn text_of(&self, node: &Node<'_>) -> &str {
        self.source.get(node.byte_range()).unwrap_or("")
    }

    /// Every capture of `query` over the whole tree, in document order.
    pub fn captures(&self, query: &Query) -> Vec<QueryCapture<'_>> {
        let mut cursor = QueryCursor::new();
        let mut captures = cursor.captures(query, self.tree.root_node(), self.source.as_bytes());
        let mut found = Vec::new();
        while let Some((found_match, index)) = captures.next() {
            found.push(found_match.captures[*index]);
        }
        found
    }
}

/// Owns the syntax tree of every known document.
pub struct ProtoTrees {
    language: Language,
    parser: Parser,
    docs: FxHashMap<String, DocTree>,
}

impl ProtoTrees {
    pub fn new() -> SyntaxResult<Self> {
        let language: Language = tree_sitter_proto::LANGUAGE.into();
        let mut parser = Parser::new();
        parser.set_language(&language)?;
        Ok(Self {
            language,
            parser,
            docs: FxHashMap::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.docs.contains_key(uri)
    }

    pub fn version(&self, uri: &str) -> Option<i32> {
        self.docs.get(uri).map(|doc| doc.version)
    }

    /// Parses `content` and stores it, unless a tree of the same or a newer
    /// version is already cached.
    pub fn add_doc(&mut self, uri: &str, content: &str, version: i32) {
        if let Some(existing) = self.docs.get(uri) {
            if existing.version >= version {
                return;
            }
        }
        let Some(tree) = self.parser.parse(content, None) else {
            warn!("parser gave up on {}", uri);
            return;
        };
        debug!("parsed {} at version {}", uri, version);
        self.docs.insert(
            uri.to_string(),
            DocTree {
                version,
                source: content.to_string(),
                tree,
            },
        );
    }

    pub fn add_document(&mut self, doc: &impl TextDocument) {
        self.add_doc(doc.uri(), doc.text(), doc.version());
    }

    /// Applies ordered content changes to the cached tree of `doc`.
    ///
    /// Unknown documents are parsed from `doc` instead. Changes carrying a
    /// version no newer than the cached one are dropped.
    pub fn edit_doc(&mut self, doc: &impl TextDocument, changes: &[ContentChange]) {
        let uri = doc.uri();
        let version = doc.version();
        let Some(entry) = self.docs.get_mut(uri) else {
            self.add_document(doc);
            return;
        };
        if version <= entry.version {
            debug!(
                "dropping stale edit of {} (version {} <= {})",
                uri, version, entry.version
            );
            return;
        }
        entry.version = version;

        for change in changes {
            let start = change.range_offset.min(entry.source.len());
            let old_end = (start + change.range_length).min(entry.source.len());
            if !entry.source.is_char_boundary(start) || !entry.source.is_char_boundary(old_end) {
                debug!("edit of {} splits a character, reparsing from the editor text", uri);
                if let Some(tree) = self.parser.parse(doc.text(), None) {
                    entry.source = doc.text().to_string();
                    entry.tree = tree;
                }
                return;
            }

            let (start_position, old_end_position) = {
                let index = LineIndex::new(&entry.source);
                (index.point_at(start), index.point_at(old_end))
            };
            entry.source.replace_range(start..old_end, &change.text);
            let new_end = start + change.text.len();
            let new_end_position = LineIndex::new(&entry.source).point_at(new_end);

            entry.tree.edit(&InputEdit {
                start_byte: start,
                old_end_byte: old_end,
                new_end_byte: new_end,
                start_position,
                old_end_position,
                new_end_position,
            });
            match self.parser.parse(&entry.source, Some(&entry.tree)) {
                Some(tree) => entry.tree = tree,
                None => warn!("parser gave up on {} at version {}", uri, version),
            }
        }
    }

    /// Releases the tree of `uri`, if any.
    pub fn drop_doc(&mut self, uri: &str) {
        if self.docs.remove(uri).is_some() {
            debug!("dropped {}", uri);
        }
    }

    /// Tree for `uri`, reading `file://` documents from disk on first use.
    pub fn get_doc(&mut self, uri: &str) -> Option<&DocTree> {
        if !self.docs.contains_key(uri) {
            if let Err(err) = self.load_from_disk(uri) {
                debug!("{}", err);
                return None;
            }
        }
        self.docs.get(uri)
    }

    /// Tree for an editor document, parsed from its live text on first use.
    pub fn get(&mut self, doc: &impl TextDocument) -> Option<&DocTree> {
        if !self.docs.contains_key(doc.uri()) {
            self.add_document(doc);
        }
        self.docs.get(doc.uri())
    }

    /// Cached tree without any loading.
    pub fn cached(&self, uri: &str) -> Option<&DocTree> {
        self.docs.get(uri)
    }

    /// Compiles a query against the proto grammar.
    pub fn query(&self, source: &str) -> SyntaxResult<Query> {
        Ok(Query::new(&self.language, source)?)
    }

    /// Releases every cached tree.
    pub fn clear(&mut self) {
        debug!("releasing {} trees", self.docs.len());
        self.docs.clear();
    }

    fn load_from_disk(&mut self, uri: &str) -> ResolveResult<()> {
        let path = Url::parse(uri)
            .ok()
            .filter(|url| url.scheme() == "file")
            .and_then(|url| url.to_file_path().ok())
            .ok_or_else(|| ResolveError::MissingDocument {
                uri: uri.to_string(),
            })?;
        let content = std::fs::read_to_string(&path).map_err(|source| ResolveError::Io {
            path: path.clone(),
            source,
        })?;
        self.add_doc(uri, &content, DISK_VERSION);
        Ok(())
    }
}

impl Drop for ProtoTrees {
    fn drop(&mut self) {
        self.clear();
    }
}
