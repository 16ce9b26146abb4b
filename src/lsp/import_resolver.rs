// Protolens Import Resolver
// Maps import literals to files on disk using the configured search roots

use std::path::{Component, Path, PathBuf};
use tower_lsp::lsp_types::Url;

use crate::config::AnalyzerConfig;
use crate::error::{ResolveError, ResolveResult};

/// Resolves `import "..."` literals against an ordered list of roots.
#[derive(Debug, Clone, Default)]
pub struct ImportResolver {
    roots: Vec<PathBuf>,
}

impl ImportResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(config.import_paths.clone())
    }

    /// Resolves `literal` as imported from `source_uri`.
    ///
    /// Relative literals (`./x`, `../x`) try the importing file's directory
    /// first. Then every root is tried in order, and finally the importing
    /// file's directory. The first existing file wins.
    pub fn resolve(&self, source_uri: &str, literal: &str) -> ResolveResult<PathBuf> {
        let target = strip_quotes(literal);
        let unresolved = || ResolveError::UnresolvedImport {
            literal: target.to_string(),
            source_uri: source_uri.to_string(),
        };
        if target.is_empty() {
            return Err(unresolved());
        }

        let target_path = Path::new(target);
        if target_path.is_absolute() {
            let candidate = normalize(target_path);
            return if candidate.is_file() {
                Ok(candidate)
            } else {
                Err(unresolved())
            };
        }

        let source_dir = source_dir(source_uri);
        let explicit_relative = target.starts_with("./") || target.starts_with("../");

        let mut search: Vec<&Path> = Vec::with_capacity(self.roots.len() + 2);
        if explicit_relative {
            search.extend(source_dir.as_deref());
        }
        search.extend(self.roots.iter().map(PathBuf::as_path));
        search.extend(source_dir.as_deref());

        search
            .into_iter()
            .map(|dir| normalize(&dir.join(target_path)))
            .find(|candidate| candidate.is_file())
            .ok_or_else(unresolved)
    }

    /// Like [`resolve`](Self::resolve), returning a `file://` URI.
    pub fn resolve_uri(&self, source_uri: &str, literal: &str) -> ResolveResult<String> {
        let path = self.resolve(source_uri, literal)?;
        Url::from_file_path(&path)
            .map(|url| url.to_string())
            .map_err(|_| ResolveError::UnresolvedImport {
                literal: strip_quotes(literal).to_string(),
                source_uri: source_uri.to_string(),
            })
    }
}

/// Removes one pair of surrounding `"` or `'` quotes.
pub fn strip_quotes(literal: &str) -> &str {
    let literal = literal.trim();
    let literal = literal
        .strip_prefix('"')
        .or_else(|| literal.strip_prefix('\''))
        .unwrap_or(literal);
    literal
        .strip_suffix('"')
        .or_else(|| literal.strip_suffix('\''))
        .unwrap_or(literal)
}

fn source_dir(source_uri: &str) -> Option<PathBuf> {
    let url = Url::parse(source_uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    let path = url.to_file_path().ok()?;
    path.parent().map(Path::to_path_buf)
}

/// Lexically resolves `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
