use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::FetchError;
use crate::model::Uri;

/// Enumerates candidate URIs and reads their contents. The workspace
/// never touches the filesystem directly; everything goes through here.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// All candidate URIs this store exposes.
    async fn list(&self) -> Result<Vec<Uri>, FetchError>;

    /// Read the full text behind a URI.
    async fn read(&self, uri: &Uri) -> Result<String, FetchError>;
}

/// Decides which URIs belong to the workspace. Full glob mechanics are
/// the host's business; the workspace only consumes this contract.
#[async_trait]
pub trait Matcher: Send + Sync {
    fn is_match(&self, uri: &Uri) -> bool;

    /// Re-read whatever backing configuration the matcher has. Called
    /// before handling file-creation events.
    async fn refresh(&self) {}
}

/// Data store over a local directory tree.
pub struct LocalFileDataStore {
    root: PathBuf,
}

impl LocalFileDataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DataStore for LocalFileDataStore {
    async fn list(&self) -> Result<Vec<Uri>, FetchError> {
        let mut uris = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            match entry {
                Ok(entry) => {
                    if entry.path().is_file() {
                        uris.push(Uri::file(entry.path()));
                    }
                }
                // a failing root means nothing was enumerated at all
                Err(err) if err.depth() == 0 => {
                    return Err(FetchError::List { source: err.into() });
                }
                Err(err) => warn!(error = %err, "skipping unreadable entry"),
            }
        }
        Ok(uris)
    }

    async fn read(&self, uri: &Uri) -> Result<String, FetchError> {
        tokio::fs::read_to_string(uri.to_path_buf())
            .await
            .map_err(|source| FetchError::Read {
                uri: uri.clone(),
                source,
            })
    }
}

/// Matcher that accepts everything.
pub struct IncludeAllMatcher;

#[async_trait]
impl Matcher for IncludeAllMatcher {
    fn is_match(&self, _uri: &Uri) -> bool {
        true
    }
}

/// Matcher that drops URIs containing any of the ignored path segments
/// (`.git`, `node_modules`, ...).
pub struct IgnorePatternMatcher {
    ignored_segments: Vec<String>,
}

impl IgnorePatternMatcher {
    pub fn new(ignored_segments: Vec<String>) -> Self {
        Self { ignored_segments }
    }
}

#[async_trait]
impl Matcher for IgnorePatternMatcher {
    fn is_match(&self, uri: &Uri) -> bool {
        !uri.segments()
            .any(|seg| self.ignored_segments.iter().any(|p| p == seg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_pattern_matcher() {
        let matcher = IgnorePatternMatcher::new(vec![".git".into(), "node_modules".into()]);
        assert!(matcher.is_match(&Uri::file("/vault/note.md")));
        assert!(!matcher.is_match(&Uri::file("/vault/.git/config")));
        assert!(!matcher.is_match(&Uri::file("/vault/node_modules/x/y.md")));
    }

    #[tokio::test]
    async fn test_local_file_data_store_lists_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.md"), "# B").unwrap();

        let store = LocalFileDataStore::new(dir.path());
        let mut uris = store.list().await.unwrap();
        uris.sort();
        assert_eq!(uris.len(), 2);

        let text = store.read(&Uri::file(dir.path().join("a.md"))).await.unwrap();
        assert_eq!(text, "# A");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_fetch_error() {
        let store = LocalFileDataStore::new("/nowhere");
        let err = store.read(&Uri::file("/nowhere/gone.md")).await;
        assert!(matches!(err, Err(FetchError::Read { .. })));
    }

    #[tokio::test]
    async fn test_list_unreadable_root_is_fetch_error() {
        let store = LocalFileDataStore::new("/nowhere");
        assert!(matches!(
            store.list().await,
            Err(FetchError::List { .. })
        ));
    }
}
